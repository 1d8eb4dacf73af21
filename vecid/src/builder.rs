use std::fmt;

use facelink_vecstore::cosine_similarity;

use crate::error::VecIdError;

/// Controls clustering behavior.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Embedding dimension (512 for the face model).
    pub dim: usize,

    /// Minimum cosine similarity between a face and a cluster centroid for
    /// the face to join that cluster. Used as given, including 0.0 and
    /// negative values. Default: 0.49.
    pub threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: 512,
            threshold: 0.49,
        }
    }
}

/// Index of an open cluster inside one [ClusterBuilder].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterRef(pub usize);

/// Result of [ClusterBuilder::assign].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub cluster: ClusterRef,

    /// True if the face opened a new cluster.
    pub opened: bool,

    /// Similarity to the best existing centroid, if any cluster was open.
    pub similarity: Option<f32>,
}

/// A scan-scoped group of faces with a running centroid.
#[derive(Clone)]
pub struct ProvisionalCluster<T> {
    sum: Vec<f64>,
    count: usize,
    members: Vec<T>,
}

impl<T> ProvisionalCluster<T> {
    fn open(vector: &[f32], member: T) -> Self {
        Self {
            sum: vector.iter().map(|&x| x as f64).collect(),
            count: 1,
            members: vec![member],
        }
    }

    fn push(&mut self, vector: &[f32], member: T) {
        for (s, &x) in self.sum.iter_mut().zip(vector.iter()) {
            *s += x as f64;
        }
        self.count += 1;
        self.members.push(member);
    }

    /// Mean of every vector added so far.
    pub fn centroid(&self) -> Vec<f32> {
        let n = self.count.max(1) as f64;
        self.sum.iter().map(|&s| (s / n) as f32).collect()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Members in insertion order.
    pub fn members(&self) -> &[T] {
        &self.members
    }

    pub fn into_members(self) -> Vec<T> {
        self.members
    }
}

impl<T> fmt::Debug for ProvisionalCluster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionalCluster")
            .field("count", &self.count)
            .field("dim", &self.sum.len())
            .finish()
    }
}

/// Greedy nearest-centroid clustering for a single scan.
///
/// Not thread-safe: one builder belongs to one scan task.
pub struct ClusterBuilder<T> {
    cfg: Config,
    clusters: Vec<ProvisionalCluster<T>>,
}

impl<T> ClusterBuilder<T> {
    /// Creates an empty builder. Panics if `cfg.dim` is 0.
    pub fn new(cfg: Config) -> Self {
        assert!(cfg.dim > 0, "vecid: Config.dim must be positive");
        Self {
            cfg,
            clusters: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.cfg.threshold
    }

    /// Assigns a face to the most similar open cluster, or opens a new one
    /// if no centroid reaches the threshold.
    pub fn assign(&mut self, vector: &[f32], member: T) -> Result<Assignment, VecIdError> {
        if vector.is_empty() {
            return Err(VecIdError::EmptyVector);
        }
        if vector.len() != self.cfg.dim {
            return Err(VecIdError::DimensionMismatch {
                expected: self.cfg.dim,
                got: vector.len(),
            });
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, cluster) in self.clusters.iter().enumerate() {
            let sim = cosine_similarity(vector, &cluster.centroid());
            if best.is_none_or(|(_, b)| sim > b) {
                best = Some((i, sim));
            }
        }

        match best {
            Some((idx, sim)) if sim >= self.cfg.threshold => {
                self.clusters[idx].push(vector, member);
                Ok(Assignment {
                    cluster: ClusterRef(idx),
                    opened: false,
                    similarity: Some(sim),
                })
            }
            _ => {
                self.clusters.push(ProvisionalCluster::open(vector, member));
                Ok(Assignment {
                    cluster: ClusterRef(self.clusters.len() - 1),
                    opened: true,
                    similarity: best.map(|(_, s)| s),
                })
            }
        }
    }

    /// Returns the cluster behind a reference, or None if out of range.
    pub fn cluster(&self, r: ClusterRef) -> Option<&ProvisionalCluster<T>> {
        self.clusters.get(r.0)
    }

    /// Current centroid of a cluster.
    pub fn centroid(&self, r: ClusterRef) -> Option<Vec<f32>> {
        self.cluster(r).map(ProvisionalCluster::centroid)
    }

    /// Number of open clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total faces assigned across all clusters.
    pub fn face_count(&self) -> usize {
        self.clusters.iter().map(|c| c.count).sum()
    }

    /// Closes the scan and returns every cluster in creation order.
    pub fn finish(self) -> Vec<ProvisionalCluster<T>> {
        self.clusters
    }
}

/// Arithmetic mean of equally sized vectors. Vectors whose length differs
/// from the first one are ignored. Returns None for an empty input.
pub fn mean_vector<V: AsRef<[f32]>>(vectors: &[V]) -> Option<Vec<f32>> {
    let dim = vectors.first()?.as_ref().len();
    let mut sum = vec![0.0f64; dim];
    let mut n = 0usize;
    for v in vectors {
        let v = v.as_ref();
        if v.len() != dim {
            continue;
        }
        for (s, &x) in sum.iter_mut().zip(v.iter()) {
            *s += x as f64;
        }
        n += 1;
    }
    let n = n as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}
