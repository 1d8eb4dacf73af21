//! Provisional clustering of face embeddings during a bulk scan.
//!
//! Faces that match no confirmed identity are grouped greedily: each face
//! joins the open cluster whose centroid is most similar, or opens a new one
//! when nothing clears the threshold. Centroids are running means kept as a
//! sum and a count, so each assignment costs one pass over the open clusters.
//!
//! # Usage
//!
//! ```
//! use facelink_vecid::{ClusterBuilder, Config};
//!
//! let mut builder = ClusterBuilder::new(Config { dim: 3, threshold: 0.49 });
//!
//! let a = builder.assign(&[1.0, 0.0, 0.0], "face-a").unwrap();
//! let b = builder.assign(&[0.9, 0.1, 0.0], "face-b").unwrap();
//! let c = builder.assign(&[0.0, 0.0, 1.0], "face-c").unwrap();
//! assert_eq!(a.cluster, b.cluster);
//! assert!(c.opened);
//!
//! let clusters = builder.finish();
//! assert_eq!(clusters.len(), 2);
//! ```
//!
//! # Ordering
//!
//! Assignment is greedy and single pass. The same faces in a different order
//! can produce different clusters, and a later face never splits an earlier
//! cluster.

mod builder;
mod error;

pub use builder::{Assignment, ClusterBuilder, ClusterRef, Config, ProvisionalCluster, mean_vector};
pub use error::VecIdError;
