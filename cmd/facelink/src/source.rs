//! Face files on disk.
//!
//! One JSON file per image, as written by the detector:
//!
//! ```json
//! { "image_id": "IMG_0042", "faces": [ { "id": "...", "vector": [...] } ] }
//! ```
//!
//! `image_id` defaults to the file stem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use facelink_resolve::{DetectedFace, FaceSource, ResolveError, Result};
use serde::Deserialize;

/// Faces detected in one image.
#[derive(Debug, Deserialize)]
pub struct ImageFaces {
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

/// Reads a face file, filling in image ids from the file stem when absent.
pub async fn read_face_file(path: &Path) -> Result<ImageFaces> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ResolveError::Scan(format!("reading {}: {e}", path.display())))?;
    let mut file: ImageFaces = serde_json::from_slice(&data)
        .map_err(|e| ResolveError::Scan(format!("parsing {}: {e}", path.display())))?;
    if file.image_id.is_empty() {
        file.image_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }
    for face in &mut file.faces {
        if face.image_id.is_empty() {
            face.image_id = file.image_id.clone();
        }
    }
    Ok(file)
}

/// A [FaceSource] over a directory of `*.json` face files. Images are
/// identified by file stem and scanned in name order.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_of(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.json"))
    }
}

#[async_trait]
impl FaceSource for DirSource {
    async fn images(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| ResolveError::Scan(format!("listing {}: {e}", self.dir.display())))?;
        let mut stems = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|e| ResolveError::Scan(format!("listing {}: {e}", self.dir.display())))?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }

    async fn faces(&self, image_id: &str) -> Result<Vec<DetectedFace>> {
        Ok(read_face_file(&self.path_of(image_id)).await?.faces)
    }
}
