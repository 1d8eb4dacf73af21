pub mod client;
pub mod cosine;
pub mod error;
pub mod point;
pub mod store_index;

pub use client::SimilarityClient;
pub use cosine::cosine_similarity;
pub use error::VecError;
pub use point::{Filter, Gender, Point, PointPayload, ScoredPoint, ScrollPage};
pub use store_index::StoreIndex;
