//! Knowledge retrieval channels and their fusion

pub mod hybrid;
pub mod vector;

pub use hybrid::{HybridRetriever, KnowledgeQuery};
pub use vector::{RemoteVectorSearch, VectorHit, VectorSearch, VectorSearchError};
