//! Cluster Gateway (C1): the only module permitted to speak HTTP to a
//! tenant's Elasticsearch/OpenSearch cluster (§4.1).

pub mod client;
pub mod error;
pub mod retry;
pub mod types;

pub use client::ClusterGateway;
pub use error::{ClusterError, ClusterResult};
pub use retry::RetryPolicy;
