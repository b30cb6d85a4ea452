pub mod cluster_repository;
#[cfg(test)]
pub mod memory;
pub mod workload_registry;

pub use cluster_repository::MongoClusterStateRepository;
#[cfg(test)]
pub use memory::{InMemoryClusterStore, RecordingAlertSink, StaticWorkloadRegistry};
pub use workload_registry::MongoWorkloadRegistry;
