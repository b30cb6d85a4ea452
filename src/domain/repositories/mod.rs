pub mod cluster;

pub use cluster::{AlertSink, ClusterStateRepository, WorkloadRegistry};
