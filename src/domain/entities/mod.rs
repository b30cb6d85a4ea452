pub mod alert;
pub mod cluster;

pub use alert::{keys as alert_keys, Alert, AlertLevel};
pub use cluster::{
    AgentIdentity, ClusterSnapshot, FenceDelayPreference, GateKey, HostId, NodeState,
    NodeWorkload, PairId, StateChanges, WorkloadCensus,
};
