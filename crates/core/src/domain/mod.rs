// Domain Layer - Pure supervision entities

pub mod error;
pub mod lifecycle;
pub mod service;
pub mod topic;

// Re-exports
pub use error::DomainError;
pub use lifecycle::{LifecycleState, ServiceStatus};
pub use service::{
    ClassificationRules, CommandSpec, HealthEndpoint, ProcessId, ServiceDescriptor, ServiceName,
    KAFKA, ZOOKEEPER,
};
pub use topic::TopicSpec;
