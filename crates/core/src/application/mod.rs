// Application Layer - Supervision use cases

pub mod classifier;
pub mod recovery;
pub mod registry;
pub mod supervisor;
pub mod topic_admin;

// Re-exports
pub use classifier::{classify, classify_text, Classification};
pub use recovery::RecoveryService;
pub use registry::{SupervisorRegistry, TransitionGuard};
pub use supervisor::{
    cancel_channel, CancelHandle, CancelToken, ServiceSupervisor, StartOutcome, StopOutcome,
    SupervisorError, SupervisorSettings,
};
pub use topic_admin::{TopicAdmin, DEFAULT_TOPICS_TOOL};
