//! Approval flow configuration and the level-by-level decision engine.

pub mod engine;
pub mod flow;

pub use engine::{
    ApprovalError, ApprovalFlowEngine, ApprovalProgress, Decision, DecisionRecord, LevelOutcome,
    RouteDecision, RoutingError,
};
pub use flow::{
    validate_matrix, ApprovalFlow, ApprovalLevel, ApprovalLogic, ConfigurationError,
    JobTypeAssignment,
};
