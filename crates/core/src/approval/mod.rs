//! Expense approval workflow.
//!
//! # Modules
//!
//! - `types` - Request states, claim statuses, actors
//! - `error` - Approval error types
//! - `directory` - Employee and department lookups
//! - `strategy` - Approval strategies and quorum
//! - `rule` - Approval rules and rule selection
//! - `policy` - Company thresholds and default rules
//! - `request` - Approval request instances
//! - `graph` - Request graph construction at submission
//! - `machine` - Per-claim approval state machine
//! - `service` - Claim registry, actions and scheduled sweeps

pub mod directory;
pub mod error;
pub mod graph;
pub mod machine;
pub mod policy;
pub mod request;
pub mod rule;
pub mod service;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod approval_props;

pub use directory::{Department, Employee, InMemoryDirectory, OrgDirectory};
pub use error::ApprovalError;
pub use expensa_shared::types::{ApprovalRequestId, ApprovalRuleId};
pub use graph::{ApprovalGraph, ApprovalGraphBuilder, RuleGroup};
pub use machine::{ApprovalOutcome, ClaimApprovals, EscalationOutcome, QUORUM_UNREACHABLE_REASON};
pub use policy::CompanyPolicy;
pub use request::{ApprovalRequest, ESCALATION_SEQUENCE_OFFSET};
pub use rule::{ApprovalRule, ApprovalRuleResolver, RuleDryRun};
pub use service::{ApprovalService, SubmitOutcome};
pub use strategy::{ApprovalStrategy, ApprovalType};
pub use types::{Actor, ApprovalState, ApprovalSubject, ClaimStatus};
