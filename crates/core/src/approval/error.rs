//! Approval error types.
//!
//! Authorization and state-conflict errors are raised before any mutation,
//! so a failed action leaves requests and claim untouched.

use expensa_shared::AppError;
use expensa_shared::types::{ApprovalRequestId, ClaimId, EmployeeId};
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{ApprovalState, ClaimStatus};

/// Errors that can occur during approval operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApprovalError {
    /// The acting login has no employee record.
    #[error("Your user account is not linked to an employee record")]
    NotLinkedToEmployee,

    /// The actor is not the request's approver.
    #[error("Employee {actor} is not the assigned approver ({approver}) for this request")]
    Unauthorized {
        /// Employee who attempted the action.
        actor: EmployeeId,
        /// Employee the request is assigned to.
        approver: EmployeeId,
    },

    /// Request action not allowed from the current request state.
    #[error("Cannot {action} an approval request in state {from}")]
    InvalidTransition {
        /// Current request state.
        from: ApprovalState,
        /// Attempted action.
        action: &'static str,
    },

    /// Claim action not allowed from the current claim status.
    #[error("Cannot {action} a claim in status {status}")]
    ClaimClosed {
        /// Current claim status.
        status: ClaimStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// The request's rule does not allow escalation.
    #[error("Escalation is not enabled for this approval rule")]
    EscalationDisabled,

    /// The request's rule allows escalation but names nobody to escalate to.
    #[error("No escalation approvers configured for this approval rule")]
    NoEscalationApprovers,

    /// No rule matches an amount above the auto-approve limit.
    #[error("No approval rule configured for amount {amount}")]
    NoApprovalRule {
        /// Claim total in company currency.
        amount: Decimal,
    },

    /// Matching rules resolved to nobody who can approve.
    #[error("No approvers could be resolved for the matching approval rules")]
    NoApprovers,

    /// The claim total is still waiting on a currency conversion.
    #[error("Currency conversion is pending; retry once exchange rates are available")]
    ConversionPending,

    /// The claim has no expense lines.
    #[error("Cannot submit an expense claim without expense lines")]
    NoExpenseLines,

    /// Approval request not found.
    #[error("Approval request {0} not found")]
    RequestNotFound(ApprovalRequestId),

    /// Claim not found.
    #[error("Expense claim {0} not found")]
    ClaimNotFound(ClaimId),

    /// Employee referenced by a claim is not in the directory.
    #[error("Employee {0} not found")]
    EmployeeNotFound(EmployeeId),

    /// Adding the claim's lines overflows the amount range.
    #[error("Claim total exceeds the supported amount range")]
    AmountOverflow,

    /// A rule or company policy violates its own invariants.
    #[error("Invalid approval rule: {0}")]
    InvalidRule(String),
}

impl ApprovalError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoExpenseLines | Self::InvalidRule(_) | Self::AmountOverflow => 400,

            Self::NotLinkedToEmployee | Self::Unauthorized { .. } => 403,

            Self::RequestNotFound(_) | Self::ClaimNotFound(_) | Self::EmployeeNotFound(_) => 404,

            Self::InvalidTransition { .. } | Self::ClaimClosed { .. } => 409,

            Self::EscalationDisabled
            | Self::NoEscalationApprovers
            | Self::NoApprovalRule { .. }
            | Self::NoApprovers => 422,

            Self::ConversionPending => 503,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotLinkedToEmployee => "NOT_LINKED_TO_EMPLOYEE",
            Self::Unauthorized { .. } => "NOT_AUTHORIZED_TO_APPROVE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ClaimClosed { .. } => "CLAIM_CLOSED",
            Self::EscalationDisabled => "ESCALATION_DISABLED",
            Self::NoEscalationApprovers => "NO_ESCALATION_APPROVERS",
            Self::NoApprovalRule { .. } => "NO_APPROVAL_RULE",
            Self::NoApprovers => "NO_APPROVERS",
            Self::ConversionPending => "CONVERSION_PENDING",
            Self::NoExpenseLines => "NO_EXPENSE_LINES",
            Self::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            Self::ClaimNotFound(_) => "CLAIM_NOT_FOUND",
            Self::EmployeeNotFound(_) => "EMPLOYEE_NOT_FOUND",
            Self::InvalidRule(_) => "INVALID_RULE",
            Self::AmountOverflow => "AMOUNT_OUT_OF_RANGE",
        }
    }

    /// Returns true for authorization failures.
    #[must_use]
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::NotLinkedToEmployee | Self::Unauthorized { .. })
    }

    /// Returns true for state-conflict failures.
    #[must_use]
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::ClaimClosed { .. })
    }
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        let message = err.to_string();
        match err {
            ApprovalError::NotLinkedToEmployee | ApprovalError::Unauthorized { .. } => {
                Self::Authorization(message)
            }
            ApprovalError::InvalidTransition { .. } | ApprovalError::ClaimClosed { .. } => {
                Self::StateConflict(message)
            }
            ApprovalError::RequestNotFound(_)
            | ApprovalError::ClaimNotFound(_)
            | ApprovalError::EmployeeNotFound(_) => Self::NotFound(message),
            ApprovalError::NoExpenseLines
            | ApprovalError::InvalidRule(_)
            | ApprovalError::AmountOverflow => Self::Validation(message),
            ApprovalError::ConversionPending => Self::ConversionUnavailable(message),
            ApprovalError::EscalationDisabled
            | ApprovalError::NoEscalationApprovers
            | ApprovalError::NoApprovalRule { .. }
            | ApprovalError::NoApprovers => Self::BusinessRule(message),
        }
    }
}
