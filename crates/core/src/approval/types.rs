//! Approval domain types.
//!
//! Defines the request and claim states driven by the state machine, the
//! acting identity, and the subject a rule set is evaluated against.

use std::fmt;

use expensa_shared::types::{ClaimId, CompanyId, CurrencyCode, DepartmentId, EmployeeId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// State of a single approval request.
///
/// The valid transitions are:
/// - Waiting → Pending (activation of the next tier)
/// - Pending → Approved | Rejected | Escalated
/// - Waiting | Pending → Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    /// Created for a later tier, not yet actionable.
    Waiting,
    /// Actionable by its approver.
    Pending,
    /// Approved by its approver.
    Approved,
    /// Rejected by its approver; the claim is rejected too.
    Rejected,
    /// Withdrawn without a decision.
    Cancelled,
    /// Replaced by escalation requests.
    Escalated,
}

impl ApprovalState {
    /// Returns the string representation of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Escalated => "escalated",
        }
    }

    /// Parses a state from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "waiting" => Some(Self::Waiting),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }

    /// Returns true while the request still awaits a decision.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Waiting | Self::Pending)
    }

    /// Returns true once the request carries a decision.
    #[must_use]
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an expense claim.
///
/// The valid transitions are:
/// - Draft → Submitted (submit with approval requests)
/// - Draft → Approved (submit, auto-approved)
/// - Submitted → UnderReview (first decision or escalation)
/// - Submitted | UnderReview → Approved | Rejected
/// - Approved → Paid
/// - any but Paid → Cancelled
/// - Rejected | Cancelled → Draft (reset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Being prepared by the employee.
    Draft,
    /// Submitted, no decision yet.
    Submitted,
    /// At least one tier has acted.
    UnderReview,
    /// Fully approved.
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// Reimbursed.
    Paid,
    /// Withdrawn.
    Cancelled,
}

impl ClaimStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "paid" => Some(Self::Paid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true while approvers can act on the claim.
    #[must_use]
    pub fn is_in_approval(&self) -> bool {
        matches!(self, Self::Submitted | Self::UnderReview)
    }

    /// Returns true once the claim has reached a decided accounting state.
    #[must_use]
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Paid)
    }

    /// Returns true if the claim's lines may be edited.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The identity performing an approval action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Login identity.
    pub user: UserId,
    /// Employee record linked to the login, if any.
    pub employee: Option<EmployeeId>,
}

impl Actor {
    /// Creates an actor linked to an employee record.
    #[must_use]
    pub const fn employee(user: UserId, employee: EmployeeId) -> Self {
        Self {
            user,
            employee: Some(employee),
        }
    }

    /// Creates an actor with no employee record.
    #[must_use]
    pub const fn unlinked(user: UserId) -> Self {
        Self {
            user,
            employee: None,
        }
    }
}

/// What the rule set is evaluated against at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSubject {
    /// Claim being approved.
    pub claim: ClaimId,
    /// Human-readable claim reference, used in display names.
    pub reference: String,
    /// Submitting employee.
    pub employee: EmployeeId,
    /// Submitting employee's department.
    pub department: Option<DepartmentId>,
    /// Company the claim belongs to.
    pub company: CompanyId,
    /// Total in company currency.
    pub amount: Decimal,
    /// Company currency.
    pub currency: CurrencyCode,
}
