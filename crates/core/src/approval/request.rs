//! Approval request instances.

use chrono::{DateTime, Duration, Utc};
use expensa_shared::types::{
    ApprovalRequestId, ApprovalRuleId, ClaimId, CurrencyCode, EmployeeId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{Actor, ApprovalState};

/// Sequence offset applied to requests created by escalation.
pub const ESCALATION_SEQUENCE_OFFSET: u32 = 1000;

/// One approver's decision slot for a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request ID.
    pub id: ApprovalRequestId,
    /// Owning claim.
    pub claim: ClaimId,
    /// Rule the request was created from.
    pub rule: ApprovalRuleId,
    /// Employee who must act.
    pub approver: EmployeeId,
    /// Activation order within the claim, starting at 1.
    pub sequence: u32,
    /// Current state.
    pub state: ApprovalState,
    /// When the request became actionable (creation time for the first tier).
    pub request_date: DateTime<Utc>,
    /// Claim total the approver is asked to approve.
    pub required_amount: Decimal,
    /// Currency of `required_amount`.
    pub currency: CurrencyCode,
    /// When it was approved.
    pub approval_date: Option<DateTime<Utc>>,
    /// Login that approved.
    pub approved_by: Option<UserId>,
    /// Approver comments.
    pub comments: Option<String>,
    /// When it was rejected.
    pub rejection_date: Option<DateTime<Utc>>,
    /// Login that rejected.
    pub rejected_by: Option<UserId>,
    /// Reason given on rejection.
    pub rejection_reason: Option<String>,
    /// When the request becomes overdue, if its rule escalates.
    pub escalation_date: Option<DateTime<Utc>>,
    /// Request this one was escalated from.
    pub escalated_from: Option<ApprovalRequestId>,
    /// Requests created when this one was escalated.
    pub escalated_to: Vec<ApprovalRequestId>,
}

impl ApprovalRequest {
    /// Creates a request in `state`, requested at `now`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        claim: ClaimId,
        rule: ApprovalRuleId,
        approver: EmployeeId,
        sequence: u32,
        state: ApprovalState,
        required_amount: Decimal,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApprovalRequestId::new(),
            claim,
            rule,
            approver,
            sequence,
            state,
            request_date: now,
            required_amount,
            currency,
            approval_date: None,
            approved_by: None,
            comments: None,
            rejection_date: None,
            rejected_by: None,
            rejection_reason: None,
            escalation_date: None,
            escalated_from: None,
            escalated_to: Vec::new(),
        }
    }

    /// Flips a waiting request to pending as of `now`.
    ///
    /// The request date restarts so that reminders and escalation count from
    /// the moment the approver was actually asked.
    pub fn activate(&mut self, now: DateTime<Utc>, escalation_delay: Option<Duration>) {
        self.state = ApprovalState::Pending;
        self.request_date = now;
        self.escalation_date = escalation_delay.map(|delay| now + delay);
    }

    /// Returns true while the request still awaits a decision.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Returns true if the request was created by escalation.
    #[must_use]
    pub fn is_escalation(&self) -> bool {
        self.escalated_from.is_some()
    }

    /// Returns true if the request is pending past its escalation date.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == ApprovalState::Pending && self.escalation_date.is_some_and(|due| due < now)
    }

    /// Returns whole days since the request was made.
    #[must_use]
    pub fn days_pending(&self, now: DateTime<Utc>) -> i64 {
        (now - self.request_date).num_days().max(0)
    }

    /// Returns true if `actor` may approve or reject the request right now.
    #[must_use]
    pub fn can_act(&self, actor: &Actor) -> bool {
        self.state == ApprovalState::Pending && actor.employee == Some(self.approver)
    }

    /// Returns a label such as `EXP/2025/0001 - Mia`.
    #[must_use]
    pub fn display_name(&self, claim_reference: &str, approver_name: &str) -> String {
        format!("{claim_reference} - {approver_name}")
    }
}
