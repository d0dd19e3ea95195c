//! Expansion of matched rules into sequenced approval requests.

use chrono::{DateTime, Utc};
use expensa_shared::types::ApprovalRuleId;
use serde::{Deserialize, Serialize};

use super::directory::{Employee, OrgDirectory};
use super::request::ApprovalRequest;
use super::rule::ApprovalRule;
use super::types::{ApprovalState, ApprovalSubject};

/// The contiguous sequence range created for one rule, with its quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    /// Rule the group was created from.
    pub rule: ApprovalRuleId,
    /// First sequence number in the group.
    pub first_sequence: u32,
    /// Last sequence number in the group.
    pub last_sequence: u32,
    /// Approvals needed before the next group is activated.
    pub required_approvals: usize,
}

impl RuleGroup {
    /// Returns true if `sequence` falls inside the group.
    #[must_use]
    pub fn contains(&self, sequence: u32) -> bool {
        (self.first_sequence..=self.last_sequence).contains(&sequence)
    }

    /// Returns the number of approvers in the group.
    #[must_use]
    pub fn size(&self) -> usize {
        (self.last_sequence - self.first_sequence + 1) as usize
    }
}

/// Requests and groups produced for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalGraph {
    /// Requests in sequence order.
    pub requests: Vec<ApprovalRequest>,
    /// One group per rule that resolved at least one approver.
    pub groups: Vec<RuleGroup>,
}

impl ApprovalGraph {
    /// Returns true if no request was created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Stateless request graph construction.
pub struct ApprovalGraphBuilder;

impl ApprovalGraphBuilder {
    /// Creates one request per (rule, approver) pair.
    ///
    /// Sequence numbers start at 1 and increase across rules in rule order,
    /// then approver order. The first request is `pending`, every other one
    /// `waiting`. Rules that resolve no approver are skipped.
    ///
    /// # Arguments
    ///
    /// * `subject` - Claim being submitted
    /// * `submitter` - Directory record of the submitting employee
    /// * `rules` - Matched rules, already in application order
    /// * `directory` - Organization lookups for approver resolution
    /// * `now` - Submission time
    #[must_use]
    pub fn build(
        subject: &ApprovalSubject,
        submitter: &Employee,
        rules: &[&ApprovalRule],
        directory: &dyn OrgDirectory,
        now: DateTime<Utc>,
    ) -> ApprovalGraph {
        let mut graph = ApprovalGraph::default();
        let mut next_sequence: u32 = 1;

        for rule in rules {
            let approvers = rule.strategy.resolve_approvers(submitter, directory);
            if approvers.is_empty() {
                tracing::warn!(
                    claim_id = %subject.claim,
                    rule = %rule.name,
                    approval_type = %rule.strategy.approval_type(),
                    "approval rule resolved no approvers, skipping"
                );
                continue;
            }

            let first_sequence = next_sequence;
            for approver in &approvers {
                let state = if graph.requests.is_empty() {
                    ApprovalState::Pending
                } else {
                    ApprovalState::Waiting
                };
                let mut request = ApprovalRequest::new(
                    subject.claim,
                    rule.id,
                    *approver,
                    next_sequence,
                    state,
                    subject.amount,
                    subject.currency.clone(),
                    now,
                );
                if state == ApprovalState::Pending {
                    request.escalation_date = rule.escalation_delay().map(|delay| now + delay);
                }
                graph.requests.push(request);
                next_sequence += 1;
            }

            graph.groups.push(RuleGroup {
                rule: rule.id,
                first_sequence,
                last_sequence: next_sequence - 1,
                required_approvals: rule.strategy.required_approvals(approvers.len()),
            });
        }

        tracing::debug!(
            claim_id = %subject.claim,
            requests = graph.requests.len(),
            groups = graph.groups.len(),
            "built approval graph"
        );
        graph
    }
}
