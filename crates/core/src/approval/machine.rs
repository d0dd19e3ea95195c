//! Approval state machine for one claim.
//!
//! `ClaimApprovals` owns a claim together with its approval requests, held
//! as an arena keyed by request ID plus an ordered ID list. Every action
//! validates first and mutates after, so a failed action changes nothing.
//!
//! Activation rules:
//! - exactly one request is `pending` at a time, except right after an
//!   escalation, where every escalation approver is `pending` at once
//! - a rule group advances when its approved count reaches its quorum; the
//!   group's remaining open requests are then cancelled
//! - a group whose quorum can no longer be reached rejects the claim
//! - an escalation request stands in for its origin: it counts toward the
//!   origin's group, and its first approval closes the rest of the lineage

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use expensa_shared::types::{ApprovalRequestId, ApprovalRuleId, EmployeeId};
use serde::Serialize;

use super::error::ApprovalError;
use super::graph::{ApprovalGraph, RuleGroup};
use super::request::{ApprovalRequest, ESCALATION_SEQUENCE_OFFSET};
use super::rule::ApprovalRule;
use super::strategy::dedup_preserving_order;
use super::types::{Actor, ApprovalState, ClaimStatus};
use crate::claim::ExpenseClaim;

/// What an approve or reject action changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    /// Request acted on.
    pub request: ApprovalRequestId,
    /// Requests that became `pending`.
    pub activated: Vec<ApprovalRequestId>,
    /// Requests that were cancelled as a consequence.
    pub cancelled: Vec<ApprovalRequestId>,
    /// Claim status after the action.
    pub claim_status: ClaimStatus,
}

/// Rejection reason recorded when a rule group can no longer reach its quorum.
pub const QUORUM_UNREACHABLE_REASON: &str = "Approval quorum can no longer be reached";

/// What an escalation created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationOutcome {
    /// Request that was escalated.
    pub request: ApprovalRequestId,
    /// New `pending` requests, one per escalation approver.
    pub created: Vec<ApprovalRequestId>,
}

/// How far a rule group is from its quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupProgress {
    Met,
    Open,
    Unreachable,
}

/// A claim and the approval requests it owns.
#[derive(Debug, Clone)]
pub struct ClaimApprovals {
    claim: ExpenseClaim,
    order: Vec<ApprovalRequestId>,
    requests: HashMap<ApprovalRequestId, ApprovalRequest>,
    rules: HashMap<ApprovalRuleId, ApprovalRule>,
    groups: Vec<RuleGroup>,
}

impl ClaimApprovals {
    /// Wraps a claim with no requests.
    #[must_use]
    pub fn new(claim: ExpenseClaim) -> Self {
        Self {
            claim,
            order: Vec::new(),
            requests: HashMap::new(),
            rules: HashMap::new(),
            groups: Vec::new(),
        }
    }

    /// Returns the claim.
    #[must_use]
    pub fn claim(&self) -> &ExpenseClaim {
        &self.claim
    }

    /// Returns the claim for editing.
    pub fn claim_mut(&mut self) -> &mut ExpenseClaim {
        &mut self.claim
    }

    /// Returns the claim status.
    #[must_use]
    pub fn status(&self) -> ClaimStatus {
        self.claim.status
    }

    /// Returns request IDs in sequence order.
    #[must_use]
    pub fn request_ids(&self) -> &[ApprovalRequestId] {
        &self.order
    }

    /// Returns requests in sequence order.
    pub fn requests(&self) -> impl Iterator<Item = &ApprovalRequest> {
        self.order.iter().filter_map(|id| self.requests.get(id))
    }

    /// Looks up one request.
    #[must_use]
    pub fn request(&self, id: ApprovalRequestId) -> Option<&ApprovalRequest> {
        self.requests.get(&id)
    }

    /// Returns the rule groups created at submission.
    #[must_use]
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// Returns the rule a request was created from.
    #[must_use]
    pub fn rule(&self, id: ApprovalRuleId) -> Option<&ApprovalRule> {
        self.rules.get(&id)
    }

    /// Returns the `pending` requests in sequence order.
    pub fn pending_requests(&self) -> impl Iterator<Item = &ApprovalRequest> {
        self.requests()
            .filter(|request| request.state == ApprovalState::Pending)
    }

    /// Returns the approver of the lowest-sequence `pending` request.
    #[must_use]
    pub fn current_approver(&self) -> Option<EmployeeId> {
        self.pending_requests().next().map(|request| request.approver)
    }

    /// Replaces all requests with a freshly built graph.
    ///
    /// Returns the IDs of the requests that were dropped.
    pub fn install(
        &mut self,
        graph: ApprovalGraph,
        rules: Vec<ApprovalRule>,
    ) -> Vec<ApprovalRequestId> {
        let dropped = std::mem::take(&mut self.order);
        self.requests.clear();

        for request in graph.requests {
            self.order.push(request.id);
            self.requests.insert(request.id, request);
        }
        self.rules = rules.into_iter().map(|rule| (rule.id, rule)).collect();
        self.groups = graph.groups;
        self.sort_order();
        dropped
    }

    /// Removes every request, returning their IDs.
    pub fn clear_requests(&mut self) -> Vec<ApprovalRequestId> {
        self.requests.clear();
        self.rules.clear();
        self.groups.clear();
        std::mem::take(&mut self.order)
    }

    /// Approves a pending request on behalf of its approver.
    ///
    /// # Errors
    ///
    /// * `RequestNotFound` - the request does not belong to this claim
    /// * `ClaimClosed` - the claim is not under approval
    /// * `InvalidTransition` - the request is not `pending`
    /// * `NotLinkedToEmployee` / `Unauthorized` - the actor is not the approver
    pub fn approve(
        &mut self,
        id: ApprovalRequestId,
        actor: &Actor,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        self.check_actionable(id, actor, "approve")?;

        let origin = self.origin_of(id);
        let origin_sequence = self.requests.get(&origin).map_or(0, |r| r.sequence);

        if let Some(request) = self.requests.get_mut(&id) {
            request.state = ApprovalState::Approved;
            request.approval_date = Some(now);
            request.approved_by = Some(actor.user);
            request.comments = comments;
        }

        // one approval per origin: every other open stand-in of it is closed
        let lineage: Vec<ApprovalRequestId> = self
            .requests
            .values()
            .filter(|r| r.id != id && r.is_open() && self.origin_of(r.id) == origin)
            .map(|r| r.id)
            .collect();
        let mut cancelled = self.cancel_all(&lineage);

        let activated = self.settle(origin_sequence, now, &mut cancelled);
        if self.claim.status.is_in_approval() {
            self.claim.status = ClaimStatus::UnderReview;
        }
        let claim_status = self.claim.status;

        tracing::info!(
            claim_id = %self.claim.id,
            request_id = %id,
            approver = ?actor.employee,
            claim_status = %claim_status,
            "approval request approved"
        );

        Ok(ApprovalOutcome {
            request: id,
            activated,
            cancelled,
            claim_status,
        })
    }

    /// Rejects a pending request, rejecting the claim with it.
    ///
    /// # Errors
    ///
    /// Same as `approve`.
    pub fn reject(
        &mut self,
        id: ApprovalRequestId,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        self.check_actionable(id, actor, "reject")?;

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "No reason provided".to_string());

        if let Some(request) = self.requests.get_mut(&id) {
            request.state = ApprovalState::Rejected;
            request.rejection_date = Some(now);
            request.rejected_by = Some(actor.user);
            request.rejection_reason = Some(reason.clone());
        }

        let open: Vec<ApprovalRequestId> = self
            .requests
            .values()
            .filter(|r| r.is_open())
            .map(|r| r.id)
            .collect();
        let cancelled = self.cancel_all(&open);

        self.claim.status = ClaimStatus::Rejected;
        self.claim.rejection_reason = Some(reason);

        tracing::info!(
            claim_id = %self.claim.id,
            request_id = %id,
            approver = ?actor.employee,
            "approval request rejected"
        );

        Ok(ApprovalOutcome {
            request: id,
            activated: Vec::new(),
            cancelled,
            claim_status: ClaimStatus::Rejected,
        })
    }

    /// Escalates a pending request to its rule's escalation approvers.
    ///
    /// # Errors
    ///
    /// * `RequestNotFound` - the request does not belong to this claim
    /// * `ClaimClosed` - the claim is not under approval
    /// * `InvalidTransition` - the request is not `pending`
    /// * `EscalationDisabled` - the rule does not escalate
    /// * `NoEscalationApprovers` - the rule names nobody to escalate to
    pub fn escalate(
        &mut self,
        id: ApprovalRequestId,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, ApprovalError> {
        let request = self
            .requests
            .get(&id)
            .ok_or(ApprovalError::RequestNotFound(id))?;
        if !self.claim.status.is_in_approval() {
            return Err(ApprovalError::ClaimClosed {
                status: self.claim.status,
                action: "escalate",
            });
        }
        if request.state != ApprovalState::Pending {
            return Err(ApprovalError::InvalidTransition {
                from: request.state,
                action: "escalate",
            });
        }
        let rule = self
            .rules
            .get(&request.rule)
            .ok_or(ApprovalError::EscalationDisabled)?;
        if !rule.escalation_enabled {
            return Err(ApprovalError::EscalationDisabled);
        }
        if rule.escalation_approvers.is_empty() {
            return Err(ApprovalError::NoEscalationApprovers);
        }

        let delay = rule.escalation_delay();
        let approvers = dedup_preserving_order(rule.escalation_approvers.clone());
        let sequence = request.sequence + ESCALATION_SEQUENCE_OFFSET;
        let comment = format!("Escalated from request #{}", request.sequence);
        let template = request.clone();

        let mut created = Vec::with_capacity(approvers.len());
        for approver in approvers {
            let mut escalated = ApprovalRequest::new(
                template.claim,
                template.rule,
                approver,
                sequence,
                ApprovalState::Pending,
                template.required_amount,
                template.currency.clone(),
                now,
            );
            escalated.escalation_date = delay.map(|d| now + d);
            escalated.escalated_from = Some(id);
            escalated.comments = Some(comment.clone());
            created.push(escalated.id);
            self.order.push(escalated.id);
            self.requests.insert(escalated.id, escalated);
        }

        if let Some(original) = self.requests.get_mut(&id) {
            original.state = ApprovalState::Escalated;
            original.escalated_to.extend(created.iter().copied());
        }
        self.sort_order();

        tracing::info!(
            claim_id = %self.claim.id,
            request_id = %id,
            created = created.len(),
            "approval request escalated"
        );

        Ok(EscalationOutcome {
            request: id,
            created,
        })
    }

    /// Cancels an open request without a decision.
    ///
    /// The claim then moves on as if the request had never existed: the
    /// next waiting request is activated once nothing is pending, and the
    /// claim is rejected if the request's group can no longer reach its
    /// quorum.
    ///
    /// # Errors
    ///
    /// * `RequestNotFound` - the request does not belong to this claim
    /// * `ClaimClosed` - the claim is approved, rejected or paid
    /// * `InvalidTransition` - the request is already closed
    pub fn cancel(
        &mut self,
        id: ApprovalRequestId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let request = self
            .requests
            .get(&id)
            .ok_or(ApprovalError::RequestNotFound(id))?;
        if self.claim.status.is_decided() {
            return Err(ApprovalError::ClaimClosed {
                status: self.claim.status,
                action: "cancel requests of",
            });
        }
        if !request.is_open() {
            return Err(ApprovalError::InvalidTransition {
                from: request.state,
                action: "cancel",
            });
        }
        self.cancel_all(&[id]);

        let origin_sequence = self.origin_sequence(id);
        let mut cancelled = Vec::new();
        let activated = self.settle(origin_sequence, now, &mut cancelled);

        tracing::info!(
            claim_id = %self.claim.id,
            request_id = %id,
            activated = activated.len(),
            claim_status = %self.claim.status,
            "approval request cancelled"
        );

        Ok(ApprovalOutcome {
            request: id,
            activated,
            cancelled,
            claim_status: self.claim.status,
        })
    }

    /// Cancels every open request, returning their IDs.
    pub fn cancel_open_requests(&mut self) -> Vec<ApprovalRequestId> {
        let open: Vec<ApprovalRequestId> = self
            .requests
            .values()
            .filter(|r| r.is_open())
            .map(|r| r.id)
            .collect();
        self.cancel_all(&open)
    }

    fn check_actionable(
        &self,
        id: ApprovalRequestId,
        actor: &Actor,
        action: &'static str,
    ) -> Result<(), ApprovalError> {
        let request = self
            .requests
            .get(&id)
            .ok_or(ApprovalError::RequestNotFound(id))?;
        if !self.claim.status.is_in_approval() {
            return Err(ApprovalError::ClaimClosed {
                status: self.claim.status,
                action,
            });
        }
        if request.state != ApprovalState::Pending {
            return Err(ApprovalError::InvalidTransition {
                from: request.state,
                action,
            });
        }
        let employee = actor.employee.ok_or(ApprovalError::NotLinkedToEmployee)?;
        if employee != request.approver {
            return Err(ApprovalError::Unauthorized {
                actor: employee,
                approver: request.approver,
            });
        }
        Ok(())
    }

    /// Follows escalation parents up to the request created at submission.
    fn origin_of(&self, id: ApprovalRequestId) -> ApprovalRequestId {
        let mut current = id;
        // lineage depth is bounded by the number of requests
        for _ in 0..=self.requests.len() {
            match self.requests.get(&current).and_then(|r| r.escalated_from) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    fn origin_sequence(&self, id: ApprovalRequestId) -> u32 {
        let origin = self.origin_of(id);
        self.requests.get(&origin).map_or(0, |r| r.sequence)
    }

    fn group_for(&self, sequence: u32) -> Option<&RuleGroup> {
        self.groups.iter().find(|group| group.contains(sequence))
    }

    fn approved_in_group(&self, group: &RuleGroup) -> usize {
        self.requests
            .values()
            .filter(|r| {
                r.state == ApprovalState::Approved && group.contains(self.origin_sequence(r.id))
            })
            .count()
    }

    /// Returns how the group stands against its quorum. Each origin still
    /// open in its lineage can contribute one more approval.
    fn group_progress(&self, group: &RuleGroup) -> GroupProgress {
        let approved = self.approved_in_group(group);
        if approved >= group.required_approvals {
            return GroupProgress::Met;
        }
        let live: HashSet<ApprovalRequestId> = self
            .requests
            .values()
            .filter(|r| r.is_open())
            .map(|r| self.origin_of(r.id))
            .filter(|origin| {
                self.requests
                    .get(origin)
                    .is_some_and(|r| group.contains(r.sequence))
            })
            .collect();
        if approved + live.len() >= group.required_approvals {
            GroupProgress::Open
        } else {
            GroupProgress::Unreachable
        }
    }

    /// Moves the claim on after a request in the group at `sequence` closed.
    ///
    /// Activates the next request the quorum gate allows, rejects the claim
    /// if the group can no longer reach its quorum, and approves it once
    /// nothing is left open. Returns the activated requests.
    fn settle(
        &mut self,
        sequence: u32,
        now: DateTime<Utc>,
        cancelled: &mut Vec<ApprovalRequestId>,
    ) -> Vec<ApprovalRequestId> {
        let group = self.group_for(sequence).copied();
        let progress = group.map_or(GroupProgress::Met, |g| self.group_progress(&g));

        let activated = match (progress, group) {
            (GroupProgress::Unreachable, _) => {
                cancelled.extend(self.cancel_open_requests());
                self.claim.status = ClaimStatus::Rejected;
                self.claim.rejection_reason = Some(QUORUM_UNREACHABLE_REASON.to_string());
                tracing::warn!(
                    claim_id = %self.claim.id,
                    sequence,
                    "approval quorum unreachable, claim rejected"
                );
                return Vec::new();
            }
            (GroupProgress::Open, Some(group)) => {
                self.activate_next(sequence, group.last_sequence, now)
            }
            (GroupProgress::Met, Some(group)) => {
                let open: Vec<ApprovalRequestId> = self
                    .requests
                    .values()
                    .filter(|r| r.is_open() && group.contains(self.origin_sequence(r.id)))
                    .map(|r| r.id)
                    .collect();
                cancelled.extend(self.cancel_all(&open));
                self.activate_next(sequence, u32::MAX, now)
            }
            (_, None) => self.activate_next(sequence, u32::MAX, now),
        };

        if !self.requests.values().any(ApprovalRequest::is_open) {
            self.claim.status = ClaimStatus::Approved;
            self.claim.approval_date = Some(now);
        }
        activated.into_iter().collect()
    }

    fn cancel_all(&mut self, ids: &[ApprovalRequestId]) -> Vec<ApprovalRequestId> {
        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.requests.get_mut(id) {
                if request.is_open() {
                    request.state = ApprovalState::Cancelled;
                    cancelled.push(*id);
                }
            }
        }
        cancelled
    }

    /// Activates the lowest-sequence waiting request in `(after, last]`,
    /// unless something is still pending.
    fn activate_next(
        &mut self,
        after: u32,
        last: u32,
        now: DateTime<Utc>,
    ) -> Option<ApprovalRequestId> {
        if self
            .requests
            .values()
            .any(|r| r.state == ApprovalState::Pending)
        {
            return None;
        }

        let next = self
            .requests
            .values()
            .filter(|r| {
                r.state == ApprovalState::Waiting && r.sequence > after && r.sequence <= last
            })
            .min_by_key(|r| r.sequence)
            .map(|r| (r.id, r.rule))?;

        let delay = self.rules.get(&next.1).and_then(ApprovalRule::escalation_delay);
        if let Some(request) = self.requests.get_mut(&next.0) {
            request.activate(now, delay);
        }
        Some(next.0)
    }

    fn sort_order(&mut self) {
        let requests = &self.requests;
        self.order
            .sort_by_key(|id| requests.get(id).map_or(u32::MAX, |r| r.sequence));
    }
}
