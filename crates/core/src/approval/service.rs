//! Approval service: claim registry, submission, actions and sweeps.
//!
//! Each claim sits behind its own mutex, so two actions on the same claim
//! are serialized while actions on different claims run in parallel. The
//! scheduled sweeps take the same per-claim lock as user actions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use expensa_shared::types::{ApprovalRequestId, ClaimId, EmployeeId};
use serde::Serialize;

use super::directory::OrgDirectory;
use super::error::ApprovalError;
use super::graph::ApprovalGraphBuilder;
use super::machine::{ApprovalOutcome, ClaimApprovals, EscalationOutcome};
use super::policy::CompanyPolicy;
use super::request::ApprovalRequest;
use super::rule::{ApprovalRule, ApprovalRuleResolver};
use super::types::{Actor, ApprovalState, ClaimStatus};
use crate::claim::{ConversionState, ExpenseClaim, ExpenseLine};
use crate::currency::CurrencyConverter;
use crate::notify::Notifier;

/// Default delay before a pending request gets a reminder.
pub const DEFAULT_REMINDER_AFTER_HOURS: i64 = 24;

/// Result of submitting a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    /// Claim status after submission.
    pub claim_status: ClaimStatus,
    /// Requests created, in sequence order.
    pub requests: Vec<ApprovalRequestId>,
    /// True if the claim was approved without any request.
    pub auto_approved: bool,
}

/// Owns every claim under approval and runs the approval workflow.
pub struct ApprovalService {
    claims: DashMap<ClaimId, Arc<Mutex<ClaimApprovals>>>,
    request_index: DashMap<ApprovalRequestId, ClaimId>,
    directory: Arc<dyn OrgDirectory>,
    notifier: Arc<dyn Notifier>,
    reminder_after: Duration,
}

impl std::fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalService")
            .field("claims", &self.claims.len())
            .field("requests", &self.request_index.len())
            .field("reminder_after", &self.reminder_after)
            .finish_non_exhaustive()
    }
}

impl ApprovalService {
    /// Creates a service with the default reminder delay.
    #[must_use]
    pub fn new(directory: Arc<dyn OrgDirectory>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            claims: DashMap::new(),
            request_index: DashMap::new(),
            directory,
            notifier,
            reminder_after: Duration::hours(DEFAULT_REMINDER_AFTER_HOURS),
        }
    }

    /// Sets how long a request stays pending before reminders start.
    #[must_use]
    pub fn with_reminder_after(mut self, reminder_after: Duration) -> Self {
        self.reminder_after = reminder_after;
        self
    }

    /// Takes ownership of a claim.
    pub fn register_claim(&self, claim: ExpenseClaim) -> ClaimId {
        let id = claim.id;
        self.claims
            .insert(id, Arc::new(Mutex::new(ClaimApprovals::new(claim))));
        id
    }

    /// Returns a snapshot of a claim.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::ClaimNotFound` for an unknown claim.
    pub fn claim(&self, id: ClaimId) -> Result<ExpenseClaim, ApprovalError> {
        let slot = self.slot(id)?;
        let approvals = lock(&slot);
        Ok(approvals.claim().clone())
    }

    /// Returns a snapshot of a claim's requests in sequence order.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::ClaimNotFound` for an unknown claim.
    pub fn requests(&self, id: ClaimId) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let slot = self.slot(id)?;
        let approvals = lock(&slot);
        Ok(approvals.requests().cloned().collect())
    }

    /// Returns a snapshot of one request.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::RequestNotFound` for an unknown request.
    pub fn request(&self, id: ApprovalRequestId) -> Result<ApprovalRequest, ApprovalError> {
        let slot = self.slot_for_request(id)?;
        let approvals = lock(&slot);
        approvals
            .request(id)
            .cloned()
            .ok_or(ApprovalError::RequestNotFound(id))
    }

    /// Returns the approver of the claim's lowest-sequence pending request.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::ClaimNotFound` for an unknown claim.
    pub fn current_approver(&self, id: ClaimId) -> Result<Option<EmployeeId>, ApprovalError> {
        let slot = self.slot(id)?;
        let approvals = lock(&slot);
        Ok(approvals.current_approver())
    }

    /// Appends an expense line to a draft claim.
    ///
    /// # Errors
    ///
    /// * `ClaimNotFound` - unknown claim
    /// * `ClaimClosed` - the claim is not a draft
    pub fn add_line(&self, id: ClaimId, line: ExpenseLine) -> Result<(), ApprovalError> {
        let slot = self.slot(id)?;
        let mut approvals = lock(&slot);
        approvals.claim_mut().add_line(line)
    }

    /// Recomputes a claim's company-currency total.
    ///
    /// The conversion runs without holding the claim lock. Its result is
    /// discarded if the lines changed in the meantime.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::ClaimNotFound` for an unknown claim. Conversion
    /// failures are recorded on the claim, not returned.
    pub async fn refresh_conversion(
        &self,
        id: ClaimId,
        converter: &CurrencyConverter,
    ) -> Result<ConversionState, ApprovalError> {
        let slot = self.slot(id)?;
        let mut snapshot = lock(&slot).claim().clone();
        let state = snapshot.refresh_conversion(converter).await.clone();

        let mut approvals = lock(&slot);
        let claim = approvals.claim_mut();
        if claim.lines == snapshot.lines && claim.currency == snapshot.currency {
            claim.conversion = state.clone();
            Ok(state)
        } else {
            tracing::debug!(claim_id = %id, "claim changed during conversion, result dropped");
            Ok(claim.conversion.clone())
        }
    }

    /// Submits a draft claim for approval.
    ///
    /// Rules are matched against the company-currency total. The claim is
    /// auto-approved when the total is within the policy's auto-approve limit
    /// and every matching rule is flagged `auto_approve_below_limit` (or none
    /// matches). The policy and the company's active rules are validated
    /// first.
    ///
    /// # Arguments
    ///
    /// * `id` - Claim to submit
    /// * `rules` - The company's configured rules
    /// * `policy` - The company's thresholds
    /// * `now` - Submission time
    ///
    /// # Errors
    ///
    /// * `ClaimNotFound` - unknown claim
    /// * `ClaimClosed` - the claim is not a draft
    /// * `NoExpenseLines` - the claim has no lines
    /// * `ConversionPending` - the company-currency total is unknown
    /// * `InvalidRule` - the policy or an active rule breaks its invariants
    /// * `NoApprovalRule` - no rule matches and the total exceeds the auto-approve limit
    /// * `EmployeeNotFound` - the submitter is missing from the directory
    /// * `NoApprovers` - matching rules resolved nobody
    pub fn submit(
        &self,
        id: ClaimId,
        rules: &[ApprovalRule],
        policy: &CompanyPolicy,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, ApprovalError> {
        let slot = self.slot(id)?;
        let mut approvals = lock(&slot);

        let claim = approvals.claim();
        if claim.status != ClaimStatus::Draft {
            return Err(ApprovalError::ClaimClosed {
                status: claim.status,
                action: "submit",
            });
        }
        if claim.lines.is_empty() {
            return Err(ApprovalError::NoExpenseLines);
        }
        policy.validate()?;
        let subject = claim.approval_subject()?;

        // an inverted band never matches, so every active rule is checked
        for rule in rules
            .iter()
            .filter(|rule| rule.active && rule.company == subject.company)
        {
            rule.validate()?;
        }

        let matched = ApprovalRuleResolver::applicable_rules(
            rules,
            subject.amount,
            subject.employee,
            subject.department,
            subject.company,
        );

        // vacuously true when nothing matched
        let auto_band = matched.iter().all(|rule| rule.auto_approve_below_limit);
        if auto_band && policy.can_auto_approve(subject.amount) {
            for dropped in approvals.clear_requests() {
                self.request_index.remove(&dropped);
            }
            let claim = approvals.claim_mut();
            claim.status = ClaimStatus::Approved;
            claim.submission_date = Some(now);
            claim.approval_date = Some(now);
            tracing::info!(
                claim_id = %id,
                amount = %subject.amount,
                currency = %subject.currency,
                "expense claim auto-approved below threshold"
            );
            return Ok(SubmitOutcome {
                claim_status: ClaimStatus::Approved,
                requests: Vec::new(),
                auto_approved: true,
            });
        }
        if matched.is_empty() {
            return Err(ApprovalError::NoApprovalRule {
                amount: subject.amount,
            });
        }

        let submitter = self
            .directory
            .employee(subject.employee)
            .ok_or(ApprovalError::EmployeeNotFound(subject.employee))?;
        let graph =
            ApprovalGraphBuilder::build(&subject, &submitter, &matched, self.directory.as_ref(), now);
        if graph.is_empty() {
            return Err(ApprovalError::NoApprovers);
        }

        let used: Vec<ApprovalRule> = matched.into_iter().cloned().collect();
        for dropped in approvals.install(graph, used) {
            self.request_index.remove(&dropped);
        }
        let created: Vec<ApprovalRequestId> = approvals.request_ids().to_vec();
        for request in &created {
            self.request_index.insert(*request, id);
        }

        let claim = approvals.claim_mut();
        claim.status = ClaimStatus::Submitted;
        claim.submission_date = Some(now);
        claim.approval_date = None;
        claim.rejection_reason = None;

        let pending: Vec<ApprovalRequest> = approvals.pending_requests().cloned().collect();
        self.notify_activated(&approvals, &pending);

        tracing::info!(
            claim_id = %id,
            amount = %subject.amount,
            requests = created.len(),
            "expense claim submitted for approval"
        );

        Ok(SubmitOutcome {
            claim_status: ClaimStatus::Submitted,
            requests: created,
            auto_approved: false,
        })
    }

    /// Approves a request on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// See `ClaimApprovals::approve`.
    pub fn approve(
        &self,
        request: ApprovalRequestId,
        actor: &Actor,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let slot = self.slot_for_request(request)?;
        let mut approvals = lock(&slot);
        let outcome = approvals.approve(request, actor, comments, now)?;
        let activated = collect(&approvals, &outcome.activated);
        self.notify_activated(&approvals, &activated);
        Ok(outcome)
    }

    /// Approves whichever pending request of the claim is assigned to `actor`.
    ///
    /// # Errors
    ///
    /// * `ClaimNotFound` - unknown claim
    /// * `ClaimClosed` - the claim is not under approval
    /// * `NotLinkedToEmployee` - the actor has no employee record
    /// * `Unauthorized` - none of the claim's pending requests is the actor's
    pub fn approve_claim(
        &self,
        id: ClaimId,
        actor: &Actor,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let request = self.actor_pending_request(id, actor, "approve")?;
        self.approve(request, actor, comments, now)
    }

    /// Rejects a request on behalf of `actor`; the claim is rejected with it.
    ///
    /// # Errors
    ///
    /// See `ClaimApprovals::reject`.
    pub fn reject(
        &self,
        request: ApprovalRequestId,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let slot = self.slot_for_request(request)?;
        let mut approvals = lock(&slot);
        approvals.reject(request, actor, reason, now)
    }

    /// Rejects the claim through the actor's pending request.
    ///
    /// # Errors
    ///
    /// Same as `approve_claim`.
    pub fn reject_claim(
        &self,
        id: ClaimId,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let request = self.actor_pending_request(id, actor, "reject")?;
        self.reject(request, actor, reason, now)
    }

    /// Escalates a pending request.
    ///
    /// # Errors
    ///
    /// See `ClaimApprovals::escalate`.
    pub fn escalate(
        &self,
        request: ApprovalRequestId,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, ApprovalError> {
        let slot = self.slot_for_request(request)?;
        let mut approvals = lock(&slot);
        let claim_id = approvals.claim().id;
        let outcome = approvals.escalate(request, now)?;
        for created in &outcome.created {
            self.request_index.insert(*created, claim_id);
        }
        let created = collect(&approvals, &outcome.created);
        self.notify_activated(&approvals, &created);
        Ok(outcome)
    }

    /// Cancels an open request and notifies whoever it hands over to.
    ///
    /// # Errors
    ///
    /// See `ClaimApprovals::cancel`.
    pub fn cancel_request(
        &self,
        request: ApprovalRequestId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let slot = self.slot_for_request(request)?;
        let mut approvals = lock(&slot);
        let outcome = approvals.cancel(request, now)?;
        let activated = collect(&approvals, &outcome.activated);
        self.notify_activated(&approvals, &activated);
        Ok(outcome)
    }

    /// Cancels a claim and its open requests.
    ///
    /// # Errors
    ///
    /// * `ClaimNotFound` - unknown claim
    /// * `ClaimClosed` - the claim is paid
    pub fn cancel_claim(&self, id: ClaimId) -> Result<ClaimStatus, ApprovalError> {
        let slot = self.slot(id)?;
        let mut approvals = lock(&slot);
        let status = approvals.status();
        if status == ClaimStatus::Paid {
            return Err(ApprovalError::ClaimClosed {
                status,
                action: "cancel",
            });
        }
        let cancelled = approvals.cancel_open_requests();
        approvals.claim_mut().status = ClaimStatus::Cancelled;
        tracing::info!(claim_id = %id, cancelled = cancelled.len(), "expense claim cancelled");
        Ok(ClaimStatus::Cancelled)
    }

    /// Returns a rejected or cancelled claim to draft.
    ///
    /// # Errors
    ///
    /// * `ClaimNotFound` - unknown claim
    /// * `ClaimClosed` - the claim is neither rejected nor cancelled
    pub fn reset_to_draft(&self, id: ClaimId) -> Result<ClaimStatus, ApprovalError> {
        let slot = self.slot(id)?;
        let mut approvals = lock(&slot);
        let status = approvals.status();
        if !matches!(status, ClaimStatus::Rejected | ClaimStatus::Cancelled) {
            return Err(ApprovalError::ClaimClosed {
                status,
                action: "reset to draft",
            });
        }
        approvals.cancel_open_requests();
        let claim = approvals.claim_mut();
        claim.status = ClaimStatus::Draft;
        claim.submission_date = None;
        claim.rejection_reason = None;
        Ok(ClaimStatus::Draft)
    }

    /// Marks an approved claim as paid.
    ///
    /// # Errors
    ///
    /// * `ClaimNotFound` - unknown claim
    /// * `ClaimClosed` - the claim is not approved
    pub fn mark_paid(&self, id: ClaimId, now: DateTime<Utc>) -> Result<ClaimStatus, ApprovalError> {
        let slot = self.slot(id)?;
        let mut approvals = lock(&slot);
        let status = approvals.status();
        if status != ClaimStatus::Approved {
            return Err(ApprovalError::ClaimClosed {
                status,
                action: "mark as paid",
            });
        }
        let claim = approvals.claim_mut();
        claim.status = ClaimStatus::Paid;
        claim.paid_date = Some(now);
        Ok(ClaimStatus::Paid)
    }

    /// Removes a claim and every request it owns.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::ClaimNotFound` for an unknown claim.
    pub fn delete_claim(&self, id: ClaimId) -> Result<ExpenseClaim, ApprovalError> {
        let (_, slot) = self
            .claims
            .remove(&id)
            .ok_or(ApprovalError::ClaimNotFound(id))?;
        let mut approvals = lock(&slot);
        for request in approvals.clear_requests() {
            self.request_index.remove(&request);
        }
        Ok(approvals.claim().clone())
    }

    /// Escalates every pending request past its escalation date.
    ///
    /// Requests whose rule cannot escalate are skipped with a warning.
    /// Returns how many requests were escalated.
    pub fn escalate_overdue(&self, now: DateTime<Utc>) -> usize {
        let mut escalated = 0;
        for slot in self.snapshot_slots() {
            let overdue: Vec<ApprovalRequestId> = lock(&slot)
                .pending_requests()
                .filter(|request| request.is_overdue(now))
                .map(|request| request.id)
                .collect();

            for request in overdue {
                match self.escalate(request, now) {
                    Ok(_) => escalated += 1,
                    Err(err) => tracing::warn!(
                        request_id = %request,
                        error = %err,
                        "overdue approval request not escalated"
                    ),
                }
            }
        }
        if escalated > 0 {
            tracing::info!(escalated, "escalated overdue approval requests");
        }
        escalated
    }

    /// Reminds approvers of requests pending longer than the reminder delay.
    ///
    /// Approvers without a linked login are skipped. No state changes.
    /// Returns how many reminders were sent.
    pub fn send_pending_reminders(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.reminder_after;
        let mut sent = 0;
        for slot in self.snapshot_slots() {
            let approvals = lock(&slot);
            for request in approvals.pending_requests() {
                if request.request_date >= cutoff {
                    continue;
                }
                if !self.has_login(request.approver) {
                    continue;
                }
                self.notifier
                    .approval_reminder(request, request.days_pending(now));
                sent += 1;
            }
        }
        if sent > 0 {
            tracing::info!(sent, "sent pending approval reminders");
        }
        sent
    }

    /// Returns the number of registered claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Returns true if no claim is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    fn slot(&self, id: ClaimId) -> Result<Arc<Mutex<ClaimApprovals>>, ApprovalError> {
        self.claims
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ApprovalError::ClaimNotFound(id))
    }

    fn slot_for_request(
        &self,
        request: ApprovalRequestId,
    ) -> Result<Arc<Mutex<ClaimApprovals>>, ApprovalError> {
        let claim = self
            .request_index
            .get(&request)
            .map(|entry| *entry.value())
            .ok_or(ApprovalError::RequestNotFound(request))?;
        self.slot(claim)
            .map_err(|_| ApprovalError::RequestNotFound(request))
    }

    /// Clones the claim handles so no map shard stays locked during a sweep.
    fn snapshot_slots(&self) -> Vec<Arc<Mutex<ClaimApprovals>>> {
        self.claims
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn actor_pending_request(
        &self,
        id: ClaimId,
        actor: &Actor,
        action: &'static str,
    ) -> Result<ApprovalRequestId, ApprovalError> {
        let slot = self.slot(id)?;
        let approvals = lock(&slot);
        let status = approvals.status();
        if !status.is_in_approval() {
            return Err(ApprovalError::ClaimClosed { status, action });
        }
        let employee = actor.employee.ok_or(ApprovalError::NotLinkedToEmployee)?;
        approvals
            .pending_requests()
            .find(|request| request.approver == employee)
            .map(|request| request.id)
            .ok_or_else(|| ApprovalError::Unauthorized {
                actor: employee,
                approver: approvals.current_approver().unwrap_or(employee),
            })
    }

    fn has_login(&self, employee: EmployeeId) -> bool {
        self.directory
            .employee(employee)
            .is_some_and(|e| e.user.is_some())
    }

    fn notify_activated(&self, approvals: &ClaimApprovals, requests: &[ApprovalRequest]) {
        for request in requests {
            if request.state != ApprovalState::Pending {
                continue;
            }
            let notify = approvals
                .rule(request.rule)
                .is_none_or(|rule| rule.notify_approvers);
            if notify && self.has_login(request.approver) {
                self.notifier.approval_activated(request);
            }
        }
    }
}

fn lock(slot: &Mutex<ClaimApprovals>) -> MutexGuard<'_, ClaimApprovals> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collect(approvals: &ClaimApprovals, ids: &[ApprovalRequestId]) -> Vec<ApprovalRequest> {
    ids.iter()
        .filter_map(|id| approvals.request(*id).cloned())
        .collect()
}
