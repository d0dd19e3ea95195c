//! Property-based tests for approval sequencing and authorization.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use expensa_shared::types::{CompanyId, CurrencyCode, EmployeeId, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::approval::{
    Actor, ApprovalGraphBuilder, ApprovalRule, ApprovalState, ApprovalStrategy, ClaimApprovals,
    ClaimStatus, Employee, InMemoryDirectory,
};
use crate::claim::{ExpenseClaim, ExpenseLine};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()
}

/// Builds a submitted claim from the rules `make` returns for a fresh company.
fn submitted(make: impl FnOnce(CompanyId, &CurrencyCode) -> Vec<ApprovalRule>) -> ClaimApprovals {
    let company = CompanyId::new();
    let usd = CurrencyCode::parse("USD").unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
    let submitter = Employee::new("Sam", company);
    let mut directory = InMemoryDirectory::new();
    directory.add_employee(submitter.clone());

    let rules = make(company, &usd);

    let mut claim = ExpenseClaim::new("EXP/P", &submitter, usd.clone(), usd, date);
    claim
        .add_line(ExpenseLine::new("Trip", Decimal::from(500), date))
        .unwrap();
    claim.status = ClaimStatus::Submitted;
    let subject = claim.approval_subject().unwrap();

    let refs: Vec<&ApprovalRule> = rules.iter().collect();
    let graph = ApprovalGraphBuilder::build(&subject, &submitter, &refs, &directory, now());
    let mut approvals = ClaimApprovals::new(claim);
    approvals.install(graph, rules);
    approvals
}

/// One single-approver rule per entry of `approvers`, so every request forms
/// its own group.
fn chain(approvers: &[EmployeeId]) -> ClaimApprovals {
    submitted(|company, usd| {
        approvers
            .iter()
            .map(|approver| {
                ApprovalRule::new(
                    "tier",
                    company,
                    usd.clone(),
                    ApprovalStrategy::SpecificUser {
                        approvers: vec![*approver],
                    },
                )
            })
            .collect()
    })
}

/// An all-must-approve group followed by a single final approver.
fn all_then(approvers: &[EmployeeId], last: EmployeeId) -> ClaimApprovals {
    submitted(|company, usd| {
        vec![
            ApprovalRule::new(
                "board",
                company,
                usd.clone(),
                ApprovalStrategy::Sequential {
                    approvers: approvers.to_vec(),
                    require_all: true,
                },
            ),
            ApprovalRule::new(
                "final",
                company,
                usd.clone(),
                ApprovalStrategy::SpecificUser {
                    approvers: vec![last],
                },
            ),
        ]
    })
}

fn approvers(n: usize) -> Vec<EmployeeId> {
    (0..n).map(|_| EmployeeId::new()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Right after construction exactly one request is pending, the rest wait.
    #[test]
    fn prop_one_pending_after_build(n in 1usize..12) {
        let approvals = chain(&approvers(n));
        let states: Vec<ApprovalState> = approvals.requests().map(|r| r.state).collect();

        prop_assert_eq!(states.len(), n);
        prop_assert_eq!(states[0], ApprovalState::Pending);
        prop_assert!(states[1..].iter().all(|s| *s == ApprovalState::Waiting));
    }

    /// Approving the sole pending request activates the next one by sequence,
    /// and the claim is approved after the last one.
    #[test]
    fn prop_approval_walks_sequence(n in 1usize..10) {
        let ids = approvers(n);
        let mut approvals = chain(&ids);

        for (index, approver) in ids.iter().enumerate() {
            let pending: Vec<u32> = approvals.pending_requests().map(|r| r.sequence).collect();
            prop_assert_eq!(pending, vec![u32::try_from(index).unwrap() + 1]);

            let request = approvals.request_ids()[index];
            let outcome = approvals
                .approve(request, &Actor::employee(UserId::new(), *approver), None, now())
                .unwrap();

            if index + 1 < n {
                prop_assert_eq!(outcome.activated, vec![approvals.request_ids()[index + 1]]);
                prop_assert_eq!(outcome.claim_status, ClaimStatus::UnderReview);
            } else {
                prop_assert!(outcome.activated.is_empty());
                prop_assert_eq!(outcome.claim_status, ClaimStatus::Approved);
            }
        }
    }

    /// Losing any member of an all-must-approve group closes the claim; the
    /// next group never gets a say.
    #[test]
    fn prop_cancel_never_bypasses_quorum(n in 2usize..6, cancel_at in 0usize..6, approved in 0usize..6) {
        let cancel_at = cancel_at % n;
        let approved = approved.min(cancel_at);
        let ids = approvers(n);
        let last = EmployeeId::new();
        let mut approvals = all_then(&ids, last);

        for (index, approver) in ids.iter().take(approved).enumerate() {
            let request = approvals.request_ids()[index];
            approvals
                .approve(request, &Actor::employee(UserId::new(), *approver), None, now())
                .unwrap();
        }
        let outcome = approvals.cancel(approvals.request_ids()[cancel_at], now()).unwrap();

        prop_assert_eq!(outcome.claim_status, ClaimStatus::Rejected);
        prop_assert!(outcome.activated.is_empty());
        prop_assert!(approvals.requests().all(|r| !r.is_open()));
        let final_request = approvals.requests().find(|r| r.approver == last).unwrap();
        prop_assert_eq!(final_request.state, ApprovalState::Cancelled);
    }

    /// Anyone but the assigned approver fails and changes nothing.
    #[test]
    fn prop_stranger_cannot_act(n in 1usize..6, reject in any::<bool>()) {
        let ids = approvers(n);
        let mut approvals = chain(&ids);
        let before: Vec<ApprovalState> = approvals.requests().map(|r| r.state).collect();
        let request = approvals.request_ids()[0];
        let stranger = Actor::employee(UserId::new(), EmployeeId::new());

        let result = if reject {
            approvals.reject(request, &stranger, None, now())
        } else {
            approvals.approve(request, &stranger, None, now())
        };

        prop_assert!(result.unwrap_err().is_authorization());
        let after: Vec<ApprovalState> = approvals.requests().map(|r| r.state).collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(approvals.status(), ClaimStatus::Submitted);
    }

    /// Percentage quorum never exceeds the group and never drops below one.
    #[test]
    fn prop_required_approvals_bounded(n in 1usize..50, pct in 1u32..=100) {
        let strategy = ApprovalStrategy::Percentage {
            approvers: approvers(n),
            percentage: Decimal::from(pct),
        };
        let required = strategy.required_approvals(n);
        prop_assert!(required >= 1);
        prop_assert!(required <= n);
    }
}
