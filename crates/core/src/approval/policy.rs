//! Company-level approval thresholds and the standard rule set.

use expensa_shared::types::{CompanyId, CurrencyCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::ApprovalError;
use super::rule::ApprovalRule;
use super::strategy::ApprovalStrategy;

/// Name of the default auto-approval rule.
pub const AUTO_APPROVE_RULE_NAME: &str = "Auto-approve Small Expenses";
/// Name of the default manager rule.
pub const MANAGER_RULE_NAME: &str = "Manager Approval - Medium Expenses";
/// Name of the default CFO rule.
pub const CFO_RULE_NAME: &str = "CFO Approval - Large Expenses";

/// Approval thresholds for one company, in company currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyPolicy {
    /// Company the policy belongs to.
    pub company: CompanyId,
    /// Company currency.
    pub currency: CurrencyCode,
    /// Claims at or below this need no approval when no rule matches.
    pub auto_approve_limit: Decimal,
    /// Upper bound of the manager band.
    pub manager_approval_limit: Decimal,
    /// Claims at or above this need CFO approval.
    pub cfo_approval_threshold: Decimal,
    /// Minimum OCR confidence for extracted fields to be used.
    pub ocr_confidence_threshold: Decimal,
}

impl CompanyPolicy {
    /// Creates a policy with the standard thresholds: 100 / 1000 / 5000, OCR 0.6.
    #[must_use]
    pub fn new(company: CompanyId, currency: CurrencyCode) -> Self {
        Self {
            company,
            currency,
            auto_approve_limit: Decimal::from(100),
            manager_approval_limit: Decimal::from(1000),
            cfo_approval_threshold: Decimal::from(5000),
            ocr_confidence_threshold: Decimal::new(6, 1),
        }
    }

    /// Checks that the thresholds are consistent.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::InvalidRule` if a limit is negative, the
    /// auto-approve limit exceeds the manager limit, or the OCR threshold is
    /// outside [0, 1].
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.auto_approve_limit < Decimal::ZERO
            || self.manager_approval_limit < Decimal::ZERO
            || self.cfo_approval_threshold < Decimal::ZERO
        {
            return Err(ApprovalError::InvalidRule(
                "approval limits cannot be negative".to_string(),
            ));
        }
        if self.auto_approve_limit > self.manager_approval_limit {
            return Err(ApprovalError::InvalidRule(format!(
                "auto-approve limit {} exceeds manager approval limit {}",
                self.auto_approve_limit, self.manager_approval_limit
            )));
        }
        if self.ocr_confidence_threshold < Decimal::ZERO
            || self.ocr_confidence_threshold > Decimal::ONE
        {
            return Err(ApprovalError::InvalidRule(format!(
                "OCR confidence threshold {} must be between 0 and 1",
                self.ocr_confidence_threshold
            )));
        }
        Ok(())
    }

    /// Returns true if `amount` may be auto-approved when no rule matches.
    #[must_use]
    pub fn can_auto_approve(&self, amount: Decimal) -> bool {
        amount <= self.auto_approve_limit
    }

    /// Returns true if `amount` reaches the CFO threshold.
    #[must_use]
    pub fn requires_cfo_approval(&self, amount: Decimal) -> bool {
        amount >= self.cfo_approval_threshold
    }

    /// Builds the three standard rules from the policy's thresholds.
    #[must_use]
    pub fn default_rules(&self) -> Vec<ApprovalRule> {
        let mut auto = ApprovalRule::new(
            AUTO_APPROVE_RULE_NAME,
            self.company,
            self.currency.clone(),
            ApprovalStrategy::Manager,
        )
        .with_amount_range(Decimal::ZERO, Some(self.auto_approve_limit))
        .with_sequence(1);
        auto.auto_approve_below_limit = true;
        auto.description = Some("Small expenses routed to the direct manager".to_string());

        let mut manager = ApprovalRule::new(
            MANAGER_RULE_NAME,
            self.company,
            self.currency.clone(),
            ApprovalStrategy::Manager,
        )
        .with_amount_range(self.auto_approve_limit, Some(self.manager_approval_limit))
        .with_sequence(2);
        manager.description = Some("Medium expenses require manager approval".to_string());

        let mut cfo = ApprovalRule::new(
            CFO_RULE_NAME,
            self.company,
            self.currency.clone(),
            ApprovalStrategy::Cfo,
        )
        .with_amount_range(self.cfo_approval_threshold, None)
        .with_sequence(3);
        cfo.description = Some("Large expenses require CFO approval".to_string());

        vec![auto, manager, cfo]
    }

    /// Adds any standard rule whose name is not yet configured for the company.
    ///
    /// Returns how many rules were added; calling it again adds none.
    pub fn ensure_default_rules(&self, rules: &mut Vec<ApprovalRule>) -> usize {
        let missing: Vec<ApprovalRule> = self
            .default_rules()
            .into_iter()
            .filter(|candidate| {
                !rules
                    .iter()
                    .any(|r| r.company == self.company && r.name == candidate.name)
            })
            .collect();
        let added = missing.len();
        rules.extend(missing);
        if added > 0 {
            tracing::info!(company = %self.company, added, "created default approval rules");
        }
        added
    }
}
