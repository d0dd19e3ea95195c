//! Approval rules and rule selection.
//!
//! A rule matches a claim by company, amount band and optional department /
//! employee filters. Matching rules are applied in `(sequence, min_amount)`
//! order.

use chrono::Duration;
use expensa_shared::types::{ApprovalRuleId, CompanyId, CurrencyCode, DepartmentId, EmployeeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::directory::{Employee, OrgDirectory};
use super::error::ApprovalError;
use super::strategy::ApprovalStrategy;

/// Default evaluation order for new rules.
pub const DEFAULT_RULE_SEQUENCE: i32 = 10;

/// A configurable approval rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    /// Rule ID.
    pub id: ApprovalRuleId,
    /// Display name; unique per company for default rules.
    pub name: String,
    /// Inactive rules never match.
    pub active: bool,
    /// Evaluation order, ascending.
    pub sequence: i32,
    /// Owning company.
    pub company: CompanyId,
    /// Lower bound of the amount band, inclusive.
    pub min_amount: Decimal,
    /// Upper bound of the amount band, inclusive; open-ended when `None`.
    pub max_amount: Option<Decimal>,
    /// Currency the band is expressed in.
    pub currency: CurrencyCode,
    /// Department include-list; empty means every department.
    pub departments: Vec<DepartmentId>,
    /// Employee include-list; empty means every employee.
    pub employees: Vec<EmployeeId>,
    /// Employees the rule never applies to.
    pub excluded_employees: Vec<EmployeeId>,
    /// How approvers are picked and how many must approve.
    pub strategy: ApprovalStrategy,
    /// Overdue pending requests may be escalated.
    pub escalation_enabled: bool,
    /// Hours a request may stay pending before it is overdue.
    pub escalation_hours: u32,
    /// Who receives escalated requests.
    pub escalation_approvers: Vec<EmployeeId>,
    /// Marks the band as eligible for auto-approval.
    pub auto_approve_below_limit: bool,
    /// Notify approvers when their request becomes pending.
    pub notify_approvers: bool,
    /// Free-form description.
    pub description: Option<String>,
}

impl ApprovalRule {
    /// Creates an active, open-ended rule starting at zero.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        company: CompanyId,
        currency: CurrencyCode,
        strategy: ApprovalStrategy,
    ) -> Self {
        Self {
            id: ApprovalRuleId::new(),
            name: name.into(),
            active: true,
            sequence: DEFAULT_RULE_SEQUENCE,
            company,
            min_amount: Decimal::ZERO,
            max_amount: None,
            currency,
            departments: Vec::new(),
            employees: Vec::new(),
            excluded_employees: Vec::new(),
            strategy,
            escalation_enabled: false,
            escalation_hours: 24,
            escalation_approvers: Vec::new(),
            auto_approve_below_limit: false,
            notify_approvers: true,
            description: None,
        }
    }

    /// Sets the amount band.
    #[must_use]
    pub fn with_amount_range(mut self, min: Decimal, max: Option<Decimal>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    /// Sets the evaluation order.
    #[must_use]
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Enables escalation after `hours` to `approvers`.
    #[must_use]
    pub fn with_escalation(mut self, hours: u32, approvers: Vec<EmployeeId>) -> Self {
        self.escalation_enabled = true;
        self.escalation_hours = hours;
        self.escalation_approvers = approvers;
        self
    }

    /// Checks the rule's invariants.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::InvalidRule` if the band is inverted or negative,
    /// the strategy is invalid, or escalation is enabled with zero hours.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.min_amount < Decimal::ZERO {
            return Err(ApprovalError::InvalidRule(format!(
                "{}: minimum amount cannot be negative",
                self.name
            )));
        }
        if let Some(max) = self.max_amount {
            if self.min_amount > max {
                return Err(ApprovalError::InvalidRule(format!(
                    "{}: minimum amount {} exceeds maximum amount {max}",
                    self.name, self.min_amount
                )));
            }
        }
        if self.escalation_enabled && self.escalation_hours == 0 {
            return Err(ApprovalError::InvalidRule(format!(
                "{}: escalation hours must be positive",
                self.name
            )));
        }
        self.strategy.validate()
    }

    /// Returns true if `amount` lies in the rule's band.
    #[must_use]
    pub fn matches_amount(&self, amount: Decimal) -> bool {
        self.min_amount <= amount && self.max_amount.is_none_or(|max| amount <= max)
    }

    /// Returns true if the department and employee filters admit the submitter.
    #[must_use]
    pub fn applies_to(&self, employee: EmployeeId, department: Option<DepartmentId>) -> bool {
        if self.excluded_employees.contains(&employee) {
            return false;
        }
        if !self.departments.is_empty()
            && !department.is_some_and(|d| self.departments.contains(&d))
        {
            return false;
        }
        self.employees.is_empty() || self.employees.contains(&employee)
    }

    /// Returns the escalation delay when escalation is enabled.
    #[must_use]
    pub fn escalation_delay(&self) -> Option<Duration> {
        (self.escalation_enabled && self.escalation_hours > 0)
            .then(|| Duration::hours(i64::from(self.escalation_hours)))
    }

    /// Returns a label such as `Manager Approval (100 - 1000 USD)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.max_amount {
            Some(max) => format!(
                "{} ({} - {} {})",
                self.name, self.min_amount, max, self.currency
            ),
            None => format!("{} ({}+ {})", self.name, self.min_amount, self.currency),
        }
    }

    /// Evaluates the rule for a sample submitter without creating anything.
    #[must_use]
    pub fn dry_run(&self, employee: &Employee, directory: &dyn OrgDirectory) -> RuleDryRun {
        let approvers = self.strategy.resolve_approvers(employee, directory);
        let required_approvals = self.strategy.required_approvals(approvers.len());
        RuleDryRun {
            rule: self.id,
            applies: self.active
                && self.company == employee.company
                && self.applies_to(employee.id, employee.department),
            approvers,
            required_approvals,
        }
    }
}

/// Outcome of `ApprovalRule::dry_run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleDryRun {
    /// Rule evaluated.
    pub rule: ApprovalRuleId,
    /// Whether the company and filters admit the submitter.
    pub applies: bool,
    /// Approvers that would be asked, in activation order.
    pub approvers: Vec<EmployeeId>,
    /// Approvals the group would need.
    pub required_approvals: usize,
}

/// Stateless rule selection.
pub struct ApprovalRuleResolver;

impl ApprovalRuleResolver {
    /// Returns the rules that apply to a claim, in application order.
    ///
    /// # Arguments
    ///
    /// * `rules` - Every configured rule
    /// * `amount` - Claim total in company currency
    /// * `employee` - Submitter
    /// * `department` - Submitter's department
    /// * `company` - Claim's company
    ///
    /// # Returns
    ///
    /// Active rules of `company` whose band contains `amount` and whose filters
    /// admit the submitter, sorted by `(sequence, min_amount)`.
    #[must_use]
    pub fn applicable_rules<'a>(
        rules: &'a [ApprovalRule],
        amount: Decimal,
        employee: EmployeeId,
        department: Option<DepartmentId>,
        company: CompanyId,
    ) -> Vec<&'a ApprovalRule> {
        let mut matched: Vec<&ApprovalRule> = rules
            .iter()
            .filter(|rule| rule.active && rule.company == company)
            .filter(|rule| rule.matches_amount(amount))
            .filter(|rule| rule.applies_to(employee, department))
            .collect();
        matched.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.min_amount.cmp(&b.min_amount))
        });
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::directory::InMemoryDirectory;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("USD").unwrap()
    }

    fn rule(name: &str, company: CompanyId, min: Decimal, max: Option<Decimal>) -> ApprovalRule {
        ApprovalRule::new(name, company, usd(), ApprovalStrategy::Manager).with_amount_range(min, max)
    }

    #[test]
    fn test_amount_band_is_inclusive() {
        let r = rule("band", CompanyId::new(), dec!(100), Some(dec!(1000)));
        assert!(!r.matches_amount(dec!(99.99)));
        assert!(r.matches_amount(dec!(100)));
        assert!(r.matches_amount(dec!(1000)));
        assert!(!r.matches_amount(dec!(1000.01)));

        let open = rule("open", CompanyId::new(), dec!(5000), None);
        assert!(open.matches_amount(dec!(1_000_000)));
    }

    #[test]
    fn test_filters() {
        let employee = EmployeeId::new();
        let department = DepartmentId::new();
        let mut r = rule("filtered", CompanyId::new(), dec!(0), None);
        assert!(r.applies_to(employee, None));

        r.departments = vec![department];
        assert!(r.applies_to(employee, Some(department)));
        assert!(!r.applies_to(employee, Some(DepartmentId::new())));
        assert!(!r.applies_to(employee, None));

        r.employees = vec![EmployeeId::new()];
        assert!(!r.applies_to(employee, Some(department)));
        r.employees.push(employee);
        assert!(r.applies_to(employee, Some(department)));

        r.excluded_employees = vec![employee];
        assert!(!r.applies_to(employee, Some(department)));
    }

    #[test]
    fn test_applicable_rules_order_and_company() {
        let company = CompanyId::new();
        let employee = EmployeeId::new();
        let rules = vec![
            rule("late", company, dec!(0), None).with_sequence(20),
            rule("early-high", company, dec!(100), None).with_sequence(5),
            rule("early-low", company, dec!(0), None).with_sequence(5),
            rule("other company", CompanyId::new(), dec!(0), None).with_sequence(1),
            ApprovalRule {
                active: false,
                ..rule("inactive", company, dec!(0), None).with_sequence(1)
            },
            rule("out of band", company, dec!(10_000), None).with_sequence(1),
        ];

        let names: Vec<&str> =
            ApprovalRuleResolver::applicable_rules(&rules, dec!(500), employee, None, company)
                .into_iter()
                .map(|r| r.name.as_str())
                .collect();
        assert_eq!(names, vec!["early-low", "early-high", "late"]);
    }

    #[test]
    fn test_validate() {
        let company = CompanyId::new();
        assert!(rule("ok", company, dec!(0), Some(dec!(100))).validate().is_ok());
        assert!(rule("inverted", company, dec!(200), Some(dec!(100))).validate().is_err());
        assert!(rule("negative", company, dec!(-1), None).validate().is_err());

        let mut escalating = rule("esc", company, dec!(0), None).with_escalation(0, vec![]);
        assert!(escalating.validate().is_err());
        escalating.escalation_hours = 48;
        assert!(escalating.validate().is_ok());
        assert_eq!(escalating.escalation_delay(), Some(Duration::hours(48)));
        assert_eq!(rule("plain", company, dec!(0), None).escalation_delay(), None);
    }

    #[test]
    fn test_display_name() {
        let company = CompanyId::new();
        assert_eq!(
            rule("Manager", company, dec!(100), Some(dec!(1000))).display_name(),
            "Manager (100 - 1000 USD)"
        );
        assert_eq!(rule("CFO", company, dec!(5000), None).display_name(), "CFO (5000+ USD)");
    }

    #[test]
    fn test_dry_run() {
        let company = CompanyId::new();
        let mut directory = InMemoryDirectory::new();
        let manager = directory.add_employee(Employee::new("Mia", company));
        let submitter = Employee::new("Sam", company).reporting_to(manager);
        directory.add_employee(submitter.clone());

        let result = rule("mgr", company, dec!(0), None).dry_run(&submitter, &directory);
        assert!(result.applies);
        assert_eq!(result.approvers, vec![manager]);
        assert_eq!(result.required_approvals, 1);

        let mut excluded = rule("mgr", company, dec!(0), None);
        excluded.excluded_employees.push(submitter.id);
        assert!(!excluded.dry_run(&submitter, &directory).applies);
    }
}
