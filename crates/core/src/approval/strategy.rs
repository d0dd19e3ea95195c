//! Approval strategies.
//!
//! Each variant carries exactly the configuration it uses, and answers two
//! questions: who approves, and how many of them must approve.

use std::fmt;

use expensa_shared::types::EmployeeId;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::directory::{Employee, OrgDirectory};
use super::error::ApprovalError;

/// How a rule picks its approvers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalStrategy {
    /// The submitter's direct manager.
    Manager,
    /// The head of the submitter's department.
    DepartmentHead,
    /// An explicit list; any one approval suffices.
    SpecificUser {
        /// Approvers in activation order.
        approvers: Vec<EmployeeId>,
    },
    /// The company's CFO, found by job title.
    Cfo,
    /// An explicit list approving one after another.
    Sequential {
        /// Approvers in activation order.
        approvers: Vec<EmployeeId>,
        /// Every approver must approve, not just the first to act.
        require_all: bool,
    },
    /// An explicit list where a share of approvers must approve.
    Percentage {
        /// Approvers in activation order.
        approvers: Vec<EmployeeId>,
        /// Required share, in (0, 100].
        percentage: Decimal,
    },
    /// The direct manager followed by an explicit list.
    Hybrid {
        /// Approvers after the manager.
        approvers: Vec<EmployeeId>,
    },
}

/// Discriminant of `ApprovalStrategy`, for display and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    /// See `ApprovalStrategy::Manager`.
    Manager,
    /// See `ApprovalStrategy::DepartmentHead`.
    DepartmentHead,
    /// See `ApprovalStrategy::SpecificUser`.
    SpecificUser,
    /// See `ApprovalStrategy::Cfo`.
    Cfo,
    /// See `ApprovalStrategy::Sequential`.
    Sequential,
    /// See `ApprovalStrategy::Percentage`.
    Percentage,
    /// See `ApprovalStrategy::Hybrid`.
    Hybrid,
}

impl ApprovalType {
    /// Returns the string representation of the type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::DepartmentHead => "department_head",
            Self::SpecificUser => "specific_user",
            Self::Cfo => "cfo",
            Self::Sequential => "sequential",
            Self::Percentage => "percentage",
            Self::Hybrid => "hybrid",
        }
    }

    /// Parses a type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "department_head" => Some(Self::DepartmentHead),
            "specific_user" => Some(Self::SpecificUser),
            "cfo" => Some(Self::Cfo),
            "sequential" => Some(Self::Sequential),
            "percentage" => Some(Self::Percentage),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ApprovalStrategy {
    /// Returns the strategy's discriminant.
    #[must_use]
    pub fn approval_type(&self) -> ApprovalType {
        match self {
            Self::Manager => ApprovalType::Manager,
            Self::DepartmentHead => ApprovalType::DepartmentHead,
            Self::SpecificUser { .. } => ApprovalType::SpecificUser,
            Self::Cfo => ApprovalType::Cfo,
            Self::Sequential { .. } => ApprovalType::Sequential,
            Self::Percentage { .. } => ApprovalType::Percentage,
            Self::Hybrid { .. } => ApprovalType::Hybrid,
        }
    }

    /// Checks the strategy's own invariants.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::InvalidRule` if a percentage is outside (0, 100].
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if let Self::Percentage { percentage, .. } = self {
            if *percentage <= Decimal::ZERO || *percentage > Decimal::ONE_HUNDRED {
                return Err(ApprovalError::InvalidRule(format!(
                    "approval percentage must be in (0, 100], got {percentage}"
                )));
            }
        }
        Ok(())
    }

    /// Resolves the approvers for a claim submitted by `employee`.
    ///
    /// Duplicates are removed keeping first occurrence; an empty result means
    /// nobody is available (no manager, no department head, no CFO).
    #[must_use]
    pub fn resolve_approvers(
        &self,
        employee: &Employee,
        directory: &dyn OrgDirectory,
    ) -> Vec<EmployeeId> {
        let resolved: Vec<EmployeeId> = match self {
            Self::Manager => employee.manager.into_iter().collect(),
            Self::DepartmentHead => employee
                .department
                .and_then(|id| directory.department(id))
                .and_then(|department| department.head)
                .into_iter()
                .collect(),
            Self::Cfo => directory
                .find_cfo(employee.company)
                .map(|cfo| cfo.id)
                .into_iter()
                .collect(),
            Self::SpecificUser { approvers }
            | Self::Sequential { approvers, .. }
            | Self::Percentage { approvers, .. } => approvers.clone(),
            Self::Hybrid { approvers } => employee
                .manager
                .into_iter()
                .chain(approvers.iter().copied())
                .collect(),
        };
        dedup_preserving_order(resolved)
    }

    /// Returns how many approvals the rule group needs out of `approver_count`.
    ///
    /// Never exceeds `approver_count` and is at least 1 when anyone approves.
    #[must_use]
    pub fn required_approvals(&self, approver_count: usize) -> usize {
        if approver_count == 0 {
            return 0;
        }
        let required = match self {
            Self::Sequential {
                require_all: true, ..
            } => approver_count,
            Self::Percentage { percentage, .. } => {
                let share = (*percentage * Decimal::from(approver_count) / Decimal::ONE_HUNDRED)
                    .floor()
                    .to_usize()
                    .unwrap_or(approver_count);
                share.max(1)
            }
            _ => 1,
        };
        required.min(approver_count)
    }
}

pub(crate) fn dedup_preserving_order(ids: Vec<EmployeeId>) -> Vec<EmployeeId> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::directory::{Department, InMemoryDirectory};
    use expensa_shared::types::CompanyId;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    struct Org {
        directory: InMemoryDirectory,
        submitter: Employee,
        manager: EmployeeId,
        head: EmployeeId,
        cfo: EmployeeId,
    }

    fn org() -> Org {
        let company = CompanyId::new();
        let mut directory = InMemoryDirectory::new();
        let cfo = directory.add_employee(Employee::new("Cass", company).with_title("CFO"));
        let head = directory.add_employee(Employee::new("Hal", company));
        let manager = directory.add_employee(Employee::new("Mia", company));
        let department = directory.add_department(Department::new("Sales", company).headed_by(head));
        let submitter = Employee::new("Sam", company)
            .in_department(department)
            .reporting_to(manager);
        directory.add_employee(submitter.clone());
        Org {
            directory,
            submitter,
            manager,
            head,
            cfo,
        }
    }

    #[test]
    fn test_resolve_hierarchy_strategies() {
        let org = org();
        assert_eq!(
            ApprovalStrategy::Manager.resolve_approvers(&org.submitter, &org.directory),
            vec![org.manager]
        );
        assert_eq!(
            ApprovalStrategy::DepartmentHead.resolve_approvers(&org.submitter, &org.directory),
            vec![org.head]
        );
        assert_eq!(
            ApprovalStrategy::Cfo.resolve_approvers(&org.submitter, &org.directory),
            vec![org.cfo]
        );
    }

    #[test]
    fn test_resolve_missing_hierarchy_is_empty() {
        let org = org();
        let loner = Employee::new("Lee", CompanyId::new());
        assert!(ApprovalStrategy::Manager.resolve_approvers(&loner, &org.directory).is_empty());
        assert!(ApprovalStrategy::DepartmentHead.resolve_approvers(&loner, &org.directory).is_empty());
        assert!(ApprovalStrategy::Cfo.resolve_approvers(&loner, &org.directory).is_empty());
    }

    #[test]
    fn test_hybrid_puts_manager_first_and_dedups() {
        let org = org();
        let strategy = ApprovalStrategy::Hybrid {
            approvers: vec![org.cfo, org.manager, org.cfo],
        };
        assert_eq!(
            strategy.resolve_approvers(&org.submitter, &org.directory),
            vec![org.manager, org.cfo]
        );
    }

    #[test]
    fn test_explicit_lists_keep_order() {
        let org = org();
        let list = vec![org.cfo, org.head];
        let strategy = ApprovalStrategy::Sequential {
            approvers: list.clone(),
            require_all: true,
        };
        assert_eq!(strategy.resolve_approvers(&org.submitter, &org.directory), list);
    }

    #[rstest]
    #[case(dec!(50), 4, 2)]
    #[case(dec!(50), 3, 1)]
    #[case(dec!(10), 3, 1)]
    #[case(dec!(66.67), 3, 2)]
    #[case(dec!(100), 5, 5)]
    fn test_percentage_quorum(#[case] percentage: Decimal, #[case] count: usize, #[case] expected: usize) {
        let strategy = ApprovalStrategy::Percentage {
            approvers: Vec::new(),
            percentage,
        };
        assert_eq!(strategy.required_approvals(count), expected);
    }

    #[test]
    fn test_required_approvals_by_type() {
        let all = ApprovalStrategy::Sequential {
            approvers: Vec::new(),
            require_all: true,
        };
        let any = ApprovalStrategy::Sequential {
            approvers: Vec::new(),
            require_all: false,
        };
        assert_eq!(all.required_approvals(3), 3);
        assert_eq!(any.required_approvals(3), 1);
        assert_eq!(ApprovalStrategy::Manager.required_approvals(1), 1);
        assert_eq!(ApprovalStrategy::Manager.required_approvals(0), 0);
    }

    #[test]
    fn test_validate_percentage_bounds() {
        let ok = ApprovalStrategy::Percentage {
            approvers: Vec::new(),
            percentage: dec!(100),
        };
        assert!(ok.validate().is_ok());
        for bad in [dec!(0), dec!(-5), dec!(100.01)] {
            let strategy = ApprovalStrategy::Percentage {
                approvers: Vec::new(),
                percentage: bad,
            };
            assert!(matches!(strategy.validate(), Err(ApprovalError::InvalidRule(_))));
        }
    }

    #[test]
    fn test_type_roundtrip_and_serde_tag() {
        let strategy = ApprovalStrategy::Cfo;
        assert_eq!(strategy.approval_type(), ApprovalType::Cfo);
        assert_eq!(ApprovalType::parse("department_head"), Some(ApprovalType::DepartmentHead));
        let json = serde_json::to_value(&strategy).unwrap();
        assert_eq!(json["type"], "cfo");
    }
}
