//! Organization directory: employees, departments, reporting lines.
//!
//! Approver resolution only reads from the directory; persistence is the
//! caller's concern.

use expensa_shared::types::{CompanyId, DepartmentId, EmployeeId, UserId};
use serde::{Deserialize, Serialize};

/// An employee record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Employee ID.
    pub id: EmployeeId,
    /// Display name.
    pub name: String,
    /// Employing company.
    pub company: CompanyId,
    /// Department, if assigned.
    pub department: Option<DepartmentId>,
    /// Direct manager, if any.
    pub manager: Option<EmployeeId>,
    /// Job title, used for CFO lookup.
    pub job_title: Option<String>,
    /// Linked login; reminders are only sent to linked employees.
    pub user: Option<UserId>,
}

impl Employee {
    /// Creates an employee with no department, manager, title or login.
    #[must_use]
    pub fn new(name: impl Into<String>, company: CompanyId) -> Self {
        Self {
            id: EmployeeId::new(),
            name: name.into(),
            company,
            department: None,
            manager: None,
            job_title: None,
            user: None,
        }
    }

    /// Sets the department.
    #[must_use]
    pub fn in_department(mut self, department: DepartmentId) -> Self {
        self.department = Some(department);
        self
    }

    /// Sets the direct manager.
    #[must_use]
    pub fn reporting_to(mut self, manager: EmployeeId) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Sets the job title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.job_title = Some(title.into());
        self
    }

    /// Links a login.
    #[must_use]
    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    /// Returns true if the job title names a chief financial officer.
    ///
    /// Case-insensitive substring match on `cfo` or `chief financial officer`.
    #[must_use]
    pub fn is_cfo(&self) -> bool {
        self.job_title.as_deref().is_some_and(|title| {
            let title = title.to_lowercase();
            title.contains("cfo") || title.contains("chief financial officer")
        })
    }
}

/// A department record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Department ID.
    pub id: DepartmentId,
    /// Display name.
    pub name: String,
    /// Owning company.
    pub company: CompanyId,
    /// Department head, if any.
    pub head: Option<EmployeeId>,
}

impl Department {
    /// Creates a department with no head.
    #[must_use]
    pub fn new(name: impl Into<String>, company: CompanyId) -> Self {
        Self {
            id: DepartmentId::new(),
            name: name.into(),
            company,
            head: None,
        }
    }

    /// Sets the department head.
    #[must_use]
    pub fn headed_by(mut self, head: EmployeeId) -> Self {
        self.head = Some(head);
        self
    }
}

/// Read access to the organization.
pub trait OrgDirectory: Send + Sync {
    /// Looks up an employee.
    fn employee(&self, id: EmployeeId) -> Option<Employee>;

    /// Looks up a department.
    fn department(&self, id: DepartmentId) -> Option<Department>;

    /// Returns a company's employees in directory order.
    fn company_employees(&self, company: CompanyId) -> Vec<Employee>;

    /// Returns the first employee of `company` whose title names a CFO.
    fn find_cfo(&self, company: CompanyId) -> Option<Employee> {
        self.company_employees(company)
            .into_iter()
            .find(Employee::is_cfo)
    }
}

/// Directory held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    employees: Vec<Employee>,
    departments: Vec<Department>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an employee, returning its ID.
    pub fn add_employee(&mut self, employee: Employee) -> EmployeeId {
        let id = employee.id;
        match self.employees.iter_mut().find(|e| e.id == id) {
            Some(existing) => *existing = employee,
            None => self.employees.push(employee),
        }
        id
    }

    /// Adds or replaces a department, returning its ID.
    pub fn add_department(&mut self, department: Department) -> DepartmentId {
        let id = department.id;
        match self.departments.iter_mut().find(|d| d.id == id) {
            Some(existing) => *existing = department,
            None => self.departments.push(department),
        }
        id
    }
}

impl OrgDirectory for InMemoryDirectory {
    fn employee(&self, id: EmployeeId) -> Option<Employee> {
        self.employees.iter().find(|e| e.id == id).cloned()
    }

    fn department(&self, id: DepartmentId) -> Option<Department> {
        self.departments.iter().find(|d| d.id == id).cloned()
    }

    fn company_employees(&self, company: CompanyId) -> Vec<Employee> {
        self.employees
            .iter()
            .filter(|e| e.company == company)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CFO", true)]
    #[case("Group cfo", true)]
    #[case("Chief Financial Officer", true)]
    #[case("chief financial officer (acting)", true)]
    #[case("Finance Manager", false)]
    #[case("Chief Executive Officer", false)]
    fn test_is_cfo(#[case] title: &str, #[case] expected: bool) {
        let employee = Employee::new("Dana", CompanyId::new()).with_title(title);
        assert_eq!(employee.is_cfo(), expected);
    }

    #[test]
    fn test_no_title_is_not_cfo() {
        assert!(!Employee::new("Dana", CompanyId::new()).is_cfo());
    }

    #[test]
    fn test_find_cfo_first_match_in_company() {
        let company = CompanyId::new();
        let other = CompanyId::new();
        let mut directory = InMemoryDirectory::new();
        directory.add_employee(Employee::new("Other CFO", other).with_title("CFO"));
        directory.add_employee(Employee::new("Ann", company).with_title("Engineer"));
        let first = directory.add_employee(Employee::new("Bo", company).with_title("CFO"));
        directory.add_employee(Employee::new("Cy", company).with_title("Chief Financial Officer"));

        assert_eq!(directory.find_cfo(company).map(|e| e.id), Some(first));
        assert_eq!(directory.company_employees(company).len(), 3);
    }

    #[test]
    fn test_add_employee_replaces_existing() {
        let company = CompanyId::new();
        let mut directory = InMemoryDirectory::new();
        let employee = Employee::new("Ann", company);
        let id = directory.add_employee(employee.clone());
        directory.add_employee(employee.with_title("CFO"));

        assert_eq!(directory.company_employees(company).len(), 1);
        assert!(directory.employee(id).unwrap().is_cfo());
    }
}
