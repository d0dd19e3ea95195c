//! Expense claims and their company-currency conversion.
//!
//! A claim is expressed in the employee's currency; approval thresholds are
//! in company currency. The conversion is cached on the claim and marked
//! pending (never raised) when no rate source is available.

use chrono::{DateTime, NaiveDate, Utc};
use expensa_shared::types::{ClaimId, CompanyId, CurrencyCode, DepartmentId, EmployeeId, Money};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::approval::{ApprovalError, ApprovalSubject, ClaimStatus, Employee};
use crate::currency::{Conversion, CurrencyConverter};

/// One expense on a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseLine {
    /// What was paid for.
    pub description: String,
    /// Amount in the claim currency.
    pub amount: Decimal,
    /// When the expense was incurred.
    pub expense_date: NaiveDate,
    /// Expense category, if classified.
    pub category: Option<String>,
    /// Merchant, if known.
    pub vendor: Option<String>,
}

impl ExpenseLine {
    /// Creates an uncategorized line.
    #[must_use]
    pub fn new(description: impl Into<String>, amount: Decimal, expense_date: NaiveDate) -> Self {
        Self {
            description: description.into(),
            amount,
            expense_date,
            category: None,
            vendor: None,
        }
    }
}

/// State of the claim total's conversion to company currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionState {
    /// Claim and company currency are the same.
    NotRequired,
    /// Lines changed since the last conversion.
    Outdated,
    /// Converted with the recorded rate and provenance.
    Converted(Conversion),
    /// No rate could be obtained; retry later.
    Pending {
        /// User-facing reason.
        reason: String,
    },
}

/// An employee's expense claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseClaim {
    /// Claim ID.
    pub id: ClaimId,
    /// Human-readable reference.
    pub reference: String,
    /// Submitting employee.
    pub employee: EmployeeId,
    /// Submitting employee's department.
    pub department: Option<DepartmentId>,
    /// Company the claim is filed with.
    pub company: CompanyId,
    /// Currency the lines are expressed in.
    pub currency: CurrencyCode,
    /// Company currency, used for approval thresholds.
    pub company_currency: CurrencyCode,
    /// Claim date, used as the conversion rate date.
    pub claim_date: NaiveDate,
    /// Expense lines.
    pub lines: Vec<ExpenseLine>,
    /// Lifecycle status.
    pub status: ClaimStatus,
    /// Company-currency conversion of the total.
    pub conversion: ConversionState,
    /// When the claim was submitted.
    pub submission_date: Option<DateTime<Utc>>,
    /// When the claim was fully approved.
    pub approval_date: Option<DateTime<Utc>>,
    /// Reason given by the rejecting approver.
    pub rejection_reason: Option<String>,
    /// When the claim was paid.
    pub paid_date: Option<DateTime<Utc>>,
}

impl ExpenseClaim {
    /// Creates a draft claim for `employee`.
    #[must_use]
    pub fn new(
        reference: impl Into<String>,
        employee: &Employee,
        currency: CurrencyCode,
        company_currency: CurrencyCode,
        claim_date: NaiveDate,
    ) -> Self {
        let conversion = if currency == company_currency {
            ConversionState::NotRequired
        } else {
            ConversionState::Outdated
        };
        Self {
            id: ClaimId::new(),
            reference: reference.into(),
            employee: employee.id,
            department: employee.department,
            company: employee.company,
            currency,
            company_currency,
            claim_date,
            lines: Vec::new(),
            status: ClaimStatus::Draft,
            conversion,
            submission_date: None,
            approval_date: None,
            rejection_reason: None,
            paid_date: None,
        }
    }

    /// Appends a line. Only draft claims are editable.
    ///
    /// # Errors
    ///
    /// * `ClaimClosed` - the claim is not a draft
    /// * `AmountOverflow` - the line would push the total out of range
    pub fn add_line(&mut self, line: ExpenseLine) -> Result<(), ApprovalError> {
        if !self.status.is_editable() {
            return Err(ApprovalError::ClaimClosed {
                status: self.status,
                action: "edit",
            });
        }
        self.total_amount()
            .and_then(|total| total.checked_add(line.amount))
            .ok_or(ApprovalError::AmountOverflow)?;
        self.lines.push(line);
        if self.currency != self.company_currency {
            self.conversion = ConversionState::Outdated;
        }
        Ok(())
    }

    /// Returns the sum of the lines in claim currency, or `None` if it
    /// overflows.
    #[must_use]
    pub fn total_amount(&self) -> Option<Decimal> {
        self.lines
            .iter()
            .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.amount))
    }

    /// Returns the total in claim currency.
    #[must_use]
    pub fn total(&self) -> Option<Money> {
        self.total_amount()
            .map(|amount| Money::new(amount, self.currency.clone()))
    }

    /// Returns the total in company currency, if known.
    #[must_use]
    pub fn company_amount(&self) -> Option<Decimal> {
        match &self.conversion {
            ConversionState::NotRequired => self.total_amount(),
            ConversionState::Converted(conversion) => Some(conversion.converted_amount),
            ConversionState::Outdated | ConversionState::Pending { .. } => None,
        }
    }

    /// Returns true while the company-currency total is unknown.
    #[must_use]
    pub fn is_conversion_pending(&self) -> bool {
        self.company_amount().is_none()
    }

    /// Recomputes the company-currency total.
    ///
    /// Conversion failures leave the state `Pending` with a user-facing
    /// reason instead of returning an error.
    pub async fn refresh_conversion(&mut self, converter: &CurrencyConverter) -> &ConversionState {
        if self.currency == self.company_currency {
            self.conversion = ConversionState::NotRequired;
            return &self.conversion;
        }

        let Some(total) = self.total_amount() else {
            tracing::warn!(claim_id = %self.id, "claim total out of range, conversion pending");
            self.conversion = ConversionState::Pending {
                reason: ApprovalError::AmountOverflow.to_string(),
            };
            return &self.conversion;
        };

        let result = converter
            .convert(
                total,
                &self.currency,
                &self.company_currency,
                Some(self.claim_date),
            )
            .await;

        self.conversion = match result {
            Ok(conversion) => ConversionState::Converted(conversion),
            Err(err) => {
                tracing::warn!(
                    claim_id = %self.id,
                    from = %self.currency,
                    to = %self.company_currency,
                    error = %err,
                    "claim conversion pending"
                );
                ConversionState::Pending {
                    reason: err.to_string(),
                }
            }
        };
        &self.conversion
    }

    /// Returns what the approval rules are evaluated against.
    ///
    /// # Errors
    ///
    /// * `AmountOverflow` - the lines do not sum within range
    /// * `ConversionPending` - the company-currency total is unknown
    pub fn approval_subject(&self) -> Result<ApprovalSubject, ApprovalError> {
        self.total_amount().ok_or(ApprovalError::AmountOverflow)?;
        let amount = self
            .company_amount()
            .ok_or(ApprovalError::ConversionPending)?;
        Ok(ApprovalSubject {
            claim: self.id,
            reference: self.reference.clone(),
            employee: self.employee,
            department: self.department,
            company: self.company,
            amount,
            currency: self.company_currency.clone(),
        })
    }
}
