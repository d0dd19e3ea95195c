//! Receipt OCR results and the confidence gate.
//!
//! The OCR engine itself is an external collaborator. Extracted fields are
//! trusted only when the reported confidence reaches the company threshold.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claim::ExpenseLine;

/// Errors for malformed OCR results.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OcrError {
    /// Confidence outside [0, 1].
    #[error("OCR confidence must be between 0.0 and 1.0, got {0}")]
    InvalidConfidence(Decimal),
}

/// Fields read off a receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrExtraction {
    /// Total amount.
    pub amount: Option<Decimal>,
    /// Receipt date.
    pub date: Option<NaiveDate>,
    /// Merchant name.
    pub vendor: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
}

impl OcrExtraction {
    /// Returns true if nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.date.is_none()
            && self.vendor.is_none()
            && self.description.is_none()
    }
}

/// What the OCR engine returned for one receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Engine confidence in [0, 1].
    pub confidence: Decimal,
    /// Raw recognized text.
    pub raw_text: String,
    /// Structured fields.
    #[serde(default, rename = "extracted_data")]
    pub extracted: OcrExtraction,
}

impl OcrResult {
    /// Creates a result, rejecting confidences outside [0, 1].
    ///
    /// # Errors
    ///
    /// Returns `OcrError::InvalidConfidence` for an out-of-range confidence.
    pub fn new(
        confidence: Decimal,
        raw_text: impl Into<String>,
        extracted: OcrExtraction,
    ) -> Result<Self, OcrError> {
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(OcrError::InvalidConfidence(confidence));
        }
        Ok(Self {
            confidence,
            raw_text: raw_text.into(),
            extracted,
        })
    }

    /// Returns true if the confidence is below `threshold`.
    #[must_use]
    pub fn is_low_confidence(&self, threshold: Decimal) -> bool {
        self.confidence < threshold
    }
}

/// Returns the extracted fields if they may be trusted.
///
/// Nothing is returned below `threshold` or when no field was extracted.
#[must_use]
pub fn accept_extraction(result: &OcrResult, threshold: Decimal) -> Option<&OcrExtraction> {
    (!result.is_low_confidence(threshold) && !result.extracted.is_empty())
        .then_some(&result.extracted)
}

/// Fills blank fields of `line` from a trusted extraction.
///
/// Fields the employee already entered are never overwritten. Returns how
/// many fields were filled.
pub fn fill_line(line: &mut ExpenseLine, extraction: &OcrExtraction) -> usize {
    let mut filled = 0;
    if let Some(amount) = extraction.amount {
        if line.amount.is_zero() {
            line.amount = amount;
            filled += 1;
        }
    }
    if let Some(vendor) = &extraction.vendor {
        if line.vendor.is_none() {
            line.vendor = Some(vendor.clone());
            filled += 1;
        }
    }
    if let Some(description) = &extraction.description {
        if line.description.trim().is_empty() {
            line.description.clone_from(description);
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn extraction() -> OcrExtraction {
        OcrExtraction {
            amount: Some(dec!(42.10)),
            date: NaiveDate::from_ymd_opt(2025, 1, 14),
            vendor: Some("Cafe Nero".into()),
            description: Some("Team lunch".into()),
        }
    }

    #[test]
    fn test_confidence_gate() {
        let result = OcrResult::new(dec!(0.6), "CAFE NERO 42.10", extraction()).unwrap();
        assert!(accept_extraction(&result, dec!(0.6)).is_some());
        assert!(accept_extraction(&result, dec!(0.61)).is_none());
        assert!(result.is_low_confidence(dec!(0.7)));
    }

    #[test]
    fn test_empty_extraction_is_not_accepted() {
        let result = OcrResult::new(dec!(0.99), "", OcrExtraction::default()).unwrap();
        assert!(accept_extraction(&result, dec!(0.6)).is_none());
    }

    #[test]
    fn test_confidence_range() {
        assert_eq!(
            OcrResult::new(dec!(1.2), "", OcrExtraction::default()).unwrap_err(),
            OcrError::InvalidConfidence(dec!(1.2))
        );
        assert!(OcrResult::new(dec!(-0.1), "", OcrExtraction::default()).is_err());
    }

    #[test]
    fn test_fill_line_keeps_user_input() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let mut blank = ExpenseLine::new("", Decimal::ZERO, date);
        assert_eq!(fill_line(&mut blank, &extraction()), 3);
        assert_eq!(blank.amount, dec!(42.10));
        assert_eq!(blank.vendor.as_deref(), Some("Cafe Nero"));
        assert_eq!(blank.description, "Team lunch");

        let mut entered = ExpenseLine::new("Client dinner", dec!(80), date);
        assert_eq!(fill_line(&mut entered, &extraction()), 1);
        assert_eq!(entered.amount, dec!(80));
        assert_eq!(entered.description, "Client dinner");
    }

    #[test]
    fn test_deserializes_engine_payload() {
        let json = r#"{
            "confidence": 0.87,
            "raw_text": "TOTAL 12.50",
            "extracted_data": {"amount": "12.50", "vendor": "Pret"}
        }"#;
        let result: OcrResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.confidence, dec!(0.87));
        assert_eq!(result.extracted.amount, Some(dec!(12.50)));
        assert_eq!(result.extracted.date, None);
    }
}
