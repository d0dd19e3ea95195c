//! Core business logic for Expensa.
//!
//! This crate contains pure domain logic with no HTTP client and no storage.
//! Network and filesystem adapters plug in through the `RateProvider` and
//! `FixtureSource` traits.
//!
//! # Modules
//!
//! - `currency` - Rate cache, rate limiting, fallback resolution, conversion
//! - `approval` - Approval rules, request graph, state machine and sweeps
//! - `claim` - Expense claims and their company-currency totals
//! - `notify` - Approver notifications and rate-limited admin alerts
//! - `ocr` - Receipt OCR results and the confidence gate

pub mod approval;
pub mod claim;
pub mod currency;
pub mod notify;
pub mod ocr;
