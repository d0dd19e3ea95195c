//! Outbound notifications.
//!
//! Delivery channels (mail, chat) live outside this crate; everything here
//! talks to a `Notifier`.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use crate::approval::ApprovalRequest;

/// Sink for approval and operational notifications.
pub trait Notifier: Send + Sync {
    /// A request became `pending` and its approver should act.
    fn approval_activated(&self, request: &ApprovalRequest);

    /// A request has been `pending` for longer than the reminder threshold.
    fn approval_reminder(&self, request: &ApprovalRequest, days_pending: i64);

    /// Operational alert for the configured administrator.
    fn admin_alert(&self, recipient: &str, title: &str, message: &str);
}

/// Notifier that only emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn approval_activated(&self, request: &ApprovalRequest) {
        tracing::info!(
            request_id = %request.id,
            claim_id = %request.claim,
            approver = %request.approver,
            sequence = request.sequence,
            "approval requested"
        );
    }

    fn approval_reminder(&self, request: &ApprovalRequest, days_pending: i64) {
        tracing::info!(
            request_id = %request.id,
            approver = %request.approver,
            days_pending,
            "approval reminder"
        );
    }

    fn admin_alert(&self, recipient: &str, title: &str, message: &str) {
        tracing::warn!(recipient, title, message, "admin alert");
    }
}

/// A notification captured by `MemoryNotifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// See `Notifier::approval_activated`.
    Activated {
        /// Request that became pending.
        request: crate::approval::ApprovalRequestId,
    },
    /// See `Notifier::approval_reminder`.
    Reminder {
        /// Request still pending.
        request: crate::approval::ApprovalRequestId,
        /// Whole days since the request became pending.
        days_pending: i64,
    },
    /// See `Notifier::admin_alert`.
    AdminAlert {
        /// Alert recipient.
        recipient: String,
        /// Alert title.
        title: String,
    },
}

/// Notifier that records everything it receives.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, notification: Notification) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

impl Notifier for MemoryNotifier {
    fn approval_activated(&self, request: &ApprovalRequest) {
        self.record(Notification::Activated {
            request: request.id,
        });
    }

    fn approval_reminder(&self, request: &ApprovalRequest, days_pending: i64) {
        self.record(Notification::Reminder {
            request: request.id,
            days_pending,
        });
    }

    fn admin_alert(&self, recipient: &str, title: &str, _message: &str) {
        self.record(Notification::AdminAlert {
            recipient: recipient.to_string(),
            title: title.to_string(),
        });
    }
}

/// Sends admin alerts at most once per calendar day per error class.
pub struct AdminAlerter {
    recipient: Option<String>,
    notifier: Arc<dyn Notifier>,
    last_sent: DashMap<String, NaiveDate>,
}

impl std::fmt::Debug for AdminAlerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAlerter")
            .field("recipient", &self.recipient)
            .field("classes", &self.last_sent.len())
            .finish_non_exhaustive()
    }
}

impl AdminAlerter {
    /// Creates an alerter. With no recipient every alert is dropped.
    #[must_use]
    pub fn new(recipient: Option<String>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            recipient,
            notifier,
            last_sent: DashMap::new(),
        }
    }

    /// Sends an alert for `class` unless one was already sent today (UTC).
    ///
    /// Returns true if the alert was handed to the notifier.
    pub fn alert(&self, class: &str, title: &str, message: &str) -> bool {
        self.alert_on(class, title, message, Utc::now().date_naive())
    }

    /// Sends an alert as of `today`.
    pub fn alert_on(&self, class: &str, title: &str, message: &str, today: NaiveDate) -> bool {
        let Some(recipient) = self.recipient.as_deref() else {
            tracing::debug!(class, "no admin recipient configured, alert dropped");
            return false;
        };

        {
            match self.last_sent.entry(class.to_string()) {
                Entry::Occupied(entry) if *entry.get() == today => {
                    tracing::debug!(class, "admin alert already sent today");
                    return false;
                }
                Entry::Occupied(mut entry) => {
                    entry.insert(today);
                }
                Entry::Vacant(entry) => {
                    entry.insert(today);
                }
            }
        }

        self.notifier.admin_alert(recipient, title, message);
        true
    }
}
