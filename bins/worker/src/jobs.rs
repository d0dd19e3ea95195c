//! Periodic sweeps.
//!
//! Every sweep runs once at startup, then on its own interval until shutdown.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use expensa_shared::config::SchedulerConfig;
use tokio::time::{Instant, MissedTickBehavior};

use crate::app::Services;

/// Counts from one pass of every sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Overdue requests escalated.
    pub escalated: usize,
    /// Reminders sent.
    pub reminded: usize,
    /// Expired rate cache entries removed.
    pub expired_rates: usize,
}

/// Escalates overdue approval requests.
pub fn escalation_pass(services: &Services, now: DateTime<Utc>) -> usize {
    services.approvals.escalate_overdue(now)
}

/// Reminds approvers of long-pending requests.
pub fn reminder_pass(services: &Services, now: DateTime<Utc>) -> usize {
    services.approvals.send_pending_reminders(now)
}

/// Drops expired rate cache entries and idle rate-limit windows.
pub fn cache_pass(services: &Services, now: DateTime<Utc>) -> usize {
    let removed = services.cache.sweep_expired_at(now);
    services.limiter.prune_idle_at(now);
    let stats = services.cache.stats_at(now);
    tracing::debug!(
        removed,
        total = stats.total,
        active = stats.active,
        "rate cache swept"
    );
    removed
}

/// Runs every sweep once.
pub fn run_once(services: &Services, now: DateTime<Utc>) -> SweepReport {
    SweepReport {
        escalated: escalation_pass(services, now),
        reminded: reminder_pass(services, now),
        expired_rates: cache_pass(services, now),
    }
}

/// Runs the sweeps on their configured intervals until `shutdown` resolves.
pub async fn run(
    services: &Services,
    schedule: &SchedulerConfig,
    shutdown: impl Future<Output = ()>,
) {
    let report = run_once(services, Utc::now());
    tracing::info!(
        escalated = report.escalated,
        reminded = report.reminded,
        expired_rates = report.expired_rates,
        "startup sweep finished"
    );

    let mut escalation = interval(schedule.escalation_interval_secs);
    let mut reminders = interval(schedule.reminder_interval_secs);
    let mut cache = interval(schedule.cache_sweep_interval_secs);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = escalation.tick() => {
                escalation_pass(services, Utc::now());
            }
            _ = reminders.tick() => {
                reminder_pass(services, Utc::now());
            }
            _ = cache.tick() => {
                cache_pass(services, Utc::now());
            }
            () = &mut shutdown => {
                tracing::info!("shutdown requested, stopping sweeps");
                break;
            }
        }
    }
}

fn interval(secs: u64) -> tokio::time::Interval {
    let period = Duration::from_secs(secs.max(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
