//! Triggers - when a runner fires

use crate::core::TriggerConfig;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fire immediately, then again `Duration` after each cycle ends
    Interval(Duration),
}

impl Trigger {
    pub fn from_config(config: &TriggerConfig) -> Option<Self> {
        config
            .interval
            .as_ref()
            .and_then(|interval| interval.duration())
            .map(Trigger::Interval)
    }

    /// Wait until the next firing
    ///
    /// Returns `true` if a stop was requested while waiting.
    pub async fn wait(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        match self {
            Trigger::Interval(interval) => sleep_or_stop(*interval, shutdown).await,
        }
    }
}

/// Sleep for `duration` unless a stop is requested first
///
/// Returns `true` if a stop was requested, either before or during the
/// sleep. A dropped sender counts as a stop.
pub async fn sleep_or_stop(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return *shutdown.borrow(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
