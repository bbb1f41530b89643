//! Monthly broadcast timer.
//!
//! One timer, re-armed after every firing: sleep until the first day of the
//! next month at a fixed local hour, then reconcile every user's control
//! message. Broadcasts are best-effort; a missed firing (process down) is
//! not replayed.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::service::BrewService;

#[derive(Clone)]
pub struct MonthlyBroadcaster {
    inner: Arc<BroadcasterInner>,
}

struct BroadcasterInner {
    service: Arc<BrewService>,
    hour: u32,
    state: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl MonthlyBroadcaster {
    pub fn new(service: Arc<BrewService>, hour: u32) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                service,
                hour,
                state: Mutex::new(None),
            }),
        }
    }

    /// Start the timer loop. A second call while running is a no-op.
    pub async fn start(&self) {
        let mut st = self.inner.state.lock().await;
        if st.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            this.run(token).await;
        });

        *st = Some(Running { cancel, handle });
        tracing::info!(hour = self.inner.hour, "monthly broadcast scheduled");
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(running) = st.take() {
            running.cancel.cancel();
            let _ = running.handle.await;
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            let now = Local::now();
            let Some(next) = next_fire_after(now, self.inner.hour) else {
                tracing::error!("could not compute next broadcast time; stopping");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!(next = %next.to_rfc3339(), "next monthly broadcast");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {
                    match self.inner.service.broadcast_all(Local::now()).await {
                        Ok(report) if !report.failed.is_empty() => {
                            tracing::warn!(
                                delivered = report.delivered.len(),
                                failed = report.failed.len(),
                                "monthly broadcast finished with failures"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "monthly broadcast failed"),
                    }
                }
            }
        }
    }
}

/// First day of the month after `now`'s month, at `hour:00` local time.
pub fn next_fire_after(now: DateTime<Local>, hour: u32) -> Option<DateTime<Local>> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let naive = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(hour, 0, 0)?;
    // DST gaps: take the earliest valid instant, or skip an hour forward.
    Local.from_local_datetime(&naive).earliest().or_else(|| {
        let shifted = naive + chrono::Duration::hours(1);
        Local.from_local_datetime(&shifted).earliest()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn next_fire_is_first_of_next_month() {
        let now = Local.with_ymd_and_hms(2024, 5, 17, 15, 30, 0).unwrap();
        let next = next_fire_after(now, 9).unwrap();
        assert_eq!((next.year(), next.month(), next.day()), (2024, 6, 1));
        assert_eq!((next.hour(), next.minute()), (9, 0));
    }

    #[test]
    fn next_fire_wraps_year() {
        let now = Local.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        let next = next_fire_after(now, 9).unwrap();
        assert_eq!((next.year(), next.month(), next.day()), (2025, 1, 1));
    }

    #[test]
    fn next_fire_on_first_day_still_targets_next_month() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let next = next_fire_after(now, 9).unwrap();
        assert_eq!(next.month(), 6);
        assert!(next > now);
    }

    #[test]
    fn invalid_hour_yields_none() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert!(next_fire_after(now, 24).is_none());
    }
}
