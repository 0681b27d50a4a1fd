//! Notification fan-out.
//!
//! The event is rendered once and sent to every channel concurrently. Each
//! send has its own timeout; a slow or failing channel only shows up in the
//! report. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::{Message, Notifier};
use crate::error::AppError;
use crate::models::NotificationEvent;

/// Per-channel outcome of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Channels that accepted the message
    pub successes: Vec<String>,
    /// `NotifyFailed` per channel that did not
    pub failures: Vec<AppError>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Dispatcher {
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send `event` to every notifier. Empty events are not sent.
    pub async fn dispatch(
        &self,
        event: &NotificationEvent,
        notifiers: &[Arc<dyn Notifier>],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        if event.is_empty() {
            log::debug!("Nothing to notify");
            return report;
        }
        if notifiers.is_empty() {
            log::info!("No notification channels configured");
            return report;
        }

        let message = Message::from_event(event);
        let sends = notifiers.iter().map(|notifier| {
            let message = &message;
            async move {
                let result = match tokio::time::timeout(self.timeout, notifier.send(message)).await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(AppError::NotifyFailed { channel, reason })) => {
                        Err(AppError::NotifyFailed { channel, reason })
                    }
                    Ok(Err(e)) => Err(AppError::notify(notifier.name(), e)),
                    Err(_elapsed) => Err(AppError::notify(
                        notifier.name(),
                        format!("timed out after {:?}", self.timeout),
                    )),
                };
                (notifier.name().to_string(), result)
            }
        });

        for (name, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    log::info!("Notification sent via {}", name);
                    report.successes.push(name);
                }
                Err(e) => {
                    log::warn!("{}", e);
                    report.failures.push(e);
                }
            }
        }
        report
    }
}
