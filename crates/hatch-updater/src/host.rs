//! Events surfaced to the host application.
//!
//! The controller reports progress and failures through a [`HostNotifier`];
//! each [`HostEvent`] carries a stable wire name and a JSON payload so a host
//! can forward it to its frontend unchanged.

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::manifest::UpdateInfo;

/// Update lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A newer version was found
    UpdateAvailable(UpdateInfo),
    /// Download progress as a fraction in `[0.0, 1.0]`
    DownloadProgress(f64),
    /// The artifact is downloaded and verified
    UpdateReady { version: String },
    /// The process is about to relaunch
    BeforeRestart,
    /// An operation failed
    UpdateError(String),
    /// Something is off but the update continues (e.g. unsigned artifact)
    UpdateWarning(String),
}

impl HostEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::UpdateAvailable(_) => "update-available",
            HostEvent::DownloadProgress(_) => "download-progress",
            HostEvent::UpdateReady { .. } => "update-ready",
            HostEvent::BeforeRestart => "before-restart",
            HostEvent::UpdateError(_) => "update-error",
            HostEvent::UpdateWarning(_) => "update-warning",
        }
    }

    /// JSON payload of the event.
    pub fn payload(&self) -> Value {
        match self {
            HostEvent::UpdateAvailable(info) => serde_json::to_value(info).unwrap_or(Value::Null),
            HostEvent::DownloadProgress(fraction) => json!({ "progress": fraction }),
            HostEvent::UpdateReady { version } => json!({ "version": version }),
            HostEvent::BeforeRestart => Value::Null,
            HostEvent::UpdateError(message) | HostEvent::UpdateWarning(message) => {
                json!({ "message": message })
            }
        }
    }
}

/// Receives update events on behalf of the host.
pub trait HostNotifier: Send + Sync {
    fn emit(&self, event: HostEvent);
}

/// Notifier that only logs events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl HostNotifier for TracingNotifier {
    fn emit(&self, event: HostEvent) {
        match &event {
            HostEvent::UpdateError(message) | HostEvent::UpdateWarning(message) => {
                warn!(event = event.name(), "{}", message);
            }
            HostEvent::DownloadProgress(_) => {}
            _ => info!(event = event.name(), payload = %event.payload(), "Update event"),
        }
    }
}

/// Forward events into a channel, dropping them once the receiver is gone.
impl HostNotifier for UnboundedSender<HostEvent> {
    fn emit(&self, event: HostEvent) {
        let _ = self.send(event);
    }
}
