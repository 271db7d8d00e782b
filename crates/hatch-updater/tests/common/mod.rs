//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hatch_updater::{
    HostEvent, HttpClient, HttpResponse, InstallOutcome, PlatformInstaller, Target,
    UpdateController, UpdateError, UpdaterConfig,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::Notify;

pub const CURRENT_VERSION: &str = "1.0.0";

/// Pauses the first `get` until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Scripted HTTP client.
#[derive(Default)]
pub struct FakeHttp {
    responses: HashMap<String, Result<HttpResponse, String>>,
    artifacts: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
    pub gate: Option<Arc<Gate>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(
            url.to_string(),
            Ok(HttpResponse {
                status,
                body: body.into(),
            }),
        );
        self
    }

    pub fn fail(mut self, url: &str) -> Self {
        self.responses
            .insert(url.to_string(), Err(format!("connection refused: {}", url)));
        self
    }

    pub fn serve_artifact(mut self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.artifacts.insert(url.to_string(), bytes.into());
        self
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, UpdateError> {
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        match self.responses.get(url) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(message)) => Err(UpdateError::Network(message.clone())),
            None => Err(UpdateError::Network(format!("unknown host for {}", url))),
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        _timeout: Duration,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), UpdateError> {
        let bytes = self
            .artifacts
            .get(url)
            .ok_or_else(|| UpdateError::Network(format!("404 for {}", url)))?;
        on_progress(0.0);
        std::fs::write(dest, bytes)?;
        on_progress(0.5);
        on_progress(1.5);
        Ok(())
    }
}

/// Installer that records what it was asked to install.
pub struct FakeInstaller {
    pub installed: Mutex<Vec<PathBuf>>,
    pub outcome: InstallOutcome,
}

impl FakeInstaller {
    pub fn new(outcome: InstallOutcome) -> Self {
        Self {
            installed: Mutex::new(Vec::new()),
            outcome,
        }
    }
}

#[async_trait]
impl PlatformInstaller for FakeInstaller {
    async fn install(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        assert!(artifact.exists(), "artifact must exist at install time");
        self.installed.lock().unwrap().push(artifact.to_path_buf());
        Ok(self.outcome)
    }

    fn relaunch(&self) -> Result<(), UpdateError> {
        Err(UpdateError::Restart("spawn refused".into()))
    }
}

pub fn simple_manifest(version: &str, url: &str, signature: Option<&str>, size: u64) -> Vec<u8> {
    let mut json = serde_json::json!({
        "version": version,
        "downloadUrl": url,
        "size": size,
        "releaseNotes": "Fixes",
    });
    if let Some(sig) = signature {
        json["signature"] = sig.into();
    }
    json.to_string().into_bytes()
}

pub fn build(
    config: UpdaterConfig,
    http: Arc<FakeHttp>,
    installer: Arc<dyn PlatformInstaller>,
) -> (UpdateController, UnboundedReceiver<HostEvent>) {
    let (tx, rx) = unbounded_channel();
    let controller = UpdateController::new(config, CURRENT_VERSION, installer, http, Arc::new(tx))
        .with_target(Target::LinuxX86_64);
    (controller, rx)
}

pub fn drain(rx: &mut UnboundedReceiver<HostEvent>) -> Vec<HostEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn names(events: &[HostEvent]) -> Vec<&'static str> {
    events.iter().map(HostEvent::name).collect()
}
