//! The usage recorder.

use crate::model::UsageEvent;
use sandclaw_core::event::{DomainEvent, EventBus};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Collects anonymous usage events for one process.
///
/// Constructed explicitly and handed to whoever needs it; a disabled
/// recorder accepts events and drops them.
pub struct TelemetryRecorder {
    enabled: bool,
    distinct_id: String,
    session_id: String,
    events: RwLock<Vec<UsageEvent>>,
}

/// A stable, anonymous machine id: SHA-256 of host facts, 32 hex chars.
pub fn anonymous_id() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default();
    let facts = format!("{host}-{}-{}", std::env::consts::ARCH, std::env::consts::OS);
    let digest = Sha256::digest(facts.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..32].to_string()
}

impl TelemetryRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            distinct_id: anonymous_id(),
            session_id: uuid::Uuid::new_v4().to_string(),
            events: RwLock::new(Vec::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn distinct_id(&self) -> &str {
        &self.distinct_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record a domain event. No-op when disabled.
    pub fn record(&self, event: &DomainEvent) {
        if !self.enabled {
            return;
        }
        let usage = UsageEvent::from_domain(event, &self.session_id);
        debug!(event = %usage.name, "Recorded usage event");
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(usage);
    }

    /// Everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Event counts by name.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        let mut counts = BTreeMap::new();
        for event in events.iter() {
            *counts.entry(event.name.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Subscribe to `bus` and record every event on a background task.
    ///
    /// Returns `None` when disabled. The task ends when the bus is dropped.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }
        let mut rx = bus.subscribe();
        let recorder = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => recorder.record(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Telemetry subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}
