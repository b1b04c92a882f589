//! Opt-in anonymous usage telemetry for sandclaw.
//!
//! The recorder subscribes to the domain [`EventBus`](sandclaw_core::EventBus)
//! and keeps a per-process list of usage events keyed by an anonymous machine
//! id and a random session id. Nothing is sent anywhere; the CLI prints a
//! summary at the end of a session when telemetry is enabled.

pub mod model;
pub mod recorder;

pub use model::UsageEvent;
pub use recorder::{TelemetryRecorder, anonymous_id};
