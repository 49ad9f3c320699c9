//! Defines all event types broadcast by the Padtrack engine.
//!
//! This module is the public API of the event bus. Each channel carries
//! exactly one of these types; subscribers receive every value published
//! while their receiver is alive.

use crate::clock::RunMode;
use crate::common::{OverlayPhase, UiMapping};
use crate::wire::FieldValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// One decoded telemetry datagram, as published on the telemetry channel.
///
/// Ephemeral: produced for a single publish and not retained anywhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedTelemetry {
    /// Decoded values keyed by the source's raw labels.
    pub readings: BTreeMap<String, FieldValue>,
    /// The raw-label → UI-target map of the source that produced this frame.
    pub ui_map: Vec<UiMapping>,
    /// When the datagram was received.
    pub received: DateTime<Utc>,
}

/// Published on the clock channel: once per tick while running, and once
/// after every clock mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockEvent {
    /// The formatted `T±HHMMSS` time.
    pub time: String,
    pub mode: RunMode,
}

/// Published on the overlay-state channel whenever the phase changes hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlayEvent {
    pub phase: OverlayPhase,
}

/// Engine lifecycle and registry notifications, for operator surfaces and
/// logging. Not one of the three overlay-facing channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    EngineStarted,
    EngineShutdown,
    SourceAdded { host: IpAddr, port: u16 },
    SourceRemoved { host: IpAddr, port: u16 },
}
