//! # Padtrack
//!
//! The realtime backbone of a launch stream overlay.
//!
//! Padtrack receives raw binary telemetry over UDP from any number of
//! independent sources, decodes each datagram against a per-port format
//! description, and fans the results out to live subscribers together with a
//! mission countdown clock and a discrete overlay phase.
//!
//! ## Core Concepts
//!
//! - **Wire format**: a compact struct-style description string (`"<2sHHB"`)
//!   defines each source's binary record layout. See [`wire`].
//! - **Sources**: one UDP listener per `(host, port)`, resolved against a
//!   static stream catalog and tagged with a raw-label → UI-target map.
//! - **Countdown clock**: a T-minus/T-plus state machine ticking once per
//!   second while running, driving the overlay phase through the final
//!   countdown into flight.
//! - **Event bus**: `tokio::sync::broadcast` channels for telemetry, clock,
//!   and overlay state. Subscribing returns a receiver; dropping it cancels
//!   the subscription without affecting anyone else.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use padtrack::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PadtrackConfig::load("padtrack")?;
//!     let engine = PadtrackEngine::new(config)?;
//!
//!     // Subscribe before anything is published.
//!     let mut overlay_rx = engine.subscribe_overlay();
//!     tokio::spawn(async move {
//!         while let Ok(event) = overlay_rx.recv().await {
//!             println!("overlay phase -> {}", event.phase);
//!         }
//!     });
//!
//!     // Arm the countdown and run until Ctrl+C.
//!     engine.set_clock("T-000030", RunMode::Running).await?;
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Padtrack Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod events;
pub mod wire;

/// A prelude module for easy importing of the most common Padtrack types.
pub mod prelude {
    pub use crate::clock::RunMode;
    pub use crate::common::{OverlayPhase, SourceId, UiMapping, UiTarget};
    pub use crate::config::PadtrackConfig;
    pub use crate::engine::{PadtrackEngine, SourceError, SourceSummary};
    pub use crate::events::{ClockEvent, DecodedTelemetry, OverlayEvent, SystemEvent};
    pub use crate::wire::{FieldValue, FormatSpec};
}
