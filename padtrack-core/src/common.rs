//! Common, primitive types shared across the crate.
//!
//! Defines the registry key for telemetry sources, the closed set of UI
//! targets raw telemetry labels are mapped onto, and the overlay phase
//! vocabulary. Keeping these small types in one module gives the rest of the
//! crate a single vocabulary to import.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::str::FromStr;

new_key_type! {
    /// Uniquely and safely identifies a live telemetry source in the registry.
    ///
    /// Returned keys are never reused, so a stale `SourceId` held across a
    /// remove/re-add cycle cannot alias the new source.
    pub struct SourceId;
}

/// The closed set of overlay UI elements raw telemetry can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiTarget {
    Altitude,
    Velocity,
    Pitch,
    Yaw,
    Roll,
    Acceleration,
    Latitude,
    Longitude,
}

impl UiTarget {
    /// All targets, in display order.
    pub const ALL: [UiTarget; 8] = [
        UiTarget::Altitude,
        UiTarget::Velocity,
        UiTarget::Pitch,
        UiTarget::Yaw,
        UiTarget::Roll,
        UiTarget::Acceleration,
        UiTarget::Latitude,
        UiTarget::Longitude,
    ];

    fn as_str(self) -> &'static str {
        match self {
            UiTarget::Altitude => "altitude",
            UiTarget::Velocity => "velocity",
            UiTarget::Pitch => "pitch",
            UiTarget::Yaw => "yaw",
            UiTarget::Roll => "roll",
            UiTarget::Acceleration => "acceleration",
            UiTarget::Latitude => "latitude",
            UiTarget::Longitude => "longitude",
        }
    }
}

impl fmt::Display for UiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UiTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown ui target '{s}'"))
    }
}

/// Connects one raw telemetry label to the overlay element it feeds.
///
/// For instance, a source's `kalman_velocity` reading is mapped to
/// [`UiTarget::Velocity`]; without the mapping the overlay has no way to place
/// the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiMapping {
    /// A label from the source's configured label list.
    pub from: String,
    /// The overlay element the value is rendered into.
    pub ui_target: UiTarget,
}

/// The discrete phase the stream overlay is currently presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPhase {
    #[default]
    EarlyCountdown,
    FinalCountdown,
    InFlight,
    PostFlight,
}

impl OverlayPhase {
    fn as_str(self) -> &'static str {
        match self {
            OverlayPhase::EarlyCountdown => "early-countdown",
            OverlayPhase::FinalCountdown => "final-countdown",
            OverlayPhase::InFlight => "in-flight",
            OverlayPhase::PostFlight => "post-flight",
        }
    }
}

impl fmt::Display for OverlayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "early-countdown" => Ok(OverlayPhase::EarlyCountdown),
            "final-countdown" => Ok(OverlayPhase::FinalCountdown),
            "in-flight" => Ok(OverlayPhase::InFlight),
            "post-flight" => Ok(OverlayPhase::PostFlight),
            _ => Err(format!("unknown overlay phase '{s}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_target_round_trips_through_str() {
        for target in UiTarget::ALL {
            assert_eq!(target.to_string().parse::<UiTarget>(), Ok(target));
        }
        assert!("thrust".parse::<UiTarget>().is_err());
    }

    #[test]
    fn overlay_phase_wire_names_are_kebab_case() {
        assert_eq!(OverlayPhase::FinalCountdown.to_string(), "final-countdown");
        assert_eq!(
            "post-flight".parse::<OverlayPhase>(),
            Ok(OverlayPhase::PostFlight)
        );
        assert_eq!(OverlayPhase::default(), OverlayPhase::EarlyCountdown);
    }
}
