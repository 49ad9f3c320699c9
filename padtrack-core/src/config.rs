//! Configuration structures for the Padtrack engine.
//!
//! Deserialized from a TOML file (with `PADTRACK__`-prefixed environment
//! overrides) at startup. The stream catalog (which format string and label
//! list belong to which UDP port) lives here; the engine only ever reads it.

use serde::Deserialize;

/// The top-level configuration for [`PadtrackEngine`](crate::engine::PadtrackEngine).
///
/// Every field carries a serde default, so a missing or empty config file
/// yields a working engine with an empty catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PadtrackConfig {
    #[serde(default)]
    pub clock: ClockConfig,

    /// The static per-port telemetry stream catalog.
    #[serde(default)]
    pub catalog: SourceCatalog,
}

/// Countdown clock startup settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Initial clock reading in `T±HHMMSS` form.
    #[serde(default = "default_initial_time")]
    pub initial_time: String,

    /// Start counting as soon as the engine runs, instead of holding.
    #[serde(default)]
    pub autostart: bool,
}

/// All known telemetry streams, grouped by the device that emits them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceCatalog {
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
}

/// One telemetry-emitting device (flight computer, engine controller, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    pub name: String,
    #[serde(default)]
    pub streams: Vec<StreamSettings>,
}

/// Wire description of a single telemetry stream, keyed by its UDP port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamSettings {
    pub id: String,
    pub port: u16,
    /// Binary layout description, see [`crate::wire`].
    pub format: String,
    /// Raw field labels, one per decoded value, in decode order.
    pub labels: Vec<String>,
}

impl SourceCatalog {
    /// Finds the stream settings registered for a UDP port, if any.
    pub fn by_port(&self, port: u16) -> Option<&StreamSettings> {
        self.devices
            .iter()
            .flat_map(|device| &device.streams)
            .find(|stream| stream.port == port)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            initial_time: default_initial_time(),
            autostart: false,
        }
    }
}

fn default_initial_time() -> String {
    "T-003000".to_string()
}

impl PadtrackConfig {
    /// Loads configuration from `<name>.toml` (optional) and the environment.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("PADTRACK").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
