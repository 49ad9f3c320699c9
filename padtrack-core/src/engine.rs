//! The core engine that owns the telemetry pipeline end to end.
//!
//! `PadtrackEngine` is a cloneable handle over shared state: the live source
//! registry, the countdown clock, the overlay phase, and one broadcast
//! channel per published stream. All mutation flows through its methods, and
//! every mutation publishes to the matching channel after the state holder
//! has been updated.

use crate::clock::{CountdownClock, InvalidTimeFormat, RunMode};
use crate::common::{OverlayPhase, UiMapping};
use crate::components::source::{self, SourceEntry, SourceRegistry};
use crate::config::PadtrackConfig;
use crate::events::{ClockEvent, DecodedTelemetry, OverlayEvent, SystemEvent};
use crate::wire::{FormatSpec, WireError};
use slotmap::SlotMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::AbortHandle;
use tracing::{info, warn};

pub use crate::components::source::SourceSummary;

const TELEMETRY_CHANNEL_CAPACITY: usize = 256;
const STATE_CHANNEL_CAPACITY: usize = 64;

/// Errors surfaced to callers of the source-registry operations.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The host is not a valid IPv4 or IPv6 literal.
    #[error("invalid source address '{0}'")]
    InvalidAddress(String),

    /// No stream settings are registered for this UDP port.
    #[error("no telemetry stream registered for port {0}")]
    UnknownPort(u16),

    /// The catalog entry for this port carries a format string that does not
    /// parse. Surfaced as-is rather than disguised as a missing port.
    #[error("catalog format string for port {port} is invalid")]
    InvalidCatalog {
        port: u16,
        #[source]
        source: WireError,
    },

    /// Binding the UDP socket failed; carries the transport error.
    #[error("failed to bind udp socket on {addr}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// No live source matches the given `(host, port)`.
    #[error("no telemetry source bound to {host}:{port}")]
    SourceNotFound { host: String, port: u16 },
}

/// The main Padtrack engine.
///
/// Cheap to clone; clones share all state and may be used from any task.
#[derive(Clone)]
pub struct PadtrackEngine {
    config: Arc<PadtrackConfig>,
    telemetry_tx: broadcast::Sender<Arc<DecodedTelemetry>>,
    clock_tx: broadcast::Sender<ClockEvent>,
    overlay_tx: broadcast::Sender<OverlayEvent>,
    system_tx: broadcast::Sender<SystemEvent>,
    sources: SourceRegistry,
    clock: Arc<Mutex<CountdownClock>>,
    phase: Arc<Mutex<OverlayPhase>>,
    ticker: Arc<Mutex<Option<AbortHandle>>>,
}

impl PadtrackEngine {
    /// Creates a new engine from configuration.
    ///
    /// Fails only when the configured initial clock time is malformed.
    pub fn new(config: PadtrackConfig) -> Result<Self, InvalidTimeFormat> {
        let (telemetry_tx, _) = broadcast::channel(TELEMETRY_CHANNEL_CAPACITY);
        let (clock_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let (overlay_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let (system_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);

        let clock = CountdownClock::new(&config.clock.initial_time)?;

        Ok(Self {
            config: Arc::new(config),
            telemetry_tx,
            clock_tx,
            overlay_tx,
            system_tx,
            sources: Arc::new(RwLock::new(SlotMap::with_key())),
            clock: Arc::new(Mutex::new(clock)),
            phase: Arc::new(Mutex::new(OverlayPhase::default())),
            ticker: Arc::new(Mutex::new(None)),
        })
    }

    /// Runs the engine until a shutdown signal is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("{} starting up...", crate::ENGINE_NAME);
        self.system_tx.send(SystemEvent::EngineStarted).ok();

        if self.config.clock.autostart {
            self.start_clock().await;
        }

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received.");
        self.shutdown().await;
        Ok(())
    }

    /// Holds the clock, closes every source, and announces shutdown.
    pub async fn shutdown(&self) {
        self.hold_clock().await;
        let entries: Vec<SourceEntry> = {
            let mut sources = self.sources.write().await;
            sources.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.pump.abort();
        }
        self.system_tx.send(SystemEvent::EngineShutdown).ok();
        info!("{} has shut down.", crate::ENGINE_NAME);
    }
}

// Source registry operations.
impl PadtrackEngine {
    /// Adds a UDP telemetry source bound to `(host, port)`.
    ///
    /// Idempotent per `(host, port)`: an existing source is returned
    /// unmodified. The socket is bound before this returns, so a successful
    /// call means the source is live.
    pub async fn add_source(
        &self,
        host: &str,
        port: u16,
        ui_map: Vec<UiMapping>,
    ) -> Result<SourceSummary, SourceError> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| SourceError::InvalidAddress(host.to_string()))?;

        if let Some(existing) = self.find_source(ip, port).await {
            return Ok(existing);
        }

        let settings = self
            .config
            .catalog
            .by_port(port)
            .cloned()
            .ok_or(SourceError::UnknownPort(port))?;
        let spec = FormatSpec::parse(&settings.format)
            .map_err(|e| SourceError::InvalidCatalog { port, source: e })?;
        if settings.labels.len() != spec.value_count() {
            warn!(
                port,
                labels = settings.labels.len(),
                values = spec.value_count(),
                "catalog label list does not match the format's value count"
            );
        }

        // The socket family follows the literal: v4 hosts get v4 sockets,
        // v6 hosts v6 sockets.
        let addr = SocketAddr::new(ip, port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SourceError::BindFailed { addr, source: e })?;

        let summary = {
            let mut sources = self.sources.write().await;
            let id = sources.insert_with_key(|id| {
                let pump = tokio::spawn(source::run_pump(
                    socket,
                    spec,
                    settings.labels.clone(),
                    ui_map.clone(),
                    self.telemetry_tx.clone(),
                    self.system_tx.clone(),
                    Arc::clone(&self.sources),
                    id,
                ));
                SourceEntry {
                    host: ip,
                    port,
                    stream_id: settings.id.clone(),
                    ui_map,
                    pump,
                }
            });
            sources[id].summary()
        };

        info!(host = %ip, port, stream = %settings.id, "telemetry source bound");
        self.system_tx
            .send(SystemEvent::SourceAdded { host: ip, port })
            .ok();
        Ok(summary)
    }

    /// Removes the source bound to `(host, port)` and closes its socket.
    pub async fn remove_source(&self, host: &str, port: u16) -> Result<(), SourceError> {
        let not_found = || SourceError::SourceNotFound {
            host: host.to_string(),
            port,
        };
        // An unparsable host cannot match any live source.
        let ip: IpAddr = host.parse().map_err(|_| not_found())?;

        let entry = {
            let mut sources = self.sources.write().await;
            let id = sources
                .iter()
                .find(|(_, e)| e.host == ip && e.port == port)
                .map(|(id, _)| id)
                .ok_or_else(not_found)?;
            sources.remove(id).ok_or_else(not_found)?
        };

        entry.pump.abort();
        // Wait the pump out so the socket is provably closed before we
        // return; a follow-up add on the same port must be able to bind.
        if let Err(e) = entry.pump.await {
            if !e.is_cancelled() {
                warn!(host = %ip, port, error = %e, "source pump ended abnormally");
            }
        }

        info!(host = %ip, port, "telemetry source removed");
        self.system_tx
            .send(SystemEvent::SourceRemoved { host: ip, port })
            .ok();
        Ok(())
    }

    /// The stream catalog the engine was configured with.
    pub fn catalog(&self) -> &crate::config::SourceCatalog {
        &self.config.catalog
    }

    /// Read-only snapshot of all live sources.
    pub async fn list_sources(&self) -> Vec<SourceSummary> {
        self.sources
            .read()
            .await
            .values()
            .map(SourceEntry::summary)
            .collect()
    }

    async fn find_source(&self, host: IpAddr, port: u16) -> Option<SourceSummary> {
        self.sources
            .read()
            .await
            .values()
            .find(|e| e.host == host && e.port == port)
            .map(SourceEntry::summary)
    }
}

// Clock operations.
impl PadtrackEngine {
    /// Starts the per-second tick scheduler. No-op if already running.
    pub async fn start_clock(&self) {
        if !self.begin_running().await {
            return;
        }
        self.publish_clock_state().await;
    }

    /// Holds the clock and cancels the ticker. No-op if already held.
    pub async fn hold_clock(&self) {
        if !self.begin_holding().await {
            return;
        }
        self.publish_clock_state().await;
    }

    /// Overwrites the clock time, leaving the run mode untouched.
    pub async fn set_clock_time(&self, time: &str) -> Result<(), InvalidTimeFormat> {
        self.clock.lock().await.set_time(time)?;
        self.publish_clock_state().await;
        Ok(())
    }

    /// The combined mutation the control surface uses: set the time, switch
    /// the run mode, publish one clock event.
    pub async fn set_clock(&self, time: &str, mode: RunMode) -> Result<(), InvalidTimeFormat> {
        self.clock.lock().await.set_time(time)?;
        match mode {
            RunMode::Running => {
                self.begin_running().await;
            }
            RunMode::Held => {
                self.begin_holding().await;
            }
        }
        self.publish_clock_state().await;
        Ok(())
    }

    /// Formatted `T±HHMMSS` reading.
    pub async fn clock_time(&self) -> String {
        self.clock.lock().await.time_string()
    }

    /// Raw signed seconds.
    pub async fn clock_raw(&self) -> i64 {
        self.clock.lock().await.raw()
    }

    pub async fn run_mode(&self) -> RunMode {
        self.clock.lock().await.mode()
    }

    /// Flips the clock to running and spawns the ticker.
    /// Returns `false` when the clock was already running.
    async fn begin_running(&self) -> bool {
        {
            let mut clock = self.clock.lock().await;
            if clock.mode() == RunMode::Running {
                return false;
            }
            clock.set_mode(RunMode::Running);
        }
        let ticker = tokio::spawn(self.clone().tick_loop());
        if let Some(stale) = self.ticker.lock().await.replace(ticker.abort_handle()) {
            stale.abort();
        }
        true
    }

    /// Flips the clock to held and aborts the ticker.
    /// Returns `false` when the clock was already held.
    async fn begin_holding(&self) -> bool {
        {
            let mut clock = self.clock.lock().await;
            if clock.mode() == RunMode::Held {
                return false;
            }
            clock.set_mode(RunMode::Held);
        }
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.abort();
        }
        true
    }

    async fn publish_clock_state(&self) {
        let event = {
            let clock = self.clock.lock().await;
            ClockEvent {
                time: clock.time_string(),
                mode: clock.mode(),
            }
        };
        self.clock_tx.send(event).ok();
    }

    /// The 1 Hz ticker. Each elapsed second advances the clock, publishes a
    /// clock event, and evaluates the countdown → overlay-phase coupling.
    async fn tick_loop(self) {
        let period = Duration::from_secs(1);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            let (raw, event) = {
                let mut clock = self.clock.lock().await;
                if clock.mode() != RunMode::Running {
                    break;
                }
                let raw = clock.tick();
                (
                    raw,
                    ClockEvent {
                        time: clock.time_string(),
                        mode: clock.mode(),
                    },
                )
            };
            self.clock_tx.send(event).ok();

            if let Some(target) = phase_for_countdown(raw) {
                self.drive_phase(target).await;
            }
        }
    }

    /// Tick-driven phase push: publishes only on an actual change, so a
    /// manually set phase stands until the next qualifying tick.
    async fn drive_phase(&self, target: OverlayPhase) {
        let mut phase = self.phase.lock().await;
        if *phase != target {
            *phase = target;
            self.overlay_tx.send(OverlayEvent { phase: target }).ok();
        }
    }
}

// Overlay state operations.
impl PadtrackEngine {
    /// Unconditionally overwrites the overlay phase and publishes it.
    pub async fn set_phase(&self, phase: OverlayPhase) {
        *self.phase.lock().await = phase;
        self.overlay_tx.send(OverlayEvent { phase }).ok();
    }

    pub async fn phase(&self) -> OverlayPhase {
        *self.phase.lock().await
    }
}

// Subscriptions.
impl PadtrackEngine {
    /// Subscribes to decoded telemetry frames.
    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<Arc<DecodedTelemetry>> {
        self.telemetry_tx.subscribe()
    }

    /// Subscribes to clock events.
    ///
    /// Also returns a synthetic snapshot of the current clock state, so a
    /// fresh consumer is never left without a reading while the clock holds.
    pub async fn subscribe_clock(&self) -> (ClockEvent, broadcast::Receiver<ClockEvent>) {
        let rx = self.clock_tx.subscribe();
        let snapshot = {
            let clock = self.clock.lock().await;
            ClockEvent {
                time: clock.time_string(),
                mode: clock.mode(),
            }
        };
        (snapshot, rx)
    }

    /// Subscribes to overlay phase changes.
    pub fn subscribe_overlay(&self) -> broadcast::Receiver<OverlayEvent> {
        self.overlay_tx.subscribe()
    }

    /// Subscribes to engine lifecycle and registry notifications.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_tx.subscribe()
    }
}

/// The countdown → overlay coupling windows.
fn phase_for_countdown(raw: i64) -> Option<OverlayPhase> {
    if (-7..=-3).contains(&raw) {
        Some(OverlayPhase::FinalCountdown)
    } else if raw > -3 && raw <= 0 {
        Some(OverlayPhase::InFlight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::UiTarget;
    use crate::config::{DeviceSettings, SourceCatalog, StreamSettings};
    use crate::wire::FieldValue;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn catalog_config(port: u16) -> PadtrackConfig {
        PadtrackConfig {
            catalog: SourceCatalog {
                devices: vec![DeviceSettings {
                    name: "fc".to_string(),
                    streams: vec![StreamSettings {
                        id: "fc-nav".to_string(),
                        port,
                        format: "<2sHHB".to_string(),
                        labels: vec!["id", "alt", "vel", "flag"]
                            .into_iter()
                            .map(String::from)
                            .collect(),
                    }],
                }],
            },
            ..Default::default()
        }
    }

    fn ui_map() -> Vec<UiMapping> {
        vec![
            UiMapping {
                from: "alt".to_string(),
                ui_target: UiTarget::Altitude,
            },
            UiMapping {
                from: "vel".to_string(),
                ui_target: UiTarget::Velocity,
            },
        ]
    }

    #[test]
    fn coupling_windows_match_the_countdown() {
        assert_eq!(phase_for_countdown(-8), None);
        assert_eq!(phase_for_countdown(-7), Some(OverlayPhase::FinalCountdown));
        assert_eq!(phase_for_countdown(-3), Some(OverlayPhase::FinalCountdown));
        assert_eq!(phase_for_countdown(-2), Some(OverlayPhase::InFlight));
        assert_eq!(phase_for_countdown(0), Some(OverlayPhase::InFlight));
        assert_eq!(phase_for_countdown(1), None);
    }

    #[tokio::test]
    async fn set_phase_publishes_to_every_active_subscriber() -> TestResult {
        let engine = PadtrackEngine::new(PadtrackConfig::default())?;
        let mut first = engine.subscribe_overlay();
        let mut second = engine.subscribe_overlay();

        engine.set_phase(OverlayPhase::PostFlight).await;
        assert_eq!(first.recv().await?.phase, OverlayPhase::PostFlight);

        // Cancelling one subscriber must not affect the other.
        drop(first);
        engine.set_phase(OverlayPhase::InFlight).await;
        assert_eq!(second.recv().await?.phase, OverlayPhase::PostFlight);
        assert_eq!(second.recv().await?.phase, OverlayPhase::InFlight);
        assert_eq!(engine.phase().await, OverlayPhase::InFlight);
        Ok(())
    }

    #[tokio::test]
    async fn late_subscribers_never_see_earlier_publishes() -> TestResult {
        let engine = PadtrackEngine::new(PadtrackConfig::default())?;
        engine.set_phase(OverlayPhase::PostFlight).await;

        let mut rx = engine.subscribe_overlay();
        engine.set_phase(OverlayPhase::EarlyCountdown).await;
        assert_eq!(rx.recv().await?.phase, OverlayPhase::EarlyCountdown);
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn clock_subscription_starts_with_a_snapshot() -> TestResult {
        let engine = PadtrackEngine::new(PadtrackConfig::default())?;
        let (snapshot, _rx) = engine.subscribe_clock().await;
        assert_eq!(snapshot.time, "T-003000");
        assert_eq!(snapshot.mode, RunMode::Held);
        Ok(())
    }

    #[tokio::test]
    async fn clock_mutations_publish_and_validate() -> TestResult {
        let engine = PadtrackEngine::new(PadtrackConfig::default())?;
        let (_, mut rx) = engine.subscribe_clock().await;

        engine.set_clock("T-000030", RunMode::Held).await?;
        let event = rx.recv().await?;
        assert_eq!(event.time, "T-000030");
        assert_eq!(event.mode, RunMode::Held);

        assert!(engine.set_clock("countdown", RunMode::Held).await.is_err());
        assert_eq!(engine.clock_time().await, "T-000030");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_through_zero_and_drives_the_overlay() -> TestResult {
        let engine = PadtrackEngine::new(PadtrackConfig::default())?;
        engine.set_clock_time("T-000030").await?;

        let (_, mut clock_rx) = engine.subscribe_clock().await;
        let mut overlay_rx = engine.subscribe_overlay();

        engine.start_clock().await;
        let armed = clock_rx.recv().await?;
        assert_eq!(armed.time, "T-000030");
        assert_eq!(armed.mode, RunMode::Running);

        let mut times = Vec::new();
        for _ in 0..31 {
            times.push(clock_rx.recv().await?.time);
        }
        assert_eq!(times.first().map(String::as_str), Some("T-000029"));
        assert_eq!(times.last().map(String::as_str), Some("T+000001"));
        assert_eq!(engine.clock_raw().await, 1);

        // Exactly two pushes: into the final countdown at T-7 and into
        // flight at T-2. Nothing outside the windows.
        assert_eq!(overlay_rx.recv().await?.phase, OverlayPhase::FinalCountdown);
        assert_eq!(overlay_rx.recv().await?.phase, OverlayPhase::InFlight);
        assert!(overlay_rx.try_recv().is_err());

        engine.hold_clock().await;
        assert_eq!(clock_rx.recv().await?.mode, RunMode::Held);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn manual_phase_yields_to_the_next_qualifying_tick() -> TestResult {
        let engine = PadtrackEngine::new(PadtrackConfig::default())?;
        engine.set_clock_time("T-000006").await?;
        engine.start_clock().await;

        let (_, mut clock_rx) = engine.subscribe_clock().await;
        clock_rx.recv().await?; // raw is now -5, phase driven to final-countdown
        assert_eq!(engine.phase().await, OverlayPhase::FinalCountdown);

        engine.set_phase(OverlayPhase::PostFlight).await;
        clock_rx.recv().await?; // raw -4: still in the window, re-driven
        assert_eq!(engine.phase().await, OverlayPhase::FinalCountdown);

        engine.hold_clock().await;
        Ok(())
    }

    #[tokio::test]
    async fn start_and_hold_are_idempotent() -> TestResult {
        let engine = PadtrackEngine::new(PadtrackConfig::default())?;
        let (_, mut rx) = engine.subscribe_clock().await;

        engine.hold_clock().await; // already held: no event
        engine.start_clock().await;
        engine.start_clock().await; // already running: no event
        engine.hold_clock().await;

        assert_eq!(rx.recv().await?.mode, RunMode::Running);
        assert_eq!(rx.recv().await?.mode, RunMode::Held);
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn add_source_validates_host_and_port() -> TestResult {
        let engine = PadtrackEngine::new(catalog_config(47311))?;

        assert!(matches!(
            engine.add_source("pad.local", 47311, vec![]).await,
            Err(SourceError::InvalidAddress(_))
        ));
        assert!(matches!(
            engine.add_source("127.0.0.1", 1, vec![]).await,
            Err(SourceError::UnknownPort(1))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn add_source_is_idempotent_per_host_port() -> TestResult {
        let engine = PadtrackEngine::new(catalog_config(47311))?;

        let first = engine.add_source("127.0.0.1", 47311, ui_map()).await?;
        // Second add with a different map returns the existing source,
        // unmodified.
        let second = engine.add_source("127.0.0.1", 47311, vec![]).await?;
        assert_eq!(second, first);
        assert_eq!(engine.list_sources().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn ipv6_hosts_bind_and_collapse_equivalent_literals() -> TestResult {
        let engine = PadtrackEngine::new(catalog_config(47315))?;

        let first = engine.add_source("::1", 47315, ui_map()).await?;
        assert_eq!(first.host, "::1".parse::<std::net::IpAddr>()?);
        assert_eq!(engine.list_sources().await.len(), 1);

        // The long-form spelling parses to the same address, so this is the
        // idempotent path, not a second bind.
        let second = engine.add_source("0:0:0:0:0:0:0:1", 47315, vec![]).await?;
        assert_eq!(second, first);
        assert_eq!(engine.list_sources().await.len(), 1);

        engine.remove_source("0:0:0:0:0:0:0:1", 47315).await?;
        assert!(engine.list_sources().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn remove_source_frees_the_port_for_rebinding() -> TestResult {
        let engine = PadtrackEngine::new(catalog_config(47312))?;

        assert!(matches!(
            engine.remove_source("127.0.0.1", 47312).await,
            Err(SourceError::SourceNotFound { .. })
        ));

        engine.add_source("127.0.0.1", 47312, vec![]).await?;
        engine.remove_source("127.0.0.1", 47312).await?;
        assert!(engine.list_sources().await.is_empty());

        // The socket is closed by the time remove returns.
        engine.add_source("127.0.0.1", 47312, vec![]).await?;
        assert_eq!(engine.list_sources().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn datagrams_decode_and_fan_out_with_the_ui_map() -> TestResult {
        let engine = PadtrackEngine::new(catalog_config(47313))?;
        let mut rx = engine.subscribe_telemetry();
        engine.add_source("127.0.0.1", 47313, ui_map()).await?;

        let sender = UdpSocket::bind("127.0.0.1:0").await?;
        sender
            .send_to(
                &[0x41, 0x42, 0xE8, 0x03, 0x64, 0x00, 0x01],
                "127.0.0.1:47313",
            )
            .await?;

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await??;
        assert_eq!(
            frame.readings.get("id"),
            Some(&FieldValue::Text("AB".to_string()))
        );
        assert_eq!(frame.readings.get("alt"), Some(&FieldValue::UInt(1000)));
        assert_eq!(frame.readings.get("vel"), Some(&FieldValue::UInt(100)));
        assert_eq!(frame.readings.get("flag"), Some(&FieldValue::UInt(1)));
        assert_eq!(frame.ui_map, ui_map());
        Ok(())
    }

    #[tokio::test]
    async fn a_bad_datagram_never_kills_the_listener() -> TestResult {
        let engine = PadtrackEngine::new(catalog_config(47314))?;
        let mut rx = engine.subscribe_telemetry();
        engine.add_source("127.0.0.1", 47314, vec![]).await?;

        let sender = UdpSocket::bind("127.0.0.1:0").await?;
        // Underrun: dropped with a log line.
        sender.send_to(&[0x41, 0x42], "127.0.0.1:47314").await?;
        // A good frame right behind it still arrives.
        sender
            .send_to(
                &[0x41, 0x42, 0xE8, 0x03, 0x64, 0x00, 0x01],
                "127.0.0.1:47314",
            )
            .await?;

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await??;
        assert_eq!(frame.readings.get("alt"), Some(&FieldValue::UInt(1000)));
        assert_eq!(engine.list_sources().await.len(), 1);
        Ok(())
    }
}
