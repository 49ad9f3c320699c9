use anyhow::Result;
use padtrack::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // 2. Load configuration from padtrack.toml and the environment.
    let config = PadtrackConfig::load("padtrack")?;
    let engine = PadtrackEngine::new(config)?;

    // 3. Spawn concurrent tasks to listen to each event stream.
    spawn_event_listeners(&engine).await;

    // 4. Bind a local development source for every catalogued stream.
    bind_local_sources(&engine).await;

    // 5. Run the engine until Ctrl+C.
    engine.run().await?;

    Ok(())
}

/// Spawns several tasks, each subscribing to a different event stream from the engine.
async fn spawn_event_listeners(engine: &PadtrackEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let (snapshot, mut clock_rx) = engine.subscribe_clock().await;
    info!("[CLOCK] => {} ({})", snapshot.time, snapshot.mode);
    tokio::spawn(async move {
        while let Ok(event) = clock_rx.recv().await {
            info!("[CLOCK] => {} ({})", event.time, event.mode);
        }
    });

    let mut overlay_rx = engine.subscribe_overlay();
    tokio::spawn(async move {
        while let Ok(event) = overlay_rx.recv().await {
            info!("[OVERLAY] => phase: {}", event.phase);
        }
    });

    let mut telemetry_rx = engine.subscribe_telemetry();
    tokio::spawn(async move {
        while let Ok(frame) = telemetry_rx.recv().await {
            let readings: Vec<String> = frame
                .readings
                .iter()
                .map(|(label, value)| format!("{label}={value}"))
                .collect();
            info!("[TELEMETRY] => {}", readings.join(" "));
        }
    });
}

/// Adds a loopback source for each stream in the catalog so a local sender
/// can exercise the whole pipeline.
async fn bind_local_sources(engine: &PadtrackEngine) {
    let ports: Vec<u16> = engine
        .catalog()
        .devices
        .iter()
        .flat_map(|device| device.streams.iter().map(|stream| stream.port))
        .collect();

    for port in ports {
        match engine.add_source("127.0.0.1", port, Vec::new()).await {
            Ok(summary) => info!(
                "Listening for '{}' datagrams on {}:{}",
                summary.stream_id, summary.host, summary.port
            ),
            Err(e) => tracing::warn!("Could not bind port {port}: {e}"),
        }
    }
}
