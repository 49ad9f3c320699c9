use anyhow::Result;
use colored::Colorize;
use padtrack::prelude::*;
use padtrack::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", version_string);
    println!("{}", "---------------------------------------------------".dimmed());
}

/// Per-stream on/off flags for the printing listeners.
#[derive(Clone, Default)]
struct WatchFlags {
    telemetry: Arc<AtomicBool>,
    clock: Arc<AtomicBool>,
    overlay: Arc<AtomicBool>,
}

/// Spawns several tasks, each subscribing to a different event stream from the engine.
async fn spawn_event_listeners(engine: &PadtrackEngine, flags: WatchFlags) {
    // System events always print; they are rare and signal lifecycle changes.
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            println!("\n<-- [SYSTEM] {:?}", event);
        }
    });

    let watch_telemetry = flags.telemetry.clone();
    let mut telemetry_rx = engine.subscribe_telemetry();
    tokio::spawn(async move {
        while let Ok(frame) = telemetry_rx.recv().await {
            if watch_telemetry.load(Ordering::Relaxed) {
                let readings: Vec<String> = frame
                    .readings
                    .iter()
                    .map(|(label, value)| format!("{label}={value}"))
                    .collect();
                println!("<-- [TELEMETRY] {}", readings.join(" "));
            }
        }
    });

    let watch_clock = flags.clock.clone();
    let (_, mut clock_rx) = engine.subscribe_clock().await;
    tokio::spawn(async move {
        while let Ok(event) = clock_rx.recv().await {
            if watch_clock.load(Ordering::Relaxed) {
                println!("<-- [CLOCK] {} ({})", event.time, event.mode);
            }
        }
    });

    let watch_overlay = flags.overlay.clone();
    let mut overlay_rx = engine.subscribe_overlay();
    tokio::spawn(async move {
        while let Ok(event) = overlay_rx.recv().await {
            if watch_overlay.load(Ordering::Relaxed) {
                println!("<-- [OVERLAY] phase: {}", event.phase);
            }
        }
    });
}

/// Parses `label=target` pairs into a UI map.
fn parse_ui_map(args: &[&str]) -> Result<Vec<UiMapping>, String> {
    args.iter()
        .map(|pair| {
            let (from, target) = pair
                .split_once('=')
                .ok_or_else(|| format!("'{pair}' is not a LABEL=TARGET pair"))?;
            Ok(UiMapping {
                from: from.to_string(),
                ui_target: target.parse()?,
            })
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();

    let config = PadtrackConfig::load("padtrack")?;
    let engine = PadtrackEngine::new(config)?;
    let engine_handle = engine.clone();

    let flags = WatchFlags::default();
    spawn_event_listeners(&engine_handle, flags.clone()).await;

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.trim().split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "source" => match args.get(1) {
                            Some(&"add") => {
                                let (Some(host), Some(port_str)) = (args.get(2), args.get(3))
                                else {
                                    println!("Usage: source add <HOST> <PORT> [LABEL=TARGET ...]");
                                    continue;
                                };
                                let Ok(port) = port_str.parse::<u16>() else {
                                    println!("Error: '{}' is not a valid port.", port_str);
                                    continue;
                                };
                                let ui_map = match parse_ui_map(&args[4..]) {
                                    Ok(map) => map,
                                    Err(e) => {
                                        println!("Error: {}", e);
                                        continue;
                                    }
                                };
                                match engine_handle.add_source(host, port, ui_map).await {
                                    Ok(summary) => println!(
                                        "--> Source '{}' live on {}:{}",
                                        summary.stream_id, summary.host, summary.port
                                    ),
                                    Err(e) => println!("Error: {}", e),
                                }
                            }
                            Some(&"remove") => {
                                let (Some(host), Some(port_str)) = (args.get(2), args.get(3))
                                else {
                                    println!("Usage: source remove <HOST> <PORT>");
                                    continue;
                                };
                                let Ok(port) = port_str.parse::<u16>() else {
                                    println!("Error: '{}' is not a valid port.", port_str);
                                    continue;
                                };
                                match engine_handle.remove_source(host, port).await {
                                    Ok(()) => println!("--> Source removed."),
                                    Err(e) => println!("Error: {}", e),
                                }
                            }
                            Some(&"list") => {
                                let sources = engine_handle.list_sources().await;
                                if sources.is_empty() {
                                    println!("No live sources.");
                                }
                                for s in sources {
                                    let map: Vec<String> = s
                                        .ui_map
                                        .iter()
                                        .map(|m| format!("{}={}", m.from, m.ui_target))
                                        .collect();
                                    println!(
                                        "  {}:{} stream '{}' [{}]",
                                        s.host,
                                        s.port,
                                        s.stream_id,
                                        map.join(" ")
                                    );
                                }
                            }
                            _ => println!("Unknown 'source' command. Try add, remove or list."),
                        },
                        "clock" => match args.get(1) {
                            Some(&"set") => {
                                let Some(time) = args.get(2) else {
                                    println!("Usage: clock set <T-HHMMSS> [held|running]");
                                    continue;
                                };
                                let mode = match args.get(3) {
                                    Some(mode_str) => match mode_str.parse::<RunMode>() {
                                        Ok(mode) => mode,
                                        Err(e) => {
                                            println!("Error: {}", e);
                                            continue;
                                        }
                                    },
                                    None => engine_handle.run_mode().await,
                                };
                                match engine_handle.set_clock(time, mode).await {
                                    Ok(()) => println!(
                                        "--> Clock set to {} ({})",
                                        engine_handle.clock_time().await,
                                        mode
                                    ),
                                    Err(e) => println!("Error: {}", e),
                                }
                            }
                            Some(&"start") => {
                                engine_handle.start_clock().await;
                                println!("--> Clock running.");
                            }
                            Some(&"hold") => {
                                engine_handle.hold_clock().await;
                                println!("--> Clock held.");
                            }
                            Some(&"get") | None => {
                                println!(
                                    "--> {} ({})",
                                    engine_handle.clock_time().await,
                                    engine_handle.run_mode().await
                                );
                            }
                            _ => println!("Unknown 'clock' command. Try set, start, hold or get."),
                        },
                        "phase" => match args.get(1) {
                            Some(phase_str) => match phase_str.parse::<OverlayPhase>() {
                                Ok(phase) => {
                                    engine_handle.set_phase(phase).await;
                                    println!("--> Overlay phase set to {}", phase);
                                }
                                Err(e) => println!("Error: {}", e),
                            },
                            None => println!("--> {}", engine_handle.phase().await),
                        },
                        "watch" => match args.get(1) {
                            Some(&"telemetry") => {
                                flags.telemetry.store(true, Ordering::Relaxed);
                                println!("--> Watching the telemetry stream.");
                            }
                            Some(&"clock") => {
                                flags.clock.store(true, Ordering::Relaxed);
                                println!("--> Watching the clock stream.");
                            }
                            Some(&"overlay") => {
                                flags.overlay.store(true, Ordering::Relaxed);
                                println!("--> Watching the overlay stream.");
                            }
                            Some(&"off") => {
                                flags.telemetry.store(false, Ordering::Relaxed);
                                flags.clock.store(false, Ordering::Relaxed);
                                flags.overlay.store(false, Ordering::Relaxed);
                                println!("--> All watches off.");
                            }
                            _ => println!("Usage: watch <telemetry|clock|overlay|off>"),
                        },
                        "help" => {
                            println!("Available commands:");
                            println!("  source add <HOST> <PORT> [L=T ...] - Binds a UDP telemetry source.");
                            println!("  source remove <HOST> <PORT>        - Closes and removes a source.");
                            println!("  source list                        - Shows live sources.");
                            println!("  clock set <T-HHMMSS> [MODE]        - Sets the countdown clock.");
                            println!("  clock start | hold | get           - Controls the countdown clock.");
                            println!("  phase [PHASE]                      - Gets or sets the overlay phase.");
                            println!("  watch <STREAM|off>                 - Prints a stream to the console.");
                            println!("  exit                               - Quits the shell.");
                        }
                        "exit" => break,
                        "" => {}
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting padshell...");
                break;
            }
        }
    }

    Ok(())
}
