//! Event Triage CLI
//!
//! Wires the triage pipeline end to end: transport messages come in as JSON
//! lines on stdin, clean output records go out as JSON lines on disk.

use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use event_triage::{
    config::Config,
    core::{AmbiguityRouter, FailurePolicy, RawEvent, WindowAggregator},
    resolver::{CommandResolver, NoResolver, ResolutionGateway},
    sink::JsonlSink,
    source::{LifecycleFilter, TransportMessage},
    telemetry::{Telemetry, TriageLog},
    VERSION,
};

#[cfg(feature = "gateway")]
use event_triage::gateway::{BlockingResolverClient, GatewayConfig};

#[derive(Parser)]
#[command(name = "event-triage")]
#[command(version = VERSION)]
#[command(about = "Debounce windowing and ambiguity routing for process-event streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on JSON-line transport messages from stdin
    Run {
        /// Debounce period in milliseconds
        #[arg(long)]
        window_ms: Option<u64>,

        /// Hard cap on window lifetime in milliseconds
        #[arg(long)]
        max_window_ms: Option<u64>,

        /// Emit unresolved candidates instead of dropping a window when
        /// resolution fails
        #[arg(long)]
        emit_on_failure: bool,

        /// Resolution backend program (overrides the configured one)
        #[arg(long)]
        resolver_cmd: Option<PathBuf>,

        /// Output record log path (overrides the configured one)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Resolve through a remote gateway instead of a local program
        /// (requires the gateway feature)
        #[arg(long)]
        gateway_host: Option<String>,

        /// Remote gateway port
        #[arg(long)]
        gateway_port: Option<u16>,

        /// Remote gateway bearer token
        #[arg(long)]
        gateway_token: Option<String>,
    },

    /// Push synthetic bursts through the pipeline and print the outcome
    Simulate {
        /// Number of bursts
        #[arg(long, default_value = "3")]
        bursts: usize,

        /// Events per burst
        #[arg(long, default_value = "2")]
        events: usize,

        /// Spacing between events inside a burst, in milliseconds
        #[arg(long, default_value = "50")]
        spacing_ms: u64,

        /// Debounce period in milliseconds
        #[arg(long, default_value = "200")]
        window_ms: u64,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            window_ms,
            max_window_ms,
            emit_on_failure,
            resolver_cmd,
            output,
            gateway_host,
            gateway_port,
            gateway_token,
        } => {
            cmd_run(
                window_ms,
                max_window_ms,
                emit_on_failure,
                resolver_cmd,
                output,
                gateway_host,
                gateway_port,
                gateway_token,
            );
        }
        Commands::Simulate {
            bursts,
            events,
            spacing_ms,
            window_ms,
        } => {
            cmd_simulate(bursts, events, spacing_ms, window_ms);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

#[allow(clippy::too_many_arguments, unused_variables)]
fn cmd_run(
    window_ms: Option<u64>,
    max_window_ms: Option<u64>,
    emit_on_failure: bool,
    resolver_cmd: Option<PathBuf>,
    output: Option<PathBuf>,
    gateway_host: Option<String>,
    gateway_port: Option<u16>,
    gateway_token: Option<String>,
) {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("could not load config ({e}), using defaults");
            Config::default()
        }
    };
    if let Some(window_ms) = window_ms {
        config.window_ms = window_ms;
    }
    if max_window_ms.is_some() {
        config.max_window_ms = max_window_ms;
    }
    if emit_on_failure {
        config.failure_policy = FailurePolicy::EmitUnresolved;
    }
    if let Some(cmd) = resolver_cmd {
        config.resolver.command = Some(cmd);
    }
    if let Some(output) = output {
        config.output_path = output;
    }
    if let Err(e) = config.ensure_directories() {
        warn!("could not create directories: {e}");
    }

    let run_id = uuid::Uuid::new_v4();
    info!(run_id = %run_id, version = VERSION, window_ms = config.window_ms, "event-triage starting");

    let gateway = build_gateway(&config, gateway_host, gateway_port, gateway_token);
    let telemetry = Arc::new(TriageLog::with_persistence(
        config.data_path.join("latencies.csv"),
        config.data_path.join("confidence.csv"),
    ));
    let sink = Arc::new(JsonlSink::new(config.output_path.clone()));
    let router = Arc::new(AmbiguityRouter::new(
        gateway,
        sink,
        telemetry.clone() as Arc<dyn Telemetry>,
        config.window(),
        config.failure_policy,
    ));
    let mut aggregator = WindowAggregator::new(config.window(), config.max_window(), router);
    let filter = LifecycleFilter::new(config.accept_prefix.clone());

    // Stdin is read on its own thread so the main loop can watch the stop
    // flag while no messages arrive.
    let (line_tx, line_rx) = unbounded::<String>();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match std::io::BufRead::read_line(&mut stdin.lock(), &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if line_tx.send(line.trim_end().to_string()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("stdin read failed: {e}");
                        break;
                    }
                }
            }
        })
        .ok();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("could not install Ctrl+C handler: {e}");
    }

    info!(output = %config.output_path.display(), "reading transport messages from stdin");

    while running.load(Ordering::SeqCst) {
        match line_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                if line.is_empty() {
                    continue;
                }
                match TransportMessage::from_json_line(&line) {
                    Ok(message) => {
                        if let Some(event) = filter.accept(&message) {
                            info!(label = %event.label, "event detected");
                            aggregator.ingest(event);
                        }
                    }
                    Err(e) => warn!("skipping malformed transport message: {e}"),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("input closed, shutting down");
                break;
            }
        }
    }

    // Flush any open window before reporting.
    aggregator.shutdown();
    println!();
    println!("{}", telemetry.summary());
}

/// Pick the resolution gateway for this run: remote HTTP gateway, local
/// command, or the unconfigured placeholder.
#[allow(unused_variables)]
fn build_gateway(
    config: &Config,
    gateway_host: Option<String>,
    gateway_port: Option<u16>,
    gateway_token: Option<String>,
) -> Arc<dyn ResolutionGateway> {
    #[cfg(feature = "gateway")]
    if let (Some(host), Some(port)) = (gateway_host.as_ref(), gateway_port) {
        let mut gateway_config = GatewayConfig::new(host.clone(), port);
        if let Some(token) = gateway_token {
            gateway_config = gateway_config.with_token(token);
        }
        match BlockingResolverClient::new(gateway_config) {
            Ok(client) => {
                info!(client_id = %client.client_id(), "using remote resolution gateway");
                match client.test_connection() {
                    Ok(true) => info!("gateway connection: OK"),
                    Ok(false) => warn!("gateway health check failed"),
                    Err(e) => warn!("could not reach gateway: {e}"),
                }
                return Arc::new(client);
            }
            Err(e) => {
                warn!("gateway initialization failed ({e}), falling back");
            }
        }
    }
    #[cfg(not(feature = "gateway"))]
    if gateway_host.is_some() || gateway_port.is_some() {
        warn!("--gateway-* flags ignored (gateway feature not enabled at compile time)");
    }

    match config.resolver.command {
        Some(ref command) => {
            let resolver = CommandResolver::new(command.clone())
                .with_args(config.resolver.args.clone())
                .with_confidence_threshold(config.resolver.confidence_threshold);
            if let Err(e) = resolver.validate() {
                warn!("resolver command check failed: {e}");
            }
            Arc::new(resolver)
        }
        None => {
            warn!("no resolution backend configured; ambiguous windows follow the failure policy");
            Arc::new(NoResolver)
        }
    }
}

fn cmd_simulate(bursts: usize, events: usize, spacing_ms: u64, window_ms: u64) {
    println!("event-triage v{VERSION} simulation");
    println!("  bursts: {bursts}, events per burst: {events}, spacing: {spacing_ms}ms, window: {window_ms}ms");
    println!();

    let telemetry = Arc::new(TriageLog::new());
    let output = std::env::temp_dir().join(format!("event-triage-sim-{}.jsonl", std::process::id()));
    let _ = std::fs::remove_file(&output);

    let router = Arc::new(AmbiguityRouter::new(
        Arc::new(NoResolver),
        Arc::new(JsonlSink::new(output.clone())),
        telemetry.clone() as Arc<dyn Telemetry>,
        Duration::from_millis(window_ms),
        // Without a backend the interesting path is the fallback.
        FailurePolicy::EmitUnresolved,
    ));
    let mut aggregator =
        WindowAggregator::new(Duration::from_millis(window_ms), None, router);

    let labels = ["pick", "place", "press", "inspect"];
    for burst in 0..bursts {
        for i in 0..events {
            let label = labels[(burst + i) % labels.len()];
            aggregator.ingest(RawEvent::now(
                label,
                r#"{"event":{"lifecycle:transition":"complete"}}"#,
                1,
            ));
            thread::sleep(Duration::from_millis(spacing_ms));
        }
        // A gap longer than the window closes the burst.
        thread::sleep(Duration::from_millis(window_ms * 2));
    }
    aggregator.shutdown();

    println!("{}", telemetry.summary());
    println!();
    println!("Records written to {}", output.display());
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Configuration file: {}", Config::config_path().display());
            println!("{json}");
        }
        Err(e) => error!("could not render config: {e}"),
    }
}
