//! Relay fed by synthetic sources
//!
//! Run with: cargo run --example synthetic_relay [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example synthetic_relay                   # binds to 127.0.0.1:8765
//!   cargo run --example synthetic_relay 0.0.0.0:9000      # binds to 0.0.0.0:9000
//!
//! Two simulated sources are advertised:
//!
//! - `SynthEEG`: 8 channels of EEG at 250 Hz (sine waves, 1..8 Hz)
//! - `SynthGaze`: 2 channels of gaze position at 60 Hz
//!
//! Connect any WebSocket client to watch the snapshots, for example:
//!   websocat ws://127.0.0.1:8765
//!
//! and send commands as JSON text:
//!   {"type":"discover_streams"}
//!   {"type":"set_visibility","identity":{"source_id":"synth-eeg","name":"SynthEEG","type":"EEG"},"channel_index":0,"visible":false}

use std::f64::consts::TAU;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use mobi_relay::server::{RelayServer, ServerConfig};
use mobi_relay::transport::{MockSource, MockTransport, SourceDescription};

const EEG_RATE: f64 = 250.0;
const GAZE_RATE: f64 = 60.0;

/// Push samples to `source` at `rate` Hz until the task is aborted
async fn generate<F>(source: MockSource, rate: f64, mut sample: F)
where
    F: FnMut(f64) -> Vec<f64> + Send + 'static,
{
    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    let mut emitted: u64 = 0;

    loop {
        ticker.tick().await;

        let due = (started.elapsed().as_secs_f64() * rate) as u64;
        while emitted < due {
            let t = emitted as f64 / rate;
            source.push(t, sample(t));
            emitted += 1;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mobi_relay=info")),
        )
        .init();

    let addr: SocketAddr = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => ServerConfig::default().bind_addr,
    };

    let transport = Arc::new(MockTransport::new());

    let eeg = transport.add_source(
        SourceDescription::new("synth-eeg", "SynthEEG", "EEG", 8, EEG_RATE)
            .labels(["Fp1", "Fp2", "C3", "C4", "P3", "P4", "O1", "O2"])
            .units(std::iter::repeat("microvolts").take(8)),
    );
    let gaze = transport.add_source(
        SourceDescription::new("synth-gaze", "SynthGaze", "Gaze", 2, GAZE_RATE)
            .labels(["x", "y"])
            .units(["pixels", "pixels"]),
    );

    let eeg_task = tokio::spawn(generate(eeg, EEG_RATE, |t| {
        (1..=8)
            .map(|hz| 50.0 * (TAU * hz as f64 * t).sin())
            .collect()
    }));
    let gaze_task = tokio::spawn(generate(gaze, GAZE_RATE, |t| {
        vec![960.0 + 300.0 * (TAU * 0.2 * t).cos(), 540.0 + 200.0 * (TAU * 0.3 * t).sin()]
    }));

    let server = RelayServer::with_transport(ServerConfig::with_addr(addr), transport);

    println!("Relay listening on ws://{}", addr);
    println!("Press Ctrl+C to stop");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    eeg_task.abort();
    gaze_task.abort();

    let stats = server.broadcaster().stats().await;
    println!(
        "Served {} sessions over {} ticks ({} snapshots published)",
        stats.total_sessions, stats.ticks.ticks, stats.ticks.snapshots_published
    );

    Ok(())
}
