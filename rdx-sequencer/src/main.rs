use anyhow::Result;
use sequencer::catalog;
use sequencer::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration, optionally from a file given as the first argument.
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = SequencerConfig::load(path.as_deref())?;
    let sequences = Sequences::new(&config)?;

    // 3. Create the engine against simulated subsystems.
    let engine = SequencerEngine::new(config.clone());
    engine.enable().await;

    // 4. Spawn tasks to listen to the event streams.
    spawn_event_listeners(&engine);

    // 5. Play a short match script against the engine.
    let script_engine = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = play_script(&script_engine, &sequences, &config).await {
            warn!("Match script stopped early: {}", e);
        }
    });

    // 6. Run the engine. It will shut down on Ctrl+C.
    engine.run().await?;

    Ok(())
}

/// Spawns tasks, each subscribing to a different event stream from the engine.
fn spawn_event_listeners(engine: &SequencerEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut sequence_rx = engine.subscribe_sequence_events();
    tokio::spawn(async move {
        while let Ok(event) = sequence_rx.recv().await {
            info!("[SEQUENCE] => {:?}", event);
        }
    });
}

/// Requests sequences the way an impatient operator would, including a few
/// that preempt each other.
async fn play_script(
    engine: &SequencerEngine,
    sequences: &Sequences,
    config: &SequencerConfig,
) -> Result<()> {
    let pause = |secs: f64| tokio::time::sleep(Duration::from_secs_f64(secs));
    let request = |key: &'static str| async move {
        match sequences.get(key) {
            Some(sequence) => {
                engine.run_sequence(sequence).await;
            }
            None => warn!("No sequence named '{}'", key),
        }
    };

    pause(0.5).await;
    request("start-intaking").await;
    pause(1.5).await;
    // Changes their mind twice before intaking has even stopped.
    request("stop-intaking").await;
    request("spin-up-shooter").await;
    pause(1.0).await;
    request("start-shooting").await;
    pause(2.0).await;
    request("stop-shooting").await;

    let turn = std::sync::Arc::new(catalog::constant_drive_power(-config.drivebase.constant_power)?);
    engine.run_sequence(&turn).await;
    pause(1.0).await;
    request("reset").await;
    pause(0.5).await;

    info!("{}", engine.status().await);
    let summary = engine.with_subsystems(|subsystems| subsystems.summary()).await;
    info!("Script finished: {}", summary);
    Ok(())
}
