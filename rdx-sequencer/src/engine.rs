//! The async driver that ticks the controller against real time.

use crate::common::RunnerId;
use crate::components::sequence::Sequence;
use crate::config::SequencerConfig;
use crate::controller::{Controller, ControllerStatus, Liveness};
use crate::events::{SequenceEvent, SystemEvent};
use crate::subsystems::Subsystems;
use crate::time::{SystemClock, TickEvent};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, trace, warn};

/// The main sequencer engine.
///
/// This struct owns the `Controller` and the `Subsystems` registry and drives
/// both from a `SystemClock`. It is designed to be cloned and shared across
/// tasks, providing a handle to the running instance. All sequencing work
/// still happens synchronously inside a single tick; the async layer only
/// decides when ticks happen.
#[derive(Clone)]
pub struct SequencerEngine {
    config: Arc<SequencerConfig>,
    controller: Arc<Mutex<Controller>>,
    subsystems: Arc<Mutex<Subsystems>>,
    liveness: Liveness,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    sequence_event_sender: broadcast::Sender<SequenceEvent>,
    shutdown_sender: broadcast::Sender<()>,
}

// Core implementation block for internal logic.
impl SequencerEngine {
    /// Creates an engine driving simulated subsystems.
    pub fn new(config: SequencerConfig) -> Self {
        let subsystems = Subsystems::simulated(&config);
        Self::from_subsystems(config, subsystems)
    }

    /// Creates an engine driving the given subsystems.
    pub fn from_subsystems(config: SequencerConfig, subsystems: Subsystems) -> Self {
        const CHANNEL_CAPACITY: usize = 256;
        let (tick_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (system_event_sender, _) = broadcast::channel(64);
        let (shutdown_sender, _) = broadcast::channel(1);

        let controller = Controller::from_config(&config.controller);
        let sequence_event_sender = controller.event_sender();
        let liveness = controller.liveness();

        Self {
            config: Arc::new(config),
            controller: Arc::new(Mutex::new(controller)),
            subsystems: Arc::new(Mutex::new(subsystems)),
            liveness,
            tick_sender,
            system_event_sender,
            sequence_event_sender,
            shutdown_sender,
        }
    }

    /// Runs the engine's main loop until Ctrl+C or `shutdown()`.
    ///
    /// This method will:
    /// 1. Spawn the `SystemClock` task.
    /// 2. Spawn the dispatcher task that executes the subsystems and the
    ///    controller on every tick.
    /// 3. Wait for a shutdown signal, then stop both tasks.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("SequencerEngine starting up...");
        let mut shutdown_rx = self.shutdown_sender.subscribe();

        let clock = SystemClock::new(self.config.resolution.clone(), self.tick_sender.clone());
        let clock_shutdown_rx = self.shutdown_sender.subscribe();
        let clock_handle = tokio::spawn(async move { clock.run(clock_shutdown_rx).await });

        let dispatcher = self.clone();
        let dispatcher_shutdown_rx = self.shutdown_sender.subscribe();
        let dispatcher_handle =
            tokio::spawn(async move { dispatcher.dispatcher_loop(dispatcher_shutdown_rx).await });

        info!(
            "Engine running at {:?}. Press Ctrl+C to shut down.",
            self.config.resolution
        );
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown signal received. Broadcasting to all tasks...");
                if self.shutdown_sender.send(()).is_err() {
                    error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested.");
            }
        }

        for handle in [clock_handle, dispatcher_handle] {
            if tokio::time::timeout(Duration::from_millis(500), handle)
                .await
                .is_err()
            {
                warn!("A task did not stop within 500ms of shutdown.");
            }
        }
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("SequencerEngine has shut down.");
        Ok(())
    }

    #[doc(hidden)]
    async fn dispatcher_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut tick_rx = self.tick_sender.subscribe();
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: Utc::now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                received = tick_rx.recv() => match received {
                    Ok(tick) => {
                        trace!("Tick #{} received.", tick.tick_count);
                        if let Some(reason) = self.process_tick(&tick).await {
                            self.system_event_sender
                                .send(SystemEvent::ControllerDied { reason })
                                .ok();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Dispatcher fell behind and skipped {} ticks.", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Returns the reason if the controller died during this tick.
    #[doc(hidden)]
    async fn process_tick(&self, tick: &TickEvent) -> Option<String> {
        let mut subsystems = self.subsystems.lock().await;
        subsystems.execute(tick);
        let mut controller = self.controller.lock().await;
        let was_alive = controller.is_alive();
        controller.execute(tick, &mut subsystems);
        if was_alive && !controller.is_alive() {
            controller.death_reason().map(str::to_string)
        } else {
            None
        }
    }
}

// Public API implementation block.
impl SequencerEngine {
    /// Requests that `sequence` run as soon as possible.
    ///
    /// Returns the runner id, or `None` if the request was ignored.
    pub async fn run_sequence(&self, sequence: &Arc<Sequence>) -> Option<RunnerId> {
        self.controller.lock().await.run(sequence)
    }

    pub async fn enable(&self) {
        self.controller.lock().await.enable();
        self.system_event_sender
            .send(SystemEvent::ControllerEnabled)
            .ok();
    }

    /// Aborts everything running and ignores new requests until re-enabled.
    pub async fn disable(&self) {
        self.controller.lock().await.disable();
        self.system_event_sender
            .send(SystemEvent::ControllerDisabled)
            .ok();
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// A handle a watchdog can poll without going through the engine.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub async fn status(&self) -> ControllerStatus {
        self.controller.lock().await.status()
    }

    /// Gives read access to the subsystems between ticks.
    pub async fn with_subsystems<R>(&self, f: impl FnOnce(&Subsystems) -> R) -> R {
        let subsystems = self.subsystems.lock().await;
        f(&subsystems)
    }

    /// Stops a running `run()` loop.
    pub fn shutdown(&self) {
        self.shutdown_sender.send(()).ok();
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Subscribes to the `SequenceEvent` stream.
    pub fn subscribe_sequence_events(&self) -> broadcast::Receiver<SequenceEvent> {
        self.sequence_event_sender.subscribe()
    }

    /// Subscribes to the raw tick stream.
    pub fn subscribe_ticks(&self) -> broadcast::Receiver<Arc<TickEvent>> {
        self.tick_sender.subscribe()
    }
}
