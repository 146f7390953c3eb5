use sequencer::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Starts an engine in the background and waits until it is ticking.
async fn start_engine() -> SequencerEngine {
    let engine = SequencerEngine::new(SequencerConfig::default());
    let mut system_rx = engine.subscribe_system_events();
    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });
    wait_for_system(&mut system_rx, |event| {
        matches!(event, SystemEvent::EngineStarted { .. })
    })
    .await;
    engine
}

async fn wait_for_system(
    rx: &mut broadcast::Receiver<SystemEvent>,
    check: impl Fn(&SystemEvent) -> bool,
) -> SystemEvent {
    timeout(WAIT, async {
        loop {
            let event = rx.recv().await.unwrap();
            if check(&event) {
                return event;
            }
        }
    })
    .await
    .expect("system event never arrived")
}

async fn wait_for_sequence(
    rx: &mut broadcast::Receiver<SequenceEvent>,
    check: impl Fn(&SequenceEvent) -> bool,
) -> SequenceEvent {
    timeout(WAIT, async {
        loop {
            let event = rx.recv().await.unwrap();
            if check(&event) {
                return event;
            }
        }
    })
    .await
    .expect("sequence event never arrived")
}

fn conveyor_then_shooter() -> Arc<Sequence> {
    let mut builder = Sequence::builder("feed and shoot");
    builder.then().set_conveyor_duty_cycle(1.0).set_delay_delta(0.1);
    builder.then().set_shooter_rps(40.0);
    Arc::new(builder.build().unwrap())
}

#[tokio::test]
async fn engine_runs_a_sequence_to_completion() {
    let engine = start_engine().await;
    let mut sequence_rx = engine.subscribe_sequence_events();

    let id = engine.run_sequence(&conveyor_then_shooter()).await.unwrap();
    let finished = wait_for_sequence(&mut sequence_rx, |event| {
        matches!(event, SequenceEvent::Finished { .. })
    })
    .await;
    match finished {
        SequenceEvent::Finished {
            id: finished_id,
            aborted,
            ..
        } => {
            assert_eq!(finished_id, id);
            assert!(!aborted);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let (conveyor, shooter) = engine
        .with_subsystems(|s| (s.conveyor.duty_cycle(), s.shooter.target_rps()))
        .await;
    assert_eq!(conveyor, 1.0);
    assert_eq!(shooter, 40.0);
    assert!(engine.is_alive());
    assert!(engine.status().await.active.is_none());

    let mut system_rx = engine.subscribe_system_events();
    engine.shutdown();
    wait_for_system(&mut system_rx, |event| {
        matches!(event, SystemEvent::EngineShutdown)
    })
    .await;
}

#[tokio::test]
async fn disable_is_broadcast_and_blocks_requests() {
    let engine = start_engine().await;
    let mut system_rx = engine.subscribe_system_events();

    engine.disable().await;
    wait_for_system(&mut system_rx, |event| {
        matches!(event, SystemEvent::ControllerDisabled)
    })
    .await;
    assert!(!engine.status().await.enabled);
    assert!(engine.run_sequence(&conveyor_then_shooter()).await.is_none());

    engine.enable().await;
    wait_for_system(&mut system_rx, |event| {
        matches!(event, SystemEvent::ControllerEnabled)
    })
    .await;
    assert!(engine.run_sequence(&conveyor_then_shooter()).await.is_some());
    engine.shutdown();
}

#[tokio::test]
async fn controller_death_is_reported_once() {
    let engine = start_engine().await;
    let mut system_rx = engine.subscribe_system_events();
    let liveness = engine.liveness();

    let mut builder = Sequence::builder("broken");
    builder
        .then()
        .wait_until("always panics", |_| panic!("encoder fault"));
    engine
        .run_sequence(&Arc::new(builder.build().unwrap()))
        .await
        .unwrap();

    let event = wait_for_system(&mut system_rx, |event| {
        matches!(event, SystemEvent::ControllerDied { .. })
    })
    .await;
    assert!(matches!(event, SystemEvent::ControllerDied { reason } if reason == "encoder fault"));
    assert!(!liveness.is_alive());
    assert!(!engine.status().await.alive);

    // The engine keeps ticking but the controller stays dead.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!engine.is_alive());
    while let Ok(event) = system_rx.try_recv() {
        assert!(!matches!(event, SystemEvent::ControllerDied { .. }));
    }
    engine.shutdown();
}
