use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sequencer::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const RANDOM_SEED: u64 = 123456;
const MAX_WAIT_SECS: f64 = 4.0;

/// A controller with simulated subsystems and a clock that moves in 10ms steps.
struct Harness {
    controller: Controller,
    subsystems: Subsystems,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        let mut controller = Controller::new();
        controller.enable();
        Self {
            controller,
            subsystems: Subsystems::default(),
            clock: ManualClock::default(),
        }
    }

    fn tick(&mut self) {
        let tick = self.clock.tick();
        self.subsystems.execute(&tick);
        self.controller.execute(&tick, &mut self.subsystems);
        assert!(
            self.controller.is_alive(),
            "the controller has died: {:?}",
            self.controller.death_reason()
        );
    }

    fn wait(&mut self, seconds: f64) {
        let ticks = (seconds / 0.01).round() as usize;
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Ticks until `check` holds, failing after `seconds`.
    fn wait_for(&mut self, seconds: f64, check: impl Fn(&Subsystems) -> bool) {
        let ticks = (seconds / 0.01).round() as usize;
        for _ in 0..ticks {
            if check(&self.subsystems) {
                return;
            }
            self.tick();
        }
        panic!(
            "state never reached within {}s: {}",
            seconds,
            self.subsystems.summary()
        );
    }
}

fn build(builder: SequenceBuilder) -> Arc<Sequence> {
    Arc::new(builder.build().unwrap())
}

/// Sequences can be aborted before they even start. They must still start so
/// they can apply their interrupt state before anything queued behind them.
///
/// Three sequences conflict on the conveyor. "start intaking" is running when
/// "stop intaking" is requested, which aborts it. Before "stop intaking" can
/// start, "start shooting" is requested, which aborts it too. "stop intaking"
/// must still get its turn to apply its interrupt state before "start
/// shooting" runs.
#[test]
fn can_start_when_conflicting_with_aborted_sequence() {
    let mut h = Harness::new();

    let mut b = Sequence::builder("start intaking");
    b.then().set_intake_rps(10.0).set_conveyor_duty_cycle(0.5);
    b.then().set_delay_delta(1.0);
    let start_intaking = build(b);

    let mut b = Sequence::builder("stop intaking");
    b.then().set_intake_rps(0.0).set_conveyor_duty_cycle(0.0);
    b.create_interrupt_state();
    let stop_intaking = build(b);

    let mut b = Sequence::builder("start shooting");
    b.then().set_shooter_rps(100.0).set_conveyor_duty_cycle(1.0);
    let start_shooting = build(b);

    assert_eq!(h.subsystems.intake.target_rps(), 0.0);
    assert_eq!(h.subsystems.conveyor.duty_cycle(), 0.0);
    assert_eq!(h.subsystems.shooter.target_rps(), 0.0);

    let mut events = h.controller.subscribe();
    h.controller.run(&start_intaking).unwrap();
    h.wait_for(1.0, |s| {
        s.intake.target_rps() == 10.0 && s.conveyor.duty_cycle() == 0.5
    });
    assert_eq!(h.subsystems.shooter.target_rps(), 0.0);

    h.wait(0.5);
    h.controller.run(&stop_intaking).unwrap();
    h.controller.run(&start_shooting).unwrap();
    assert_eq!(
        h.controller.status().queued,
        vec!["stop intaking", "start shooting"]
    );

    h.wait_for(2.0, |s| {
        s.intake.target_rps() == 0.0
            && s.conveyor.duty_cycle() == 1.0
            && s.shooter.target_rps() == 100.0
    });
    h.tick();
    assert!(h.controller.is_idle());

    // "stop intaking" started (cleanup only) and finished before "start shooting" started.
    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SequenceEvent::Started { name, aborted, .. } => order.push(format!("start {} {}", name, aborted)),
            SequenceEvent::Finished { name, .. } => order.push(format!("end {}", name)),
            _ => {}
        }
    }
    assert_eq!(
        order,
        vec![
            "start start intaking false",
            "end start intaking",
            "start stop intaking true",
            "end stop intaking",
            "start start shooting false",
            "end start shooting",
        ]
    );
}

#[test]
fn promotion_happens_on_the_same_tick() {
    let mut h = Harness::new();
    let mut b = Sequence::builder("conveyor on");
    b.then().set_conveyor_duty_cycle(1.0);
    let first = build(b);
    let mut b = Sequence::builder("shooter on");
    b.then().set_shooter_rps(50.0);
    let second = build(b);

    h.controller.run(&first);
    h.controller.run(&second);
    h.tick();
    assert_eq!(h.subsystems.conveyor.duty_cycle(), 1.0);
    assert_eq!(h.subsystems.shooter.target_rps(), 50.0);
    assert!(h.controller.is_idle());
}

#[test]
fn duplicate_requests_are_ignored() {
    let mut h = Harness::new();
    let mut b = Sequence::builder("slow conveyor");
    b.then().set_conveyor_duty_cycle(0.2).set_delay_delta(1.0);
    let slow = build(b);

    let mut events = h.controller.subscribe();
    assert!(h.controller.run(&slow).is_some());
    assert!(h.controller.run(&slow).is_none());
    assert!(matches!(
        events.try_recv().unwrap(),
        SequenceEvent::Queued { .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        SequenceEvent::Ignored {
            reason: IgnoreReason::AlreadyRunning,
            ..
        }
    ));

    // A structurally identical but separately built sequence is not a duplicate.
    let mut b = Sequence::builder("slow conveyor");
    b.then().set_conveyor_duty_cycle(0.2).set_delay_delta(1.0);
    let twin = build(b);
    let first = h.controller.status();
    assert!(h.controller.run(&twin).is_some());
    assert_eq!(first.queued.len() + 1, h.controller.status().queued.len());
}

#[test]
fn requesting_an_aborted_sequence_again_queues_it() {
    let mut h = Harness::new();
    let mut b = Sequence::builder("slow conveyor");
    b.then().set_conveyor_duty_cycle(0.2).set_delay_delta(1.0);
    let slow = build(b);
    let mut b = Sequence::builder("fast conveyor");
    b.then().set_conveyor_duty_cycle(1.0);
    let fast = build(b);

    h.controller.run(&slow).unwrap();
    h.tick();
    h.controller.run(&fast).unwrap();
    // "slow" is now aborting, so asking for it again is a new request.
    assert!(h.controller.run(&slow).is_some());
    // The first finishes its delay, "fast" only cleans up, the second runs its delay.
    h.wait(2.5);
    assert!(h.controller.is_idle());
    assert_eq!(h.subsystems.conveyor.duty_cycle(), 0.2);
}

#[test]
fn disable_aborts_and_ignores_requests() {
    let mut h = Harness::new();
    let mut b = Sequence::builder("shooter ramp");
    b.then().set_shooter_rps(20.0).set_delay_delta(0.5);
    b.then().set_shooter_rps(60.0).set_delay_delta(0.5);
    b.on_interrupt().set_shooter_rps(0.0);
    let ramp = build(b);

    h.controller.run(&ramp).unwrap();
    h.tick();
    assert_eq!(h.subsystems.shooter.target_rps(), 20.0);

    h.controller.disable();
    assert!(!h.controller.is_enabled());
    assert!(h.controller.run(&ramp).is_none());

    // The step in progress finishes, then the interrupt step runs.
    h.wait(0.3);
    assert_eq!(h.subsystems.shooter.target_rps(), 20.0);
    h.wait_for(1.0, |s| s.shooter.target_rps() == 0.0);
    h.tick();
    assert!(h.controller.is_idle());

    h.controller.enable();
    assert!(h.controller.run(&ramp).is_some());
}

#[test]
fn panicking_predicate_kills_the_controller() {
    let mut controller = Controller::new();
    controller.enable();
    let mut subsystems = Subsystems::default();
    let mut clock = ManualClock::default();
    let liveness = controller.liveness();

    let mut b = Sequence::builder("broken");
    b.then().wait_until("explodes", |_| panic!("sensor unplugged"));
    let broken = build(b);

    controller.run(&broken).unwrap();
    controller.execute(&clock.tick(), &mut subsystems);
    assert!(!liveness.is_alive());
    assert!(!controller.status().alive);
    assert_eq!(controller.death_reason(), Some("sensor unplugged"));

    // Later ticks and requests are ignored.
    let mut b = Sequence::builder("conveyor");
    b.then().set_conveyor_duty_cycle(1.0);
    assert!(controller.run(&build(b)).is_none());
    controller.execute(&clock.tick(), &mut subsystems);
    assert_eq!(subsystems.conveyor.duty_cycle(), 0.0);
}

#[test]
fn largest_representable_delay_does_not_kill_the_controller() {
    let mut h = Harness::new();
    let mut b = Sequence::builder("wait forever");
    b.then()
        .set_conveyor_duty_cycle(0.4)
        .set_delay_delta(18446744073709549568.0);
    let forever = build(b);

    h.controller.run(&forever).unwrap();
    h.tick();
    h.clock.advance(Duration::from_secs(3600));
    h.tick();
    assert_eq!(h.controller.status().blocked_by, Some(Blocker::Time));
    assert_eq!(h.subsystems.conveyor.duty_cycle(), 0.4);
}

/// Pretends to be an operator that keeps changing their mind, waiting a random
/// time between requests so the robot gets fully or only part way there.
///
/// Only checks that the controller survives and always drains its queue; not
/// that the robot does anything useful.
#[test]
fn crazy_operator_fuzz_test() {
    let mut h = Harness::new();
    let sequences = Sequences::new(&SequencerConfig::default()).unwrap();
    let all: Vec<Arc<Sequence>> = sequences.all().cloned().collect();
    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);

    for _ in 0..100 {
        let sequence = &all[rng.random_range(0..all.len())];
        h.controller.run(sequence);
        h.wait(rng.random::<f64>() * MAX_WAIT_SECS);
    }

    // Turning the robot off lets everything that was in flight wind down.
    h.controller.disable();
    let mut ticks = 0;
    while !h.controller.is_idle() {
        h.tick();
        ticks += 1;
        assert!(ticks < 10_000, "{}", h.controller.status());
    }
    h.clock.advance(Duration::from_secs(1));
    h.tick();
    assert!(h.controller.is_alive());
}
