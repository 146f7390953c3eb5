//! Immutable, named plans of steps and the builder that produces them.

use super::step::{Step, StepBuilder};
use crate::common::ResourceSet;
use crate::error::BuildError;

/// A list of steps the robot should go through, plus an optional interrupt
/// step applied if the sequence is aborted.
///
/// Once built a `Sequence` never changes, so the same instance can back any
/// number of runners, one after another or at the same time.
#[derive(Debug, Clone)]
pub struct Sequence {
    name: String,
    steps: Vec<Step>,
    interrupt: Option<Step>,
    required: ResourceSet,
}

impl Sequence {
    /// Starts building a new sequence.
    pub fn builder(name: impl Into<String>) -> SequenceBuilder {
        SequenceBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The cleanup step applied when the sequence is aborted.
    pub fn interrupt_step(&self) -> Option<&Step> {
        self.interrupt.as_ref()
    }

    /// Every resource touched by any step, including the interrupt step.
    pub fn required_resources(&self) -> ResourceSet {
        self.required
    }

    /// Two sequences conflict if they share any resource. A sequence without
    /// actions conflicts with nothing, not even itself.
    pub fn does_conflict(&self, other: &Sequence) -> bool {
        self.required.intersects(&other.required)
    }
}

/// Describes a `Sequence` one step at a time.
///
/// Every `then()` call opens a new step that the robot must fully reach
/// before moving on. Setpoints that aren't mentioned are left unchanged.
///
/// ```
/// use sequencer::prelude::*;
///
/// let mut builder = Sequence::builder("Start intaking");
/// builder.then().deploy_intake();
/// builder.then().set_intake_rps(90.0).set_conveyor_duty_cycle(1.0);
/// builder.create_interrupt_state();
/// let sequence = builder.build().unwrap();
/// assert_eq!(sequence.steps().len(), 2);
/// assert!(sequence.interrupt_step().is_some());
/// ```
#[derive(Debug)]
pub struct SequenceBuilder {
    name: String,
    steps: Vec<StepBuilder>,
    interrupt: Option<StepBuilder>,
    create_interrupt: bool,
}

impl SequenceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            interrupt: None,
            create_interrupt: false,
        }
    }

    /// Opens a new step at the end of the sequence.
    pub fn then(&mut self) -> &mut StepBuilder {
        self.steps.push(StepBuilder::new());
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    /// Opens a new step that logs `message` when it is applied.
    pub fn then_log(&mut self, message: impl Into<String>) -> &mut StepBuilder {
        self.then().set_log(message)
    }

    /// Generates an interrupt step that leaves every mechanism at the last
    /// setpoint the sequence would have given it had it run to the end.
    pub fn create_interrupt_state(&mut self) -> &mut Self {
        self.create_interrupt = true;
        self
    }

    /// The interrupt step, for setting it explicitly. Anything set here
    /// overrides what `create_interrupt_state()` generates.
    pub fn on_interrupt(&mut self) -> &mut StepBuilder {
        self.interrupt.get_or_insert_with(StepBuilder::new)
    }

    /// Appends the normal steps of `other` to this sequence.
    pub fn append_sequence(&mut self, other: &Sequence) -> &mut Self {
        self.steps
            .extend(other.steps().iter().cloned().map(StepBuilder::from_step));
        self
    }

    /// Freezes the sequence.
    pub fn build(self) -> Result<Sequence, BuildError> {
        let name = self.name;
        let steps = self
            .steps
            .into_iter()
            .map(|step| step.finish(&name))
            .collect::<Result<Vec<_>, _>>()?;
        let explicit = self
            .interrupt
            .map(|step| step.finish(&name))
            .transpose()?;

        let interrupt = if self.create_interrupt {
            let mut generated = Step::default();
            let setpoints = steps
                .iter()
                .flat_map(|step| step.actions())
                .filter(|action| action.is_setpoint());
            for action in setpoints {
                generated.set_action(*action);
            }
            if let Some(explicit) = explicit {
                for action in explicit.actions() {
                    generated.set_action(*action);
                }
                generated.set_completion(explicit.completion().clone());
                generated.set_log(explicit.log_message().map(str::to_string));
            }
            if generated.actions().is_empty() {
                return Err(BuildError::EmptyInterrupt(name));
            }
            Some(generated)
        } else {
            explicit
        };

        let mut required: ResourceSet = steps.iter().map(Step::resources).fold(
            ResourceSet::empty(),
            |mut acc, resources| {
                acc.extend(resources);
                acc
            },
        );
        if let Some(interrupt) = &interrupt {
            required.extend(interrupt.resources());
        }

        Ok(Sequence {
            name,
            steps,
            interrupt,
            required,
        })
    }
}
