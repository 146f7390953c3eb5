//! Contains common, primitive types shared across the sequencer.
//!
//! This module defines the identifiers for contended subsystems (`Resource`),
//! the compact set type used to compute conflicts between sequences, and the
//! key type used to track runners inside the controller.

use serde::Deserialize;
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Uniquely and safely identifies a `SequenceRunner` tracked by the controller.
    ///
    /// A new key is handed out for every accepted `run()` request and is never
    /// reused, so a stale id can't accidentally refer to a later runner.
    pub struct RunnerId;
}

/// A subsystem that can be exclusively claimed by one sequence at a time.
///
/// Subsystems that can physically interfere with each other should share a
/// resource so that sequences using either of them conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Drivebase,
    Intake,
    Conveyor,
    Feeder,
    Shooter,
    ClimberLeft,
    ClimberRight,
    Led,
}

impl Resource {
    /// Every resource, in declaration order.
    pub const ALL: [Resource; 8] = [
        Resource::Drivebase,
        Resource::Intake,
        Resource::Conveyor,
        Resource::Feeder,
        Resource::Shooter,
        Resource::ClimberLeft,
        Resource::ClimberRight,
        Resource::Led,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Drivebase => "drivebase",
            Resource::Intake => "intake",
            Resource::Conveyor => "conveyor",
            Resource::Feeder => "feeder",
            Resource::Shooter => "shooter",
            Resource::ClimberLeft => "climber_left",
            Resource::ClimberRight => "climber_right",
            Resource::Led => "led",
        };
        f.write_str(name)
    }
}

/// A fixed-size set of `Resource`s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceSet(u16);

impl ResourceSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, resource: Resource) {
        self.0 |= resource.bit();
    }

    pub fn extend(&mut self, other: ResourceSet) {
        self.0 |= other.0;
    }

    pub fn contains(&self, resource: Resource) -> bool {
        self.0 & resource.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns `true` if at least one resource is in both sets.
    pub fn intersects(&self, other: &ResourceSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Resource> + '_ {
        Resource::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Resource> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut set = ResourceSet::empty();
        for resource in iter {
            set.insert(resource);
        }
        set
    }
}

impl fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|r| r.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_never_intersects() {
        let empty = ResourceSet::empty();
        assert!(!empty.intersects(&empty));
        let all: ResourceSet = Resource::ALL.into_iter().collect();
        assert!(!empty.intersects(&all));
        assert_eq!(all.len(), Resource::ALL.len());
    }

    #[test]
    fn intersection_is_symmetric() {
        let a: ResourceSet = [Resource::Intake, Resource::Led].into_iter().collect();
        let b: ResourceSet = [Resource::Led].into_iter().collect();
        let c: ResourceSet = [Resource::Shooter].into_iter().collect();
        assert!(a.intersects(&b) && b.intersects(&a));
        assert!(!a.intersects(&c) && !c.intersects(&a));
    }

    #[test]
    fn display_lists_members_in_order() {
        let set: ResourceSet = [Resource::Led, Resource::Drivebase].into_iter().collect();
        assert_eq!(set.to_string(), "{drivebase, led}");
    }
}
