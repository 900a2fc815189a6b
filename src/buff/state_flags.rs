//! Crowd-control and immunity flags.
//!
//! Flags carry no magnitude: a holder's effective state is the union of
//! every source's flags, so removing one source never clears a flag another
//! source still holds.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::attributes::ModifierSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFlag {
    Stun,
    Silence,
    Root,
    Disarm,
    Sleep,
    Fear,
    Invulnerable,
    Invisible,
    Untargetable,
    ImmuneControl,
    /// Named union: Stun, Silence, Root, Disarm.
    FullControl,
}

impl StateFlag {
    pub const fn bits(self) -> u32 {
        match self {
            Self::Stun => StateFlags::STUN.0,
            Self::Silence => StateFlags::SILENCE.0,
            Self::Root => StateFlags::ROOT.0,
            Self::Disarm => StateFlags::DISARM.0,
            Self::Sleep => StateFlags::SLEEP.0,
            Self::Fear => StateFlags::FEAR.0,
            Self::Invulnerable => StateFlags::INVULNERABLE.0,
            Self::Invisible => StateFlags::INVISIBLE.0,
            Self::Untargetable => StateFlags::UNTARGETABLE.0,
            Self::ImmuneControl => StateFlags::IMMUNE_CONTROL.0,
            Self::FullControl => StateFlags::FULL_CONTROL.0,
        }
    }
}

const SINGLE_FLAGS: [StateFlag; 10] = [
    StateFlag::Stun,
    StateFlag::Silence,
    StateFlag::Root,
    StateFlag::Disarm,
    StateFlag::Sleep,
    StateFlag::Fear,
    StateFlag::Invulnerable,
    StateFlag::Invisible,
    StateFlag::Untargetable,
    StateFlag::ImmuneControl,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateFlags(u32);

impl StateFlags {
    pub const NONE: StateFlags = StateFlags(0);
    pub const STUN: StateFlags = StateFlags(1 << 0);
    pub const SILENCE: StateFlags = StateFlags(1 << 1);
    pub const ROOT: StateFlags = StateFlags(1 << 2);
    pub const DISARM: StateFlags = StateFlags(1 << 3);
    pub const SLEEP: StateFlags = StateFlags(1 << 4);
    pub const FEAR: StateFlags = StateFlags(1 << 5);
    pub const INVULNERABLE: StateFlags = StateFlags(1 << 6);
    pub const INVISIBLE: StateFlags = StateFlags(1 << 7);
    pub const UNTARGETABLE: StateFlags = StateFlags(1 << 8);
    pub const IMMUNE_CONTROL: StateFlags = StateFlags(1 << 9);
    pub const FULL_CONTROL: StateFlags =
        StateFlags(Self::STUN.0 | Self::SILENCE.0 | Self::ROOT.0 | Self::DISARM.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0x3ff)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set.
    pub const fn contains(self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: StateFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: StateFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: StateFlags) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = StateFlag> {
        SINGLE_FLAGS
            .into_iter()
            .filter(move |flag| self.0 & flag.bits() != 0)
    }
}

impl From<StateFlag> for StateFlags {
    fn from(flag: StateFlag) -> Self {
        Self(flag.bits())
    }
}

impl BitOr for StateFlags {
    type Output = StateFlags;

    fn bitor(self, rhs: StateFlags) -> StateFlags {
        self.union(rhs)
    }
}

impl BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: StateFlags) {
        *self = self.union(rhs);
    }
}

impl FromIterator<StateFlag> for StateFlags {
    fn from_iter<I: IntoIterator<Item = StateFlag>>(iter: I) -> Self {
        iter.into_iter()
            .fold(StateFlags::NONE, |acc, flag| acc | flag.into())
    }
}

impl fmt::Display for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|flag| format!("{flag:?}")).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

// Authored as a list of flag names, e.g. `[stun, silence]` or `[full_control]`.
impl Serialize for StateFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for StateFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flags = Vec::<StateFlag>::deserialize(deserializer)?;
        Ok(flags.into_iter().collect())
    }
}

/// Per-holder flag registry keyed by the effect that installed them.
#[derive(Debug, Clone, Default)]
pub struct StateRegistry {
    by_source: BTreeMap<ModifierSource, StateFlags>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, source: ModifierSource, flags: StateFlags) {
        *self.by_source.entry(source).or_default() |= flags;
    }

    pub fn remove(&mut self, source: ModifierSource) -> StateFlags {
        self.by_source.remove(&source).unwrap_or_default()
    }

    pub fn current(&self) -> StateFlags {
        self.by_source
            .values()
            .fold(StateFlags::NONE, |acc, flags| acc | *flags)
    }
}
