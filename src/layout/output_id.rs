//! Output ids - stable identity for mountable outputs.
//!
//! An id packs four fields into 64 bits:
//!
//! ```text
//!  63                         26 25      18 17  16 15             0
//! ┌─────────────────────────────┬──────────┬──────┬────────────────┐
//! │     component type (38)     │ level(8) │ unit │  sequence (16) │
//! └─────────────────────────────┴──────────┴──────┴────────────────┘
//! ```
//!
//! Outputs sharing type, level and unit share a base id and are told apart by
//! the sequence. The calculator reuses the previous version's id for the same
//! global key and unit whenever that sequence is still free in this version,
//! so reordering keyed siblings keeps their ids.
//!
//! The unit field has two bits for five unit types: border outputs share the
//! foreground code and get distinct sequences.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::engine::ComponentTypeId;
use crate::error::{RenderError, RenderResult};

pub const TYPE_SHIFT: u32 = 26;
pub const LEVEL_SHIFT: u32 = 18;
pub const UNIT_SHIFT: u32 = 16;

pub const MAX_LEVEL: usize = 255;
pub const MAX_SEQUENCE: u32 = 65535;

/// Id of the root host. No calculated id can be zero.
pub const ROOT_HOST_ID: u64 = 0;

const SEQUENCE_MASK: u64 = 0xffff;

/// Kind of output a node contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputUnitType {
    Background,
    Content,
    Foreground,
    Border,
    Host,
}

impl OutputUnitType {
    /// Two bit code stored in the id.
    pub const fn code(self) -> u64 {
        match self {
            Self::Background => 0,
            Self::Content => 1,
            Self::Foreground | Self::Border => 2,
            Self::Host => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Content => "content",
            Self::Foreground => "foreground",
            Self::Border => "border",
            Self::Host => "host",
        }
    }
}

/// What the calculator learned about an output relative to the previous
/// version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdateState {
    /// Fresh id, nothing known; mount must diff explicitly.
    #[default]
    Unknown,
    /// Same id as before and equivalent props.
    Updated,
    /// Same id as before but props changed.
    Dirty,
}

/// Pack an id from its fields.
pub fn calculate_id(
    type_id: u64,
    level: usize,
    unit: OutputUnitType,
    sequence: u32,
) -> RenderResult<u64> {
    if level > MAX_LEVEL {
        return Err(RenderError::LevelOverflow {
            level,
            max: MAX_LEVEL,
        });
    }
    if sequence > MAX_SEQUENCE {
        return Err(RenderError::SequenceOverflow {
            base_id: base_id(type_id, level, unit),
            max: MAX_SEQUENCE,
        });
    }
    Ok(base_id(type_id, level, unit) | u64::from(sequence))
}

fn base_id(type_id: u64, level: usize, unit: OutputUnitType) -> u64 {
    (type_id << TYPE_SHIFT) | ((level as u64) << LEVEL_SHIFT) | (unit.code() << UNIT_SHIFT)
}

/// Sequence part of an id.
pub fn sequence_of(id: u64) -> u32 {
    (id & SEQUENCE_MASK) as u32
}

/// Id with the sequence cleared.
pub fn base_of(id: u64) -> u64 {
    id & !SEQUENCE_MASK
}

/// Level part of an id.
pub fn level_of(id: u64) -> usize {
    ((id >> LEVEL_SHIFT) & 0xff) as usize
}

/// Component type part of an id.
pub fn type_of(id: u64) -> u64 {
    id >> TYPE_SHIFT
}

/// Assigns ids for one layout version.
pub struct OutputIdCalculator<'a> {
    previous: Option<&'a HashMap<(String, OutputUnitType), u64>>,
    /// Sequences the previous version used per base id.
    reserved: HashMap<u64, HashSet<u32>>,
    /// Sequences handed out in this version per base id.
    used: HashMap<u64, HashSet<u32>>,
}

impl<'a> OutputIdCalculator<'a> {
    /// `previous` maps (global key, unit) to the id it had last version.
    pub fn new(previous: Option<&'a HashMap<(String, OutputUnitType), u64>>) -> Self {
        let mut reserved: HashMap<u64, HashSet<u32>> = HashMap::new();
        for &id in previous.into_iter().flat_map(|ids| ids.values()) {
            reserved.entry(base_of(id)).or_default().insert(sequence_of(id));
        }
        Self {
            previous,
            reserved,
            used: HashMap::new(),
        }
    }

    /// Id for the `unit` output of the node with `global_key`.
    ///
    /// `equivalent` is asked, with the previous id, whether the output is
    /// unchanged; it only runs when the previous id is reused.
    pub fn next_id(
        &mut self,
        global_key: &str,
        type_id: ComponentTypeId,
        level: usize,
        unit: OutputUnitType,
        equivalent: impl FnOnce(u64) -> bool,
    ) -> RenderResult<(u64, UpdateState)> {
        let base = calculate_id(type_id.value(), level, unit, 0)?;
        let used = self.used.entry(base).or_default();

        let previous_id = self
            .previous
            .and_then(|ids| ids.get(&(global_key.to_string(), unit)))
            .copied()
            .filter(|&id| base_of(id) == base && !used.contains(&sequence_of(id)));
        if let Some(id) = previous_id {
            used.insert(sequence_of(id));
            let state = if equivalent(id) {
                UpdateState::Updated
            } else {
                UpdateState::Dirty
            };
            return Ok((id, state));
        }

        let reserved = self.reserved.get(&base);
        let mut sequence: u32 = 0;
        while used.contains(&sequence) || reserved.is_some_and(|r| r.contains(&sequence)) {
            sequence += 1;
        }
        if sequence > MAX_SEQUENCE {
            return Err(RenderError::SequenceOverflow {
                base_id: base,
                max: MAX_SEQUENCE,
            });
        }
        used.insert(sequence);
        log::trace!("new {} id for {global_key}: seq {sequence}", unit.name());
        Ok((base | u64::from(sequence), UpdateState::Unknown))
    }
}
