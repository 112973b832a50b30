//! Protocol template store.
//!
//! A protocol is a named list of treatment steps keyed by day offset.
//! The store is the only mutation path for protocols, so the step
//! invariants (unique offsets, ascending order, non-blank text) hold for
//! every protocol it hands out.

use crate::{Error, Protocol, ProtocolId, Result, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Owned collection of protocol templates keyed by id.
///
/// Serialized as a plain `{ id: { name, steps } }` map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<ProtocolId, Protocol>",
    into = "BTreeMap<ProtocolId, Protocol>"
)]
pub struct ProtocolStore {
    protocols: BTreeMap<ProtocolId, Protocol>,
}

/// Trimmed text, or `EmptyInput` naming the field
pub(crate) fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyInput(field));
    }
    Ok(trimmed)
}

impl ProtocolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty protocol and return its id
    pub fn create(&mut self, name: &str) -> Result<ProtocolId> {
        let name = required("protocol name", name)?;

        let mut id = ProtocolId::generate();
        while self.protocols.contains_key(&id) {
            id = ProtocolId::generate();
        }

        self.protocols.insert(
            id.clone(),
            Protocol {
                id: id.clone(),
                name: name.to_string(),
                steps: Vec::new(),
            },
        );
        tracing::debug!("Created protocol {} ({})", id, name);
        Ok(id)
    }

    /// Add a step, keeping the steps sorted by day offset
    pub fn add_step(
        &mut self,
        id: &ProtocolId,
        day_offset: i32,
        hormone_name: &str,
        dosage: &str,
        note: Option<&str>,
    ) -> Result<Step> {
        let protocol = self.get_mut(id)?;
        let hormone_name = required("hormone name", hormone_name)?;
        let dosage = required("dosage", dosage)?;

        let position = match protocol
            .steps
            .binary_search_by_key(&day_offset, |s| s.day_offset)
        {
            Ok(_) => {
                return Err(Error::DuplicateKey(format!(
                    "day {} already defined in protocol {}",
                    day_offset, id
                )))
            }
            Err(pos) => pos,
        };

        let step = Step {
            day_offset,
            hormone_name: hormone_name.to_string(),
            dosage: dosage.to_string(),
            note: note.map(str::trim).unwrap_or_default().to_string(),
        };
        protocol.steps.insert(position, step.clone());
        tracing::debug!("Added day {} step to protocol {}", day_offset, id);
        Ok(step)
    }

    /// Remove the step at `day_offset`; absent offsets are a no-op
    pub fn remove_step(&mut self, id: &ProtocolId, day_offset: i32) -> Result<Option<Step>> {
        let protocol = self.get_mut(id)?;
        let removed = protocol
            .steps
            .iter()
            .position(|s| s.day_offset == day_offset)
            .map(|pos| protocol.steps.remove(pos));
        if removed.is_some() {
            tracing::debug!("Removed day {} step from protocol {}", day_offset, id);
        }
        Ok(removed)
    }

    /// Remove a protocol definition. Existing assignments keep their snapshot.
    pub fn delete(&mut self, id: &ProtocolId) -> Result<Protocol> {
        let removed = self
            .protocols
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("protocol {}", id)))?;
        tracing::debug!("Deleted protocol {}", id);
        Ok(removed)
    }

    pub fn get(&self, id: &ProtocolId) -> Result<&Protocol> {
        self.protocols
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("protocol {}", id)))
    }

    fn get_mut(&mut self, id: &ProtocolId) -> Result<&mut Protocol> {
        self.protocols
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("protocol {}", id)))
    }

    /// All protocols ordered by name, then id
    pub fn list(&self) -> Vec<&Protocol> {
        let mut protocols: Vec<_> = self.protocols.values().collect();
        protocols.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        protocols
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

impl Protocol {
    /// Display label with the step count, e.g. `Ovsynch (3 steps)`
    pub fn summary(&self) -> String {
        let noun = if self.steps.len() == 1 { "step" } else { "steps" };
        format!("{} ({} {})", self.name, self.steps.len(), noun)
    }
}

impl TryFrom<BTreeMap<ProtocolId, Protocol>> for ProtocolStore {
    type Error = Error;

    fn try_from(mut protocols: BTreeMap<ProtocolId, Protocol>) -> Result<Self> {
        for (key, protocol) in protocols.iter_mut() {
            if protocol.id.as_str().is_empty() {
                protocol.id = key.clone();
            } else if &protocol.id != key {
                return Err(Error::State(format!(
                    "protocol stored under {} claims id {}",
                    key, protocol.id
                )));
            }
            required("protocol name", &protocol.name)?;

            protocol.steps.sort_by_key(|s| s.day_offset);
            for step in &protocol.steps {
                required("hormone name", &step.hormone_name)?;
                required("dosage", &step.dosage)?;
            }
            if let Some(pair) = protocol
                .steps
                .windows(2)
                .find(|pair| pair[0].day_offset == pair[1].day_offset)
            {
                return Err(Error::DuplicateKey(format!(
                    "day {} defined twice in protocol {}",
                    pair[0].day_offset, key
                )));
            }
        }
        Ok(Self { protocols })
    }
}

impl From<ProtocolStore> for BTreeMap<ProtocolId, Protocol> {
    fn from(store: ProtocolStore) -> Self {
        store.protocols
    }
}
