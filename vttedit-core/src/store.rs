//! In-memory cue sequence for the open document.
//!
//! Cues are addressed by position, but every cue also carries a [`CueKey`]
//! that stays fixed for its lifetime. Views that send the key along with the
//! position get stale-address protection: if the cue at that position is no
//! longer the one they saw, the operation fails with `CueNotFound` instead
//! of touching a different cue.

use crate::error::{CoreError, Result};
use crate::time;
use crate::vtt::{Cue, CueField};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Span of a cue created by [`CueStore::insert_default`]
pub const DEFAULT_CUE_SPAN: Duration = Duration::from_secs(3);

/// Text of a cue created by [`CueStore::insert_default`]
pub const DEFAULT_CUE_TEXT: &str = "New cue";

/// Stable identity of a cue within one store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CueKey(u64);

impl std::fmt::Display for CueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of a cue as sent by a view, optionally pinned to the key the view saw there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueAddress {
    pub index: usize,
    #[serde(default)]
    pub key: Option<CueKey>,
}

impl CueAddress {
    /// Address by position alone
    #[must_use]
    pub const fn at(index: usize) -> Self {
        Self { index, key: None }
    }

    /// Address by position, valid only while `key` is still at that position
    #[must_use]
    pub const fn pinned(index: usize, key: CueKey) -> Self {
        Self {
            index,
            key: Some(key),
        }
    }
}

impl From<usize> for CueAddress {
    fn from(index: usize) -> Self {
        Self::at(index)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    key: CueKey,
    cue: Cue,
}

/// Ordered cues of one open document
#[derive(Debug, Clone, Default)]
pub struct CueStore {
    slots: Vec<Slot>,
    next_key: u64,
}

impl CueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding `cues` in order
    #[must_use]
    pub fn from_cues(cues: Vec<Cue>) -> Self {
        let mut store = Self::new();
        store.replace_all(cues);
        store
    }

    /// Replace the whole sequence, e.g. after a parse or a restore.
    /// All previously issued keys become invalid.
    pub fn replace_all(&mut self, cues: Vec<Cue>) {
        let mut slots = Vec::with_capacity(cues.len());
        for cue in cues {
            let key = self.allocate_key();
            slots.push(Slot { key, cue });
        }
        self.slots = slots;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cues in display order
    pub fn cues(&self) -> impl Iterator<Item = &Cue> {
        self.slots.iter().map(|slot| &slot.cue)
    }

    /// `(position, key, cue)` triples in display order
    pub fn entries(&self) -> impl Iterator<Item = (usize, CueKey, &Cue)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| (index, slot.key, &slot.cue))
    }

    /// Owned copy of the sequence, as persisted
    #[must_use]
    pub fn snapshot(&self) -> Vec<Cue> {
        self.cues().cloned().collect()
    }

    #[must_use]
    pub fn key_at(&self, index: usize) -> Option<CueKey> {
        self.slots.get(index).map(|slot| slot.key)
    }

    #[must_use]
    pub fn position_of(&self, key: CueKey) -> Option<usize> {
        self.slots.iter().position(|slot| slot.key == key)
    }

    /// Translate an address into a current position.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CueNotFound`] if the position is out of range or
    /// no longer holds the pinned key.
    pub fn resolve(&self, address: CueAddress) -> Result<usize> {
        let not_found = CoreError::CueNotFound {
            index: address.index,
        };

        let slot = self.slots.get(address.index).ok_or(not_found)?;
        match address.key {
            Some(key) if key != slot.key => Err(CoreError::CueNotFound {
                index: address.index,
            }),
            _ => Ok(address.index),
        }
    }

    /// # Errors
    ///
    /// Returns [`CoreError::CueNotFound`] if the address does not resolve.
    pub fn get(&self, address: impl Into<CueAddress>) -> Result<&Cue> {
        let index = self.resolve(address.into())?;
        Ok(&self.slots[index].cue)
    }

    /// Overwrite one field with raw text
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CueNotFound`] if the address does not resolve and
    /// [`CoreError::EmptyCueText`] if the text would become blank.
    pub fn update_field(
        &mut self,
        address: impl Into<CueAddress>,
        field: CueField,
        value: impl Into<String>,
    ) -> Result<()> {
        let index = self.resolve(address.into())?;
        let value = value.into();
        if field == CueField::Text {
            require_text(index, &value)?;
        }
        self.slots[index].cue.set_field(field, value);
        Ok(())
    }

    /// Replace the cue at an address wholesale, keeping its key
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CueNotFound`] if the address does not resolve and
    /// [`CoreError::EmptyCueText`] if the new cue has no text.
    pub fn replace(&mut self, address: impl Into<CueAddress>, cue: Cue) -> Result<()> {
        let index = self.resolve(address.into())?;
        require_text(index, &cue.text)?;
        self.slots[index].cue = cue;
        Ok(())
    }

    /// Append a cue starting at `reference` with the default span and text.
    /// Returns the new cue's position and key.
    pub fn insert_default(&mut self, reference: Duration) -> (usize, CueKey) {
        self.insert_default_with(reference, DEFAULT_CUE_SPAN, DEFAULT_CUE_TEXT)
    }

    /// Append a cue starting at `reference` lasting `span`, labelled with its
    /// 1-based sequence number.
    pub fn insert_default_with(
        &mut self,
        reference: Duration,
        span: Duration,
        text: &str,
    ) -> (usize, CueKey) {
        let index = self.slots.len();
        let cue = Cue::new(
            (index + 1).to_string(),
            time::format(reference),
            time::format(reference.saturating_add(span)),
            text,
        );
        let key = self.allocate_key();
        self.slots.push(Slot { key, cue });
        (index, key)
    }

    /// Remove a cue; later cues shift down one position
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CueNotFound`] if the address does not resolve.
    pub fn delete(&mut self, address: impl Into<CueAddress>) -> Result<Cue> {
        let index = self.resolve(address.into())?;
        Ok(self.slots.remove(index).cue)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Positions of cues whose time range contains `position`
    #[must_use]
    pub fn active_at(&self, position: Duration) -> Vec<usize> {
        self.entries()
            .filter(|(_, _, cue)| cue.contains(position))
            .map(|(index, _, _)| index)
            .collect()
    }

    fn allocate_key(&mut self) -> CueKey {
        let key = CueKey(self.next_key);
        self.next_key += 1;
        key
    }
}

// A blank cue would not survive an export and re-parse
fn require_text(index: usize, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(CoreError::EmptyCueText { index });
    }
    Ok(())
}
