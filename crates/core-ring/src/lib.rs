//! Bounded LRU rings for kill, delete, search, and replace storage.
//!
//! A ring is a circular list with a movable "top". Pushing inserts at the
//! top and evicts the oldest entry when the ring is at capacity; cycling
//! rotates the top pointer; deletion removes relative to the top. Entries
//! are indexed top-first, so index 0 is always the most recent (or most
//! recently rotated-to) entry.

use core_status::{EdResult, Status};
use core_value::Value;
use std::collections::VecDeque;
use tracing::debug;

/// A bounded ring of values. `max_size == 0` means unlimited.
#[derive(Debug, Default)]
pub struct Ring {
    name: &'static str,
    entries: VecDeque<Value>,
    max_size: usize,
}

impl Ring {
    pub fn new(name: &'static str, max_size: usize) -> Self {
        Self {
            name,
            entries: VecDeque::new(),
            max_size,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Insert at the top, evicting the bottom entry when full.
    pub fn push(&mut self, v: Value) {
        if self.max_size > 0 && self.entries.len() == self.max_size {
            self.entries.pop_back();
            debug!(target: "ring", ring = self.name, "evicted oldest entry");
        }
        self.entries.push_front(v);
    }

    /// Entry at relative position `n` from the top (0 = top).
    pub fn get(&self, n: usize) -> Option<&Value> {
        self.entries.get(n)
    }

    pub fn top(&self) -> Option<&Value> {
        self.entries.front()
    }

    /// Rotate the top pointer by `n` positions (positive rotates toward
    /// older entries). With `wrap` false, rotation past either end fails.
    pub fn cycle(&mut self, n: i64, wrap: bool) -> EdResult<()> {
        let len = self.entries.len();
        if len == 0 {
            return Err(Status::failure(format!("{} ring is empty", self.name)));
        }
        if !wrap && n.unsigned_abs() as usize >= len {
            return Err(Status::failure(format!(
                "Cannot cycle {} ring {} positions (have {} entries)",
                self.name, n, len
            )));
        }
        let shift = n.rem_euclid(len as i64) as usize;
        self.entries.rotate_left(shift);
        Ok(())
    }

    /// Delete the entry at relative position `n` from the top.
    pub fn delete(&mut self, n: usize) -> EdResult<Value> {
        if n >= self.entries.len() {
            return Err(Status::failure(format!(
                "No entry {} in {} ring (have {})",
                n,
                self.name,
                self.entries.len()
            )));
        }
        Ok(self.entries.remove(n).expect("index checked above"))
    }

    /// Change capacity. Shrinking below the current size is rejected; the
    /// caller must delete entries first.
    pub fn set_max(&mut self, n: usize) -> EdResult<()> {
        if n > 0 && n < self.entries.len() {
            return Err(Status::failure(format!(
                "{} ring size ({}) too small to hold current entries ({})",
                self.name,
                n,
                self.entries.len()
            )));
        }
        self.max_size = n;
        Ok(())
    }

    /// Iterate entries top-first.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter()
    }
}
