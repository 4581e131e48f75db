//! The buffer registry: an ordered array keyed by name, searched with
//! binary search. Creation keeps the array sorted; renames re-insert.

use crate::{Buffer, MACRO_SIGIL, MacroInfo, auto_unique_name, valid_buffer_name};
use core_status::{EdResult, Status};
use tracing::debug;

#[derive(Debug, Default)]
pub struct BufferRegistry {
    bufs: Vec<Buffer>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.bufs.iter()
    }

    /// Index of the named buffer, if it exists.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.bufs
            .binary_search_by(|b| b.name().cmp(name))
            .ok()
    }

    pub fn get(&self, idx: usize) -> &Buffer {
        &self.bufs[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Buffer {
        &mut self.bufs[idx]
    }

    pub fn by_name(&self, name: &str) -> Option<&Buffer> {
        self.find(name).map(|i| &self.bufs[i])
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Buffer> {
        match self.find(name) {
            Some(i) => Some(&mut self.bufs[i]),
            None => None,
        }
    }

    /// Create a buffer with exactly this name; error if it exists or the
    /// name is invalid. Macro names grow a `MacroInfo` record.
    pub fn create(&mut self, name: &str) -> EdResult<usize> {
        if !valid_buffer_name(name) {
            return Err(Status::failure(format!("Invalid buffer name '{name}'")));
        }
        match self.bufs.binary_search_by(|b| b.name().cmp(name)) {
            Ok(_) => Err(Status::failure(format!("Buffer '{name}' already exists"))),
            Err(pos) => {
                let mut buf = Buffer::new(name);
                if name.starts_with(MACRO_SIGIL) {
                    buf.macro_info = Some(MacroInfo::default());
                }
                self.bufs.insert(pos, buf);
                debug!(target: "buffer", buffer = name, "created");
                Ok(pos)
            }
        }
    }

    /// Create with a uniquified variant of `base` if the name is taken.
    /// Returns the index of the new buffer.
    pub fn create_unique(&mut self, base: &str) -> EdResult<usize> {
        let name = auto_unique_name(base, |n| self.find(n).is_some());
        self.create(&name)
    }

    /// Find an existing buffer or create it. Returns `(index, created)`.
    pub fn find_or_create(&mut self, name: &str) -> EdResult<(usize, bool)> {
        match self.find(name) {
            Some(i) => Ok((i, false)),
            None => Ok((self.create(name)?, true)),
        }
    }

    /// Remove a buffer, enforcing the deletion preconditions. With `force`,
    /// unsaved changes are discarded (display/execution/alias pins still
    /// block deletion).
    pub fn remove(&mut self, name: &str, force: bool) -> EdResult<Buffer> {
        let idx = self
            .find(name)
            .ok_or_else(|| Status::failure(format!("No such buffer '{name}'")))?;
        {
            let b = &self.bufs[idx];
            if b.nwind > 0 {
                return Err(Status::failure(format!(
                    "Buffer '{name}' is being displayed"
                )));
            }
            if b.nexec() > 0 {
                return Err(Status::failure(format!(
                    "Buffer '{name}' is being executed"
                )));
            }
            if b.nalias > 0 {
                return Err(Status::failure(format!(
                    "Buffer '{name}' has {} alias(es)",
                    b.nalias
                )));
            }
            if !force && b.flags.contains(crate::BufFlags::CHANGED) {
                return Err(Status::cancelled());
            }
        }
        debug!(target: "buffer", buffer = name, "deleted");
        Ok(self.bufs.remove(idx))
    }

    /// Rename a buffer, keeping the registry sorted. A running macro
    /// buffer may not be renamed; macro names must keep the sigil rule.
    pub fn rename(&mut self, old: &str, new: &str) -> EdResult<usize> {
        if !valid_buffer_name(new) {
            return Err(Status::failure(format!("Invalid buffer name '{new}'")));
        }
        if self.find(new).is_some() {
            return Err(Status::failure(format!("Buffer '{new}' already exists")));
        }
        let idx = self
            .find(old)
            .ok_or_else(|| Status::failure(format!("No such buffer '{old}'")))?;
        if self.bufs[idx].nexec() > 0 {
            return Err(Status::failure(format!(
                "Buffer '{old}' is being executed"
            )));
        }
        if self.bufs[idx].is_macro() && !new.starts_with(MACRO_SIGIL) {
            return Err(Status::failure(format!(
                "Macro buffer name '{new}' must begin with '{MACRO_SIGIL}'"
            )));
        }
        let mut buf = self.bufs.remove(idx);
        buf.set_name(new.to_string());
        let pos = match self.bufs.binary_search_by(|b| b.name().cmp(new)) {
            Err(p) => p,
            Ok(_) => unreachable!("collision checked above"),
        };
        self.bufs.insert(pos, buf);
        debug!(target: "buffer", from = old, to = new, "renamed");
        Ok(pos)
    }
}
