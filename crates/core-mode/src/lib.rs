//! Named editing modes, global or per-buffer, with mutually-exclusive groups.
//!
//! A mode group holds modes that exclude one another on the same scope:
//! enabling one evicts any other group member that is enabled globally (for
//! global modes) or in the same buffer's mode set (for buffer modes). The
//! caller is told which modes were evicted so affected windows can be marked
//! for mode-line redraw.

use bitflags::bitflags;
use core_status::{EdResult, Status};
use std::collections::HashMap;
use tracing::debug;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u8 {
        /// Scope is the whole editor rather than a single buffer.
        const GLOBAL  = 1 << 0;
        /// Created by a user script (may be deleted).
        const USER    = 1 << 1;
        /// Not shown on the mode line.
        const HIDDEN  = 1 << 2;
        /// May not be toggled interactively.
        const LOCKED  = 1 << 3;
        /// Shown in the mode-line "in line" position.
        const IN_LINE = 1 << 4;
        /// Currently enabled (global modes only; buffer modes live in the
        /// buffer's mode set).
        const ENABLED = 1 << 5;
    }
}

/// Stable identifier of a registered mode.
pub type ModeId = usize;

#[derive(Debug, Clone)]
pub struct ModeSpec {
    pub name: String,
    pub desc: String,
    pub flags: ModeFlags,
    pub group: Option<String>,
}

impl ModeSpec {
    pub fn global(name: &str, desc: &str) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            flags: ModeFlags::GLOBAL,
            group: None,
        }
    }

    pub fn buffer(name: &str, desc: &str) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            flags: ModeFlags::empty(),
            group: None,
        }
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.flags |= ModeFlags::HIDDEN;
        self
    }
}

/// Set of buffer-scope modes enabled in one buffer.
#[derive(Debug, Clone, Default)]
pub struct ModeSet {
    enabled: Vec<ModeId>,
}

impl ModeSet {
    pub fn contains(&self, id: ModeId) -> bool {
        self.enabled.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.enabled.iter().copied()
    }

    fn insert(&mut self, id: ModeId) {
        if !self.enabled.contains(&id) {
            self.enabled.push(id);
        }
    }

    fn remove(&mut self, id: ModeId) -> bool {
        if let Some(pos) = self.enabled.iter().position(|&m| m == id) {
            self.enabled.remove(pos);
            true
        } else {
            false
        }
    }
}

/// Registry of all known modes and their groups.
#[derive(Debug, Default)]
pub struct ModeTable {
    specs: Vec<ModeSpec>,
    by_name: HashMap<String, ModeId>,
    groups: HashMap<String, Vec<ModeId>>,
}

impl ModeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-loaded with the built-in modes.
    pub fn standard() -> Self {
        let mut t = Self::new();
        for spec in [
            ModeSpec::global("Exact", "Case-sensitive searching"),
            ModeSpec::global("Regexp", "Regular-expression searching"),
            ModeSpec::global("ATerm", "Append line delimiter to last line on save"),
            ModeSpec::global("Bak", "Rename original to .bak on save"),
            ModeSpec::global("Safe", "Write to temporary file, then rename"),
            ModeSpec::global("RtnMsg", "Display return messages"),
            ModeSpec::buffer("Over", "Overwrite columns when typing").in_group("Typeover"),
            ModeSpec::buffer("Repl", "Replace characters when typing").in_group("Typeover"),
        ] {
            t.register(spec).expect("built-in mode names are unique");
        }
        t
    }

    pub fn register(&mut self, spec: ModeSpec) -> EdResult<ModeId> {
        if self.by_name.contains_key(&spec.name) {
            return Err(Status::failure(format!(
                "Mode '{}' already exists",
                spec.name
            )));
        }
        let id = self.specs.len();
        self.by_name.insert(spec.name.clone(), id);
        if let Some(g) = &spec.group {
            self.groups.entry(g.clone()).or_default().push(id);
        }
        self.specs.push(spec);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<ModeId> {
        self.by_name.get(name).copied()
    }

    pub fn spec(&self, id: ModeId) -> &ModeSpec {
        &self.specs[id]
    }

    pub fn is_global(&self, id: ModeId) -> bool {
        self.specs[id].flags.contains(ModeFlags::GLOBAL)
    }

    pub fn global_enabled(&self, id: ModeId) -> bool {
        self.specs[id].flags.contains(ModeFlags::ENABLED)
    }

    fn group_members(&self, id: ModeId) -> &[ModeId] {
        match &self.specs[id].group {
            Some(g) => self.groups.get(g).map(|v| v.as_slice()).unwrap_or(&[]),
            None => &[],
        }
    }

    /// Enable a global mode, evicting enabled members of its group.
    /// Returns the evicted mode ids.
    pub fn enable_global(&mut self, id: ModeId) -> EdResult<Vec<ModeId>> {
        if !self.is_global(id) {
            return Err(Status::failure(format!(
                "'{}' is not a global mode",
                self.specs[id].name
            )));
        }
        let evicted: Vec<ModeId> = self
            .group_members(id)
            .iter()
            .copied()
            .filter(|&m| m != id && self.specs[m].flags.contains(ModeFlags::ENABLED))
            .collect();
        for &m in &evicted {
            self.specs[m].flags.remove(ModeFlags::ENABLED);
            debug!(target: "mode", mode = %self.specs[m].name, "evicted by group rule");
        }
        self.specs[id].flags.insert(ModeFlags::ENABLED);
        Ok(evicted)
    }

    pub fn disable_global(&mut self, id: ModeId) -> EdResult<bool> {
        if !self.is_global(id) {
            return Err(Status::failure(format!(
                "'{}' is not a global mode",
                self.specs[id].name
            )));
        }
        let was = self.specs[id].flags.contains(ModeFlags::ENABLED);
        self.specs[id].flags.remove(ModeFlags::ENABLED);
        Ok(was)
    }

    /// Enable a buffer mode in the given set, evicting group members from
    /// that same set. Returns the evicted ids.
    pub fn enable_in(&self, set: &mut ModeSet, id: ModeId) -> EdResult<Vec<ModeId>> {
        if self.is_global(id) {
            return Err(Status::failure(format!(
                "'{}' is not a buffer mode",
                self.specs[id].name
            )));
        }
        let evicted: Vec<ModeId> = self
            .group_members(id)
            .iter()
            .copied()
            .filter(|&m| m != id && set.contains(m))
            .collect();
        for &m in &evicted {
            set.remove(m);
        }
        set.insert(id);
        Ok(evicted)
    }

    pub fn disable_in(&self, set: &mut ModeSet, id: ModeId) -> EdResult<bool> {
        if self.is_global(id) {
            return Err(Status::failure(format!(
                "'{}' is not a buffer mode",
                self.specs[id].name
            )));
        }
        Ok(set.remove(id))
    }
}
