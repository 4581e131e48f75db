//! The editor context: every piece of shared editing state in one
//! explicit struct, threaded through the core instead of global
//! variables. Constructing one per process (or per test) keeps the
//! engine unit-testable without a terminal.

use core_buffer::{Buffer, BufferRegistry};
use core_config::Config;
use core_file::LineDelim;
use core_input::ExtKey;
use core_mode::{ModeId, ModeTable};
use core_ring::Ring;
use core_search::{MatchRecord, WordTable};
use core_status::{EdResult, Status};
use core_value::Value;
use std::path::PathBuf;
use tracing::debug;

/// Name of the buffer created at startup.
pub const FIRST_BUFFER: &str = "unnamed";

/// Execution limits, loaded from config and adjustable from scripts.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum iterations of one loop block; 0 = unbounded.
    pub max_loop: u32,
    /// Maximum macro recursion depth; 0 = unbounded.
    pub max_macro_depth: u32,
    /// Maximum array nesting for deep walks.
    pub max_array_depth: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_loop: 2500,
            max_macro_depth: 100,
            max_array_depth: 32,
        }
    }
}

/// Editor lifecycle points a macro can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookId {
    CreateBuf,
    ChDir,
    EnterBuf,
    ExitBuf,
    Help,
    Mode,
    PostKey,
    PreKey,
    Read,
    Filename,
    Wrap,
    Write,
}

pub const ALL_HOOKS: [HookId; 12] = [
    HookId::CreateBuf,
    HookId::ChDir,
    HookId::EnterBuf,
    HookId::ExitBuf,
    HookId::Help,
    HookId::Mode,
    HookId::PostKey,
    HookId::PreKey,
    HookId::Read,
    HookId::Filename,
    HookId::Wrap,
    HookId::Write,
];

impl HookId {
    pub fn name(self) -> &'static str {
        match self {
            HookId::CreateBuf => "createBuf",
            HookId::ChDir => "chDir",
            HookId::EnterBuf => "enterBuf",
            HookId::ExitBuf => "exitBuf",
            HookId::Help => "help",
            HookId::Mode => "mode",
            HookId::PostKey => "postKey",
            HookId::PreKey => "preKey",
            HookId::Read => "read",
            HookId::Filename => "filename",
            HookId::Wrap => "wrap",
            HookId::Write => "write",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_HOOKS.into_iter().find(|h| h.name() == name)
    }

    fn index(self) -> usize {
        ALL_HOOKS
            .iter()
            .position(|h| *h == self)
            .expect("hook listed in ALL_HOOKS")
    }
}

/// One hook binding slot.
#[derive(Debug, Default, Clone)]
pub struct HookSlot {
    /// Bound macro buffer name, if any.
    pub macro_name: Option<String>,
    /// Re-entry guard: set while the hook runs.
    pub running: bool,
}

/// Keyboard macro state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMacroState {
    #[default]
    Stopped,
    Recording,
    Playing,
}

#[derive(Debug)]
pub struct Editor {
    pub buffers: BufferRegistry,
    cur_buf: String,
    pub modes: ModeTable,
    pub kill_ring: Ring,
    pub delete_ring: Ring,
    pub search_ring: Ring,
    pub replace_ring: Ring,
    /// Buffer search/replace state.
    pub match_rec: MatchRecord,
    /// Separate record for script string matching (`=~`, `sub`, `index`).
    pub str_match: MatchRecord,
    pub word: WordTable,
    pub limits: Limits,
    pub script_dirs: Vec<PathBuf>,
    pub work_dir: PathBuf,
    hooks: [HookSlot; ALL_HOOKS.len()],
    pub key_macro: Vec<ExtKey>,
    pub key_macro_state: KeyMacroState,
    /// Delimiter overrides from the command line.
    pub input_delim: Option<LineDelim>,
    pub output_delim: Option<LineDelim>,
    /// Keystrokes remaining until auto-save (0 = disabled).
    pub auto_save: u32,
    pub auto_save_left: u32,
}

impl Editor {
    pub fn new(config: &Config) -> Self {
        let mut buffers = BufferRegistry::new();
        buffers
            .create(FIRST_BUFFER)
            .expect("first buffer name is valid");
        let rings = &config.file.rings;
        let limits = &config.file.limits;
        Self {
            buffers,
            cur_buf: FIRST_BUFFER.to_string(),
            modes: ModeTable::standard(),
            kill_ring: Ring::new("kill", rings.kill),
            delete_ring: Ring::new("delete", rings.delete),
            search_ring: Ring::new("search", rings.search),
            replace_ring: Ring::new("replace", rings.replace),
            match_rec: MatchRecord::new(),
            str_match: MatchRecord::new(),
            word: WordTable::default(),
            limits: Limits {
                max_loop: limits.max_loop,
                max_macro_depth: limits.max_macro_depth,
                max_array_depth: limits.max_array_depth,
            },
            script_dirs: core_file::script_path(None),
            work_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            hooks: Default::default(),
            key_macro: Vec::new(),
            key_macro_state: KeyMacroState::Stopped,
            input_delim: None,
            output_delim: None,
            auto_save: 0,
            auto_save_left: 0,
        }
    }

    // ------------------------------------------------------------------
    // Current buffer
    // ------------------------------------------------------------------

    pub fn current_name(&self) -> &str {
        &self.cur_buf
    }

    pub fn cur(&self) -> &Buffer {
        self.buffers
            .by_name(&self.cur_buf)
            .expect("current buffer exists")
    }

    pub fn cur_mut(&mut self) -> &mut Buffer {
        self.buffers
            .by_name_mut(&self.cur_buf)
            .expect("current buffer exists")
    }

    /// Switch the current buffer without running hooks; the script layer
    /// wraps this with `exitBuf`/`enterBuf` dispatch. Returns the name of
    /// the buffer left.
    pub fn switch_to(&mut self, name: &str) -> EdResult<String> {
        if self.buffers.find(name).is_none() {
            return Err(Status::failure(format!("No such buffer '{name}'")));
        }
        let old = std::mem::replace(&mut self.cur_buf, name.to_string());
        debug!(target: "buffer", from = %old, to = name, "switched");
        Ok(old)
    }

    /// Track a rename of the current buffer.
    pub fn rename_current(&mut self, new: &str) -> EdResult<()> {
        let old = self.cur_buf.clone();
        if self.cur().nexec() > 0 {
            return Err(Status::failure(format!(
                "Buffer '{old}' is being executed"
            )));
        }
        self.buffers.rename(&old, new)?;
        self.cur_buf = new.to_string();
        Ok(())
    }

    /// Delete a buffer; the current buffer may not be deleted out from
    /// under the editor.
    pub fn delete_buffer(&mut self, name: &str, force: bool) -> EdResult<()> {
        if name == self.cur_buf {
            return Err(Status::failure("Cannot delete the current buffer"));
        }
        if self.hooks.iter().any(|h| h.macro_name.as_deref() == Some(name)) {
            return Err(Status::failure(format!(
                "Buffer '{name}' is bound to a hook"
            )));
        }
        self.buffers.remove(name, force)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Global modes
    // ------------------------------------------------------------------

    fn global_mode(&self, name: &str) -> bool {
        self.modes
            .find(name)
            .map(|id| self.modes.global_enabled(id))
            .unwrap_or(false)
    }

    pub fn global_exact(&self) -> bool {
        self.global_mode("Exact")
    }

    pub fn global_regexp(&self) -> bool {
        self.global_mode("Regexp")
    }

    pub fn mode_safe(&self) -> bool {
        self.global_mode("Safe")
    }

    pub fn mode_bak(&self) -> bool {
        self.global_mode("Bak")
    }

    pub fn mode_aterm(&self) -> bool {
        self.global_mode("ATerm")
    }

    /// Enable or disable a global mode by name; returns evicted mode ids
    /// for mode-line refresh.
    pub fn set_global_mode(&mut self, name: &str, on: bool) -> EdResult<Vec<ModeId>> {
        let id = self
            .modes
            .find(name)
            .ok_or_else(|| Status::failure(format!("No such mode '{name}'")))?;
        if on {
            self.modes.enable_global(id)
        } else {
            self.modes.disable_global(id).map(|_| Vec::new())
        }
    }

    /// Enable or disable a buffer mode on the named buffer.
    pub fn set_buffer_mode(&mut self, buf_name: &str, mode: &str, on: bool) -> EdResult<()> {
        let id = self
            .modes
            .find(mode)
            .ok_or_else(|| Status::failure(format!("No such mode '{mode}'")))?;
        let modes = &self.modes;
        let buf = self
            .buffers
            .by_name_mut(buf_name)
            .ok_or_else(|| Status::failure(format!("No such buffer '{buf_name}'")))?;
        if on {
            modes.enable_in(&mut buf.modes, id)?;
        } else {
            modes.disable_in(&mut buf.modes, id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search and replace patterns
    // ------------------------------------------------------------------

    /// Install a search pattern and remember it on the search ring.
    pub fn install_search_pattern(&mut self, raw: &str) -> EdResult<()> {
        self.match_rec.set_pattern(raw)?;
        if self
            .search_ring
            .top()
            .and_then(|v| v.as_str().ok().map(str::to_string))
            .as_deref()
            != Some(raw)
        {
            self.search_ring.push(Value::str(raw));
        }
        Ok(())
    }

    /// Install a replacement pattern and remember it on the replace ring.
    pub fn install_replace_pattern(&mut self, raw: &str) -> EdResult<()> {
        self.match_rec.set_replacement(raw);
        if self
            .replace_ring
            .top()
            .and_then(|v| v.as_str().ok().map(str::to_string))
            .as_deref()
            != Some(raw)
        {
            self.replace_ring.push(Value::str(raw));
        }
        Ok(())
    }

    /// After cycling or deleting on the search ring, re-install the new
    /// top entry into the match record.
    pub fn set_top_search_pattern(&mut self) -> EdResult<()> {
        let top = self
            .search_ring
            .top()
            .ok_or_else(|| Status::failure("search ring is empty"))?
            .as_str()?
            .to_string();
        self.match_rec.set_pattern(&top)
    }

    pub fn set_top_replace_pattern(&mut self) -> EdResult<()> {
        let top = self
            .replace_ring
            .top()
            .ok_or_else(|| Status::failure("replace ring is empty"))?
            .as_str()?
            .to_string();
        self.match_rec.set_replacement(&top);
        Ok(())
    }

    /// Rebuild the word-character table; compiled RE programs that may
    /// reference `\w`/`\b` become stale and are invalidated.
    pub fn set_word_chars(&mut self, spec: Option<&str>) -> EdResult<()> {
        self.word = match spec {
            Some(s) => WordTable::from_spec(s)?,
            None => WordTable::default(),
        };
        self.match_rec.invalidate();
        self.str_match.invalidate();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    pub fn hook(&self, id: HookId) -> &HookSlot {
        &self.hooks[id.index()]
    }

    pub fn hook_mut(&mut self, id: HookId) -> &mut HookSlot {
        &mut self.hooks[id.index()]
    }

    /// Bind a macro buffer to a hook. The buffer must exist, be a macro,
    /// and be constrained.
    pub fn set_hook(&mut self, id: HookId, macro_name: &str) -> EdResult<()> {
        let buf = self
            .buffers
            .by_name(macro_name)
            .ok_or_else(|| Status::failure(format!("No such buffer '{macro_name}'")))?;
        if !buf.is_macro() {
            return Err(Status::failure(format!(
                "'{macro_name}' is not a macro buffer"
            )));
        }
        if !buf.flags.contains(core_buffer::BufFlags::CONSTRAIN) {
            return Err(Status::failure(format!(
                "Hook '{}' may only be bound to a constrained macro",
                id.name()
            )));
        }
        self.hooks[id.index()].macro_name = Some(macro_name.to_string());
        Ok(())
    }

    pub fn clear_hook(&mut self, id: HookId) {
        self.hooks[id.index()] = HookSlot::default();
    }

    // ------------------------------------------------------------------
    // Working directory
    // ------------------------------------------------------------------

    pub fn change_dir(&mut self, path: &std::path::Path) -> EdResult<()> {
        std::env::set_current_dir(path)
            .map_err(|e| Status::os_error(format!("Cannot chdir to '{}': {e}", path.display())))?;
        self.work_dir = std::env::current_dir().unwrap_or_else(|_| path.to_path_buf());
        Ok(())
    }
}
