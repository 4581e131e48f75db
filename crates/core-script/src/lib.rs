//! The script interpreter: lexer, expression evaluator, variables,
//! pre-processor, and the level-stack statement executor.
//!
//! An [`Interp`] owns the [`Editor`] context plus everything scripts can
//! reach: global and local user variables, the macro invocation frame
//! stack, and the alias table. Execution is strictly single-threaded;
//! macro re-entrancy is bounded by the per-buffer `nexec` counters and
//! the configured recursion limit.

use core_editor::Editor;
use core_search::QueryResponder;
use core_status::{EdResult, Status};
use core_value::Value;
use std::collections::HashMap;
use std::path::PathBuf;

pub mod exec;
pub mod expr;
pub mod funcs;
pub mod lexer;
pub mod preproc;
pub mod token;
pub mod var;

pub use exec::exec_hook;
pub use preproc::preprocess;

/// Sentinel integer meaning "no n argument" (`defn`).
pub const DEFN: i64 = i64::MIN;

/// One macro invocation frame.
#[derive(Debug)]
pub struct ScriptFrame {
    /// Path of the script file being executed, if any.
    pub path: Option<PathBuf>,
    /// Buffer being executed.
    pub buf_name: String,
    /// The `n` argument (`None` = defaulted).
    pub narg: Option<i64>,
    /// Positional arguments (`$1`...).
    pub args: Vec<Value>,
    /// Local-variable stack length at entry; locals above this are
    /// rewound on exit.
    pub local_head: usize,
}

#[derive(Debug, Clone)]
pub struct UserVar {
    pub name: String,
    pub value: Value,
}

pub struct Interp {
    pub ed: Editor,
    /// Global user variables (`$name`).
    pub globals: Vec<UserVar>,
    /// Local user variables, stacked across macro invocations.
    pub locals: Vec<UserVar>,
    pub frames: Vec<ScriptFrame>,
    /// Alias name -> target callable name.
    pub aliases: HashMap<String, String>,
    /// Most recent `message`/success text.
    pub last_message: Option<String>,
    /// Query-replace prompt driver (terminal UI or test script).
    pub responder: Option<Box<dyn QueryResponder>>,
    /// Terminal width used for prompt truncation.
    pub term_cols: usize,
}

impl Interp {
    pub fn new(ed: Editor) -> Self {
        Self {
            ed,
            globals: Vec::new(),
            locals: Vec::new(),
            frames: Vec::new(),
            aliases: HashMap::new(),
            last_message: None,
            responder: None,
            term_cols: 80,
        }
    }

    pub fn current_frame(&self) -> Option<&ScriptFrame> {
        self.frames.last()
    }

    /// Execute a single command line (an expression statement).
    pub fn exec_line(&mut self, line: &str) -> EdResult<Value> {
        let mut lx = lexer::Lexer::new(line, None)?;
        let v = expr::eval_statement(self, &mut lx, true)?;
        lx.expect_end()?;
        Ok(v)
    }

    /// Execute a named macro buffer with arguments.
    pub fn exec_buffer_by_name(
        &mut self,
        name: &str,
        n: Option<i64>,
        args: Vec<Value>,
    ) -> EdResult<Value> {
        exec::exec_buffer(self, name, n, args, None)
    }

    /// Load a script file into a hidden buffer and execute it.
    pub fn exec_file(&mut self, path: &std::path::Path, n: Option<i64>) -> EdResult<Value> {
        let name = format!(
            "{}exec-{}",
            core_buffer::MACRO_SIGIL,
            core_buffer::name_from_filename(path)
        );
        let idx = match self.ed.buffers.find(&name) {
            Some(i) => i,
            None => self.ed.buffers.create_unique(&name)?,
        };
        let buf_name = self.ed.buffers.get(idx).name().to_string();
        {
            let buf = self.ed.buffers.get_mut(idx);
            core_file::read_into(buf, path, core_file::ReadOptions {
                must_exist: true,
                delim: None,
            })?;
            buf.flags |= core_buffer::BufFlags::HIDDEN;
            // Contents were replaced wholesale; stale loop blocks are gone.
            buf.flags -= core_buffer::BufFlags::PREPROC;
        }
        exec::exec_buffer(self, &buf_name, n, Vec::new(), Some(path.to_path_buf()))
    }

    /// Locate a script by name along the search path and execute it.
    pub fn exec_script(&mut self, name: &str, n: Option<i64>) -> EdResult<Value> {
        let path = core_file::find_script(name, &self.ed.script_dirs)
            .ok_or_else(|| Status::failure(format!("Script file '{name}' not found")))?;
        self.exec_file(&path, n)
    }

    /// What a bare identifier resolves to in call position.
    pub fn lookup_callable(&self, name: &str) -> Option<Callable> {
        // One level of alias indirection.
        let target = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        if let Some(spec) = funcs::lookup(target) {
            return Some(Callable::Builtin(spec));
        }
        let macro_name = format!("{}{target}", core_buffer::MACRO_SIGIL);
        if self.ed.buffers.find(&macro_name).is_some() {
            return Some(Callable::MacroBuf(macro_name));
        }
        None
    }

    /// True if `name` collides with a command, function, alias, or macro
    /// (user-variable creation must not shadow them).
    pub fn name_in_use(&self, name: &str) -> bool {
        self.lookup_callable(name).is_some()
    }
}

/// A resolved callable.
pub enum Callable {
    Builtin(&'static funcs::CmdSpec),
    MacroBuf(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;

    fn interp() -> Interp {
        Interp::new(Editor::new(&Config::default()))
    }

    #[test]
    fn exec_line_evaluates_expression() {
        let mut it = interp();
        let v = it.exec_line("1 + 2 * 3").unwrap();
        assert_eq!(v, Value::Int(7));
    }

    #[test]
    fn lookup_resolves_builtins_and_aliases() {
        let mut it = interp();
        assert!(matches!(it.lookup_callable("length"), Some(Callable::Builtin(_))));
        it.aliases.insert("len".into(), "length".into());
        assert!(matches!(it.lookup_callable("len"), Some(Callable::Builtin(_))));
        assert!(it.lookup_callable("noSuchThing").is_none());
    }
}
