//! Variable resolution: system variables with side-effectful setters,
//! global (`$name`) and local user variables, and macro positional
//! arguments (`$N`, with `$0` bound to the `n` argument).

use crate::{Interp, UserVar};
use bitflags::bitflags;
use core_buffer::Point;
use core_input::{keys_to_string, string_to_keys};
use core_status::{EdResult, Status};
use core_value::Value;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SvFlags: u8 {
        const RD_ONLY = 1 << 0;
        /// Value must be an integer.
        const INT     = 1 << 1;
        /// Value must be a single character (one-byte string or int).
        const CHAR    = 1 << 2;
        /// nil is an accepted value.
        const NIL_OK  = 1 << 3;
        /// Arrays are accepted.
        const ARRAY   = 1 << 4;
    }
}

/// The closed system-variable enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysVar {
    AutoSave,
    BufFile,
    BufList,
    BufName,
    DelRingSize,
    KeyMacro,
    KillRingSize,
    LineChar,
    LineNum,
    LineOffset,
    LineText,
    Match,
    MaxArrayDepth,
    MaxLoop,
    MaxMacroDepth,
    ReplacePat,
    ReplaceRingSize,
    SearchPat,
    SearchRingSize,
    WordChars,
    WorkDir,
}

pub struct SysVarInfo {
    pub name: &'static str,
    pub var: SysVar,
    pub flags: SvFlags,
}

/// Name table, kept sorted for display purposes.
pub const SYS_VARS: &[SysVarInfo] = &[
    SysVarInfo {
        name: "autoSave",
        var: SysVar::AutoSave,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "bufFile",
        var: SysVar::BufFile,
        flags: SvFlags::NIL_OK,
    },
    SysVarInfo {
        name: "bufList",
        var: SysVar::BufList,
        flags: SvFlags::RD_ONLY.union(SvFlags::ARRAY),
    },
    SysVarInfo {
        name: "bufname",
        var: SysVar::BufName,
        flags: SvFlags::empty(),
    },
    SysVarInfo {
        name: "delRingSize",
        var: SysVar::DelRingSize,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "keyMacro",
        var: SysVar::KeyMacro,
        flags: SvFlags::empty(),
    },
    SysVarInfo {
        name: "killRingSize",
        var: SysVar::KillRingSize,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "lineChar",
        var: SysVar::LineChar,
        flags: SvFlags::INT.union(SvFlags::CHAR),
    },
    SysVarInfo {
        name: "lineNum",
        var: SysVar::LineNum,
        flags: SvFlags::RD_ONLY.union(SvFlags::INT),
    },
    SysVarInfo {
        name: "lineOffset",
        var: SysVar::LineOffset,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "lineText",
        var: SysVar::LineText,
        flags: SvFlags::empty(),
    },
    SysVarInfo {
        name: "match",
        var: SysVar::Match,
        flags: SvFlags::RD_ONLY.union(SvFlags::NIL_OK),
    },
    SysVarInfo {
        name: "maxArrayDepth",
        var: SysVar::MaxArrayDepth,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "maxLoop",
        var: SysVar::MaxLoop,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "maxMacroDepth",
        var: SysVar::MaxMacroDepth,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "replacePat",
        var: SysVar::ReplacePat,
        flags: SvFlags::empty(),
    },
    SysVarInfo {
        name: "replaceRingSize",
        var: SysVar::ReplaceRingSize,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "searchPat",
        var: SysVar::SearchPat,
        flags: SvFlags::empty(),
    },
    SysVarInfo {
        name: "searchRingSize",
        var: SysVar::SearchRingSize,
        flags: SvFlags::INT,
    },
    SysVarInfo {
        name: "wordChars",
        var: SysVar::WordChars,
        flags: SvFlags::NIL_OK,
    },
    SysVarInfo {
        name: "workDir",
        var: SysVar::WorkDir,
        flags: SvFlags::empty(),
    },
];

pub fn find_sys_var(name: &str) -> Option<&'static SysVarInfo> {
    SYS_VARS.iter().find(|s| s.name == name)
}

/// A resolved variable reference, carrying enough state to read or write
/// later.
#[derive(Debug, Clone)]
pub enum VarRef {
    Local(String),
    Global(String),
    Sys(SysVar),
    /// Positional macro argument; 0 is the `n` argument.
    MacroArg(usize),
    ArrayElem {
        array: core_value::ArrayHandle,
        index: usize,
    },
}

/// Access intent for name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarOp {
    Read,
    Write,
}

/// Resolve a `$`-prefixed name: system variable first, then global user
/// variable (created on write).
pub fn find_dollar_var(interp: &Interp, name: &str, op: VarOp) -> EdResult<VarRef> {
    if let Some(info) = find_sys_var(name) {
        return Ok(VarRef::Sys(info.var));
    }
    if interp.globals.iter().any(|v| v.name == name) {
        return Ok(VarRef::Global(name.to_string()));
    }
    match op {
        VarOp::Write => Ok(VarRef::Global(name.to_string())),
        VarOp::Read => Err(Status::failure(format!("No such variable, ${name}"))),
    }
}

/// Resolve a bare identifier as a local user variable (created on write;
/// creation must not shadow a callable name).
pub fn find_local_var(interp: &Interp, name: &str, op: VarOp) -> EdResult<VarRef> {
    if interp.locals.iter().any(|v| v.name == name) {
        return Ok(VarRef::Local(name.to_string()));
    }
    match op {
        VarOp::Write => {
            if interp.name_in_use(name) {
                Err(Status::failure(format!(
                    "Name '{name}' already in use as a command, function, alias, or macro"
                )))
            } else {
                Ok(VarRef::Local(name.to_string()))
            }
        }
        VarOp::Read => Err(Status::failure(format!("No such variable, {name}"))),
    }
}

/// Resolve `$N`.
pub fn find_macro_arg(interp: &Interp, n: usize) -> EdResult<VarRef> {
    let frame = interp
        .current_frame()
        .ok_or_else(|| Status::failure(format!("Argument reference ${n} outside a macro")))?;
    if n > frame.args.len() {
        return Err(Status::failure(format!(
            "No such macro argument, ${n} (have {})",
            frame.args.len()
        )));
    }
    Ok(VarRef::MacroArg(n))
}

pub fn read_var(interp: &mut Interp, vref: &VarRef) -> EdResult<Value> {
    match vref {
        VarRef::Local(name) => Ok(interp
            .locals
            .iter()
            .rev()
            .find(|v| &v.name == name)
            .map(|v| v.value.clone())
            .unwrap_or(Value::Nil)),
        VarRef::Global(name) => Ok(interp
            .globals
            .iter()
            .find(|v| &v.name == name)
            .map(|v| v.value.clone())
            .unwrap_or(Value::Nil)),
        VarRef::Sys(var) => get_svar(interp, *var),
        VarRef::MacroArg(0) => Ok(interp
            .current_frame()
            .and_then(|f| f.narg)
            .map(Value::Int)
            .unwrap_or(Value::Nil)),
        VarRef::MacroArg(n) => Ok(interp
            .current_frame()
            .and_then(|f| f.args.get(n - 1).cloned())
            .unwrap_or(Value::Nil)),
        VarRef::ArrayElem { array, index } => Ok(array.get(*index).unwrap_or(Value::Nil)),
    }
}

pub fn write_var(interp: &mut Interp, vref: &VarRef, value: Value) -> EdResult<()> {
    match vref {
        VarRef::Local(name) => {
            if let Some(slot) = interp.locals.iter_mut().rev().find(|v| &v.name == name) {
                slot.value = value;
            } else {
                interp.locals.push(UserVar {
                    name: name.clone(),
                    value,
                });
            }
            Ok(())
        }
        VarRef::Global(name) => {
            if let Some(slot) = interp.globals.iter_mut().find(|v| &v.name == name) {
                slot.value = value;
            } else {
                interp.globals.push(UserVar {
                    name: name.clone(),
                    value,
                });
            }
            Ok(())
        }
        VarRef::Sys(var) => put_svar(interp, *var, value),
        VarRef::MacroArg(_) => Err(Status::failure("Macro arguments are read-only")),
        VarRef::ArrayElem { array, index } => array.set(*index, value),
    }
}

// ---------------------------------------------------------------------
// System variable readers
// ---------------------------------------------------------------------

fn get_svar(interp: &mut Interp, var: SysVar) -> EdResult<Value> {
    let ed = &interp.ed;
    Ok(match var {
        SysVar::AutoSave => Value::Int(ed.auto_save as i64),
        SysVar::BufFile => ed
            .cur()
            .filename
            .as_ref()
            .map(|p| Value::str(p.to_string_lossy()))
            .unwrap_or(Value::Nil),
        SysVar::BufList => Value::array(
            ed.buffers
                .iter()
                .map(|b| Value::str(b.name()))
                .collect::<Vec<_>>(),
        ),
        SysVar::BufName => Value::str(ed.current_name()),
        SysVar::DelRingSize => Value::Int(ed.delete_ring.max_size() as i64),
        SysVar::KeyMacro => {
            if ed.key_macro_state == core_editor::KeyMacroState::Recording {
                return Err(Status::failure(
                    "Cannot access '$keyMacro' while recording, cancelled",
                ));
            }
            Value::str(keys_to_string(&ed.key_macro)?)
        }
        SysVar::KillRingSize => Value::Int(ed.kill_ring.max_size() as i64),
        SysVar::LineChar => {
            let buf = ed.cur();
            let c = match buf.byte_at(buf.point) {
                Some(b) => b as i64,
                None => {
                    if buf.next_line(buf.point.line).is_some() {
                        b'\n' as i64
                    } else {
                        0
                    }
                }
            };
            Value::Int(c)
        }
        SysVar::LineNum => Value::Int(ed.cur().line_number(ed.cur().point.line) as i64),
        SysVar::LineOffset => Value::Int(ed.cur().point.off as i64),
        SysVar::LineText => {
            let buf = ed.cur();
            Value::str(String::from_utf8_lossy(buf.line_text(buf.point.line)))
        }
        SysVar::Match => match ed.match_rec.last_match() {
            Some(m) => Value::str(m),
            None => Value::Nil,
        },
        SysVar::MaxArrayDepth => Value::Int(ed.limits.max_array_depth as i64),
        SysVar::MaxLoop => Value::Int(ed.limits.max_loop as i64),
        SysVar::MaxMacroDepth => Value::Int(ed.limits.max_macro_depth as i64),
        SysVar::ReplacePat => Value::str(ed.match_rec.replacement()),
        SysVar::ReplaceRingSize => Value::Int(ed.replace_ring.max_size() as i64),
        SysVar::SearchPat => Value::str(ed.match_rec.raw_pattern()),
        SysVar::SearchRingSize => Value::Int(ed.search_ring.max_size() as i64),
        SysVar::WordChars => Value::str(word_chars_spec(&ed.word)),
        SysVar::WorkDir => Value::str(ed.work_dir.to_string_lossy()),
    })
}

/// Render the word table back into a compact `a-z` range specification.
fn word_chars_spec(word: &core_search::WordTable) -> String {
    let mut out = String::new();
    let mut run: Option<(u8, u8)> = None;
    for b in 0u8..=255 {
        if word.is_word(b) {
            run = match run {
                Some((start, _)) => Some((start, b)),
                None => Some((b, b)),
            };
        } else if let Some((start, end)) = run.take() {
            push_run(&mut out, start, end);
        }
    }
    if let Some((start, end)) = run {
        push_run(&mut out, start, end);
    }
    out
}

fn push_run(out: &mut String, start: u8, end: u8) {
    out.push(start as char);
    if end > start {
        if end - start > 1 {
            out.push('-');
        }
        out.push(end as char);
    }
}

// ---------------------------------------------------------------------
// System variable writers (the side-effectful ones)
// ---------------------------------------------------------------------

fn int_arg(info_name: &str, v: &Value) -> EdResult<i64> {
    v.as_int()
        .map_err(|_| Status::failure(format!("${info_name} requires an integer value")))
}

fn put_svar(interp: &mut Interp, var: SysVar, value: Value) -> EdResult<()> {
    match var {
        SysVar::AutoSave => {
            let n = int_arg("autoSave", &value)?.max(0) as u32;
            let ed = &mut interp.ed;
            if n == 0 {
                ed.auto_save = 0;
                ed.auto_save_left = 0;
            } else {
                // Scale the remaining keystroke count to the new trigger.
                ed.auto_save_left = if ed.auto_save == 0 {
                    n
                } else {
                    ((ed.auto_save_left as u64 * n as u64 / ed.auto_save as u64) as u32).max(1)
                };
                ed.auto_save = n;
            }
            Ok(())
        }
        SysVar::BufFile => {
            interp.ed.cur_mut().filename = match value {
                Value::Nil => None,
                v => Some(std::path::PathBuf::from(v.as_str()?)),
            };
            Ok(())
        }
        SysVar::BufName => {
            let new = value.as_str()?.to_string();
            interp.ed.rename_current(&new)
        }
        SysVar::DelRingSize => {
            let n = int_arg("delRingSize", &value)?.max(0) as usize;
            interp.ed.delete_ring.set_max(n)
        }
        SysVar::KeyMacro => {
            let ed = &mut interp.ed;
            if ed.key_macro_state != core_editor::KeyMacroState::Stopped {
                return Err(Status::failure(
                    "Cannot set '$keyMacro' while recording or playing, cancelled",
                ));
            }
            ed.key_macro = string_to_keys(value.as_str()?)?;
            Ok(())
        }
        SysVar::KillRingSize => {
            let n = int_arg("killRingSize", &value)?.max(0) as usize;
            interp.ed.kill_ring.set_max(n)
        }
        SysVar::LineChar => {
            let c = match &value {
                Value::Int(n) => {
                    u8::try_from(*n).map_err(|_| Status::failure("Character value out of range"))?
                }
                Value::Str(s) if s.len() == 1 => s.as_bytes()[0],
                _ => return Err(Status::failure("$lineChar requires a character value")),
            };
            let buf = interp.ed.cur_mut();
            let at = buf.point;
            if at.off >= buf.line_len(at.line) {
                return Err(Status::failure("No character at point to replace"));
            }
            buf.delete(at, 1)?;
            buf.insert(at, &[c])?;
            buf.point = at;
            Ok(())
        }
        SysVar::LineOffset => {
            let n = int_arg("lineOffset", &value)?;
            let buf = interp.ed.cur_mut();
            let len = buf.line_len(buf.point.line) as i64;
            if n < 0 || n > len {
                return Err(Status::failure(format!(
                    "Line offset {n} out of range (0-{len})"
                )));
            }
            buf.point.off = n as usize;
            Ok(())
        }
        SysVar::LineText => {
            let text = value.as_str()?.to_string();
            let buf = interp.ed.cur_mut();
            let line = buf.point.line;
            let len = buf.line_len(line);
            if len > 0 {
                buf.delete(Point::new(line, 0), len)?;
            }
            if !text.is_empty() {
                buf.insert(Point::new(line, 0), text.as_bytes())?;
            }
            let end = buf.line_len(line);
            if buf.point.off > end {
                buf.point.off = end;
            }
            Ok(())
        }
        SysVar::MaxArrayDepth => {
            interp.ed.limits.max_array_depth =
                int_arg("maxArrayDepth", &value)?.max(0) as u32;
            Ok(())
        }
        SysVar::MaxLoop => {
            interp.ed.limits.max_loop = int_arg("maxLoop", &value)?.max(0) as u32;
            Ok(())
        }
        SysVar::MaxMacroDepth => {
            interp.ed.limits.max_macro_depth =
                int_arg("maxMacroDepth", &value)?.max(0) as u32;
            Ok(())
        }
        SysVar::ReplacePat => interp.ed.install_replace_pattern(value.as_str()?),
        SysVar::ReplaceRingSize => {
            let n = int_arg("replaceRingSize", &value)?.max(0) as usize;
            interp.ed.replace_ring.set_max(n)
        }
        SysVar::SearchPat => interp.ed.install_search_pattern(value.as_str()?),
        SysVar::SearchRingSize => {
            let n = int_arg("searchRingSize", &value)?.max(0) as usize;
            interp.ed.search_ring.set_max(n)
        }
        SysVar::WordChars => match value {
            Value::Nil => interp.ed.set_word_chars(None),
            v => {
                let spec = v.as_str()?.to_string();
                if spec.is_empty() {
                    interp.ed.set_word_chars(None)
                } else {
                    interp.ed.set_word_chars(Some(&spec))
                }
            }
        },
        SysVar::WorkDir => {
            let dir = value.as_str()?.to_string();
            interp.ed.change_dir(std::path::Path::new(&dir))
        }
        SysVar::BufList | SysVar::LineNum | SysVar::Match => Err(Status::failure(format!(
            "Variable '${}' is read-only",
            SYS_VARS
                .iter()
                .find(|i| i.var == var)
                .map(|i| i.name)
                .unwrap_or("?")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;
    use core_editor::Editor;

    fn interp() -> Interp {
        Interp::new(Editor::new(&Config::default()))
    }

    #[test]
    fn sys_var_table_is_consistent() {
        for info in SYS_VARS {
            assert_eq!(find_sys_var(info.name).map(|i| i.var), Some(info.var));
        }
        assert!(find_sys_var("nope").is_none());
    }

    #[test]
    fn line_text_setter_replaces_line() {
        let mut it = interp();
        let first = it.ed.cur().first_line();
        it.ed
            .cur_mut()
            .insert(Point::new(first, 0), b"old line")
            .unwrap();
        it.ed.cur_mut().point.off = 8;
        write_var(&mut it, &VarRef::Sys(SysVar::LineText), Value::str("new")).unwrap();
        assert_eq!(it.ed.cur().contents(), "new");
        assert_eq!(it.ed.cur().point.off, 3, "point clamped to new length");
    }

    #[test]
    fn line_offset_setter_validates() {
        let mut it = interp();
        let first = it.ed.cur().first_line();
        it.ed
            .cur_mut()
            .insert(Point::new(first, 0), b"abc")
            .unwrap();
        write_var(&mut it, &VarRef::Sys(SysVar::LineOffset), Value::Int(2)).unwrap();
        assert_eq!(it.ed.cur().point.off, 2);
        assert!(
            write_var(&mut it, &VarRef::Sys(SysVar::LineOffset), Value::Int(9)).is_err()
        );
    }

    #[test]
    fn line_char_setter_replaces_char() {
        let mut it = interp();
        let first = it.ed.cur().first_line();
        it.ed
            .cur_mut()
            .insert(Point::new(first, 0), b"xyz")
            .unwrap();
        it.ed.cur_mut().point.off = 1;
        write_var(&mut it, &VarRef::Sys(SysVar::LineChar), Value::Int(b'Q' as i64)).unwrap();
        assert_eq!(it.ed.cur().contents(), "xQz");
    }

    #[test]
    fn search_pat_setter_pushes_ring() {
        let mut it = interp();
        write_var(&mut it, &VarRef::Sys(SysVar::SearchPat), Value::str("abc")).unwrap();
        assert_eq!(it.ed.match_rec.pattern(), "abc");
        assert_eq!(it.ed.search_ring.len(), 1);
    }

    #[test]
    fn ring_size_setter_validates_shrink() {
        let mut it = interp();
        it.ed.search_ring.push(Value::str("a"));
        it.ed.search_ring.push(Value::str("b"));
        let err = write_var(
            &mut it,
            &VarRef::Sys(SysVar::SearchRingSize),
            Value::Int(1),
        )
        .unwrap_err();
        assert!(err.message().unwrap().contains("too small"));
    }

    #[test]
    fn word_chars_round_trip() {
        let mut it = interp();
        write_var(&mut it, &VarRef::Sys(SysVar::WordChars), Value::str("a-z_")).unwrap();
        let v = read_var(&mut it, &VarRef::Sys(SysVar::WordChars)).unwrap();
        assert_eq!(v, Value::str("_a-z"));
        assert!(it.ed.word.is_word(b'q'));
        assert!(!it.ed.word.is_word(b'Q'));
    }

    #[test]
    fn key_macro_guards_states() {
        let mut it = interp();
        write_var(
            &mut it,
            &VarRef::Sys(SysVar::KeyMacro),
            Value::str("\tC-a\ta"),
        )
        .unwrap();
        assert_eq!(it.ed.key_macro.len(), 2);
        it.ed.key_macro_state = core_editor::KeyMacroState::Playing;
        assert!(
            write_var(
                &mut it,
                &VarRef::Sys(SysVar::KeyMacro),
                Value::str("\tq")
            )
            .is_err()
        );
        it.ed.key_macro_state = core_editor::KeyMacroState::Recording;
        assert!(read_var(&mut it, &VarRef::Sys(SysVar::KeyMacro)).is_err());
    }

    #[test]
    fn auto_save_scales_remaining() {
        let mut it = interp();
        write_var(&mut it, &VarRef::Sys(SysVar::AutoSave), Value::Int(100)).unwrap();
        assert_eq!(it.ed.auto_save_left, 100);
        it.ed.auto_save_left = 50;
        write_var(&mut it, &VarRef::Sys(SysVar::AutoSave), Value::Int(10)).unwrap();
        assert_eq!(it.ed.auto_save, 10);
        assert_eq!(it.ed.auto_save_left, 5, "remaining scaled proportionally");
    }

    #[test]
    fn globals_and_locals_create_on_write() {
        let mut it = interp();
        let g = find_dollar_var(&it, "myGlobal", VarOp::Write).unwrap();
        write_var(&mut it, &g, Value::Int(5)).unwrap();
        assert_eq!(read_var(&mut it, &g).unwrap(), Value::Int(5));
        assert!(find_dollar_var(&it, "unknown", VarOp::Read).is_err());

        let l = find_local_var(&it, "temp", VarOp::Write).unwrap();
        write_var(&mut it, &l, Value::str("v")).unwrap();
        assert_eq!(read_var(&mut it, &l).unwrap(), Value::str("v"));
        // Builtin names are protected.
        assert!(find_local_var(&it, "length", VarOp::Write).is_err());
    }
}
