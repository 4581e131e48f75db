//! Built-in commands and functions reachable from scripts.
//!
//! Each entry declares its argument bounds the way macros do, so the
//! expression parser can pull the right number of comma-separated
//! arguments from the token stream. Handlers receive the `n` prefix
//! (`None` when defaulted) and the evaluated arguments.

use crate::{Callable, Interp, exec};
use core_buffer::{BufFlags, MACRO_SIGIL, Point, REG_MARK};
use core_editor::HookId;
use core_file::{ReadOptions, SaveOptions};
use core_search::scan::{Direction, search};
use core_search::{ReplaceSpec, match_in_string, replace};
use core_status::{EdResult, Severity, Status};
use core_value::{Flatten, Value};

pub type Handler = fn(&mut Interp, Option<i64>, Vec<Value>) -> EdResult<Value>;

/// Entry kinds mirrored in the shared exec table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdKind {
    /// May be bound to a key; full editor access.
    Command,
    /// Pure value-level function.
    Function,
}

pub struct CmdSpec {
    pub name: &'static str,
    pub kind: CmdKind,
    pub min_args: i16,
    /// Negative = unlimited.
    pub max_args: i16,
    pub handler: Handler,
}

macro_rules! spec {
    ($name:literal, $kind:ident, $min:literal, $max:literal, $handler:path) => {
        CmdSpec {
            name: $name,
            kind: CmdKind::$kind,
            min_args: $min,
            max_args: $max,
            handler: $handler,
        }
    };
}

pub static COMMANDS: &[CmdSpec] = &[
    spec!("abs", Function, 1, 1, fn_abs),
    spec!("alias", Command, 2, 2, cmd_alias),
    spec!("alterBufMode", Command, 2, 2, cmd_alter_buf_mode),
    spec!("alterGlobalMode", Command, 2, 2, cmd_alter_global_mode),
    spec!("backChar", Command, 0, 0, cmd_back_char),
    spec!("backLine", Command, 0, 0, cmd_back_line),
    spec!("beginBuf", Command, 0, 0, cmd_begin_buf),
    spec!("beginLine", Command, 0, 0, cmd_begin_line),
    spec!("bufMode?", Function, 1, 2, fn_buf_mode_q),
    spec!("chgDir", Command, 1, 1, cmd_chg_dir),
    spec!("clearBuf", Command, 0, 1, cmd_clear_buf),
    spec!("clearHook", Command, 1, 1, cmd_clear_hook),
    spec!("clone", Function, 1, 1, fn_clone),
    spec!("copyRegion", Command, 0, 0, cmd_copy_region),
    spec!("cycleDeleteRing", Command, 0, 0, cmd_cycle_delete_ring),
    spec!("cycleKillRing", Command, 0, 0, cmd_cycle_kill_ring),
    spec!("cycleReplaceRing", Command, 0, 0, cmd_cycle_replace_ring),
    spec!("cycleSearchRing", Command, 0, 0, cmd_cycle_search_ring),
    spec!("deleteAlias", Command, 1, 1, cmd_delete_alias),
    spec!("deleteBackChar", Command, 0, 0, cmd_delete_back_char),
    spec!("deleteBuf", Command, 1, 1, cmd_delete_buf),
    spec!("deleteForwChar", Command, 0, 0, cmd_delete_forw_char),
    spec!("deleteMacro", Command, 1, 1, cmd_delete_macro),
    spec!("empty?", Function, 1, 1, fn_empty_q),
    spec!("endBuf", Command, 0, 0, cmd_end_buf),
    spec!("endLine", Command, 0, 0, cmd_end_line),
    spec!("env", Function, 1, 1, fn_env),
    spec!("eval", Command, 1, -1, cmd_eval),
    spec!("findFile", Command, 1, 1, cmd_find_file),
    spec!("forwChar", Command, 0, 0, cmd_forw_char),
    spec!("forwLine", Command, 0, 0, cmd_forw_line),
    spec!("globalMode?", Function, 1, 1, fn_global_mode_q),
    spec!("gotoLine", Command, 1, 1, cmd_goto_line),
    spec!("gotoMark", Command, 1, 1, cmd_goto_mark),
    spec!("huntBack", Command, 0, 0, cmd_hunt_back),
    spec!("huntForw", Command, 0, 0, cmd_hunt_forw),
    spec!("index", Function, 2, 2, fn_index),
    spec!("insert", Command, 1, -1, cmd_insert),
    spec!("join", Function, 1, -1, fn_join),
    spec!("killLine", Command, 0, 0, cmd_kill_line),
    spec!("killRegion", Command, 0, 0, cmd_kill_region),
    spec!("length", Function, 1, 1, fn_length),
    spec!("match", Function, 1, 1, fn_match),
    spec!("message", Command, 0, -1, cmd_message),
    spec!("narrowBuf", Command, 0, 0, cmd_narrow_buf),
    spec!("nil?", Function, 1, 1, fn_nil_q),
    spec!("pop", Function, 1, 1, fn_pop),
    spec!("push", Function, 2, 2, fn_push),
    spec!("queryReplace", Command, 2, 2, cmd_query_replace),
    spec!("quote", Function, 1, 1, fn_quote),
    spec!("readFile", Command, 1, 1, cmd_read_file),
    spec!("renameBuf", Command, 1, 1, cmd_rename_buf),
    spec!("replace", Command, 2, 2, cmd_replace),
    spec!("run", Command, 1, 1, cmd_run),
    spec!("saveFile", Command, 0, 0, cmd_save_file),
    spec!("scratchBuf", Command, 0, 0, cmd_scratch_buf),
    spec!("searchBack", Command, 0, 1, cmd_search_back),
    spec!("searchForw", Command, 0, 1, cmd_search_forw),
    spec!("selectBuf", Command, 1, 1, cmd_select_buf),
    spec!("setHook", Command, 2, 2, cmd_set_hook),
    spec!("setMark", Command, 0, 1, cmd_set_mark),
    spec!("shift", Function, 1, 1, fn_shift),
    spec!("split", Function, 2, 2, fn_split),
    spec!("sub", Function, 3, 3, fn_sub),
    spec!("toInt", Function, 1, 1, fn_to_int),
    spec!("toString", Function, 1, 1, fn_to_string),
    spec!("type?", Function, 1, 1, fn_type_q),
    spec!("undelete", Command, 0, 0, cmd_undelete),
    spec!("unshift", Function, 2, 2, fn_unshift),
    spec!("widenBuf", Command, 0, 0, cmd_widen_buf),
    spec!("writeFile", Command, 1, 1, cmd_write_file),
    spec!("xeqBuf", Command, 1, -1, cmd_xeq_buf),
    spec!("xeqFile", Command, 1, -1, cmd_xeq_file),
    spec!("yank", Command, 0, 0, cmd_yank),
];

pub fn lookup(name: &str) -> Option<&'static CmdSpec> {
    COMMANDS.iter().find(|s| s.name == name)
}

// ---------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------

fn arg_str(args: &[Value], i: usize) -> EdResult<String> {
    args.get(i)
        .ok_or_else(|| Status::failure("Missing argument"))?
        .as_str()
        .map(str::to_string)
}

fn arg_int(args: &[Value], i: usize) -> EdResult<i64> {
    args.get(i)
        .ok_or_else(|| Status::failure("Missing argument"))?
        .as_int()
}

fn count(n: Option<i64>) -> i64 {
    n.unwrap_or(1)
}

// ---------------------------------------------------------------------
// Value functions
// ---------------------------------------------------------------------

fn fn_abs(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(Value::Int(arg_int(&args, 0)?.wrapping_abs()))
}

fn fn_length(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(Value::Int(match &args[0] {
        Value::Array(a) => a.len() as i64,
        Value::Str(s) => s.len() as i64,
        other => {
            return Err(Status::failure(format!(
                "String or array expected, got {}",
                other.type_name()
            )));
        }
    }))
}

fn fn_to_string(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(Value::Str(args[0].to_display_string(
        "",
        Flatten::KEEP_NIL | Flatten::KEEP_NULL | Flatten::SHOW_BOOL,
    )?))
}

fn fn_to_int(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Status::failure(format!("Cannot convert '{s}' to an integer"))),
        other => Err(Status::failure(format!(
            "Cannot convert {} to an integer",
            other.type_name()
        ))),
    }
}

fn fn_type_q(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(Value::str(args[0].type_name()))
}

fn fn_empty_q(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(Value::Bool(args[0].is_empty()))
}

fn fn_nil_q(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(Value::Bool(args[0].is_nil()))
}

fn fn_quote(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(Value::Str(core_value::quote(&args[0])?))
}

fn fn_env(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(std::env::var(arg_str(&args, 0)?)
        .map(Value::Str)
        .unwrap_or(Value::Nil))
}

fn fn_clone(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let arr = args[0].as_array()?;
    Ok(Value::Array(
        arr.deep_clone(it.ed.limits.max_array_depth as usize)?,
    ))
}

fn fn_join(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let delim = arg_str(&args, 0)?;
    let mut out = String::new();
    let mut first = true;
    for v in &args[1..] {
        let s = core_value::join(v, &delim, Flatten::KEEP_NIL | Flatten::KEEP_NULL)?;
        if !first {
            out.push_str(&delim);
        }
        first = false;
        out.push_str(&s);
    }
    Ok(Value::Str(out))
}

fn fn_split(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let delim = arg_str(&args, 0)?;
    let subject = arg_str(&args, 1)?;
    if delim.is_empty() {
        return Err(Status::failure("Empty split delimiter"));
    }
    Ok(Value::array(
        subject.split(&delim).map(Value::str).collect::<Vec<_>>(),
    ))
}

fn fn_push(_it: &mut Interp, _n: Option<i64>, mut args: Vec<Value>) -> EdResult<Value> {
    let v = args.pop().expect("arity checked");
    let arr = args[0].as_array()?;
    arr.push(v);
    Ok(args.swap_remove(0))
}

fn fn_pop(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(args[0].as_array()?.pop().unwrap_or(Value::Nil))
}

fn fn_shift(_it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    Ok(args[0].as_array()?.shift().unwrap_or(Value::Nil))
}

fn fn_unshift(_it: &mut Interp, _n: Option<i64>, mut args: Vec<Value>) -> EdResult<Value> {
    let v = args.pop().expect("arity checked");
    args[0].as_array()?.unshift(v);
    Ok(args.swap_remove(0))
}

// ---------------------------------------------------------------------
// String matching functions
// ---------------------------------------------------------------------

fn fn_match(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let n = arg_int(&args, 0)?;
    if !(0..core_search::MAX_GROUPS as i64).contains(&n) {
        return Err(Status::failure(format!("No such group, {n}")));
    }
    // String matches take precedence; fall back to the buffer match.
    let group = it
        .ed
        .str_match
        .group(n as usize)
        .or_else(|| it.ed.match_rec.group(n as usize));
    Ok(group.map(Value::str).unwrap_or(Value::Nil))
}

fn fn_index(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let subject = arg_str(&args, 0)?;
    let pattern = arg_str(&args, 1)?;
    let global_regexp = it.ed.global_regexp();
    let global_exact = it.ed.global_exact();
    it.ed.str_match.set_pattern(&pattern)?;
    if it.ed.str_match.re_mode(global_regexp) {
        let word = it.ed.word.clone();
        it.ed
            .str_match
            .ensure_compiled(global_exact, global_regexp, &word)?;
        let exact = it.ed.str_match.exact_mode(global_exact);
        match match_in_string(&subject, 0, &mut it.ed.str_match, &word, exact)? {
            Some(off) => Ok(Value::Int(off as i64)),
            None => Ok(Value::Nil),
        }
    } else {
        let body = it.ed.str_match.pattern().to_string();
        let found = if it.ed.str_match.exact_mode(global_exact) {
            subject.find(&body)
        } else {
            subject.to_lowercase().find(&body.to_lowercase())
        };
        Ok(found.map(|o| Value::Int(o as i64)).unwrap_or(Value::Nil))
    }
}

fn fn_sub(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let subject = arg_str(&args, 0)?;
    let pattern = arg_str(&args, 1)?;
    let replacement = arg_str(&args, 2)?;
    let global_regexp = it.ed.global_regexp();
    let global_exact = it.ed.global_exact();
    it.ed.str_match.set_pattern(&pattern)?;
    if !it.ed.str_match.re_mode(global_regexp) {
        let body = it.ed.str_match.pattern().to_string();
        return Ok(Value::Str(subject.replace(&body, &replacement)));
    }
    let word = it.ed.word.clone();
    it.ed
        .str_match
        .ensure_compiled(global_exact, global_regexp, &word)?;
    let exact = it.ed.str_match.exact_mode(global_exact);
    it.ed.str_match.set_replacement(&replacement);
    it.ed.str_match.ensure_replacement_compiled()?;
    let nodes = it.ed.str_match.replacement_nodes().to_vec();

    let mut out = String::new();
    let mut rest = subject.as_str();
    loop {
        match match_in_string(rest, 0, &mut it.ed.str_match, &word, exact)? {
            Some(off) => {
                let whole = it.ed.str_match.last_match().unwrap_or("").to_string();
                out.push_str(&rest[..off]);
                for node in &nodes {
                    match node {
                        replace::ReplNode::Lit(b) => {
                            out.push_str(&String::from_utf8_lossy(b));
                        }
                        replace::ReplNode::Match => out.push_str(&whole),
                        replace::ReplNode::Group(g) => {
                            out.push_str(it.ed.str_match.group(*g).unwrap_or(""));
                        }
                    }
                }
                let consumed = off + whole.len();
                if consumed >= rest.len() {
                    rest = "";
                    break;
                }
                // A zero-length match must still make progress.
                if whole.is_empty() {
                    let next = rest[consumed..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(0);
                    out.push_str(&rest[consumed..consumed + next]);
                    rest = &rest[consumed + next..];
                } else {
                    rest = &rest[consumed..];
                }
                if rest.is_empty() {
                    break;
                }
            }
            None => break,
        }
    }
    out.push_str(rest);
    Ok(Value::Str(out))
}

// ---------------------------------------------------------------------
// Motion commands
// ---------------------------------------------------------------------

fn cmd_forw_char(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let buf = it.ed.cur_mut();
    match buf.move_chars(buf.point, count(n) as isize) {
        Ok(p) => {
            buf.point = p;
            Ok(Value::Bool(true))
        }
        Err(st) if st.severity == Severity::NotFound => Ok(Value::Bool(false)),
        Err(st) => Err(st),
    }
}

fn cmd_back_char(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    cmd_forw_char(it, Some(-count(n)), Vec::new())
}

fn cmd_forw_line(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let buf = it.ed.cur_mut();
    let mut line = buf.point.line;
    let steps = count(n);
    for _ in 0..steps.abs() {
        let next = if steps >= 0 {
            buf.next_line(line)
        } else {
            buf.prev_line(line)
        };
        match next {
            Some(l) => line = l,
            None => return Ok(Value::Bool(false)),
        }
    }
    buf.point = Point::new(line, 0);
    Ok(Value::Bool(true))
}

fn cmd_back_line(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    cmd_forw_line(it, Some(-count(n)), Vec::new())
}

fn cmd_begin_line(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let buf = it.ed.cur_mut();
    buf.point.off = 0;
    Ok(Value::Bool(true))
}

fn cmd_end_line(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let buf = it.ed.cur_mut();
    buf.point.off = buf.line_len(buf.point.line);
    Ok(Value::Bool(true))
}

fn cmd_begin_buf(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let buf = it.ed.cur_mut();
    buf.point = Point::new(buf.first_line(), 0);
    Ok(Value::Bool(true))
}

fn cmd_end_buf(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let buf = it.ed.cur_mut();
    let last = buf.last_line();
    buf.point = Point::new(last, buf.line_len(last));
    Ok(Value::Bool(true))
}

fn cmd_goto_line(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let target = arg_int(&args, 0)?;
    let buf = it.ed.cur_mut();
    let total = buf.line_count() as i64;
    let lnum = if target < 0 { total + target + 1 } else { target };
    if lnum < 1 || lnum > total {
        return Err(Status::failure(format!("No such line, {target}")));
    }
    buf.point = Point::new(buf.nth_line(lnum as usize), 0);
    Ok(Value::Bool(true))
}

// ---------------------------------------------------------------------
// Marks
// ---------------------------------------------------------------------

fn mark_code(args: &[Value], i: usize) -> EdResult<char> {
    match args.get(i) {
        None => Ok(REG_MARK),
        Some(Value::Str(s)) if s.chars().count() == 1 => {
            Ok(s.chars().next().expect("length checked"))
        }
        Some(Value::Int(n)) => {
            char::from_u32(*n as u32).ok_or_else(|| Status::failure("Bad mark character"))
        }
        Some(other) => Err(Status::failure(format!(
            "Mark name must be a character, got {}",
            other.type_name()
        ))),
    }
}

fn cmd_set_mark(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let code = mark_code(&args, 0)?;
    let buf = it.ed.cur_mut();
    let point = buf.point;
    buf.set_mark(code, point, 0);
    Ok(Value::Bool(true))
}

fn cmd_goto_mark(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let code = mark_code(&args, 0)?;
    let buf = it.ed.cur_mut();
    let mark = buf
        .find_mark(code)
        .ok_or_else(|| Status::failure(format!("Mark '{code}' not set in this buffer")))?;
    if !mark.active {
        return Err(Status::failure(format!(
            "Mark '{code}' is outside the narrowed region"
        )));
    }
    buf.point = mark.point;
    Ok(Value::Bool(true))
}

// ---------------------------------------------------------------------
// Editing commands
// ---------------------------------------------------------------------

fn cmd_insert(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let mut text = String::new();
    for v in &args {
        text.push_str(&v.to_display_string(
            "",
            Flatten::KEEP_NIL | Flatten::KEEP_NULL | Flatten::SHOW_BOOL,
        )?);
    }
    let buf = it.ed.cur_mut();
    let end = buf.insert(buf.point, text.as_bytes())?;
    buf.point = end;
    Ok(Value::Str(text))
}

fn cmd_delete_forw_char(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let nch = count(n).max(0) as usize;
    let buf = it.ed.cur_mut();
    let point = buf.point;
    match buf.delete(point, nch) {
        Ok(bytes) => {
            it.ed
                .delete_ring
                .push(Value::str(String::from_utf8_lossy(&bytes)));
            Ok(Value::Bool(true))
        }
        Err(st) if st.severity == Severity::NotFound => Ok(Value::Bool(false)),
        Err(st) => Err(st),
    }
}

fn cmd_delete_back_char(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let nch = count(n).max(0) as usize;
    let buf = it.ed.cur_mut();
    let mut start = buf.point;
    for _ in 0..nch {
        match buf.backward_char(start) {
            Ok(p) => start = p,
            Err(_) => return Ok(Value::Bool(false)),
        }
    }
    buf.point = start;
    cmd_delete_forw_char(it, Some(nch as i64), Vec::new())
}

fn cmd_kill_line(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let buf = it.ed.cur_mut();
    let point = buf.point;
    let line_rest = buf.line_len(point.line) - point.off;
    // An empty remainder kills the line terminator instead.
    let nbytes = if line_rest == 0 { 1 } else { line_rest };
    match buf.delete(point, nbytes) {
        Ok(bytes) => {
            it.ed
                .kill_ring
                .push(Value::str(String::from_utf8_lossy(&bytes)));
            Ok(Value::Bool(true))
        }
        Err(st) if st.severity == Severity::NotFound => Ok(Value::Bool(false)),
        Err(st) => Err(st),
    }
}

fn region_span(it: &mut Interp) -> EdResult<(Point, Point)> {
    let buf = it.ed.cur();
    let mark = buf
        .find_mark(REG_MARK)
        .ok_or_else(|| Status::failure("No mark set in this buffer"))?;
    let (a, b) = if buf.point_precedes(mark.point, buf.point) {
        (mark.point, buf.point)
    } else {
        (buf.point, mark.point)
    };
    Ok((a, b))
}

fn cmd_copy_region(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let (a, b) = region_span(it)?;
    let text = String::from_utf8_lossy(&it.ed.cur().text_between(a, b)).into_owned();
    it.ed.kill_ring.push(Value::str(&text));
    Ok(Value::Str(text))
}

fn cmd_kill_region(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let (a, b) = region_span(it)?;
    let len = it.ed.cur().text_between(a, b).len();
    let buf = it.ed.cur_mut();
    let bytes = buf.delete(a, len)?;
    buf.point = a;
    it.ed
        .kill_ring
        .push(Value::str(String::from_utf8_lossy(&bytes)));
    Ok(Value::Bool(true))
}

fn yank_from_ring(it: &mut Interp, kill: bool) -> EdResult<Value> {
    let text = {
        let ring = if kill {
            &it.ed.kill_ring
        } else {
            &it.ed.delete_ring
        };
        ring.top()
            .ok_or_else(|| Status::failure(format!("{} ring is empty", ring.name())))?
            .as_str()?
            .to_string()
    };
    let buf = it.ed.cur_mut();
    let end = buf.insert(buf.point, text.as_bytes())?;
    buf.point = end;
    Ok(Value::Bool(true))
}

fn cmd_yank(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    yank_from_ring(it, true)
}

fn cmd_undelete(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    yank_from_ring(it, false)
}

// ---------------------------------------------------------------------
// Ring commands
// ---------------------------------------------------------------------

fn cmd_cycle_kill_ring(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    it.ed.kill_ring.cycle(count(n), true)?;
    Ok(Value::Bool(true))
}

fn cmd_cycle_delete_ring(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    it.ed.delete_ring.cycle(count(n), true)?;
    Ok(Value::Bool(true))
}

fn cmd_cycle_search_ring(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    it.ed.search_ring.cycle(count(n), true)?;
    it.ed.set_top_search_pattern()?;
    Ok(Value::Bool(true))
}

fn cmd_cycle_replace_ring(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    it.ed.replace_ring.cycle(count(n), true)?;
    it.ed.set_top_replace_pattern()?;
    Ok(Value::Bool(true))
}

// ---------------------------------------------------------------------
// Search and replace commands
// ---------------------------------------------------------------------

fn do_search(it: &mut Interp, n: Option<i64>, dir: Direction) -> EdResult<Value> {
    let reps = count(n).max(1) as usize;
    let global_exact = it.ed.global_exact();
    let global_regexp = it.ed.global_regexp();
    let word = it.ed.word.clone();
    let from = it.ed.cur().point;
    let idx = it
        .ed
        .buffers
        .find(it.ed.current_name())
        .expect("current buffer exists");
    let result = {
        let ed = &mut it.ed;
        search(
            ed.buffers.get(idx),
            from,
            reps,
            dir,
            &mut ed.match_rec,
            &word,
            global_exact,
            global_regexp,
        )
    };
    match result {
        Ok(hit) => {
            let buf = it.ed.cur_mut();
            buf.point = match dir {
                Direction::Forward => hit.end,
                Direction::Backward => hit.start,
            };
            Ok(it
                .ed
                .match_rec
                .last_match()
                .map(Value::str)
                .unwrap_or(Value::Nil))
        }
        Err(st) if st.severity == Severity::NotFound => {
            it.last_message = Some("Not found".to_string());
            Ok(Value::Bool(false))
        }
        Err(st) => Err(st),
    }
}

fn cmd_search_forw(it: &mut Interp, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    if let Some(pat) = args.first() {
        let pat = pat.as_str()?.to_string();
        it.ed.install_search_pattern(&pat)?;
    }
    do_search(it, n, Direction::Forward)
}

fn cmd_search_back(it: &mut Interp, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    if let Some(pat) = args.first() {
        let pat = pat.as_str()?.to_string();
        it.ed.install_search_pattern(&pat)?;
    }
    do_search(it, n, Direction::Backward)
}

fn cmd_hunt_forw(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    do_search(it, n, Direction::Forward)
}

fn cmd_hunt_back(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    do_search(it, n, Direction::Backward)
}

fn do_replace(it: &mut Interp, n: Option<i64>, args: Vec<Value>, query: bool) -> EdResult<Value> {
    let pat = arg_str(&args, 0)?;
    let repl = arg_str(&args, 1)?;
    it.ed.install_search_pattern(&pat)?;
    it.ed.install_replace_pattern(&repl)?;
    let global_exact = it.ed.global_exact();
    let global_regexp = it.ed.global_regexp();
    let word = it.ed.word.clone();
    let spec = ReplaceSpec { n, query };
    let term_cols = it.term_cols;
    let buf_name = it.ed.current_name().to_string();
    // Split borrows: the responder lives on the interpreter, the buffer
    // inside the editor.
    let mut responder = it.responder.take();
    let result = {
        let ed = &mut it.ed;
        let idx = ed.buffers.find(&buf_name).expect("current buffer exists");
        let (regs, mr) = (&mut ed.buffers, &mut ed.match_rec);
        replace::replace_scan(
            regs.get_mut(idx),
            mr,
            &word,
            global_exact,
            global_regexp,
            spec,
            responder.as_deref_mut(),
            term_cols,
        )
    };
    it.responder = responder;
    let outcome = result?;
    it.last_message = Some(format!(
        "{} substitution{}",
        outcome.substitutions,
        if outcome.substitutions == 1 { "" } else { "s" }
    ));
    Ok(Value::Bool(!outcome.stopped))
}

fn cmd_replace(it: &mut Interp, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    do_replace(it, n, args, false)
}

fn cmd_query_replace(it: &mut Interp, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    do_replace(it, n, args, true)
}

// ---------------------------------------------------------------------
// Buffer commands
// ---------------------------------------------------------------------

fn cmd_select_buf(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    exec::switch_buffer(it, &name, false)?;
    Ok(Value::str(name))
}

fn cmd_scratch_buf(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let idx = it.ed.buffers.create_unique("scratch")?;
    let name = it.ed.buffers.get(idx).name().to_string();
    exec::exec_hook(it, HookId::CreateBuf, None, vec![Value::str(&name)])?;
    exec::switch_buffer(it, &name, false)?;
    Ok(Value::str(name))
}

fn cmd_delete_buf(it: &mut Interp, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    it.ed.delete_buffer(&name, n.is_some())?;
    Ok(Value::str(name))
}

fn cmd_rename_buf(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let new = arg_str(&args, 0)?;
    it.ed.rename_current(&new)?;
    Ok(Value::str(new))
}

fn cmd_clear_buf(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    match args.first() {
        None => it.ed.cur_mut().clear()?,
        Some(v) => {
            let name = v.as_str()?;
            let buf = it
                .ed
                .buffers
                .by_name_mut(name)
                .ok_or_else(|| Status::failure(format!("No such buffer '{name}'")))?;
            if buf.nexec() > 0 {
                return Err(Status::failure(format!(
                    "Buffer '{name}' is being executed"
                )));
            }
            buf.clear()?;
        }
    }
    Ok(Value::Bool(true))
}

fn cmd_narrow_buf(it: &mut Interp, n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let lines = count(n).max(1) as usize;
    let buf = it.ed.cur_mut();
    let start = buf.point.line;
    buf.narrow(start, lines)?;
    Ok(Value::Bool(true))
}

fn cmd_widen_buf(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    it.ed.cur_mut().widen()?;
    Ok(Value::Bool(true))
}

// ---------------------------------------------------------------------
// File commands
// ---------------------------------------------------------------------

fn cmd_read_file(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let path = std::path::PathBuf::from(arg_str(&args, 0)?);
    let delim = it.ed.input_delim;
    let outcome = {
        let buf = it.ed.cur_mut();
        core_file::read_into(
            buf,
            &path,
            ReadOptions {
                must_exist: false,
                delim,
            },
        )?
    };
    exec::exec_hook(
        it,
        HookId::Read,
        None,
        vec![Value::str(path.to_string_lossy())],
    )?;
    if outcome.created {
        it.last_message = Some("New file".to_string());
    }
    Ok(Value::Int(outcome.lines as i64))
}

fn cmd_find_file(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let path = std::path::PathBuf::from(arg_str(&args, 0)?);
    let base = core_buffer::name_from_filename(&path);
    // Reuse a buffer already visiting this file.
    let existing = it
        .ed
        .buffers
        .iter()
        .find(|b| b.filename.as_deref() == Some(path.as_path()))
        .map(|b| b.name().to_string());
    let name = match existing {
        Some(name) => name,
        None => {
            let idx = it.ed.buffers.create_unique(&base)?;
            let name = it.ed.buffers.get(idx).name().to_string();
            exec::exec_hook(it, HookId::CreateBuf, None, vec![Value::str(&name)])?;
            name
        }
    };
    exec::switch_buffer(it, &name, false)?;
    // Lazily activate: read the file on first visit.
    if !it.ed.cur().flags.contains(BufFlags::ACTIVE) {
        let delim = it.ed.input_delim;
        {
            let buf = it.ed.cur_mut();
            core_file::read_into(
                buf,
                &path,
                ReadOptions {
                    must_exist: false,
                    delim,
                },
            )?;
        }
        exec::exec_hook(
            it,
            HookId::Read,
            None,
            vec![Value::str(path.to_string_lossy())],
        )?;
    }
    Ok(Value::str(name))
}

fn save_options(it: &Interp) -> SaveOptions {
    SaveOptions {
        safe: it.ed.mode_safe(),
        backup: it.ed.mode_bak(),
        append_final_delim: it.ed.mode_aterm(),
        delim: it.ed.output_delim,
    }
}

fn cmd_write_file(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let path = std::path::PathBuf::from(arg_str(&args, 0)?);
    exec::exec_hook(
        it,
        HookId::Write,
        None,
        vec![Value::str(path.to_string_lossy())],
    )?;
    let opts = save_options(it);
    let bytes = {
        let buf = it.ed.cur_mut();
        let written = core_file::write_buffer(buf, &path, opts)?;
        buf.filename = Some(path.clone());
        written
    };
    it.last_message = Some(format!("Wrote {bytes} bytes to '{}'", path.display()));
    Ok(Value::Bool(true))
}

fn cmd_save_file(it: &mut Interp, _n: Option<i64>, _args: Vec<Value>) -> EdResult<Value> {
    let Some(path) = it.ed.cur().filename.clone() else {
        return Err(Status::failure("No filename associated with this buffer"));
    };
    cmd_write_file(it, None, vec![Value::str(path.to_string_lossy())])
}

// ---------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------

fn cmd_alter_global_mode(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    let on = args[1].to_bool();
    it.ed.set_global_mode(&name, on)?;
    exec::exec_hook(
        it,
        HookId::Mode,
        None,
        vec![Value::str(&name), Value::Bool(on)],
    )?;
    Ok(Value::Bool(on))
}

fn cmd_alter_buf_mode(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    let on = args[1].to_bool();
    let cur = it.ed.current_name().to_string();
    it.ed.set_buffer_mode(&cur, &name, on)?;
    exec::exec_hook(
        it,
        HookId::Mode,
        None,
        vec![Value::str(&name), Value::Bool(on)],
    )?;
    Ok(Value::Bool(on))
}

fn fn_global_mode_q(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    let id = it
        .ed
        .modes
        .find(&name)
        .ok_or_else(|| Status::failure(format!("No such mode '{name}'")))?;
    Ok(Value::Bool(it.ed.modes.global_enabled(id)))
}

fn fn_buf_mode_q(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let mode = arg_str(&args, 0)?;
    let buf_name = match args.get(1) {
        Some(v) => v.as_str()?.to_string(),
        None => it.ed.current_name().to_string(),
    };
    let id = it
        .ed
        .modes
        .find(&mode)
        .ok_or_else(|| Status::failure(format!("No such mode '{mode}'")))?;
    let buf = it
        .ed
        .buffers
        .by_name(&buf_name)
        .ok_or_else(|| Status::failure(format!("No such buffer '{buf_name}'")))?;
    Ok(Value::Bool(buf.modes.contains(id)))
}

// ---------------------------------------------------------------------
// Hooks, aliases, execution
// ---------------------------------------------------------------------

fn hook_id(name: &str) -> EdResult<HookId> {
    HookId::from_name(name).ok_or_else(|| Status::failure(format!("No such hook '{name}'")))
}

fn cmd_set_hook(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let hook = hook_id(&arg_str(&args, 0)?)?;
    let target = arg_str(&args, 1)?;
    let full = if target.starts_with(MACRO_SIGIL) {
        target
    } else {
        format!("{MACRO_SIGIL}{target}")
    };
    it.ed.set_hook(hook, &full)?;
    Ok(Value::Bool(true))
}

fn cmd_clear_hook(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let hook = hook_id(&arg_str(&args, 0)?)?;
    it.ed.clear_hook(hook);
    Ok(Value::Bool(true))
}

fn cmd_alias(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let new = arg_str(&args, 0)?;
    let target = arg_str(&args, 1)?;
    if it.lookup_callable(&new).is_some() {
        return Err(Status::failure(format!("Name '{new}' already in use")));
    }
    if it.lookup_callable(&target).is_none() {
        return Err(Status::failure(format!(
            "No such command, function, or macro '{target}'"
        )));
    }
    it.aliases.insert(new, target);
    Ok(Value::Bool(true))
}

fn cmd_delete_alias(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    if it.aliases.remove(&name).is_none() {
        return Err(Status::failure(format!("No such alias '{name}'")));
    }
    Ok(Value::Bool(true))
}

fn cmd_delete_macro(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    let full = if name.starts_with(MACRO_SIGIL) {
        name
    } else {
        format!("{MACRO_SIGIL}{name}")
    };
    it.ed.delete_buffer(&full, true)?;
    Ok(Value::Bool(true))
}

fn cmd_run(it: &mut Interp, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    match it.lookup_callable(&name) {
        Some(Callable::Builtin(spec)) => (spec.handler)(it, n, Vec::new()),
        Some(Callable::MacroBuf(mac)) => exec::exec_buffer(it, &mac, n, Vec::new(), None),
        None => Err(Status::failure(format!(
            "No such command, function, or macro '{name}'"
        ))),
    }
}

fn cmd_eval(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let mut src = String::new();
    for v in &args {
        src.push_str(v.as_str()?);
    }
    it.exec_line(&src)
}

fn cmd_xeq_buf(it: &mut Interp, n: Option<i64>, mut args: Vec<Value>) -> EdResult<Value> {
    let name = args.remove(0).as_str()?.to_string();
    exec::exec_buffer(it, &name, n, args, None)
}

fn cmd_xeq_file(it: &mut Interp, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let name = arg_str(&args, 0)?;
    it.exec_script(&name, n)
}

fn cmd_chg_dir(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let dir = arg_str(&args, 0)?;
    it.ed.change_dir(std::path::Path::new(&dir))?;
    let cwd = it.ed.work_dir.to_string_lossy().into_owned();
    exec::exec_hook(it, HookId::ChDir, None, vec![Value::str(&cwd)])?;
    Ok(Value::Str(cwd))
}

fn cmd_message(it: &mut Interp, _n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let mut text = String::new();
    for v in &args {
        text.push_str(&v.to_display_string(
            "",
            Flatten::KEEP_NIL | Flatten::KEEP_NULL | Flatten::SHOW_BOOL,
        )?);
    }
    it.last_message = Some(text);
    Ok(Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;
    use core_editor::Editor;

    fn interp() -> Interp {
        Interp::new(Editor::new(&Config::default()))
    }

    fn eval(it: &mut Interp, src: &str) -> EdResult<Value> {
        it.exec_line(src)
    }

    #[test]
    fn table_is_sorted_and_unique() {
        for pair in COMMANDS.windows(2) {
            assert!(
                pair[0].name < pair[1].name,
                "table out of order near '{}'",
                pair[1].name
            );
        }
    }

    #[test]
    fn value_functions() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "length \"hello\"").unwrap(), Value::Int(5));
        assert_eq!(eval(&mut it, "length [1, 2]").unwrap(), Value::Int(2));
        assert_eq!(eval(&mut it, "abs -5").unwrap(), Value::Int(5));
        assert_eq!(eval(&mut it, "toInt \"42\"").unwrap(), Value::Int(42));
        assert_eq!(eval(&mut it, "toString 42").unwrap(), Value::str("42"));
        assert_eq!(eval(&mut it, "type? nil").unwrap(), Value::str("nil"));
        assert_eq!(eval(&mut it, "empty? \"\"").unwrap(), Value::Bool(true));
        assert_eq!(eval(&mut it, "nil? false").unwrap(), Value::Bool(false));
    }

    #[test]
    fn quote_round_trips_through_eval() {
        let mut it = interp();
        eval(&mut it, "$orig = \"a \\\"quoted\\\" value\"").unwrap();
        let v = eval(&mut it, "eval \"$copy = \" & quote $orig").unwrap();
        assert_eq!(v, eval(&mut it, "$orig").unwrap());
        assert_eq!(
            eval(&mut it, "$copy").unwrap(),
            eval(&mut it, "$orig").unwrap()
        );
    }

    #[test]
    fn array_functions() {
        let mut it = interp();
        eval(&mut it, "a = [1, 2]").unwrap();
        eval(&mut it, "push a, 3").unwrap();
        assert_eq!(eval(&mut it, "length a").unwrap(), Value::Int(3));
        assert_eq!(eval(&mut it, "pop a").unwrap(), Value::Int(3));
        assert_eq!(eval(&mut it, "shift a").unwrap(), Value::Int(1));
        eval(&mut it, "unshift a, 0").unwrap();
        assert_eq!(eval(&mut it, "a[0]").unwrap(), Value::Int(0));
        // clone detaches storage
        eval(&mut it, "b = clone a").unwrap();
        eval(&mut it, "b[0] = 99").unwrap();
        assert_eq!(eval(&mut it, "a[0]").unwrap(), Value::Int(0));
    }

    #[test]
    fn split_and_join() {
        let mut it = interp();
        assert_eq!(
            eval(&mut it, "split \",\", \"a,b,c\"").unwrap(),
            Value::array(vec![Value::str("a"), Value::str("b"), Value::str("c")])
        );
        assert_eq!(
            eval(&mut it, "join \"-\", [1, 2], 3").unwrap(),
            Value::str("1-2-3")
        );
    }

    #[test]
    fn string_match_functions() {
        let mut it = interp();
        assert_eq!(
            eval(&mut it, "index \"hello world\", \"world\"").unwrap(),
            Value::Int(6)
        );
        assert_eq!(
            eval(&mut it, "index \"hello\", \"zz\"").unwrap(),
            Value::Nil
        );
        assert_eq!(
            eval(&mut it, r"index 'ab123', '\d+:r'").unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            eval(&mut it, r"sub 'a-b c-d', '(\w)-(\w):r', '\2_\1'").unwrap(),
            Value::str("b_a d_c")
        );
        assert_eq!(
            eval(&mut it, "sub \"aaa\", \"a\", \"b\"").unwrap(),
            Value::str("bbb")
        );
    }

    #[test]
    fn motion_and_editing() {
        let mut it = interp();
        eval(&mut it, "insert \"hello\"").unwrap();
        assert_eq!(it.ed.cur().contents(), "hello");
        eval(&mut it, "beginLine").unwrap();
        assert_eq!(it.ed.cur().point.off, 0);
        eval(&mut it, "2 => forwChar").unwrap();
        assert_eq!(it.ed.cur().point.off, 2);
        eval(&mut it, "endLine").unwrap();
        assert_eq!(it.ed.cur().point.off, 5);
        // Past the end: false, not an error.
        assert_eq!(eval(&mut it, "forwChar").unwrap(), Value::Bool(false));
    }

    #[test]
    fn empty_buffer_motion_is_false() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "forwChar").unwrap(), Value::Bool(false));
        assert_eq!(eval(&mut it, "backChar").unwrap(), Value::Bool(false));
        assert_eq!(eval(&mut it, "forwLine").unwrap(), Value::Bool(false));
    }

    #[test]
    fn delete_and_rings() {
        let mut it = interp();
        eval(&mut it, "insert \"abcdef\"").unwrap();
        eval(&mut it, "beginLine").unwrap();
        eval(&mut it, "2 => deleteForwChar").unwrap();
        assert_eq!(it.ed.cur().contents(), "cdef");
        assert_eq!(it.ed.delete_ring.top(), Some(&Value::str("ab")));
        eval(&mut it, "undelete").unwrap();
        assert_eq!(it.ed.cur().contents(), "abcdef");
    }

    #[test]
    fn kill_line_and_yank() {
        let mut it = interp();
        eval(&mut it, "insert \"one two\"").unwrap();
        eval(&mut it, "beginLine").unwrap();
        eval(&mut it, "killLine").unwrap();
        assert_eq!(it.ed.cur().contents(), "");
        eval(&mut it, "yank").unwrap();
        assert_eq!(it.ed.cur().contents(), "one two");
    }

    #[test]
    fn region_commands() {
        let mut it = interp();
        eval(&mut it, "insert \"hello world\"").unwrap();
        eval(&mut it, "beginLine").unwrap();
        eval(&mut it, "setMark").unwrap();
        eval(&mut it, "5 => forwChar").unwrap();
        assert_eq!(
            eval(&mut it, "copyRegion").unwrap(),
            Value::str("hello")
        );
        eval(&mut it, "killRegion").unwrap();
        assert_eq!(it.ed.cur().contents(), " world");
    }

    #[test]
    fn search_commands_move_point() {
        let mut it = interp();
        eval(&mut it, "insert \"one two three two\"").unwrap();
        eval(&mut it, "beginBuf").unwrap();
        let m = eval(&mut it, "searchForw \"two\"").unwrap();
        assert_eq!(m, Value::str("two"));
        assert_eq!(it.ed.cur().point.off, 7);
        let m = eval(&mut it, "huntForw").unwrap();
        assert_eq!(m, Value::str("two"));
        assert_eq!(it.ed.cur().point.off, 17);
        assert_eq!(eval(&mut it, "huntForw").unwrap(), Value::Bool(false));
        let m = eval(&mut it, "searchBack \"one\"").unwrap();
        assert_eq!(m, Value::str("one"));
        assert_eq!(it.ed.cur().point.off, 0);
    }

    #[test]
    fn replace_command() {
        let mut it = interp();
        eval(&mut it, "insert \"foo-bar baz-qux\"").unwrap();
        eval(&mut it, "beginBuf").unwrap();
        eval(&mut it, r"replace '(\w+)-(\w+):r', '\2-\1'").unwrap();
        assert_eq!(it.ed.cur().contents(), "bar-foo qux-baz");
        assert_eq!(it.last_message.as_deref(), Some("2 substitutions"));
    }

    #[test]
    fn narrow_and_widen_commands() {
        let mut it = interp();
        eval(&mut it, "insert \"A\\nB\\nC\\nD\\nE\"").unwrap();
        eval(&mut it, "gotoLine 2").unwrap();
        eval(&mut it, "3 => narrowBuf").unwrap();
        assert_eq!(it.ed.cur().contents(), "B\nC\nD");
        eval(&mut it, "widenBuf").unwrap();
        assert_eq!(it.ed.cur().contents(), "A\nB\nC\nD\nE");
    }

    #[test]
    fn buffer_management_commands() {
        let mut it = interp();
        eval(&mut it, "scratchBuf").unwrap();
        assert_eq!(it.ed.current_name(), "scratch");
        eval(&mut it, "renameBuf \"work\"").unwrap();
        assert_eq!(it.ed.current_name(), "work");
        eval(&mut it, "selectBuf \"unnamed\"").unwrap();
        assert_eq!(it.ed.current_name(), "unnamed");
        eval(&mut it, "deleteBuf \"work\"").unwrap();
        assert!(it.ed.buffers.find("work").is_none());
    }

    #[test]
    fn alias_and_run() {
        let mut it = interp();
        eval(&mut it, "alias \"bb\", \"beginBuf\"").unwrap();
        eval(&mut it, "insert \"xy\"").unwrap();
        eval(&mut it, "bb").unwrap();
        assert_eq!(it.ed.cur().point.off, 0);
        eval(&mut it, "run \"endBuf\"").unwrap();
        assert_eq!(it.ed.cur().point.off, 2);
        eval(&mut it, "deleteAlias \"bb\"").unwrap();
        assert!(eval(&mut it, "bb").is_err());
    }

    #[test]
    fn mode_commands() {
        let mut it = interp();
        assert_eq!(
            eval(&mut it, "globalMode? \"Exact\"").unwrap(),
            Value::Bool(false)
        );
        eval(&mut it, "alterGlobalMode \"Exact\", true").unwrap();
        assert_eq!(
            eval(&mut it, "globalMode? \"Exact\"").unwrap(),
            Value::Bool(true)
        );
        eval(&mut it, "alterBufMode \"Over\", true").unwrap();
        assert_eq!(
            eval(&mut it, "bufMode? \"Over\"").unwrap(),
            Value::Bool(true)
        );
        // Group eviction through the command surface.
        eval(&mut it, "alterBufMode \"Repl\", true").unwrap();
        assert_eq!(
            eval(&mut it, "bufMode? \"Over\"").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn file_commands_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "alpha\nbeta\n").unwrap();
        let mut it = interp();
        let path_str = path.to_string_lossy().into_owned();
        eval(&mut it, &format!("findFile \"{path_str}\"")).unwrap();
        assert_eq!(it.ed.current_name(), "notes.txt");
        assert_eq!(it.ed.cur().contents(), "alpha\nbeta\n");
        eval(&mut it, "endBuf").unwrap();
        eval(&mut it, "insert \"gamma\"").unwrap();
        eval(&mut it, "saveFile").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "alpha\nbeta\ngamma"
        );
    }

    #[test]
    fn xeq_file_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("setup.mx");
        std::fs::write(&script, "$ran = 41 + 1\nreturn $ran\n").unwrap();
        let mut it = interp();
        it.ed.script_dirs = vec![dir.path().to_path_buf()];
        let v = eval(&mut it, "xeqFile \"setup\"").unwrap();
        assert_eq!(v, Value::Int(42));
        assert_eq!(eval(&mut it, "$ran").unwrap(), Value::Int(42));
    }

    #[test]
    fn search_ring_cycle_updates_pattern() {
        let mut it = interp();
        eval(&mut it, "$searchPat = \"first\"").unwrap();
        eval(&mut it, "$searchPat = \"second\"").unwrap();
        eval(&mut it, "cycleSearchRing").unwrap();
        assert_eq!(it.ed.match_rec.pattern(), "first");
    }
}
