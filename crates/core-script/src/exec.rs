//! The statement executor: a level-stack interpreter over a
//! pre-processed buffer.
//!
//! Each nesting level tracks its truth state, whether a loop spawned it,
//! and the `if` chain bookkeeping. Loop control flow jumps between lines
//! via the pre-resolved loop-block list; `break N` unwinds through
//! parent `endloop` lines using each block's recorded break target.
//! Statement text reaches the expression evaluator only when the current
//! level is live, so dead branches cost a keyword scan and nothing more.

use crate::expr;
use crate::lexer::Lexer;
use crate::preproc::{self, is_white_line, leading_keyword};
use crate::token::{StmtKw, Sym};
use crate::var::{self, VarOp, VarRef};
use crate::{DEFN, Interp, ScriptFrame};
use core_buffer::{BufFlags, LineId, LoopBlock, MacroInfo, Point};
use core_editor::HookId;
use core_status::{EdResult, Severity, Status};
use core_value::{ArrayHandle, Value};
use std::path::PathBuf;
use tracing::debug;

/// One entry of the execution level stack.
#[derive(Debug, Default)]
struct Level {
    live: bool,
    /// Entered through a loop keyword (vs `if`).
    loop_spawn: bool,
    /// Some arm of the current `if` chain has been true.
    if_was_true: bool,
    else_seen: bool,
    loop_count: u32,
    /// In-progress `for` loop owned by this level (the level the `for`
    /// statement executes at, not the body level).
    fli: Option<ForLoop>,
}

#[derive(Debug)]
struct ForLoop {
    var: VarRef,
    array: ArrayHandle,
    /// Next element to bind; negative = needs (re)initialization.
    index: isize,
}

/// Execute a buffer as a macro: bind arguments, pre-process if needed,
/// push an invocation frame, and run the interpreter loop.
pub fn exec_buffer(
    it: &mut Interp,
    buf_name: &str,
    n: Option<i64>,
    args: Vec<Value>,
    path: Option<PathBuf>,
) -> EdResult<Value> {
    {
        let buf = it
            .ed
            .buffers
            .by_name(buf_name)
            .ok_or_else(|| Status::failure(format!("No such buffer '{buf_name}'")))?;
        if buf.flags.contains(BufFlags::NARROWED) {
            return Err(Status::failure("Cannot execute a narrowed buffer"));
        }
        let depth = it.ed.limits.max_macro_depth;
        if depth > 0 && buf.nexec() >= depth {
            return Err(Status::failure(format!(
                "Maximum macro recursion depth ({depth}) exceeded"
            )));
        }
    }
    // Validate arguments against the declared counts.
    {
        let buf = it.ed.buffers.by_name_mut(buf_name).expect("checked above");
        let info = buf.macro_info.get_or_insert_with(MacroInfo::default);
        if (args.len() as i32) < info.min_args {
            return Err(Status::failure(format!(
                "Wrong number of arguments for '{buf_name}' (have {}, need at least {})",
                args.len(),
                info.min_args
            )));
        }
        if info.max_args >= 0 && (args.len() as i32) > info.max_args {
            return Err(Status::failure(format!(
                "Wrong number of arguments for '{buf_name}' (have {}, maximum {})",
                args.len(),
                info.max_args
            )));
        }
    }
    // Pre-process once; the block list is cached on the buffer.
    let needs_pp = !it
        .ed
        .buffers
        .by_name(buf_name)
        .is_some_and(|b| b.flags.contains(BufFlags::PREPROC));
    if needs_pp {
        let blocks = {
            let buf = it.ed.buffers.by_name(buf_name).expect("checked above");
            preproc::preprocess(buf)?
        };
        let buf = it.ed.buffers.by_name_mut(buf_name).expect("checked above");
        buf.macro_info
            .get_or_insert_with(MacroInfo::default)
            .loop_blocks = blocks;
        buf.flags |= BufFlags::PREPROC;
    }

    let local_head = it.locals.len();
    it.frames.push(ScriptFrame {
        path,
        buf_name: buf_name.to_string(),
        narg: n.filter(|&v| v != DEFN),
        args,
        local_head,
    });
    {
        let buf = it.ed.buffers.by_name_mut(buf_name).expect("checked above");
        buf.macro_info.as_mut().expect("created above").nexec += 1;
    }
    debug!(target: "script", buffer = buf_name, "executing buffer");
    let result = xbuf(it, buf_name);
    if let Some(buf) = it.ed.buffers.by_name_mut(buf_name)
        && let Some(info) = buf.macro_info.as_mut()
    {
        info.nexec -= 1;
    }
    it.locals.truncate(local_head);
    it.frames.pop();
    result
}

fn line_text_of(it: &Interp, buf_name: &str, line: LineId) -> String {
    it.ed
        .buffers
        .by_name(buf_name)
        .map(|b| String::from_utf8_lossy(b.line_text(line)).into_owned())
        .unwrap_or_default()
}

/// Build the standard script diagnostic and move point to the error line.
fn script_error(it: &mut Interp, buf_name: &str, line: LineId, st: Status) -> Status {
    if st.severity >= Severity::UserExit {
        return st;
    }
    let location = match it.current_frame().and_then(|f| f.path.as_ref()) {
        Some(p) => format!("file \"{}\"", p.display()),
        None => format!("buffer '{buf_name}'"),
    };
    let lnum = it
        .ed
        .buffers
        .by_name(buf_name)
        .map(|b| b.line_number(line))
        .unwrap_or(0);
    if let Some(buf) = it.ed.buffers.by_name_mut(buf_name) {
        buf.point = Point::new(line, 0);
    }
    let msg = st.message().unwrap_or("unknown error");
    Status::script_error(format!("{msg}, in {location} at line {lnum}"))
}

fn rewind_to_loop(levels: &mut Vec<Level>) -> EdResult<()> {
    while let Some(top) = levels.last() {
        if top.loop_spawn {
            return Ok(());
        }
        if levels.len() == 1 {
            break;
        }
        levels.pop();
    }
    Err(Status::failure("Script loop boundary not found"))
}

/// Find the loop block whose opening keyword is on `mark`.
fn block_by_mark(blocks: &[LoopBlock], mark: LineId) -> EdResult<LoopBlock> {
    blocks
        .iter()
        .find(|b| b.mark == mark)
        .copied()
        .ok_or_else(|| Status::failure("Script loop boundary line not found"))
}

/// Find the loop-kind block whose `endloop` is on `jump`.
fn loop_block_by_jump(blocks: &[LoopBlock], jump: LineId) -> EdResult<LoopBlock> {
    blocks
        .iter()
        .find(|b| b.kind.is_loop() && b.jump == jump)
        .copied()
        .ok_or_else(|| Status::failure("Script loop boundary line not found"))
}

fn eval_guard(it: &mut Interp, src: &str) -> EdResult<bool> {
    let mut lx = Lexer::new(src, None)?;
    let v = expr::ge_assign(it, &mut lx, true)?;
    lx.expect_end()?;
    Ok(v.value.to_bool())
}

fn expect_no_args(rest: &str, what: &str) -> EdResult<()> {
    let lx = Lexer::new(rest, None)?;
    if lx.have_sym() {
        return Err(Status::failure(format!("Extraneous token after '{what}'")));
    }
    Ok(())
}

/// Parse `macro name(min[, max])` after the keyword.
fn parse_macro_decl(rest: &str) -> EdResult<(String, i32, i32)> {
    let mut lx = Lexer::new(rest, None)?;
    let Sym::Ident { name, query: false } = lx.sym.clone() else {
        return Err(Status::failure("Macro name expected"));
    };
    lx.advance()?;
    let mut min = 0i32;
    let mut max = -1i32;
    if lx.accept(&Sym::LParen)? {
        if let Sym::IntLit(v) = lx.sym {
            min = v as i32;
            lx.advance()?;
            if lx.accept(&Sym::Comma)? {
                if let Sym::IntLit(v) = lx.sym {
                    max = v as i32;
                    lx.advance()?;
                } else if lx.sym == Sym::Minus {
                    lx.advance()?;
                    if let Sym::IntLit(v) = lx.sym {
                        max = -(v as i32);
                        lx.advance()?;
                    }
                }
            } else {
                max = min;
            }
        }
        lx.require(&Sym::RParen, "')'")?;
    }
    lx.expect_end()?;
    Ok((name, min, max))
}

/// The interpreter loop proper.
fn xbuf(it: &mut Interp, buf_name: &str) -> EdResult<Value> {
    let blocks: Vec<LoopBlock> = it
        .ed
        .buffers
        .by_name(buf_name)
        .and_then(|b| b.macro_info.as_ref())
        .map(|mi| mi.loop_blocks.clone())
        .unwrap_or_default();
    let max_loop = it.ed.limits.max_loop;

    let mut levels: Vec<Level> = vec![Level {
        live: true,
        ..Default::default()
    }];
    let mut rval = Value::Nil;
    let mut break_level = 0u32;
    // Name of the buffer being salted by a `macro` block, if any.
    let mut salting: Option<String> = None;

    let mut cur = it
        .ed
        .buffers
        .by_name(buf_name)
        .map(|b| Some(b.first_line()))
        .ok_or_else(|| Status::failure(format!("No such buffer '{buf_name}'")))?;

    'lines: while let Some(line) = cur {
        let stmt_line = line;
        let raw = line_text_of(it, buf_name, line);

        // Accumulate continuation lines into one logical line.
        let mut logical = raw.clone();
        let mut last = line;
        while logical.ends_with('\\') {
            logical.pop();
            let next = it
                .ed
                .buffers
                .by_name(buf_name)
                .and_then(|b| b.next_line(last));
            match next {
                Some(nl) => {
                    logical.push_str(&line_text_of(it, buf_name, nl));
                    last = nl;
                }
                None => {
                    return Err(script_error(
                        it,
                        buf_name,
                        stmt_line,
                        Status::failure(format!("Incomplete line \"{raw}\"")),
                    ));
                }
            }
        }
        let next_line = it
            .ed
            .buffers
            .by_name(buf_name)
            .and_then(|b| b.next_line(last));
        let live = levels.last().map(|l| l.live).unwrap_or(false);

        // Macro storing: check for the terminating endmacro, otherwise
        // salt the raw source line away.
        if let Some(target) = salting.clone() {
            let kw = leading_keyword(&logical).map(|(k, _)| k);
            if kw == Some(StmtKw::Endmacro) && live {
                salting = None;
                cur = next_line;
                continue 'lines;
            }
            // Save the line verbatim, minus one leading tab.
            let mut text = raw.as_str();
            if let Some(stripped) = text.strip_prefix('\t') {
                text = stripped;
            }
            let bytes = text.as_bytes().to_vec();
            if let Some(mbuf) = it.ed.buffers.by_name_mut(&target) {
                mbuf.append_line(&bytes);
            }
            cur = next_line;
            continue 'lines;
        }

        if is_white_line(&logical) {
            cur = next_line;
            continue 'lines;
        }

        // Statement keyword dispatch.
        let kw_parse = leading_keyword(&logical);
        let mut force = false;
        let mut stmt_src: &str = &logical;
        if let Some((mut kw, mut rest)) = kw_parse {
            let mut constrained = false;
            if kw == StmtKw::Constrain {
                // Pre-processing guaranteed `macro` follows.
                constrained = true;
                let Some((k2, r2)) = leading_keyword(rest) else {
                    return Err(script_error(
                        it,
                        buf_name,
                        stmt_line,
                        Status::failure("'macro' keyword expected"),
                    ));
                };
                kw = k2;
                rest = r2;
            }
            let dispatch = (|| -> EdResult<Option<Option<LineId>>> {
                match kw {
                    StmtKw::If => {
                        let parent_live = live;
                        let mut level = Level::default();
                        if parent_live {
                            level.live = eval_guard(it, rest)?;
                            level.if_was_true = level.live;
                        }
                        levels.push(level);
                        Ok(Some(next_line))
                    }
                    StmtKw::Elsif => {
                        let misplaced = levels.len() == 1
                            || levels.last().is_some_and(|l| l.loop_spawn || l.else_seen);
                        if misplaced {
                            return Err(Status::failure("Misplaced 'elsif' keyword"));
                        }
                        let parent_live = levels[levels.len() - 2].live;
                        let top = levels.last_mut().expect("len checked above");
                        if parent_live && !top.live && !top.if_was_true {
                            let truth = eval_guard(it, rest)?;
                            let top = levels.last_mut().expect("len checked above");
                            top.live = truth;
                            if truth {
                                top.if_was_true = true;
                            }
                        } else {
                            top.live = false;
                        }
                        Ok(Some(next_line))
                    }
                    StmtKw::Else => {
                        expect_no_args(rest, "else")?;
                        let misplaced = levels.len() == 1
                            || levels.last().is_some_and(|l| l.loop_spawn || l.else_seen);
                        if misplaced {
                            return Err(Status::failure("Misplaced 'else' keyword"));
                        }
                        let parent_live = levels[levels.len() - 2].live;
                        let top = levels.last_mut().expect("len checked above");
                        top.live = parent_live && !top.live && !top.if_was_true;
                        top.else_seen = true;
                        Ok(Some(next_line))
                    }
                    StmtKw::Endif => {
                        expect_no_args(rest, "endif")?;
                        let misplaced =
                            levels.len() == 1 || levels.last().is_some_and(|l| l.loop_spawn);
                        if misplaced {
                            return Err(Status::failure("Misplaced 'endif' keyword"));
                        }
                        levels.pop();
                        Ok(Some(next_line))
                    }
                    StmtKw::While | StmtKw::Until | StmtKw::Loop => {
                        let go = match kw {
                            StmtKw::While => Some(true),
                            StmtKw::Until => Some(false),
                            _ => None,
                        };
                        let enter = if !live {
                            false
                        } else {
                            match go {
                                None => {
                                    expect_no_args(rest, "loop")?;
                                    true
                                }
                                Some(want) => eval_guard(it, rest)? == want,
                            }
                        };
                        if enter {
                            levels.push(Level {
                                live: true,
                                loop_spawn: true,
                                ..Default::default()
                            });
                            Ok(Some(next_line))
                        } else {
                            // Skip past the matching endloop.
                            let block = block_by_mark(&blocks, stmt_line)?;
                            if let Some(top) = levels.last_mut() {
                                top.loop_count = 0;
                            }
                            let after = it
                                .ed
                                .buffers
                                .by_name(buf_name)
                                .and_then(|b| b.next_line(block.jump));
                            Ok(Some(after))
                        }
                    }
                    StmtKw::For => {
                        if live {
                            let needs_init = levels
                                .last()
                                .and_then(|l| l.fli.as_ref())
                                .is_none_or(|f| f.index < 0);
                            if needs_init {
                                let fli = init_for(it, rest)?;
                                levels.last_mut().expect("level stack non-empty").fli =
                                    Some(fli);
                            }
                            if next_for(it, &mut levels)? {
                                levels.push(Level {
                                    live: true,
                                    loop_spawn: true,
                                    ..Default::default()
                                });
                                return Ok(Some(next_line));
                            }
                        }
                        let block = block_by_mark(&blocks, stmt_line)?;
                        if let Some(top) = levels.last_mut() {
                            top.loop_count = 0;
                        }
                        let after = it
                            .ed
                            .buffers
                            .by_name(buf_name)
                            .and_then(|b| b.next_line(block.jump));
                        Ok(Some(after))
                    }
                    StmtKw::Break | StmtKw::Next => {
                        if !live {
                            return Ok(Some(next_line));
                        }
                        if kw == StmtKw::Break {
                            let mut lx = Lexer::new(rest, None)?;
                            if lx.have_sym() {
                                let v = expr::ge_assign(it, &mut lx, true)?;
                                lx.expect_end()?;
                                let n = v.value.as_int()?;
                                if n <= 0 {
                                    return Err(Status::failure(format!(
                                        "'break' level '{n}' must be 1 or greater"
                                    )));
                                }
                                break_level = n as u32;
                            } else {
                                break_level = 1;
                            }
                            // Invalidate any for-loop in progress below.
                            if levels.len() >= 2 {
                                let parent = levels.len() - 2;
                                if let Some(fli) = levels[parent].fli.as_mut() {
                                    fli.index = -1;
                                }
                            }
                        } else {
                            expect_no_args(rest, "next")?;
                        }
                        // Jump to this block's endloop so it executes.
                        let block = block_by_mark(&blocks, stmt_line)?;
                        rewind_to_loop(&mut levels)?;
                        Ok(Some(Some(block.jump)))
                    }
                    StmtKw::Endloop => {
                        expect_no_args(rest, "endloop")?;
                        if break_level == 0 {
                            let misplaced = levels.len() == 1
                                || !levels.last().is_some_and(|l| l.loop_spawn);
                            if misplaced {
                                return Err(Status::failure("Misplaced 'endloop' keyword"));
                            }
                            levels.pop();
                            let top = levels.last_mut().expect("base level remains");
                            top.loop_count += 1;
                            if max_loop > 0 && top.loop_count > max_loop {
                                return Err(Status::failure(format!(
                                    "Maximum number of loop iterations ({max_loop}) exceeded"
                                )));
                            }
                            let block = loop_block_by_jump(&blocks, stmt_line)?;
                            Ok(Some(Some(block.mark)))
                        } else {
                            let block = loop_block_by_jump(&blocks, stmt_line)?;
                            break_level -= 1;
                            if break_level > 0 {
                                let Some(target) = block.brk else {
                                    return Err(Status::failure(format!(
                                        "Too many break levels ({break_level} short) \
                                         from inner 'break'"
                                    )));
                                };
                                levels.pop();
                                rewind_to_loop(&mut levels)?;
                                let top = levels.last_mut().expect("loop level found");
                                top.loop_count = 0;
                                Ok(Some(Some(target)))
                            } else {
                                levels.pop();
                                let top = levels.last_mut().expect("base level remains");
                                top.loop_count = 0;
                                let after = it
                                    .ed
                                    .buffers
                                    .by_name(buf_name)
                                    .and_then(|b| b.next_line(stmt_line));
                                Ok(Some(after))
                            }
                        }
                    }
                    StmtKw::Return => {
                        if live {
                            let mut lx = Lexer::new(rest, None)?;
                            rval = if lx.have_sym() {
                                let v = expr::ge_assign(it, &mut lx, true)?;
                                lx.expect_end()?;
                                v.value
                            } else {
                                Value::Nil
                            };
                            return Ok(None); // sentinel: unwind
                        }
                        Ok(Some(next_line))
                    }
                    StmtKw::Macro => {
                        if live {
                            let (name, min, max) = parse_macro_decl(rest)?;
                            let full = format!("{}{name}", core_buffer::MACRO_SIGIL);
                            begin_macro(it, &full, min, max, constrained)?;
                            salting = Some(full);
                        }
                        Ok(Some(next_line))
                    }
                    StmtKw::Endmacro => Ok(Some(next_line)),
                    StmtKw::Force => {
                        force = true;
                        Ok(None) // fall through to expression execution
                    }
                    StmtKw::Constrain => {
                        Err(Status::failure("'macro' keyword expected"))
                    }
                }
            })();
            match dispatch {
                Ok(Some(next)) => {
                    cur = next;
                    continue 'lines;
                }
                Ok(None) => {
                    if kw == StmtKw::Return {
                        return Ok(rval);
                    }
                    // force: execute the remainder as an expression.
                    stmt_src = rest;
                }
                Err(st) => return Err(script_error(it, buf_name, stmt_line, st)),
            }
        }

        // Expression statement.
        if live {
            let result = (|| -> EdResult<Value> {
                let mut lx = Lexer::new(stmt_src, None)?;
                let v = expr::eval_statement(it, &mut lx, true)?;
                lx.expect_end()?;
                Ok(v)
            })();
            match result {
                Ok(v) => rval = v,
                Err(st) if force && st.severity < Severity::UserExit => {
                    // `force` resets the status to success.
                    debug!(target: "script", msg = ?st.message(), "status forced to success");
                }
                Err(st) => return Err(script_error(it, buf_name, stmt_line, st)),
            }
        }
        cur = next_line;
    }

    if levels.len() > 1 {
        return Err(Status::script_error(format!(
            "Unmatched 'if' keyword, in buffer '{buf_name}'"
        )));
    }
    Ok(rval)
}

/// Parse and initialize `for var in expr`.
fn init_for(it: &mut Interp, rest: &str) -> EdResult<ForLoop> {
    let mut lx = Lexer::new(rest, None)?;
    let var = match lx.sym.clone() {
        Sym::Ident { name, query: false } => var::find_local_var(it, &name, VarOp::Write)?,
        Sym::GlobalVar(name) => var::find_dollar_var(it, &name, VarOp::Write)?,
        _ => return Err(Status::failure("Variable name expected after 'for'")),
    };
    lx.advance()?;
    lx.require(&Sym::KwIn, "'in' in 'for' statement")?;
    let value = expr::ge_assign(it, &mut lx, true)?.value;
    lx.expect_end()?;
    let array = value.as_array()?.clone();
    Ok(ForLoop {
        var,
        array,
        index: 0,
    })
}

/// Bind the next array element to the control variable. Returns false
/// (and invalidates the loop) when the array is exhausted.
fn next_for(it: &mut Interp, levels: &mut [Level]) -> EdResult<bool> {
    let top = levels.last_mut().expect("level stack non-empty");
    let Some(fli) = top.fli.as_mut() else {
        return Ok(false);
    };
    let idx = fli.index;
    if idx < 0 || idx as usize >= fli.array.len() {
        fli.index = -1;
        return Ok(false);
    }
    let value = fli.array.get(idx as usize).unwrap_or(Value::Nil);
    fli.index = idx + 1;
    let var = fli.var.clone();
    var::write_var(it, &var, value)?;
    Ok(true)
}

/// Begin storing a macro: create (or reuse) its buffer, reset contents,
/// and record the declared argument counts.
fn begin_macro(it: &mut Interp, full: &str, min: i32, max: i32, constrained: bool) -> EdResult<()> {
    let (idx, _created) = it.ed.buffers.find_or_create(full)?;
    let buf = it.ed.buffers.get_mut(idx);
    if buf.nexec() > 0 {
        return Err(Status::failure(format!(
            "Buffer '{full}' is being executed"
        )));
    }
    buf.clear()?;
    buf.flags |= BufFlags::HIDDEN;
    if constrained {
        buf.flags |= BufFlags::CONSTRAIN;
    }
    buf.flags -= BufFlags::PREPROC;
    let info = buf.macro_info.get_or_insert_with(MacroInfo::default);
    info.min_args = min;
    info.max_args = max;
    info.loop_blocks.clear();
    debug!(target: "script", name = full, min, max, constrained, "defined macro");
    Ok(())
}

// ---------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------

/// Invoke the macro bound to a hook with the given arguments. On failure
/// the hook is disabled with an explanatory message so a broken user
/// hook cannot wedge the editor.
pub fn exec_hook(it: &mut Interp, id: HookId, n: Option<i64>, args: Vec<Value>) -> EdResult<Value> {
    let Some(name) = it.ed.hook(id).macro_name.clone() else {
        return Ok(Value::Nil);
    };
    if it.ed.hook(id).running {
        return Err(Status::failure(format!(
            "Hook '{}' cannot invoke itself",
            id.name()
        )));
    }
    it.ed.hook_mut(id).running = true;
    let result = exec_buffer(it, &name, n, args, None);
    it.ed.hook_mut(id).running = false;
    match result {
        Ok(v) => Ok(v),
        Err(st) => {
            it.ed.clear_hook(id);
            Err(Status::failure(format!(
                "Hook '{}' disabled: {}",
                id.name(),
                st.message().unwrap_or("error")
            )))
        }
    }
}

/// Switch the current buffer, running the `exitBuf` and `enterBuf` hooks
/// unless suppressed.
pub fn switch_buffer(it: &mut Interp, name: &str, no_hooks: bool) -> EdResult<String> {
    if !no_hooks {
        let from = it.ed.current_name().to_string();
        exec_hook(it, HookId::ExitBuf, None, vec![Value::str(from)])?;
    }
    let old = it.ed.switch_to(name)?;
    if !no_hooks {
        exec_hook(it, HookId::EnterBuf, None, vec![Value::str(name)])?;
    }
    Ok(old)
}
