//! Minimal interactive loop: a raw-mode guard and a key dispatcher that
//! exercises self-insert, motion, abort, and the pre/post key hooks.
//! Redisplay is intentionally crude (line echo only); the engine itself
//! is terminal-agnostic.

use core_editor::HookId;
use core_input::{ExtKey, KeyMods, ektos};
use core_script::{Interp, exec_hook};
use core_status::{EdResult, Severity, Status};
use core_value::Value;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers, read};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::Write;
use tracing::debug;

struct RawGuard;

impl RawGuard {
    fn new() -> EdResult<Self> {
        enable_raw_mode()
            .map_err(|e| Status::os_error(format!("Cannot enter raw mode: {e}")))?;
        Ok(Self)
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn map_key(event: &KeyEvent) -> Option<ExtKey> {
    let mut mods = KeyMods::empty();
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        mods |= KeyMods::CTRL;
    }
    if event.modifiers.contains(KeyModifiers::ALT) {
        mods |= KeyMods::META;
    }
    let key = match event.code {
        KeyCode::Char(c) => ExtKey::new(mods, c),
        KeyCode::Enter => ExtKey::new(mods, '\r'),
        KeyCode::Tab => ExtKey::new(mods, '\t'),
        KeyCode::Esc => ExtKey::new(mods, '\x1b'),
        KeyCode::Backspace => ExtKey::new(mods, '\x7f'),
        KeyCode::F(n) => ExtKey::new(
            mods | KeyMods::FKEY,
            char::from_digit(u32::from(n) % 10, 10)?,
        ),
        _ => return None,
    };
    Some(key)
}

/// Self-insert: printable keys insert at point, honoring the
/// Over/Repl buffer modes.
fn self_insert(interp: &mut Interp, c: char) -> EdResult<()> {
    let over = interp
        .ed
        .modes
        .find("Over")
        .map(|id| interp.ed.cur().modes.contains(id))
        .unwrap_or(false);
    let repl = interp
        .ed
        .modes
        .find("Repl")
        .map(|id| interp.ed.cur().modes.contains(id))
        .unwrap_or(false);
    let buf = interp.ed.cur_mut();
    if (over || repl) && buf.point.off < buf.line_len(buf.point.line) {
        buf.delete(buf.point, 1)?;
    }
    let mut tmp = [0u8; 4];
    let s = c.encode_utf8(&mut tmp);
    let end = buf.insert(buf.point, s.as_bytes())?;
    buf.point = end;
    Ok(())
}

/// Run the interactive loop until the user exits. Returns `UserExit`
/// through the error channel so the caller maps it to exit code 0.
pub fn interact(interp: &mut Interp) -> EdResult<()> {
    let _guard = RawGuard::new()?;
    let mut prefix2 = false;
    loop {
        let event = read().map_err(|e| Status::os_error(format!("Read error: {e}")))?;
        let Event::Key(kev) = event else {
            continue;
        };
        let Some(key) = map_key(&kev) else {
            continue;
        };
        let lit = ektos(key);
        exec_hook(interp, HookId::PreKey, None, vec![Value::str(&lit)]).ok();
        debug!(target: "input", key = %lit, "keypress");

        let result = dispatch_key(interp, key, &mut prefix2);
        match result {
            Err(st) if st.severity == Severity::UserExit => return Err(st),
            Err(st) if st.severity == Severity::UserAbort => {
                // Abort beeps, stops any recording macro, and returns to
                // the loop.
                print!("\x07");
                let _ = std::io::stdout().flush();
                interp.ed.key_macro_state = core_editor::KeyMacroState::Stopped;
            }
            Err(st) => {
                debug!(target: "input", msg = ?st.message(), "command failed");
            }
            Ok(()) => {}
        }
        exec_hook(interp, HookId::PostKey, None, vec![Value::str(&lit)]).ok();
    }
}

fn dispatch_key(interp: &mut Interp, key: ExtKey, prefix2: &mut bool) -> EdResult<()> {
    let ctrl = key.mods().contains(KeyMods::CTRL);
    // ^X prefix sequences.
    if *prefix2 {
        *prefix2 = false;
        if ctrl && key.ch() == 'c' {
            return Err(Status::user_exit());
        }
        if ctrl && key.ch() == 's' {
            interp.exec_line("saveFile")?;
            return Ok(());
        }
        return Ok(());
    }
    if ctrl {
        match key.ch() {
            'g' => return Err(Status::user_abort()),
            'x' => {
                *prefix2 = true;
                return Ok(());
            }
            'a' => {
                interp.exec_line("beginLine")?;
                return Ok(());
            }
            'e' => {
                interp.exec_line("endLine")?;
                return Ok(());
            }
            'f' => {
                interp.exec_line("forwChar")?;
                return Ok(());
            }
            'b' => {
                interp.exec_line("backChar")?;
                return Ok(());
            }
            'n' => {
                interp.exec_line("forwLine")?;
                return Ok(());
            }
            'p' => {
                interp.exec_line("backLine")?;
                return Ok(());
            }
            _ => return Ok(()),
        }
    }
    match key.ch() {
        '\r' => self_insert(interp, '\n'),
        '\x7f' => {
            interp.exec_line("deleteBackChar")?;
            Ok(())
        }
        c if !c.is_control() || c == '\t' => self_insert(interp, c),
        _ => Ok(()),
    }
}
