//! Buffer and line store: the in-memory text model.
//!
//! A buffer owns a slab of byte lines linked into a doubly-linked list.
//! List discipline: the head line's `prev` points at the tail (so the tail
//! is reachable in O(1)), the tail's `next` is `None`, and every interior
//! link is ordinary. A buffer is *empty* iff it holds a single line of zero
//! length. Line terminators are never stored; they are synthesized at line
//! boundaries by scanning and I/O code.
//!
//! Points and marks hold `(LineId, offset)`. Mark inactivation during
//! narrowing is an explicit `active` flag rather than an encoded offset.

use bitflags::bitflags;
use core_mode::ModeSet;
use core_status::{EdResult, Status};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

mod line;
pub mod registry;

pub use line::{LineId, LineStore};
pub use registry::BufferRegistry;

/// First character of every macro buffer name.
pub const MACRO_SIGIL: char = '@';
/// Substitute first character for derived names that would collide with
/// the sigil or leading-space convention.
const ALT_LEAD_CHAR: char = '_';

/// Mark code for the region mark.
pub const REG_MARK: char = ' ';
/// Mark code used by query-replace "stop and go back".
pub const WORK_MARK: char = '.';
/// Mark codes above this value are reserved for window state.
pub const FIRST_WIND_MARK: char = '\u{7F}';

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u16 {
        /// Contents differ from the attached file (or creation state).
        const CHANGED   = 1 << 0;
        /// Contents reflect the attached file (lazily read on activation).
        const ACTIVE    = 1 << 1;
        const READ_ONLY = 1 << 2;
        const HIDDEN    = 1 << 3;
        /// Name begins with the macro sigil; may carry a `MacroInfo`.
        const MACRO     = 1 << 4;
        const NARROWED  = 1 << 5;
        /// Macro is safe to bind to a hook.
        const CONSTRAIN = 1 << 6;
        /// Messages from this buffer may carry attribute sentinels.
        const TERM_ATTR = 1 << 7;
        /// Loop blocks have been resolved and cached in `MacroInfo`.
        const PREPROC   = 1 << 8;
        /// Save has been confirmed once for this quit cycle.
        const QSAVE     = 1 << 9;
    }
}

/// `(line, offset)` with `0 <= offset <= line.used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub line: LineId,
    pub off: usize,
}

impl Point {
    pub fn new(line: LineId, off: usize) -> Self {
        Self { line, off }
    }
}

/// A named saved point plus a reframe-row hint.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pub code: char,
    pub point: Point,
    pub reframe: i32,
    pub active: bool,
}

/// Block kinds recorded by the script pre-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    Until,
    For,
    Loop,
    Break,
    Next,
}

impl LoopKind {
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            LoopKind::While | LoopKind::Until | LoopKind::For | LoopKind::Loop
        )
    }
}

/// One resolved loop block: the opening keyword line, its `endloop`, and
/// (for loop kinds) the parent loop's `endloop` for multi-level break.
#[derive(Debug, Clone, Copy)]
pub struct LoopBlock {
    pub kind: LoopKind,
    pub mark: LineId,
    pub jump: LineId,
    pub brk: Option<LineId>,
}

/// Extension record attached to macro buffers.
#[derive(Debug, Clone, Default)]
pub struct MacroInfo {
    pub min_args: i32,
    /// Negative means unlimited.
    pub max_args: i32,
    /// Concurrent executions of this buffer (re-entrancy depth).
    pub nexec: u32,
    pub usage: Option<String>,
    pub desc: Option<String>,
    pub loop_blocks: Vec<LoopBlock>,
}

#[derive(Debug, Clone, Copy)]
struct Fragment {
    first: LineId,
    last: LineId,
}

#[derive(Debug)]
pub struct Buffer {
    name: String,
    pub filename: Option<PathBuf>,
    store: LineStore,
    first: LineId,
    pub point: Point,
    marks: SmallVec<[Mark; 4]>,
    pub modes: ModeSet,
    pub flags: BufFlags,
    /// Number of windows currently displaying this buffer.
    pub nwind: u32,
    /// Number of aliases referring to this buffer.
    pub nalias: u32,
    pub macro_info: Option<MacroInfo>,
    top_fragment: Option<Fragment>,
    bottom_fragment: Option<Fragment>,
    /// Detected or assigned input line delimiter (raw bytes).
    pub input_delim: Option<Vec<u8>>,
}

impl Buffer {
    pub fn new(name: impl Into<String>) -> Self {
        let mut store = LineStore::new();
        let first = store.alloc(Vec::new());
        // Single line: it is its own tail.
        store.set_prev(first, Some(first));
        let name = name.into();
        let mut flags = BufFlags::empty();
        if name.starts_with(MACRO_SIGIL) {
            flags |= BufFlags::MACRO;
        }
        Self {
            name,
            filename: None,
            store,
            first,
            point: Point::new(first, 0),
            marks: SmallVec::new(),
            modes: ModeSet::default(),
            flags,
            nwind: 0,
            nalias: 0,
            macro_info: None,
            top_fragment: None,
            bottom_fragment: None,
            input_delim: None,
        }
    }

    /// Build a buffer from text, splitting on `\n`. Text ending in `\n`
    /// yields a trailing empty line, matching file-read semantics.
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        let mut b = Self::new(name);
        if !text.is_empty() {
            let head = b.first;
            let mut parts = text.split('\n');
            if let Some(first) = parts.next() {
                b.store.text_mut(head).extend_from_slice(first.as_bytes());
            }
            for part in parts {
                b.append_line(part.as_bytes());
            }
        }
        b
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        if name.starts_with(MACRO_SIGIL) {
            self.flags |= BufFlags::MACRO;
        } else {
            self.flags -= BufFlags::MACRO;
        }
        self.name = name;
    }

    pub fn is_macro(&self) -> bool {
        self.flags.contains(BufFlags::MACRO)
    }

    /// Re-entrancy depth of this buffer as a running macro.
    pub fn nexec(&self) -> u32 {
        self.macro_info.as_ref().map(|m| m.nexec).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Line list access
    // ------------------------------------------------------------------

    pub fn first_line(&self) -> LineId {
        self.first
    }

    pub fn last_line(&self) -> LineId {
        self.store.prev(self.first).expect("head.prev is the tail")
    }

    /// Next line, or `None` at the tail.
    pub fn next_line(&self, id: LineId) -> Option<LineId> {
        self.store.next(id)
    }

    /// Previous line, or `None` at the head.
    pub fn prev_line(&self, id: LineId) -> Option<LineId> {
        if id == self.first {
            None
        } else {
            self.store.prev(id)
        }
    }

    pub fn line_text(&self, id: LineId) -> &[u8] {
        self.store.text(id)
    }

    pub fn line_len(&self, id: LineId) -> usize {
        self.store.used(id)
    }

    /// Byte at a point, or `None` at end-of-line (where a terminator would
    /// be synthesized).
    pub fn byte_at(&self, p: Point) -> Option<u8> {
        self.store.text(p.line).get(p.off).copied()
    }

    pub fn line_count(&self) -> usize {
        self.lines().count()
    }

    /// 1-based line number, walking from the head.
    pub fn line_number(&self, id: LineId) -> usize {
        let mut n = 1;
        let mut cur = self.first;
        while cur != id {
            match self.next_line(cur) {
                Some(next) => {
                    cur = next;
                    n += 1;
                }
                None => return n, // stale id; best effort
            }
        }
        n
    }

    /// Line id at 1-based line number `n` (clamped to the last line).
    pub fn nth_line(&self, n: usize) -> LineId {
        let mut cur = self.first;
        for _ in 1..n {
            match self.next_line(cur) {
                Some(next) => cur = next,
                None => break,
            }
        }
        cur
    }

    pub fn lines(&self) -> impl Iterator<Item = LineId> + '_ {
        let mut cur = Some(self.first);
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.next_line(id);
            Some(id)
        })
    }

    /// True iff the buffer holds a single line of zero length.
    pub fn is_empty(&self) -> bool {
        self.next_line(self.first).is_none() && self.line_len(self.first) == 0
    }

    /// Full contents with `\n` between lines.
    pub fn contents(&self) -> String {
        let mut out = String::new();
        for (i, id) in self.lines().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&String::from_utf8_lossy(self.line_text(id)));
        }
        out
    }

    /// Append a line after the current tail.
    pub fn append_line(&mut self, text: &[u8]) -> LineId {
        let new = self.store.alloc(text.to_vec());
        let tail = self.last_line();
        self.store.link_after(new, tail);
        // link_after set new.next from tail.next, which was None; fix head.prev.
        self.store.set_prev(self.first, Some(new));
        new
    }

    fn validate(&self, p: Point) -> EdResult<()> {
        if p.off > self.line_len(p.line) {
            return Err(Status::failure(format!(
                "Offset {} past end of line (length {})",
                p.off,
                self.line_len(p.line)
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Editing primitives
    // ------------------------------------------------------------------

    /// Shift marks and point on `line` after a splice of `delta` bytes at
    /// `at` (positive inserts, negative deletes).
    fn shift_positions(&mut self, line: LineId, at: usize, delta: isize) {
        let adjust = |off: &mut usize| {
            if *off > at {
                if delta >= 0 {
                    *off += delta as usize;
                } else {
                    *off = at.max(*off - delta.unsigned_abs().min(*off - at));
                }
            }
        };
        if self.point.line == line {
            adjust(&mut self.point.off);
        }
        for m in self.marks.iter_mut() {
            if m.point.line == line {
                adjust(&mut m.point.off);
            }
        }
    }

    /// Split `at.line` at `at.off`; the remainder moves to a new line
    /// linked after it. Positions at or past the split move with it.
    fn split_line(&mut self, at: Point) -> LineId {
        let rest = self.store.text_mut(at.line).split_off(at.off);
        let new = self.store.alloc(rest);
        if self.next_line(at.line).is_none() {
            // Splitting the tail: new line becomes the tail.
            self.store.link_after(new, at.line);
            self.store.set_prev(self.first, Some(new));
        } else {
            self.store.link_after(new, at.line);
        }
        let move_pos = |p: &mut Point| {
            if p.line == at.line && p.off >= at.off {
                p.line = new;
                p.off -= at.off;
            }
        };
        move_pos(&mut self.point);
        for m in self.marks.iter_mut() {
            move_pos(&mut m.point);
        }
        new
    }

    /// Join the successor of `id` onto `id`, consuming the line boundary.
    fn join_with_next(&mut self, id: LineId) -> EdResult<()> {
        let next = self
            .next_line(id)
            .ok_or_else(Status::not_found)?;
        let base = self.line_len(id);
        let tail_text = std::mem::take(self.store.text_mut(next));
        self.store.text_mut(id).extend_from_slice(&tail_text);
        let move_pos = |p: &mut Point| {
            if p.line == next {
                p.line = id;
                p.off += base;
            }
        };
        move_pos(&mut self.point);
        for m in self.marks.iter_mut() {
            move_pos(&mut m.point);
        }
        if self.next_line(next).is_none() {
            // Removing the tail: id becomes the new tail.
            self.store.unlink(next);
            self.store.set_prev(self.first, Some(id));
        } else {
            self.store.unlink(next);
        }
        self.store.dealloc(next);
        Ok(())
    }

    /// Insert bytes at a point; `\n` splits lines. Returns the position
    /// just past the inserted text. This is the sole inserting primitive.
    pub fn insert(&mut self, at: Point, bytes: &[u8]) -> EdResult<Point> {
        self.validate(at)?;
        let mut cur = at;
        for (i, seg) in bytes.split(|&b| b == b'\n').enumerate() {
            if i > 0 {
                let new = self.split_line(cur);
                cur = Point::new(new, 0);
            }
            if !seg.is_empty() {
                let text = self.store.text_mut(cur.line);
                text.splice(cur.off..cur.off, seg.iter().copied());
                let start = cur.off;
                cur.off += seg.len();
                self.shift_positions(cur.line, start, seg.len() as isize);
            }
        }
        self.flags |= BufFlags::CHANGED;
        Ok(cur)
    }

    /// Delete `n` bytes forward from `at`, counting one byte per line
    /// boundary crossed. Returns the deleted bytes (with `\n` at joins),
    /// or bare `NotFound` if the end of the buffer intervenes.
    pub fn delete(&mut self, at: Point, n: usize) -> EdResult<Vec<u8>> {
        self.validate(at)?;
        let mut out = Vec::with_capacity(n);
        let mut remaining = n;
        let line = at.line;
        let off = at.off;
        while remaining > 0 {
            let len = self.line_len(line);
            if off < len {
                let take = remaining.min(len - off);
                let removed: Vec<u8> = self
                    .store
                    .text_mut(line)
                    .drain(off..off + take)
                    .collect();
                out.extend_from_slice(&removed);
                self.shift_positions(line, off, -(take as isize));
                remaining -= take;
            } else if self.next_line(line).is_some() {
                out.push(b'\n');
                self.join_with_next(line)?;
                remaining -= 1;
            } else {
                self.flags |= BufFlags::CHANGED;
                return Err(Status::not_found());
            }
        }
        if !out.is_empty() {
            self.flags |= BufFlags::CHANGED;
        }
        Ok(out)
    }

    /// Collect the bytes between two points, `from` preceding `to`, with
    /// `\n` at line boundaries.
    pub fn text_between(&self, from: Point, to: Point) -> Vec<u8> {
        let mut out = Vec::new();
        let mut line = from.line;
        let mut off = from.off;
        loop {
            if line == to.line {
                out.extend_from_slice(&self.line_text(line)[off..to.off]);
                return out;
            }
            out.extend_from_slice(&self.line_text(line)[off..]);
            out.push(b'\n');
            match self.next_line(line) {
                Some(next) => {
                    line = next;
                    off = 0;
                }
                None => return out,
            }
        }
    }

    /// True if `a` is at or before `b` in buffer order.
    pub fn point_precedes(&self, a: Point, b: Point) -> bool {
        if a.line == b.line {
            return a.off <= b.off;
        }
        self.line_number(a.line) < self.line_number(b.line)
    }

    // ------------------------------------------------------------------
    // Motion
    // ------------------------------------------------------------------

    /// One byte forward (line boundaries count as one byte). Bare
    /// `NotFound` at the end of the buffer.
    pub fn forward_char(&self, p: Point) -> EdResult<Point> {
        if p.off < self.line_len(p.line) {
            Ok(Point::new(p.line, p.off + 1))
        } else if let Some(next) = self.next_line(p.line) {
            Ok(Point::new(next, 0))
        } else {
            Err(Status::not_found())
        }
    }

    pub fn backward_char(&self, p: Point) -> EdResult<Point> {
        if p.off > 0 {
            Ok(Point::new(p.line, p.off - 1))
        } else if let Some(prev) = self.prev_line(p.line) {
            Ok(Point::new(prev, self.line_len(prev)))
        } else {
            Err(Status::not_found())
        }
    }

    pub fn move_chars(&self, mut p: Point, n: isize) -> EdResult<Point> {
        if n >= 0 {
            for _ in 0..n {
                p = self.forward_char(p)?;
            }
        } else {
            for _ in 0..-n {
                p = self.backward_char(p)?;
            }
        }
        Ok(p)
    }

    // ------------------------------------------------------------------
    // Marks
    // ------------------------------------------------------------------

    pub fn set_mark(&mut self, code: char, point: Point, reframe: i32) {
        if let Some(m) = self.marks.iter_mut().find(|m| m.code == code) {
            m.point = point;
            m.reframe = reframe;
            m.active = true;
            return;
        }
        self.marks.push(Mark {
            code,
            point,
            reframe,
            active: true,
        });
    }

    pub fn find_mark(&self, code: char) -> Option<&Mark> {
        self.marks.iter().find(|m| m.code == code)
    }

    pub fn delete_mark(&mut self, code: char) -> bool {
        if let Some(pos) = self.marks.iter().position(|m| m.code == code) {
            self.marks.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn marks(&self) -> impl Iterator<Item = &Mark> {
        self.marks.iter()
    }

    // ------------------------------------------------------------------
    // Narrowing
    // ------------------------------------------------------------------

    /// Hide all lines outside the `nlines` lines starting at `start`,
    /// detaching them as top and bottom fragments. Marks outside the
    /// region are inactivated; a point outside moves to the region start.
    pub fn narrow(&mut self, start: LineId, nlines: usize) -> EdResult<()> {
        if self.flags.contains(BufFlags::NARROWED) {
            return Err(Status::failure(format!(
                "Buffer '{}' is already narrowed",
                self.name
            )));
        }
        if nlines == 0 {
            return Err(Status::failure("Cannot narrow to zero lines"));
        }
        // Find the last line of the region.
        let mut end = start;
        for _ in 1..nlines {
            match self.next_line(end) {
                Some(next) => end = next,
                None => break,
            }
        }
        if start == self.first && self.next_line(end).is_none() {
            return Err(Status::failure("Nothing to hide: region is whole buffer"));
        }
        let old_tail = self.last_line();

        // Detach the leading fragment.
        if start != self.first {
            let frag = Fragment {
                first: self.first,
                last: self.store.prev(start).expect("start is not the head"),
            };
            self.store.set_next(frag.last, None);
            self.top_fragment = Some(frag);
            self.first = start;
        }
        // Detach the trailing fragment.
        if let Some(after) = self.next_line(end) {
            let frag = Fragment {
                first: after,
                last: old_tail,
            };
            self.store.set_next(end, None);
            self.bottom_fragment = Some(frag);
        }
        // Region tail is the new tail.
        self.store.set_prev(self.first, Some(end));

        // Inactivate marks (and relocate the point) outside the region.
        let visible: HashSet<LineId> = self.lines().collect();
        for m in self.marks.iter_mut() {
            if !visible.contains(&m.point.line) {
                m.active = false;
            }
        }
        if !visible.contains(&self.point.line) {
            self.point = Point::new(self.first, 0);
        }
        self.flags |= BufFlags::NARROWED;
        debug!(target: "buffer", buffer = %self.name, lines = nlines, "narrowed");
        Ok(())
    }

    /// Reattach the detached fragments and reactivate marks.
    pub fn widen(&mut self) -> EdResult<()> {
        if !self.flags.contains(BufFlags::NARROWED) {
            return Err(Status::failure(format!(
                "Buffer '{}' is not narrowed",
                self.name
            )));
        }
        if let Some(frag) = self.bottom_fragment.take() {
            let tail = self.last_line();
            self.store.set_next(tail, Some(frag.first));
            self.store.set_prev(frag.first, Some(tail));
            self.store.set_prev(self.first, Some(frag.last));
        }
        if let Some(frag) = self.top_fragment.take() {
            let tail = self.last_line();
            self.store.set_next(frag.last, Some(self.first));
            self.store.set_prev(self.first, Some(frag.last));
            self.first = frag.first;
            self.store.set_prev(self.first, Some(tail));
        }
        for m in self.marks.iter_mut() {
            m.active = true;
        }
        self.flags -= BufFlags::NARROWED;
        debug!(target: "buffer", buffer = %self.name, "widened");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Whole-buffer operations
    // ------------------------------------------------------------------

    /// Reset to a single empty line. A narrowed buffer is widened first so
    /// no fragment lines leak.
    pub fn clear(&mut self) -> EdResult<()> {
        if self.flags.contains(BufFlags::NARROWED) {
            self.widen()?;
        }
        let ids: Vec<LineId> = self.lines().collect();
        for id in ids {
            self.store.dealloc(id);
        }
        let first = self.store.alloc(Vec::new());
        self.store.set_prev(first, Some(first));
        self.first = first;
        self.point = Point::new(first, 0);
        self.marks.clear();
        self.flags -= BufFlags::CHANGED;
        Ok(())
    }
}

/// Validate a buffer name: non-empty, no control characters, and the macro
/// sigil only in first position.
pub fn valid_buffer_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(|c| c.is_control())
        && !name[1..].contains(MACRO_SIGIL)
}

/// Derive a buffer name from a filename: the final path component, with a
/// leading space or macro sigil replaced and trailing whitespace stripped.
pub fn name_from_filename(path: &std::path::Path) -> String {
    let base = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string());
    let mut name: String = base.trim_end().to_string();
    if let Some(first) = name.chars().next()
        && (first == ' ' || first == MACRO_SIGIL)
    {
        name.replace_range(..first.len_utf8(), &ALT_LEAD_CHAR.to_string());
    }
    if name.is_empty() {
        name.push(ALT_LEAD_CHAR);
    }
    name
}

/// Make a unique name from `base` by stripping trailing digits, adding one
/// to the numeric suffix, and retrying until `taken` rejects it.
pub fn auto_unique_name(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    let mut name = base.to_string();
    while taken(&name) {
        let stem_len = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let n: u64 = name[stem_len..].parse().unwrap_or(0);
        name.truncate(stem_len);
        name.push_str(&(n + 1).to_string());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_single_zero_line() {
        let b = Buffer::new("t");
        assert!(b.is_empty());
        assert_eq!(b.line_count(), 1);
        assert_eq!(b.contents(), "");
    }

    #[test]
    fn list_invariants_hold() {
        let b = Buffer::from_text("t", "a\nb\nc");
        // head.prev is the tail and tail.next is none.
        let tail = b.last_line();
        assert_eq!(b.next_line(tail), None);
        // forward walk then backward walk returns to the head
        let ids: Vec<LineId> = b.lines().collect();
        assert_eq!(ids.len(), 3);
        let mut cur = tail;
        let mut back = vec![cur];
        while let Some(p) = b.prev_line(cur) {
            back.push(p);
            cur = p;
        }
        back.reverse();
        assert_eq!(ids, back);
    }

    #[test]
    fn from_text_trailing_newline_yields_empty_last_line() {
        let b = Buffer::from_text("t", "a\n");
        assert_eq!(b.line_count(), 2);
        assert_eq!(b.line_text(b.last_line()), b"");
    }

    #[test]
    fn insert_plain_and_multiline() {
        let mut b = Buffer::from_text("t", "hello");
        let end = b.insert(Point::new(b.first_line(), 5), b", world").unwrap();
        assert_eq!(b.contents(), "hello, world");
        assert_eq!(end.off, 12);
        let end = b.insert(Point::new(b.first_line(), 5), b"\nX").unwrap();
        assert_eq!(b.contents(), "hello\nX, world");
        assert_eq!(b.line_number(end.line), 2);
        assert!(b.flags.contains(BufFlags::CHANGED));
    }

    #[test]
    fn insert_moves_point_past_split() {
        let mut b = Buffer::from_text("t", "abcd");
        b.point = Point::new(b.first_line(), 3);
        b.insert(Point::new(b.first_line(), 2), b"\n").unwrap();
        // Point was after the split position, so it followed the remainder.
        assert_eq!(b.line_number(b.point.line), 2);
        assert_eq!(b.point.off, 1);
    }

    #[test]
    fn delete_within_and_across_lines() {
        let mut b = Buffer::from_text("t", "ab\ncd");
        let got = b.delete(Point::new(b.first_line(), 1), 3).unwrap();
        assert_eq!(got, b"b\nc");
        assert_eq!(b.contents(), "ad");
    }

    #[test]
    fn delete_past_end_returns_not_found() {
        let mut b = Buffer::from_text("t", "ab");
        let err = b.delete(Point::new(b.first_line(), 1), 5).unwrap_err();
        assert_eq!(err.severity, core_status::Severity::NotFound);
        assert!(err.message().is_none());
    }

    #[test]
    fn motion_boundaries() {
        let b = Buffer::from_text("t", "a\nb");
        let last = b.last_line();
        assert!(b.forward_char(Point::new(last, 1)).is_err());
        assert!(b.backward_char(Point::new(b.first_line(), 0)).is_err());
        // crossing a boundary forward lands at start of next line
        let p = b.forward_char(Point::new(b.first_line(), 1)).unwrap();
        assert_eq!(p, Point::new(last, 0));
    }

    #[test]
    fn marks_follow_edits() {
        let mut b = Buffer::from_text("t", "abcdef");
        b.set_mark(REG_MARK, Point::new(b.first_line(), 4), 0);
        b.insert(Point::new(b.first_line(), 1), b"XY").unwrap();
        assert_eq!(b.find_mark(REG_MARK).unwrap().point.off, 6);
        b.delete(Point::new(b.first_line(), 0), 2).unwrap();
        assert_eq!(b.find_mark(REG_MARK).unwrap().point.off, 4);
    }

    #[test]
    fn narrow_edit_widen_round_trip() {
        // Lines A..E; narrow to B..D, append to C, widen.
        let mut b = Buffer::from_text("t", "A\nB\nC\nD\nE");
        let line_a = b.first_line();
        let line_e = b.last_line();
        b.set_mark('a', Point::new(line_a, 0), 0);
        b.set_mark('e', Point::new(line_e, 1), 0);
        let line_b = b.next_line(line_a).unwrap();
        b.narrow(line_b, 3).unwrap();
        assert!(b.flags.contains(BufFlags::NARROWED));
        assert_eq!(b.contents(), "B\nC\nD");
        assert!(!b.find_mark('a').unwrap().active);
        assert!(!b.find_mark('e').unwrap().active);

        let line_c = b.next_line(b.first_line()).unwrap();
        b.insert(Point::new(line_c, 1), b"X").unwrap();
        b.widen().unwrap();
        assert_eq!(b.contents(), "A\nB\nCX\nD\nE");
        let ma = b.find_mark('a').unwrap();
        assert!(ma.active);
        assert_eq!(ma.point, Point::new(line_a, 0));
        let me = b.find_mark('e').unwrap();
        assert!(me.active);
        assert_eq!(me.point, Point::new(line_e, 1));
    }

    #[test]
    fn narrow_whole_buffer_rejected() {
        let mut b = Buffer::from_text("t", "A\nB");
        let first = b.first_line();
        assert!(b.narrow(first, 2).is_err());
    }

    #[test]
    fn narrow_at_head_has_only_bottom_fragment() {
        let mut b = Buffer::from_text("t", "A\nB\nC");
        let first = b.first_line();
        b.narrow(first, 1).unwrap();
        assert_eq!(b.contents(), "A");
        b.widen().unwrap();
        assert_eq!(b.contents(), "A\nB\nC");
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut b = Buffer::from_text("t", "A\nB");
        b.set_mark('x', b.point, 0);
        b.clear().unwrap();
        assert!(b.is_empty());
        assert!(b.find_mark('x').is_none());
        assert!(!b.flags.contains(BufFlags::CHANGED));
    }

    #[test]
    fn name_helpers() {
        assert!(valid_buffer_name("main.rs"));
        assert!(!valid_buffer_name(""));
        assert!(!valid_buffer_name("a@b"));
        assert_eq!(
            name_from_filename(std::path::Path::new("/tmp/@script")),
            "_script"
        );
        let names = ["scratch", "scratch1"];
        let unique = auto_unique_name("scratch", |n| names.contains(&n));
        assert_eq!(unique, "scratch2");
    }

    #[test]
    fn text_between_spans_lines() {
        let b = Buffer::from_text("t", "ab\ncd");
        let from = Point::new(b.first_line(), 1);
        let to = Point::new(b.last_line(), 1);
        assert_eq!(b.text_between(from, to), b"b\nc");
    }
}
