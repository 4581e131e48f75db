//! Scan positions, the recursive matcher, and the RE scan drivers.
//!
//! A scan position addresses either a buffer point or an offset in a
//! string, so the same matcher serves buffer searches and script string
//! operations. `nextch` synthesizes a line terminator when it crosses a
//! line boundary; pattern comparison always consumes in the direction of
//! the program being run (forward program forward, reversed program
//! backward), which keeps the matcher direction-agnostic.

use crate::bm::{self, Hit};
use crate::mc::{Closure, MKind, MNode};
use crate::{MAX_GROUPS, MatchRecord, WordTable, eq_bytes};
use core_buffer::{Buffer, Point};
use core_status::{EdResult, Status};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Fetch the next (or previous) scan byte in a buffer and advance (or
/// retreat) the position. Line boundaries yield `\n`. `None` at a buffer
/// boundary.
pub(crate) fn nextch_buf(buf: &Buffer, pos: &mut Point, dir: Direction) -> Option<u8> {
    match dir {
        Direction::Forward => {
            if pos.off == buf.line_len(pos.line) {
                let next = buf.next_line(pos.line)?;
                *pos = Point::new(next, 0);
                Some(b'\n')
            } else {
                let c = buf.line_text(pos.line)[pos.off];
                pos.off += 1;
                Some(c)
            }
        }
        Direction::Backward => {
            if pos.off == 0 {
                let prev = buf.prev_line(pos.line)?;
                *pos = Point::new(prev, buf.line_len(prev));
                Some(b'\n')
            } else {
                pos.off -= 1;
                Some(buf.line_text(pos.line)[pos.off])
            }
        }
    }
}

fn nextch_str(s: &[u8], off: &mut usize, dir: Direction) -> Option<u8> {
    match dir {
        Direction::Forward => {
            if *off < s.len() {
                let c = s[*off];
                *off += 1;
                Some(c)
            } else {
                None
            }
        }
        Direction::Backward => {
            if *off > 0 {
                *off -= 1;
                Some(s[*off])
            } else {
                None
            }
        }
    }
}

/// What the matcher is scanning.
#[derive(Clone, Copy)]
enum Target<'a> {
    Buf(&'a Buffer),
    Str(&'a [u8]),
}

/// A position within a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SPos {
    Buf(Point),
    Str(usize),
}

struct MatchCtx<'a> {
    target: Target<'a>,
    word: &'a WordTable,
    dir: Direction,
    multi: bool,
    exact: bool,
}

/// Group capture slots recorded during a match attempt: the scan position
/// at each group's begin and end node.
#[derive(Default)]
struct GroupSlots {
    open: [Option<SPos>; MAX_GROUPS],
    close: [Option<SPos>; MAX_GROUPS],
}

impl<'a> MatchCtx<'a> {
    fn nextch(&self, pos: &mut SPos, dir: Direction) -> Option<u8> {
        match (self.target, pos) {
            (Target::Buf(buf), SPos::Buf(p)) => nextch_buf(buf, p, dir),
            (Target::Str(s), SPos::Str(off)) => nextch_str(s, off, dir),
            _ => None,
        }
    }

    fn swap_case(b: u8) -> u8 {
        if b.is_ascii_lowercase() {
            b.to_ascii_uppercase()
        } else {
            b.to_ascii_lowercase()
        }
    }

    /// Metachar equality for consuming node kinds. The boundary value
    /// (`None`) never matches anything.
    fn mceq(&self, c: Option<u8>, kind: &MKind) -> bool {
        let Some(c) = c else {
            return false;
        };
        match kind {
            MKind::Lit(l) => eq_bytes(c, *l, self.exact),
            MKind::Any => c != b'\n' || self.multi,
            MKind::Ccl(bm) => {
                bm.test(c) || (!self.exact && bm.test(Self::swap_case(c)))
            }
            MKind::NotCcl(bm) => {
                (c != b'\n' || self.multi)
                    && !bm.test(c)
                    && (self.exact || !bm.test(Self::swap_case(c)))
            }
            _ => false,
        }
    }

    /// Zero-width assertion test at a position. An empty target always
    /// matches every anchor.
    fn anchor_ok(&self, kind: &MKind, pos: SPos) -> bool {
        match (self.target, pos) {
            (Target::Buf(buf), SPos::Buf(p)) => {
                if buf.is_empty() {
                    return true;
                }
                let used = buf.line_len(p.line);
                let last = buf.last_line();
                match kind {
                    MKind::Bol => p.off == 0,
                    MKind::Eol => p.off == used,
                    MKind::BufBegin => {
                        if self.multi {
                            p.line == buf.first_line() && p.off == 0
                        } else {
                            p.off == 0
                        }
                    }
                    MKind::BufEnd => {
                        if self.multi {
                            p.line == last && p.off == used
                        } else {
                            p.off == 0 && p.line != buf.first_line()
                        }
                    }
                    MKind::BufEndAlt => {
                        if self.multi {
                            let ends_with_term =
                                buf.line_len(last) == 0 && buf.prev_line(last).is_some();
                            if p.line == last && p.off == used {
                                !ends_with_term
                            } else {
                                ends_with_term
                                    && buf.next_line(p.line) == Some(last)
                                    && p.off == used
                            }
                        } else {
                            p.off == used
                        }
                    }
                    _ => false,
                }
            }
            (Target::Str(s), SPos::Str(off)) => {
                if s.is_empty() {
                    return true;
                }
                match kind {
                    MKind::Bol => off == 0 || s[off - 1] == b'\n',
                    MKind::Eol => off == s.len() || s[off] == b'\n',
                    MKind::BufBegin => off == 0,
                    MKind::BufEnd => off == s.len(),
                    MKind::BufEndAlt => {
                        if off == s.len() {
                            s[s.len() - 1] != b'\n'
                        } else {
                            s[off] == b'\n' && off == s.len() - 1
                        }
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Word-ness of the characters around a position (previous, current).
    fn word_context(&self, pos: SPos) -> (bool, bool) {
        match (self.target, pos) {
            (Target::Buf(buf), SPos::Buf(p)) => {
                let prev = if p.off > 0 {
                    self.word.is_word(buf.line_text(p.line)[p.off - 1])
                } else {
                    buf.prev_line(p.line).is_some() && self.word.is_word(b'\n')
                };
                let cur = if p.off < buf.line_len(p.line) {
                    self.word.is_word(buf.line_text(p.line)[p.off])
                } else {
                    buf.next_line(p.line).is_some() && self.word.is_word(b'\n')
                };
                (prev, cur)
            }
            (Target::Str(s), SPos::Str(off)) => {
                let prev = off > 0 && self.word.is_word(s[off - 1]);
                let cur = off < s.len() && self.word.is_word(s[off]);
                (prev, cur)
            }
            _ => (false, false),
        }
    }

    /// Extract the text between two scan positions (order-agnostic).
    fn text_between(&self, a: SPos, b: SPos) -> String {
        match (self.target, a, b) {
            (Target::Buf(buf), SPos::Buf(pa), SPos::Buf(pb)) => {
                let (from, to) = if buf.point_precedes(pa, pb) {
                    (pa, pb)
                } else {
                    (pb, pa)
                };
                String::from_utf8_lossy(&buf.text_between(from, to)).into_owned()
            }
            (Target::Str(s), SPos::Str(oa), SPos::Str(ob)) => {
                let (from, to) = if oa <= ob { (oa, ob) } else { (ob, oa) };
                String::from_utf8_lossy(&s[from..to]).into_owned()
            }
            _ => String::new(),
        }
    }
}

/// Try to match the program at `pos`, recursing once per closure. Returns
/// the end position on success.
fn amatch(ctx: &MatchCtx, groups: &mut GroupSlots, prog: &[MNode], pos: SPos) -> Option<SPos> {
    let mut pos = pos;
    let mut idx = 0;
    while idx < prog.len() {
        let node = &prog[idx];
        if let Some(cl) = node.closure {
            return closure_match(ctx, groups, node, cl, &prog[idx + 1..], pos);
        }
        match &node.kind {
            MKind::GroupBegin(n) => groups.open[*n] = Some(pos),
            MKind::GroupEnd(n) => groups.close[*n] = Some(pos),
            MKind::WordBound { negate } => {
                let (prev, cur) = ctx.word_context(pos);
                if (prev == cur) != *negate {
                    return None;
                }
            }
            k if k.is_zero_width() => {
                if !ctx.anchor_ok(k, pos) {
                    return None;
                }
            }
            k => {
                let c = ctx.nextch(&mut pos, ctx.dir);
                if !ctx.mceq(c, k) {
                    return None;
                }
            }
        }
        idx += 1;
    }
    Some(pos)
}

/// Closure handling: consume the minimum, then grow (lazy) or shrink
/// (greedy) by one scan byte per failed suffix match.
fn closure_match(
    ctx: &MatchCtx,
    groups: &mut GroupSlots,
    node: &MNode,
    cl: Closure,
    rest: &[MNode],
    start: SPos,
) -> Option<SPos> {
    let max = cl.max.map(|m| m as usize);
    if cl.lazy {
        let mut pos = start;
        for _ in 0..cl.min {
            let c = ctx.nextch(&mut pos, ctx.dir);
            if !ctx.mceq(c, &node.kind) {
                return None;
            }
        }
        let mut count = cl.min as usize;
        loop {
            if let Some(end) = amatch(ctx, groups, rest, pos) {
                return Some(end);
            }
            if max.is_some_and(|m| count == m) {
                return None;
            }
            let c = ctx.nextch(&mut pos, ctx.dir);
            if !ctx.mceq(c, &node.kind) {
                return None;
            }
            count += 1;
        }
    } else {
        // Record the position after each consumed byte so backtracking is
        // a simple walk down the list.
        let mut stops: SmallVec<[SPos; 16]> = SmallVec::new();
        stops.push(start);
        let mut pos = start;
        while max.is_none_or(|m| stops.len() <= m) {
            let mut probe = pos;
            let c = ctx.nextch(&mut probe, ctx.dir);
            if !ctx.mceq(c, &node.kind) {
                break;
            }
            pos = probe;
            stops.push(pos);
        }
        if stops.len() <= cl.min as usize {
            return None;
        }
        for &stop in stops.iter().skip(cl.min as usize).rev() {
            if let Some(end) = amatch(ctx, groups, rest, stop) {
                return Some(end);
            }
        }
        None
    }
}

/// Store group captures from a completed attempt into the match record.
fn save_groups(
    ctx: &MatchCtx,
    groups: &GroupSlots,
    mr: &mut MatchRecord,
    whole_start: SPos,
    whole_end: SPos,
) {
    let mut out: Vec<Option<String>> = Vec::with_capacity(mr.group_count + 1);
    out.push(Some(ctx.text_between(whole_start, whole_end)));
    for n in 1..=mr.group_count {
        match (groups.open[n], groups.close[n]) {
            (Some(a), Some(b)) => out.push(Some(ctx.text_between(a, b))),
            _ => out.push(None),
        }
    }
    mr.groups = out;
}

fn at_buffer_boundary(buf: &Buffer, p: Point, dir: Direction) -> bool {
    match dir {
        Direction::Forward => {
            p.line == buf.last_line() && p.off == buf.line_len(p.line)
        }
        Direction::Backward => p.line == buf.first_line() && p.off == 0,
    }
}

/// RE scan over a buffer: find the `n`th match from `from`. The buffer
/// boundary must be hit twice before giving up so zero-width anchors can
/// match at either end. Returns bare `NotFound` on exhaustion.
pub fn scan_re(
    buf: &Buffer,
    from: Point,
    n: usize,
    dir: Direction,
    mr: &mut MatchRecord,
    word: &WordTable,
    exact: bool,
) -> EdResult<Hit> {
    let prog: Vec<MNode> = match dir {
        Direction::Forward => mr.mc_fwd.clone(),
        Direction::Backward => mr.mc_bwd.clone(),
    };
    if prog.is_empty() {
        return Err(Status::failure("Search pattern not compiled"));
    }
    let ctx = MatchCtx {
        target: Target::Buf(buf),
        word,
        dir,
        multi: mr.flags.contains(crate::SearchFlags::MULTI),
        exact,
    };
    let mut n = n.max(1);
    let mut sdot = SPos::Buf(from);
    let mut hit_boundary = false;
    loop {
        let mut groups = GroupSlots::default();
        if let Some(end) = amatch(&ctx, &mut groups, &prog, sdot) {
            let (start, stop) = match dir {
                Direction::Forward => (sdot, end),
                Direction::Backward => (end, sdot),
            };
            save_groups(&ctx, &groups, mr, start, stop);
            n -= 1;
            let (SPos::Buf(ps), SPos::Buf(pe)) = (start, stop) else {
                return Err(Status::failure("Scan position type mismatch"));
            };
            if n == 0 {
                return Ok(Hit { start: ps, end: pe });
            }
            // Continue past this match; force progress on zero-length hits.
            if end == sdot {
                let _ = ctx.nextch(&mut sdot, dir);
            } else {
                sdot = end;
            }
        } else {
            let _ = ctx.nextch(&mut sdot, dir);
        }
        let SPos::Buf(p) = sdot else {
            return Err(Status::failure("Scan position type mismatch"));
        };
        if at_buffer_boundary(buf, p, dir) {
            if hit_boundary {
                break;
            }
            hit_boundary = true;
        }
    }
    Err(Status::not_found())
}

/// Match the compiled pattern against a string. `scan_off >= 0` scans
/// forward from that offset; negative scans backward from the end.
/// On success, fills the record's groups and returns the match's start
/// offset; `Ok(None)` when there is no match.
pub fn match_in_string(
    s: &str,
    scan_off: isize,
    mr: &mut MatchRecord,
    word: &WordTable,
    exact: bool,
) -> EdResult<Option<usize>> {
    let bytes = s.as_bytes();
    let backward = scan_off < 0;
    let prog: Vec<MNode> = if backward {
        mr.mc_bwd.clone()
    } else {
        mr.mc_fwd.clone()
    };
    if prog.is_empty() {
        return Err(Status::failure("Search pattern not compiled"));
    }
    let ctx = MatchCtx {
        target: Target::Str(bytes),
        word,
        dir: if backward {
            Direction::Backward
        } else {
            Direction::Forward
        },
        multi: mr.flags.contains(crate::SearchFlags::MULTI),
        exact,
    };
    let starts: Vec<usize> = if backward {
        (0..=bytes.len()).rev().collect()
    } else {
        (scan_off as usize..=bytes.len()).collect()
    };
    for off in starts {
        let mut groups = GroupSlots::default();
        if let Some(end) = amatch(&ctx, &mut groups, &prog, SPos::Str(off)) {
            let (start, stop) = if backward {
                (end, SPos::Str(off))
            } else {
                (SPos::Str(off), end)
            };
            save_groups(&ctx, &groups, mr, start, stop);
            let SPos::Str(begin) = start else {
                return Err(Status::failure("Scan position type mismatch"));
            };
            return Ok(Some(begin));
        }
    }
    Ok(None)
}

/// Unified buffer search: compiles what the effective mode needs, runs
/// the plain or RE engine, and stores group 0 (plus RE groups) in the
/// record. Returns bare `NotFound` when the pattern does not occur.
pub fn search(
    buf: &Buffer,
    from: Point,
    n: usize,
    dir: Direction,
    mr: &mut MatchRecord,
    word: &WordTable,
    global_exact: bool,
    global_regexp: bool,
) -> EdResult<Hit> {
    mr.ensure_compiled(global_exact, global_regexp, word)?;
    let exact = mr.exact_mode(global_exact);
    if mr.plain_search(global_regexp) {
        let hit = {
            let deltas = mr
                .deltas
                .as_ref()
                .ok_or_else(|| Status::failure("Search pattern not compiled"))?;
            bm::scan(buf, from, n, dir, deltas, exact)?
        };
        let text = String::from_utf8_lossy(&buf.text_between(hit.start, hit.end)).into_owned();
        mr.groups = vec![Some(text)];
        Ok(hit)
    } else {
        scan_re(buf, from, n, dir, mr, word, exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchFlags;

    fn record(pat: &str) -> (MatchRecord, WordTable) {
        let mut mr = MatchRecord::new();
        mr.set_pattern(pat).unwrap();
        let word = WordTable::default();
        mr.ensure_compiled(true, true, &word).unwrap();
        (mr, word)
    }

    fn find_all(text: &str, pat: &str) -> Vec<(usize, usize)> {
        let buf = Buffer::from_text("t", text);
        let (mut mr, word) = record(pat);
        let mut out = Vec::new();
        let mut from = Point::new(buf.first_line(), 0);
        loop {
            match scan_re(&buf, from, 1, Direction::Forward, &mut mr, &word, true) {
                Ok(hit) => {
                    let prefix: usize = text
                        .lines()
                        .take(buf.line_number(hit.start.line) - 1)
                        .map(|l| l.len() + 1)
                        .sum();
                    out.push((
                        prefix + hit.start.off,
                        mr.last_match().map(|m| m.len()).unwrap_or(0),
                    ));
                    if hit.end == from {
                        match buf.forward_char(from) {
                            Ok(p) => from = p,
                            Err(_) => break,
                        }
                    } else {
                        from = hit.end;
                    }
                }
                Err(_) => break,
            }
        }
        out
    }

    #[test]
    fn literal_re_and_closure() {
        assert_eq!(find_all("xaaay", "a+"), vec![(1, 3)]);
        assert_eq!(find_all("xy", "x*y"), vec![(0, 2)]);
    }

    #[test]
    fn greedy_vs_lazy() {
        let (mut mr, word) = record("<.+>");
        let buf = Buffer::from_text("t", "<a> <b>");
        scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!(mr.last_match(), Some("<a> <b>"));

        let (mut mr, word) = record("<.+?>");
        scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!(mr.last_match(), Some("<a>"));
    }

    #[test]
    fn groups_capture() {
        let buf = Buffer::from_text("t", "foo-bar baz-qux");
        let (mut mr, word) = record(r"(\w+)-(\w+)");
        scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!(mr.group(0), Some("foo-bar"));
        assert_eq!(mr.group(1), Some("foo"));
        assert_eq!(mr.group(2), Some("bar"));
    }

    #[test]
    fn backward_re_scan() {
        let buf = Buffer::from_text("t", "ab12cd34");
        let (mut mr, word) = record(r"\d+");
        let end = Point::new(buf.last_line(), buf.line_len(buf.last_line()));
        let hit = scan_re(&buf, end, 1, Direction::Backward, &mut mr, &word, true).unwrap();
        assert_eq!(mr.last_match(), Some("34"));
        assert_eq!(hit.start.off, 6);
        let hit = scan_re(
            &buf,
            hit.start,
            1,
            Direction::Backward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!(mr.last_match(), Some("12"));
        assert_eq!(hit.start.off, 2);
    }

    #[test]
    fn anchors_and_boundaries() {
        let buf = Buffer::from_text("t", "cat cats");
        let (mut mr, word) = record(r"\bcat\b");
        let hit = scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!((hit.start.off, hit.end.off), (0, 3));
        // Second bare "cat" word does not exist.
        assert!(
            scan_re(
                &buf,
                hit.end,
                1,
                Direction::Forward,
                &mut mr,
                &word,
                true
            )
            .is_err()
        );
    }

    #[test]
    fn eol_anchor_per_line() {
        let buf = Buffer::from_text("t", "ab\ncb");
        let (mut mr, word) = record("b$");
        let hit = scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!((buf.line_number(hit.start.line), hit.start.off), (1, 1));
    }

    #[test]
    fn multi_mode_dot_crosses_lines() {
        let buf = Buffer::from_text("t", "a\nb");
        let mut mr = MatchRecord::new();
        mr.set_pattern("a.b:m").unwrap();
        let word = WordTable::default();
        mr.ensure_compiled(true, true, &word).unwrap();
        assert!(mr.flags.contains(SearchFlags::MULTI));
        let hit = scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!(mr.last_match(), Some("a\nb"));
        assert_eq!(buf.line_number(hit.end.line), 2);

        // Without Multi, `.` refuses the line terminator.
        let (mut mr2, word) = record("a.b");
        assert!(
            scan_re(
                &buf,
                Point::new(buf.first_line(), 0),
                1,
                Direction::Forward,
                &mut mr2,
                &word,
                true
            )
            .is_err()
        );
    }

    #[test]
    fn zero_width_match_at_end_terminates() {
        let buf = Buffer::from_text("t", "ab");
        let (mut mr, word) = record("x*");
        // Matches empty at offset 0.
        let hit = scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!(hit.start, hit.end);
        // And the scan loop terminates when no match exists at all.
        let (mut mr, word) = record("q+");
        assert!(
            scan_re(
                &buf,
                Point::new(buf.first_line(), 0),
                1,
                Direction::Forward,
                &mut mr,
                &word,
                true
            )
            .is_err()
        );
    }

    #[test]
    fn string_matching_both_directions() {
        let (mut mr, word) = record(r"(\d+)");
        let found = match_in_string("ab 12 cd 34", 0, &mut mr, &word, true).unwrap();
        assert_eq!(found, Some(3));
        assert_eq!(mr.group(1), Some("12"));
        let found = match_in_string("ab 12 cd 34", -1, &mut mr, &word, true).unwrap();
        assert_eq!(found, Some(9));
        assert_eq!(mr.group(1), Some("34"));
        let none = match_in_string("nothing here", 0, &mut mr, &word, true).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn counted_repetition_scan() {
        let buf = Buffer::from_text("t", "aa aaa aaaa");
        let (mut mr, word) = record("a{3}");
        let hit = scan_re(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
        )
        .unwrap();
        assert_eq!(hit.start.off, 3);
        assert_eq!(mr.last_match(), Some("aaa"));
    }

    #[test]
    fn unified_search_picks_engines() {
        let buf = Buffer::from_text("t", "number 42 here");
        let word = WordTable::default();
        let mut mr = MatchRecord::new();
        mr.set_pattern(r"\d+:r").unwrap();
        let hit = search(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
            false,
        )
        .unwrap();
        assert_eq!(mr.last_match(), Some("42"));
        assert_eq!((hit.start.off, hit.end.off), (7, 9));

        let mut mr = MatchRecord::new();
        mr.set_pattern("here").unwrap();
        let hit = search(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &mut mr,
            &word,
            true,
            false,
        )
        .unwrap();
        assert_eq!(hit.start.off, 10);
        assert_eq!(mr.last_match(), Some("here"));
    }
}
