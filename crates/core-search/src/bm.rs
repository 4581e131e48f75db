//! Plain-text Boyer–Moore with forward and reverse delta tables.
//!
//! Forward searches scan the *reversed* pattern against the buffer and
//! backward searches the forward pattern, so the comparison loop always
//! walks the pattern left-to-right regardless of search direction; only
//! the delta tables differ. In ignore-case mode `delta1` is populated for
//! both cases of each letter and `delta2` degrades to a minimum-advance
//! table.

use crate::scan::{Direction, nextch_buf};
use crate::eq_bytes;
use core_buffer::{Buffer, Point};
use core_status::{EdResult, Status};

/// Delta tables for one compiled plain pattern, both directions.
#[derive(Debug, Clone)]
pub struct Deltas {
    pub pat: Vec<u8>,
    /// Reversed pattern, scanned by forward searches.
    pub bpat: Vec<u8>,
    fdelta1: Box<[usize; 256]>,
    fdelta2: Vec<usize>,
    bdelta1: Box<[usize; 256]>,
    bdelta2: Vec<usize>,
}

/// `delta1[c]`: distance from the last pattern byte to the rightmost
/// occurrence of `c` in the pattern, or the pattern length if absent.
fn mkdelta1(pat: &[u8], exact: bool) -> Box<[usize; 256]> {
    let patlen = pat.len();
    let mut delta = Box::new([patlen; 256]);
    for (i, &b) in pat.iter().enumerate().take(patlen - 1) {
        delta[b as usize] = patlen - 1 - i;
        if !exact {
            delta[b.to_ascii_lowercase() as usize] = patlen - 1 - i;
            delta[b.to_ascii_uppercase() as usize] = patlen - 1 - i;
        }
    }
    delta
}

/// True if the suffix of `word` starting at `pos` is a prefix of `word`.
fn is_prefix(word: &[u8], pos: usize) -> bool {
    let suffix_len = word.len() - pos;
    (0..suffix_len).all(|i| word[i] == word[pos + i])
}

/// Length of the longest suffix of `word` ending on `word[pos]`,
/// capped at `pos`.
fn suffix_length(word: &[u8], pos: usize) -> usize {
    let last = word.len() - 1;
    let mut i = 0;
    while i < pos && word[pos - i] == word[last - i] {
        i += 1;
    }
    i
}

/// Good-suffix table. In ignore-case mode it cannot be used in the usual
/// way, so each entry becomes the minimum advance for its index.
fn mkdelta2(pat: &[u8], exact: bool) -> Vec<usize> {
    let patlen = pat.len();
    let mut delta = vec![0usize; patlen];
    if !exact {
        for (j, slot) in delta.iter_mut().enumerate() {
            *slot = patlen - j;
        }
        return delta;
    }
    let patlen1 = patlen - 1;
    let mut last_prefix_index = patlen1;
    let mut i = patlen;
    loop {
        if is_prefix(pat, i) {
            last_prefix_index = i;
        }
        i -= 1;
        delta[i] = last_prefix_index + (patlen1 - i);
        if i == 0 {
            break;
        }
    }
    for i in 0..patlen1 {
        let slen = suffix_length(pat, i);
        if slen <= i && pat[i - slen] != pat[patlen1 - slen] {
            delta[patlen1 - slen] = patlen1 - i + slen;
        }
    }
    delta
}

impl Deltas {
    pub fn build(pat: &[u8], exact: bool) -> Self {
        debug_assert!(!pat.is_empty());
        let bpat: Vec<u8> = pat.iter().rev().copied().collect();
        Self {
            fdelta1: mkdelta1(pat, exact),
            fdelta2: mkdelta2(pat, exact),
            bdelta1: mkdelta1(&bpat, exact),
            bdelta2: mkdelta2(&bpat, exact),
            pat: pat.to_vec(),
            bpat,
        }
    }

    pub fn pattern_len(&self) -> usize {
        self.pat.len()
    }
}

/// A plain-search hit: half-open byte span as points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub start: Point,
    pub end: Point,
}

/// Move a scan position by `jump` bytes, counting line boundaries as one
/// byte each. Returns `false` when a buffer boundary blocks the move.
fn bjump(buf: &Buffer, pos: &mut Point, jump: usize, dir: Direction) -> bool {
    match dir {
        Direction::Forward => {
            let mut off = pos.off + jump;
            let mut line = pos.line;
            while off > buf.line_len(line) {
                let Some(next) = buf.next_line(line) else {
                    return false;
                };
                off -= buf.line_len(line) + 1;
                line = next;
            }
            *pos = Point::new(line, off);
            true
        }
        Direction::Backward => {
            let mut off = pos.off as isize - jump as isize;
            let mut line = pos.line;
            while off < 0 {
                let Some(prev) = buf.prev_line(line) else {
                    return false;
                };
                off += buf.line_len(prev) as isize + 1;
                line = prev;
            }
            *pos = Point::new(line, off as usize);
            true
        }
    }
}

/// Find the `n`th match from `from` in the given direction. Returns the
/// hit, or bare `NotFound` on exhaustion (the caller supplies messaging).
pub fn scan(
    buf: &Buffer,
    from: Point,
    mut n: usize,
    dir: Direction,
    d: &Deltas,
    exact: bool,
) -> EdResult<Hit> {
    let patlen = d.pat.len();
    let (pattern, delta1, delta2) = match dir {
        Direction::Forward => (&d.bpat, &d.fdelta1, &d.fdelta2),
        Direction::Backward => (&d.pat, &d.bdelta1, &d.bdelta2),
    };
    // Pattern comparison always runs opposite to the search direction.
    let sdirect = dir.opposite();
    let mut sdot = from;
    let mut jumpsz = patlen;
    'outer: while bjump(buf, &mut sdot, jumpsz, dir) {
        let far = sdot;
        let mut pati = patlen;
        for &pc in pattern.iter() {
            pati -= 1;
            let Some(bc) = nextch_buf(buf, &mut sdot, sdirect) else {
                return Err(Status::not_found());
            };
            if !eq_bytes(bc, pc, exact) {
                jumpsz = delta1[bc as usize].max(delta2[pati]) + 1;
                continue 'outer;
            }
        }
        let hit = match dir {
            Direction::Forward => Hit {
                start: sdot,
                end: far,
            },
            Direction::Backward => Hit {
                start: far,
                end: sdot,
            },
        };
        n -= 1;
        if n == 0 {
            return Ok(hit);
        }
        // Skip well past this match before resuming the scan.
        jumpsz = patlen * 2;
    }
    Err(Status::not_found())
}

/// Reference byte-at-a-time scan used to validate the Boyer–Moore engine
/// (and as the baseline in the search benchmark).
pub fn linear_scan(
    buf: &Buffer,
    from: Point,
    mut n: usize,
    dir: Direction,
    pat: &[u8],
    exact: bool,
) -> EdResult<Hit> {
    let mut start = from;
    loop {
        // Try to match at `start` (forward) or ending at `start` (backward).
        let candidate = match dir {
            Direction::Forward => start,
            Direction::Backward => {
                let mut p = start;
                if !bjump(buf, &mut p, pat.len(), Direction::Backward) {
                    return Err(Status::not_found());
                }
                p
            }
        };
        let mut pos = candidate;
        let mut ok = true;
        for &pc in pat {
            match nextch_buf(buf, &mut pos, Direction::Forward) {
                Some(bc) if eq_bytes(bc, pc, exact) => {}
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            n -= 1;
            if n == 0 {
                return Ok(Hit {
                    start: candidate,
                    end: pos,
                });
            }
        }
        let moved = match dir {
            Direction::Forward => bjump(buf, &mut start, 1, Direction::Forward),
            Direction::Backward => bjump(buf, &mut start, 1, Direction::Backward),
        };
        if !moved {
            return Err(Status::not_found());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(buf: &Buffer, hit: &Hit) -> (usize, usize, usize, usize) {
        (
            buf.line_number(hit.start.line),
            hit.start.off,
            buf.line_number(hit.end.line),
            hit.end.off,
        )
    }

    #[test]
    fn forward_scan_finds_successive_matches() {
        let buf = Buffer::from_text("t", "Hello, hello, HELLO");
        let d = Deltas::build(b"hello", false);
        let mut from = Point::new(buf.first_line(), 0);
        let mut offs = Vec::new();
        while let Ok(hit) = scan(&buf, from, 1, Direction::Forward, &d, false) {
            offs.push(hit.start.off);
            from = hit.end;
        }
        assert_eq!(offs, vec![0, 7, 14]);
    }

    #[test]
    fn exact_mode_distinguishes_case() {
        let buf = Buffer::from_text("t", "Hello, hello");
        let d = Deltas::build(b"hello", true);
        let hit = scan(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &d,
            true,
        )
        .unwrap();
        assert_eq!(hit.start.off, 7);
    }

    #[test]
    fn backward_scan() {
        let buf = Buffer::from_text("t", "ab ab ab");
        let d = Deltas::build(b"ab", true);
        let end = Point::new(buf.first_line(), 8);
        let hit = scan(&buf, end, 1, Direction::Backward, &d, true).unwrap();
        assert_eq!(hit.start.off, 6);
        let hit = scan(&buf, hit.start, 1, Direction::Backward, &d, true).unwrap();
        assert_eq!(hit.start.off, 3);
    }

    #[test]
    fn match_across_lines() {
        let buf = Buffer::from_text("t", "one\ntwo");
        let d = Deltas::build(b"e\nt", true);
        let hit = scan(
            &buf,
            Point::new(buf.first_line(), 0),
            1,
            Direction::Forward,
            &d,
            true,
        )
        .unwrap();
        assert_eq!(points(&buf, &hit), (1, 2, 2, 1));
    }

    #[test]
    fn nth_match_and_not_found() {
        let buf = Buffer::from_text("t", "x.x.x");
        let d = Deltas::build(b"x", true);
        let from = Point::new(buf.first_line(), 0);
        let hit = scan(&buf, from, 3, Direction::Forward, &d, true).unwrap();
        assert_eq!(hit.start.off, 4);
        let err = scan(&buf, from, 4, Direction::Forward, &d, true).unwrap_err();
        assert_eq!(err.severity, core_status::Severity::NotFound);
        assert!(err.message().is_none(), "NotFound bypasses messaging");
    }

    #[test]
    fn agrees_with_linear_reference() {
        let text = "the quick brown fox jumps over the lazy dog\n\
                    pack my box with five dozen liquor jugs\n\
                    the five boxing wizards jump quickly";
        let buf = Buffer::from_text("t", text);
        for pat in ["the", "jump", "quick", "o", "zzz", "box", "g\np"] {
            for exact in [true, false] {
                let d = Deltas::build(pat.as_bytes(), exact);
                let mut bm_from = Point::new(buf.first_line(), 0);
                let mut ln_from = Point::new(buf.first_line(), 0);
                loop {
                    let a = scan(&buf, bm_from, 1, Direction::Forward, &d, exact);
                    let b = linear_scan(
                        &buf,
                        ln_from,
                        1,
                        Direction::Forward,
                        pat.as_bytes(),
                        exact,
                    );
                    match (a, b) {
                        (Ok(x), Ok(y)) => {
                            assert_eq!(x, y, "pattern {pat:?} exact={exact}");
                            bm_from = x.end;
                            ln_from = y.end;
                        }
                        (Err(_), Err(_)) => break,
                        (x, y) => panic!("divergence for {pat:?}: {x:?} vs {y:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn forward_and_backward_agree() {
        let buf = Buffer::from_text("t", "abcabcABCabc");
        let d = Deltas::build(b"abc", true);
        let mut fwd = Vec::new();
        let mut from = Point::new(buf.first_line(), 0);
        while let Ok(hit) = scan(&buf, from, 1, Direction::Forward, &d, true) {
            fwd.push(hit.start.off);
            from = hit.end;
        }
        let mut bwd = Vec::new();
        let mut from = Point::new(buf.last_line(), buf.line_len(buf.last_line()));
        while let Ok(hit) = scan(&buf, from, 1, Direction::Backward, &d, true) {
            bwd.push(hit.start.off);
            from = hit.start;
        }
        bwd.reverse();
        assert_eq!(fwd, bwd);
    }
}
