//! Cross-engine properties of the search and replace stack.

use core_buffer::{Buffer, Point};
use core_search::bm::{Deltas, linear_scan, scan};
use core_search::scan::{Direction, search};
use core_search::{MatchRecord, ReplaceSpec, WordTable, replace};

fn all_forward(buf: &Buffer, mr: &mut MatchRecord, word: &WordTable) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut from = Point::new(buf.first_line(), 0);
    while let Ok(hit) = search(buf, from, 1, Direction::Forward, mr, word, true, false) {
        out.push((buf.line_number(hit.start.line), hit.start.off));
        from = if hit.end == from {
            match buf.forward_char(from) {
                Ok(p) => p,
                Err(_) => break,
            }
        } else {
            hit.end
        };
    }
    out
}

fn all_backward(buf: &Buffer, mr: &mut MatchRecord, word: &WordTable) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let last = buf.last_line();
    let mut from = Point::new(last, buf.line_len(last));
    while let Ok(hit) = search(buf, from, 1, Direction::Backward, mr, word, true, false) {
        out.push((buf.line_number(hit.start.line), hit.start.off));
        from = if hit.start == from {
            match buf.backward_char(from) {
                Ok(p) => p,
                Err(_) => break,
            }
        } else {
            hit.start
        };
    }
    out
}

#[test]
fn forward_matches_equal_reversed_backward_matches() {
    let text = "abc abca bc\nxabc\nabc abc";
    let word = WordTable::default();
    for pat in ["abc", "bc", "a"] {
        let mut mr = MatchRecord::new();
        mr.set_pattern(pat).unwrap();
        let buf = Buffer::from_text("t", text);
        let fwd = all_forward(&buf, &mut mr, &word);
        let mut bwd = all_backward(&buf, &mut mr, &word);
        bwd.reverse();
        assert_eq!(fwd, bwd, "pattern {pat:?}");
    }
}

#[test]
fn boyer_moore_equals_linear_scan() {
    let text = "mississippi river\nmisses the mark\nmiss mississippi";
    let buf = Buffer::from_text("t", text);
    for pat in ["ss", "miss", "issi", "ppi r", "none"] {
        for exact in [true, false] {
            let d = Deltas::build(pat.as_bytes(), exact);
            let start = Point::new(buf.first_line(), 0);
            let bm_hits = {
                let mut out = Vec::new();
                let mut from = start;
                while let Ok(h) = scan(&buf, from, 1, Direction::Forward, &d, exact) {
                    out.push((buf.line_number(h.start.line), h.start.off));
                    from = h.end;
                }
                out
            };
            let linear_hits = {
                let mut out = Vec::new();
                let mut from = start;
                while let Ok(h) =
                    linear_scan(&buf, from, 1, Direction::Forward, pat.as_bytes(), exact)
                {
                    out.push((buf.line_number(h.start.line), h.start.off));
                    from = h.end;
                }
                out
            };
            assert_eq!(bm_hits, linear_hits, "pattern {pat:?} exact={exact}");
        }
    }
}

#[test]
fn case_insensitive_search_scenario() {
    // Successive forward searches over mixed-case text.
    let buf = Buffer::from_text("t", "Hello, hello, HELLO");
    let word = WordTable::default();
    let mut mr = MatchRecord::new();
    mr.set_pattern("hello:i").unwrap();
    let offs: Vec<usize> = all_forward(&buf, &mut mr, &word)
        .into_iter()
        .map(|(_, off)| off)
        .collect();
    assert_eq!(offs, vec![0, 7, 14]);
}

#[test]
fn backref_replacement_scenario() {
    let mut buf = Buffer::from_text("t", "foo-bar baz-qux");
    let word = WordTable::default();
    let mut mr = MatchRecord::new();
    mr.set_pattern(r"(\w+)-(\w+):r").unwrap();
    mr.set_replacement(r"\2-\1");
    replace::replace_scan(
        &mut buf,
        &mut mr,
        &word,
        true,
        false,
        ReplaceSpec {
            n: None,
            query: false,
        },
        None,
        80,
    )
    .unwrap();
    assert_eq!(buf.contents(), "bar-foo qux-baz");
}

#[test]
fn empty_buffer_search_is_not_found_without_message() {
    let buf = Buffer::new("t");
    let word = WordTable::default();
    let mut mr = MatchRecord::new();
    mr.set_pattern("x").unwrap();
    let err = search(
        &buf,
        Point::new(buf.first_line(), 0),
        1,
        Direction::Forward,
        &mut mr,
        &word,
        true,
        false,
    )
    .unwrap_err();
    assert_eq!(err.severity, core_status::Severity::NotFound);
    assert!(err.message().is_none());
}
