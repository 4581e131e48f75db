//! Replacement compilation and the substitution loop.
//!
//! A replacement pattern compiles to a stream of literal runs, `&` (whole
//! match) nodes, and `\N` group references. When no meta node is present
//! the raw replacement text is inserted directly. The substitution loop
//! drives the search engine forward from point, deleting each match and
//! emitting its replacement, with an optional query state machine
//! (yes / no / do-rest / undo-last / stop / stop-and-go-back / help).

use crate::scan::{Direction, search};
use crate::{MatchRecord, SearchFlags, WordTable};
use core_buffer::{Buffer, Point, WORK_MARK};
use core_status::{EdResult, Status};
use tracing::debug;
use unicode_width::UnicodeWidthChar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplNode {
    Lit(Vec<u8>),
    /// `&` — the whole matched text.
    Match,
    /// `\N` — captured group N.
    Group(usize),
}

/// Compile a replacement pattern against a search pattern with
/// `group_count` groups. Returns the node stream and whether any meta
/// node was emitted (false = raw text fast path applies).
pub fn compile_replacement(rpat: &str, group_count: usize) -> EdResult<(Vec<ReplNode>, bool)> {
    let bytes = rpat.as_bytes();
    let mut nodes = Vec::new();
    let mut lit: Vec<u8> = Vec::new();
    let mut regical = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'&' => {
                if !lit.is_empty() {
                    nodes.push(ReplNode::Lit(std::mem::take(&mut lit)));
                }
                nodes.push(ReplNode::Match);
                regical = true;
            }
            b'\\' => {
                regical = true;
                i += 1;
                match bytes.get(i) {
                    Some(&d) if d.is_ascii_digit() && d != b'0' => {
                        let n = (d - b'0') as usize;
                        if n > group_count {
                            return Err(Status::failure(format!(
                                "No such group (ref: {n}, have: {group_count}) \
                                 in replacement pattern '{rpat}'"
                            )));
                        }
                        if !lit.is_empty() {
                            nodes.push(ReplNode::Lit(std::mem::take(&mut lit)));
                        }
                        nodes.push(ReplNode::Group(n));
                    }
                    Some(&c) => lit.push(match c {
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'n' => b'\n',
                        b'f' => 0x0c,
                        other => other,
                    }),
                    None => lit.push(b'\\'),
                }
            }
            c => lit.push(c),
        }
        i += 1;
    }
    if !lit.is_empty() {
        nodes.push(ReplNode::Lit(lit));
    }
    Ok((nodes, regical))
}

/// Expand the replacement for the current match into bytes.
fn expand(nodes: &[ReplNode], mr: &MatchRecord) -> Vec<u8> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            ReplNode::Lit(b) => out.extend_from_slice(b),
            ReplNode::Match => out.extend_from_slice(mr.last_match().unwrap_or("").as_bytes()),
            ReplNode::Group(n) => out.extend_from_slice(mr.group(*n).unwrap_or("").as_bytes()),
        }
    }
    out
}

/// Replies to the query-replace prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryReply {
    /// `y` / space.
    Yes,
    /// `n`.
    No,
    /// `!` — replace the rest without asking.
    DoRest,
    /// `u` — undo the last replacement and re-prompt.
    UndoLast,
    /// `q` / ESC.
    Stop,
    /// `.` — stop and return to the origin.
    StopAndGoBack,
    /// `?`.
    Help,
}

/// Supplies answers to the query prompt (terminal UI or a test script).
pub trait QueryResponder {
    fn respond(&mut self, prompt: &str) -> EdResult<QueryReply>;
}

pub const QUERY_HELP: &str =
    "(SPC,y) Yes (n) No (!) Do rest (u) Undo last (ESC,q) Stop here (.) Stop and go back (?) Help";

#[derive(Debug, Clone, Copy)]
pub struct ReplaceSpec {
    /// Stop after this many matches; `None` = all.
    pub n: Option<i64>,
    /// Prompt at each match.
    pub query: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub substitutions: usize,
    pub matches: usize,
    /// The user stopped before the scan was exhausted.
    pub stopped: bool,
    /// Point was restored to the origin (`.` reply).
    pub returned_to_origin: bool,
    /// The work mark was set to the pre-replace position.
    pub work_mark_set: bool,
}

/// Truncate to `width` terminal cells, appending `...` when shortened.
fn fit_to_width(s: &str, width: usize) -> String {
    let total: usize = s.chars().map(|c| c.width().unwrap_or(1)).sum();
    if total <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(1);
        if used + w + 3 > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str("...");
    out
}

struct LastRepl {
    match_text: String,
    repl_start: Point,
    repl_len: usize,
}

/// Search-and-replace from point. Ports the classic substitution loop:
/// find, (optionally) query, delete matched bytes, emit the replacement,
/// repeat until the count is reached or the buffer end is consumed.
#[allow(clippy::too_many_arguments)]
pub fn replace_scan(
    buf: &mut Buffer,
    mr: &mut MatchRecord,
    word: &WordTable,
    global_exact: bool,
    global_regexp: bool,
    spec: ReplaceSpec,
    mut responder: Option<&mut (dyn QueryResponder + 'static)>,
    term_cols: usize,
) -> EdResult<ReplaceOutcome> {
    let mut outcome = ReplaceOutcome::default();
    if let Some(n) = spec.n {
        if n < 0 {
            return Err(Status::failure(format!(
                "Repeat count ({n}) must be 0 or greater"
            )));
        }
        if n == 0 {
            return Ok(outcome);
        }
    }
    mr.ensure_compiled(global_exact, global_regexp, word)?;
    let re = mr.re_mode(global_regexp);
    if re {
        mr.ensure_replacement_compiled()?;
    }
    let use_nodes = re && mr.flags.contains(SearchFlags::RREGICAL);
    let mut querying = spec.query;
    if querying && responder.is_none() {
        return Err(Status::failure("Query replace requires a responder"));
    }

    let origin = buf.point;
    let mut last: Option<LastRepl> = None;
    let mut last_match_pos: Option<Point> = None;
    let mut last_was_no = false;
    let mut goback = false;

    'outer: loop {
        let hit = match search(
            buf,
            buf.point,
            1,
            Direction::Forward,
            mr,
            word,
            global_exact,
            global_regexp,
        ) {
            Ok(hit) => hit,
            Err(st) if st.severity == core_status::Severity::NotFound => break,
            Err(st) => return Err(st),
        };
        outcome.matches += 1;
        let match_len = mr.last_match().map(|m| m.len()).unwrap_or(0);
        let at_eob = hit.end.line == buf.last_line() && hit.end.off == buf.line_len(hit.end.line);
        buf.point = hit.start;

        // Guard against `^`, `()*` and friends spinning in place.
        if !querying && match_len == 0 {
            let same_as_match = last_match_pos == Some(buf.point);
            let same_as_repl = last.as_ref().is_some_and(|l| l.repl_start == buf.point);
            if same_as_match || same_as_repl {
                return Err(Status::failure(
                    "Repeating match at same position detected",
                ));
            }
        }
        last_match_pos = Some(buf.point);
        last_was_no = false;

        if querying {
            let responder = responder
                .as_deref_mut()
                .ok_or_else(|| Status::failure("Query replace requires a responder"))?;
            let shown_match =
                fit_to_width(mr.last_match().unwrap_or(""), term_cols.max(20) / 2 - 9);
            let shown_repl = if use_nodes {
                String::from_utf8_lossy(&expand(&mr.repl, mr)).into_owned()
            } else {
                mr.replacement().to_string()
            };
            let mut prompt = format!(
                "Replace '{shown_match}' with '{}'? ",
                fit_to_width(&shown_repl, term_cols.max(20) / 2)
            );
            loop {
                match responder.respond(&prompt)? {
                    QueryReply::Yes => break,
                    QueryReply::No => {
                        last_was_no = true;
                        match buf.forward_char(buf.point) {
                            Ok(p) => buf.point = p,
                            Err(_) => break 'outer,
                        }
                        continue 'outer;
                    }
                    QueryReply::DoRest => {
                        querying = false;
                        break;
                    }
                    QueryReply::UndoLast => {
                        let Some(prev) = last.take() else {
                            // Nothing to undo; ask again.
                            continue;
                        };
                        buf.delete(prev.repl_start, prev.repl_len)?;
                        buf.insert(prev.repl_start, prev.match_text.as_bytes())?;
                        buf.point = prev.repl_start;
                        outcome.substitutions -= 1;
                        continue 'outer;
                    }
                    QueryReply::Stop => {
                        outcome.stopped = true;
                        break 'outer;
                    }
                    QueryReply::StopAndGoBack => {
                        outcome.stopped = true;
                        goback = true;
                        break 'outer;
                    }
                    QueryReply::Help => {
                        prompt = format!("{QUERY_HELP} ");
                        continue;
                    }
                }
            }
        }

        // Delete the match and emit its replacement.
        if match_len > 0 {
            buf.delete(buf.point, match_len)?;
        }
        let replacement = if use_nodes {
            expand(&mr.repl, mr)
        } else {
            mr.replacement().as_bytes().to_vec()
        };
        let start = buf.point;
        let end = buf.insert(start, &replacement)?;
        buf.point = end;
        outcome.substitutions += 1;
        let last_was_nl = replacement.last() == Some(&b'\n');
        last = Some(LastRepl {
            match_text: mr.last_match().unwrap_or("").to_string(),
            repl_start: start,
            repl_len: replacement.len(),
        });

        // The match consumed the final line terminator: drop the synthetic
        // extra line and stop.
        if at_eob {
            if last_was_nl {
                let _ = buf.delete(buf.point, 1);
            }
            break;
        }
        if spec.n.is_some_and(|n| outcome.matches as i64 >= n) {
            break;
        }
    }

    if goback {
        buf.point = origin;
        outcome.returned_to_origin = true;
    } else if spec.query && last_was_no {
        if let Ok(p) = buf.backward_char(buf.point) {
            buf.point = p;
        }
    }
    if buf.point != origin {
        buf.set_mark(WORK_MARK, origin, 0);
        outcome.work_mark_set = true;
    }
    debug!(
        target: "search",
        substitutions = outcome.substitutions,
        matches = outcome.matches,
        "replace finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_buffer::Buffer;

    fn run(
        text: &str,
        pat: &str,
        rpat: &str,
        n: Option<i64>,
    ) -> (Buffer, ReplaceOutcome, MatchRecord) {
        let mut buf = Buffer::from_text("t", text);
        let word = WordTable::default();
        let mut mr = MatchRecord::new();
        mr.set_pattern(pat).unwrap();
        mr.set_replacement(rpat);
        let outcome = replace_scan(
            &mut buf,
            &mut mr,
            &word,
            true,
            false,
            ReplaceSpec { n, query: false },
            None,
            80,
        )
        .unwrap();
        (buf, outcome, mr)
    }

    #[test]
    fn plain_replace_all() {
        let (buf, out, _) = run("one two one", "one", "1", None);
        assert_eq!(buf.contents(), "1 two 1");
        assert_eq!(out.substitutions, 2);
    }

    #[test]
    fn replace_with_count() {
        let (buf, out, _) = run("aaa", "a", "b", Some(2));
        assert_eq!(buf.contents(), "bba");
        assert_eq!(out.matches, 2);
    }

    #[test]
    fn backref_substitution() {
        let (buf, _, _) = run("foo-bar baz-qux", r"(\w+)-(\w+):r", r"\2-\1", None);
        assert_eq!(buf.contents(), "bar-foo qux-baz");
    }

    #[test]
    fn ampersand_inserts_whole_match() {
        let (buf, _, _) = run("ab", "a:r", "<&>", None);
        assert_eq!(buf.contents(), "<a>b");
    }

    #[test]
    fn plain_mode_ampersand_is_literal() {
        let (buf, _, _) = run("ab", "a", "&&", None);
        assert_eq!(buf.contents(), "&&b");
    }

    #[test]
    fn empty_replacement_for_nonmatching_is_identity() {
        let (buf, out, _) = run("untouched text", "zzz", "", None);
        assert_eq!(buf.contents(), "untouched text");
        assert_eq!(out.substitutions, 0);
    }

    #[test]
    fn zero_length_match_at_same_position_fails() {
        let mut buf = Buffer::from_text("t", "abc");
        let word = WordTable::default();
        let mut mr = MatchRecord::new();
        mr.set_pattern("^:r").unwrap();
        mr.set_replacement("");
        let err = replace_scan(
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
        .unwrap_err();
        assert!(
            err.message()
                .unwrap()
                .contains("Repeating match at same position")
        );
    }

    #[test]
    fn bad_group_reference_rejected() {
        let err = compile_replacement(r"\3", 2).unwrap_err();
        assert!(err.message().unwrap().contains("No such group"));
    }

    #[test]
    fn replacement_escapes() {
        let (nodes, regical) = compile_replacement(r"a\tb\&c", 0).unwrap();
        assert!(regical);
        assert_eq!(nodes, vec![ReplNode::Lit(b"a\tb&c".to_vec())]);
        let (nodes, regical) = compile_replacement("plain", 0).unwrap();
        assert!(!regical);
        assert_eq!(nodes, vec![ReplNode::Lit(b"plain".to_vec())]);
    }

    #[test]
    fn work_mark_records_origin() {
        let (buf, out, _) = run("x y x", "x", "q", None);
        assert!(out.work_mark_set);
        let mark = buf.find_mark(WORK_MARK).unwrap();
        assert_eq!(mark.point, Point::new(buf.first_line(), 0));
    }

    struct Script(Vec<QueryReply>);
    impl QueryResponder for Script {
        fn respond(&mut self, _prompt: &str) -> EdResult<QueryReply> {
            Ok(self.0.remove(0))
        }
    }

    fn run_query(text: &str, pat: &str, rpat: &str, replies: Vec<QueryReply>) -> (Buffer, ReplaceOutcome) {
        let mut buf = Buffer::from_text("t", text);
        let word = WordTable::default();
        let mut mr = MatchRecord::new();
        mr.set_pattern(pat).unwrap();
        mr.set_replacement(rpat);
        let mut script = Script(replies);
        let outcome = replace_scan(
            &mut buf,
            &mut mr,
            &word,
            true,
            false,
            ReplaceSpec {
                n: None,
                query: true,
            },
            Some(&mut script),
            80,
        )
        .unwrap();
        (buf, outcome)
    }

    #[test]
    fn query_yes_no_stop() {
        let (buf, out) = run_query(
            "a a a a",
            "a",
            "b",
            vec![
                QueryReply::Yes,
                QueryReply::No,
                QueryReply::Yes,
                QueryReply::Stop,
            ],
        );
        assert_eq!(buf.contents(), "b a b a");
        assert_eq!(out.substitutions, 2);
        assert!(out.stopped);
    }

    #[test]
    fn query_do_rest() {
        let (buf, out) = run_query("a a a", "a", "b", vec![QueryReply::DoRest]);
        assert_eq!(buf.contents(), "b b b");
        assert_eq!(out.substitutions, 3);
        assert!(!out.stopped);
    }

    #[test]
    fn query_undo_last() {
        let (buf, out) = run_query(
            "a a",
            "a",
            "b",
            vec![
                QueryReply::Yes,
                QueryReply::UndoLast,
                QueryReply::Yes,
                QueryReply::Yes,
            ],
        );
        // First replaced, then undone, then both replaced again.
        assert_eq!(buf.contents(), "b b");
        assert_eq!(out.substitutions, 2);
    }

    #[test]
    fn query_undo_with_nothing_reasks() {
        let (buf, _) = run_query("a", "a", "b", vec![QueryReply::UndoLast, QueryReply::Yes]);
        assert_eq!(buf.contents(), "b");
    }

    #[test]
    fn query_stop_and_go_back_restores_origin() {
        let (buf, out) = run_query(
            "a a",
            "a",
            "b",
            vec![QueryReply::Yes, QueryReply::StopAndGoBack],
        );
        assert_eq!(buf.contents(), "b a");
        assert!(out.returned_to_origin);
        assert_eq!(buf.point, Point::new(buf.first_line(), 0));
    }

    #[test]
    fn query_help_then_yes() {
        let (buf, _) = run_query("a", "a", "b", vec![QueryReply::Help, QueryReply::Yes]);
        assert_eq!(buf.contents(), "b");
    }

    #[test]
    fn fit_to_width_truncates() {
        assert_eq!(fit_to_width("short", 10), "short");
        let cut = fit_to_width("a very long matched string", 10);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 10);
    }
}
