//! Search and replace: plain-text Boyer–Moore plus a metachar RE engine.
//!
//! A pattern is compiled into a [`MatchRecord`] holding whichever programs
//! the effective mode needs: delta tables for plain scans, forward and
//! reverse metachar programs for RE scans, and a replacement program. The
//! record also stores the captured groups of the most recent match.
//!
//! Mode resolution: a pattern's trailing options override the global
//! `Exact`/`Regexp` modes; a pattern compiled as an RE that uses no RE
//! feature is scanned with the plain engine anyway.

use bitflags::bitflags;
use core_status::{EdResult, Status};

pub mod bm;
pub mod mc;
pub mod replace;
pub mod scan;

pub use replace::{QueryReply, QueryResponder, ReplaceOutcome, ReplaceSpec};
pub use scan::{Direction, match_in_string};

/// Group 0 plus nine back-referenceable capture groups.
pub const MAX_GROUPS: usize = 10;

/// Pattern option sentinel (`pat:flags`).
pub const OPT_CH: char = ':';

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SearchFlags: u16 {
        // Trailing pattern options.
        const EXACT    = 1 << 0;
        const IGNORE   = 1 << 1;
        const REGEXP   = 1 << 2;
        const PLAIN    = 1 << 3;
        const MULTI    = 1 << 4;
        /// Doubled option sentinel was demoted to a literal colon.
        const LIT_SENTINEL = 1 << 5;
        // Compile results.
        /// Compiled forward program uses at least one RE feature.
        const REGICAL  = 1 << 6;
        /// Compiled replacement program uses at least one meta node.
        const RREGICAL = 1 << 7;
        /// Delta tables were built in exact mode.
        const CPL_EXACT = 1 << 8;
    }
}

impl SearchFlags {
    pub const OPTIONS: SearchFlags = SearchFlags::EXACT
        .union(SearchFlags::IGNORE)
        .union(SearchFlags::REGEXP)
        .union(SearchFlags::PLAIN)
        .union(SearchFlags::MULTI);
}

/// Table of bytes considered "in a word", driving `\w` and `\b`.
#[derive(Debug, Clone)]
pub struct WordTable {
    table: [bool; 256],
}

impl Default for WordTable {
    fn default() -> Self {
        let mut table = [false; 256];
        for b in 0..=255u8 {
            table[b as usize] = b == b'_' || b.is_ascii_alphanumeric();
        }
        Self { table }
    }
}

impl WordTable {
    /// Rebuild from a specification of characters and `a-z` ranges.
    pub fn from_spec(spec: &str) -> EdResult<Self> {
        let mut table = [false; 256];
        let bytes = spec.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if i + 2 < bytes.len() && bytes[i + 1] == b'-' && bytes[i + 2] >= bytes[i] {
                for b in bytes[i]..=bytes[i + 2] {
                    table[b as usize] = true;
                }
                i += 3;
            } else {
                table[bytes[i] as usize] = true;
                i += 1;
            }
        }
        if !table.iter().any(|&b| b) {
            return Err(Status::failure("Word character list cannot be empty"));
        }
        Ok(Self { table })
    }

    pub fn is_word(&self, b: u8) -> bool {
        self.table[b as usize]
    }

    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(|&b| self.table[b as usize])
    }
}

/// Split a pattern into its body and trailing option flags.
///
/// The options are introduced by the *last* `:` in the pattern followed
/// only by lowercase letters from `{m,i,e,r,p}`. Duplicate or conflicting
/// letters (i/e, r/p) disqualify the suffix, which then stays pattern
/// text. A doubled sentinel (`::`) drops one colon, records the demotion,
/// and keeps the rest literal.
pub fn parse_pattern(pat: &str) -> (String, SearchFlags) {
    let Some(colon) = pat.rfind(OPT_CH) else {
        return (pat.to_string(), SearchFlags::empty());
    };
    if colon == 0 {
        return (pat.to_string(), SearchFlags::empty());
    }
    let opts = &pat[colon + 1..];
    if opts.is_empty() || !opts.chars().all(|c| c.is_ascii_lowercase()) {
        return (pat.to_string(), SearchFlags::empty());
    }
    let mut flags = SearchFlags::empty();
    for c in opts.chars() {
        let (flag, conflicts) = match c {
            'm' => (SearchFlags::MULTI, SearchFlags::MULTI),
            'i' => (SearchFlags::IGNORE, SearchFlags::IGNORE | SearchFlags::EXACT),
            'e' => (SearchFlags::EXACT, SearchFlags::IGNORE | SearchFlags::EXACT),
            'r' => (SearchFlags::REGEXP, SearchFlags::REGEXP | SearchFlags::PLAIN),
            'p' => (SearchFlags::PLAIN, SearchFlags::REGEXP | SearchFlags::PLAIN),
            _ => return (pat.to_string(), SearchFlags::empty()),
        };
        if flags.intersects(conflicts) {
            return (pat.to_string(), SearchFlags::empty());
        }
        flags |= flag;
    }
    // Doubled sentinel: demote the first colon to a literal and keep the
    // option letters as pattern text.
    if colon > 0 && pat.as_bytes()[colon - 1] == b':' {
        let mut body = String::with_capacity(pat.len() - 1);
        body.push_str(&pat[..colon - 1]);
        body.push_str(&pat[colon..]);
        return (body, SearchFlags::LIT_SENTINEL);
    }
    (pat[..colon].to_string(), flags)
}

/// Compiled pattern state plus the groups of the last match.
#[derive(Debug, Clone, Default)]
pub struct MatchRecord {
    /// Pattern as the user entered it (options suffix included).
    raw: String,
    /// Pattern body with options stripped.
    pat: String,
    pub flags: SearchFlags,
    /// Number of capture groups in the compiled pattern.
    pub group_count: usize,
    /// Forward and reverse metachar programs (empty = not compiled).
    pub(crate) mc_fwd: Vec<mc::MNode>,
    pub(crate) mc_bwd: Vec<mc::MNode>,
    /// Plain-search tables (empty delta2 = not compiled).
    pub(crate) deltas: Option<bm::Deltas>,
    /// Replacement pattern and its compiled program.
    rpat: String,
    pub(crate) repl: Vec<replace::ReplNode>,
    /// Captured strings of the last match; index 0 is the whole match.
    pub groups: Vec<Option<String>>,
}

impl MatchRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(&self) -> &str {
        &self.pat
    }

    pub fn raw_pattern(&self) -> &str {
        &self.raw
    }

    pub fn replacement(&self) -> &str {
        &self.rpat
    }

    /// Install a new search pattern, parsing trailing options and
    /// invalidating compiled state.
    pub fn set_pattern(&mut self, raw: &str) -> EdResult<()> {
        if raw.is_empty() {
            return Err(Status::failure("Empty search pattern"));
        }
        let (body, opts) = parse_pattern(raw);
        self.raw = raw.to_string();
        self.pat = body;
        self.flags = (self.flags - SearchFlags::OPTIONS - SearchFlags::LIT_SENTINEL) | opts;
        self.invalidate();
        Ok(())
    }

    /// Install a new replacement pattern. Compilation is deferred until the
    /// group count of the compiled search pattern is known.
    pub fn set_replacement(&mut self, rpat: &str) {
        self.rpat = rpat.to_string();
        self.repl.clear();
        self.flags -= SearchFlags::RREGICAL;
    }

    /// True when any compiled program (RE or delta tables) is present.
    pub fn is_compiled(&self) -> bool {
        !self.mc_fwd.is_empty() || self.deltas.is_some()
    }

    /// Drop all compiled programs (pattern or word-table change).
    pub fn invalidate(&mut self) {
        self.mc_fwd.clear();
        self.mc_bwd.clear();
        self.deltas = None;
        self.repl.clear();
        self.group_count = 0;
        self.flags -= SearchFlags::REGICAL | SearchFlags::RREGICAL | SearchFlags::CPL_EXACT;
        self.groups.clear();
    }

    /// Effective exact-case mode given the global `Exact` mode.
    pub fn exact_mode(&self, global_exact: bool) -> bool {
        self.flags.contains(SearchFlags::EXACT)
            || (global_exact && !self.flags.contains(SearchFlags::IGNORE))
    }

    /// Effective RE mode given the global `Regexp` mode.
    pub fn re_mode(&self, global_regexp: bool) -> bool {
        self.flags.contains(SearchFlags::REGEXP)
            || (global_regexp && !self.flags.contains(SearchFlags::PLAIN))
    }

    /// True when the effective scan is plain text (not an RE, or an RE that
    /// compiled without any RE feature).
    pub fn plain_search(&self, global_regexp: bool) -> bool {
        !self.re_mode(global_regexp) || !self.flags.contains(SearchFlags::REGICAL)
    }

    /// Compile whatever the effective mode requires. Safe to call
    /// repeatedly; recompiles only on staleness.
    pub fn ensure_compiled(
        &mut self,
        global_exact: bool,
        global_regexp: bool,
        word: &WordTable,
    ) -> EdResult<()> {
        if self.pat.is_empty() {
            return Err(Status::failure("No search pattern set"));
        }
        let exact = self.exact_mode(global_exact);
        if self.re_mode(global_regexp) && self.mc_fwd.is_empty() {
            let compiled = mc::compile(&self.pat, word)?;
            self.group_count = compiled.group_count;
            self.mc_bwd = compiled.reversed();
            if compiled.regical {
                self.flags |= SearchFlags::REGICAL;
            }
            self.mc_fwd = compiled.nodes;
        }
        if self.plain_search(global_regexp) {
            let stale = match &self.deltas {
                Some(_) => self.flags.contains(SearchFlags::CPL_EXACT) != exact,
                None => true,
            };
            if stale {
                self.deltas = Some(bm::Deltas::build(self.pat.as_bytes(), exact));
                self.flags.set(SearchFlags::CPL_EXACT, exact);
            }
        }
        Ok(())
    }

    /// Compile the replacement program against the compiled search pattern.
    pub fn ensure_replacement_compiled(&mut self) -> EdResult<()> {
        if !self.repl.is_empty() {
            return Ok(());
        }
        let (nodes, regical) = replace::compile_replacement(&self.rpat, self.group_count)?;
        self.repl = nodes;
        self.flags.set(SearchFlags::RREGICAL, regical);
        Ok(())
    }

    /// Compiled replacement program (empty until compiled).
    pub fn replacement_nodes(&self) -> &[replace::ReplNode] {
        &self.repl
    }

    /// The whole text of the last match.
    pub fn last_match(&self) -> Option<&str> {
        self.groups.first().and_then(|g| g.as_deref())
    }

    pub fn group(&self, n: usize) -> Option<&str> {
        self.groups.get(n).and_then(|g| g.as_deref())
    }
}

pub(crate) fn fold_case(b: u8) -> u8 {
    b.to_ascii_lowercase()
}

pub(crate) fn eq_bytes(a: u8, b: u8, exact: bool) -> bool {
    if exact {
        a == b
    } else {
        fold_case(a) == fold_case(b)
    }
}
