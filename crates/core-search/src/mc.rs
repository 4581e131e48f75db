//! Regular-expression compiler: surface syntax to metachar programs.
//!
//! A pattern compiles to a linear array of [`MNode`]s (the forward
//! program); the reverse program is the same array reversed, so backward
//! searches can scan the pattern left-to-right like forward ones. Closures
//! annotate the node they follow rather than being nodes themselves.
//!
//! Closure over a whole group is rejected. A closure symbol with nothing
//! closable before it is an invalid repetition operand, except `{` not
//! followed by a digit, which stays a literal.

use crate::{MAX_GROUPS, WordTable};
use core_status::{EdResult, Status};

/// 256-bit character class bitmap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitMap([u64; 4]);

impl BitMap {
    pub fn set(&mut self, b: u8) {
        self.0[(b >> 6) as usize] |= 1 << (b & 63);
    }

    pub fn set_range(&mut self, from: u8, to: u8) {
        for b in from..=to {
            self.set(b);
        }
    }

    pub fn test(&self, b: u8) -> bool {
        self.0[(b >> 6) as usize] & (1 << (b & 63)) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MKind {
    Lit(u8),
    /// Any byte except the line terminator (unless Multi).
    Any,
    Ccl(BitMap),
    NotCcl(BitMap),
    Bol,
    Eol,
    /// `\A`
    BufBegin,
    /// `\z`
    BufEnd,
    /// `\Z` — also matches just before a final line terminator.
    BufEndAlt,
    WordBound {
        negate: bool,
    },
    GroupBegin(usize),
    GroupEnd(usize),
}

impl MKind {
    /// Zero-width nodes never consume a scan character.
    pub fn is_zero_width(&self) -> bool {
        matches!(
            self,
            MKind::Bol
                | MKind::Eol
                | MKind::BufBegin
                | MKind::BufEnd
                | MKind::BufEndAlt
                | MKind::WordBound { .. }
                | MKind::GroupBegin(_)
                | MKind::GroupEnd(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closure {
    pub min: u32,
    /// `None` = unlimited.
    pub max: Option<u32>,
    pub lazy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MNode {
    pub kind: MKind,
    pub closure: Option<Closure>,
}

impl MNode {
    fn plain(kind: MKind) -> Self {
        Self {
            kind,
            closure: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compiled {
    pub nodes: Vec<MNode>,
    pub group_count: usize,
    /// At least one RE feature was used; false means the pattern is
    /// literal text and the plain engine applies.
    pub regical: bool,
}

impl Compiled {
    pub fn reversed(&self) -> Vec<MNode> {
        self.nodes.iter().rev().cloned().collect()
    }
}

fn set_digits(bm: &mut BitMap) {
    bm.set_range(b'0', b'9');
}

fn set_letters(bm: &mut BitMap) {
    bm.set_range(b'a', b'z');
    bm.set_range(b'A', b'Z');
}

fn set_space(bm: &mut BitMap) {
    for b in [b' ', b'\t', b'\r', b'\n', 0x0c] {
        bm.set(b);
    }
}

fn set_word(bm: &mut BitMap, word: &WordTable) {
    for b in word.bytes() {
        bm.set(b);
    }
}

/// Build the bitmap for a `[...]` class. `i` points at the `[` on entry
/// and at the terminating `]` on (successful) return.
fn cclmake(pat: &[u8], i: &mut usize, word: &WordTable) -> EdResult<(BitMap, bool)> {
    let mut bm = BitMap::default();
    *i += 1;
    let negate = if pat.get(*i) == Some(&b'^') {
        *i += 1;
        true
    } else {
        false
    };
    if pat.get(*i).is_none_or(|&b| b == b']') {
        return Err(Status::failure("Empty character class"));
    }
    // Pending start of a range: resolved when the atom after `-` arrives.
    let mut ochr: Option<u8> = None;
    // Set the pending range start and the range char as plain characters.
    fn set_norange(bm: &mut BitMap, ochr: &mut Option<u8>) {
        if let Some(c) = ochr.take() {
            bm.set(c);
            bm.set(b'-');
        }
    }
    loop {
        let Some(&pchr) = pat.get(*i) else {
            return Err(Status::failure("Character class not ended"));
        };
        match pchr {
            b']' => break,
            b'-' => {
                if pat.get(*i + 1).is_none() {
                    return Err(Status::failure("Character class not ended"));
                }
                if ochr.is_none() {
                    // First or last position: plain character.
                    bm.set(b'-');
                } else if pat.get(*i + 1) == Some(&b'-') {
                    set_norange(&mut bm, &mut ochr);
                }
                // Otherwise the range resolves at the next atom.
            }
            b'\\' => {
                *i += 1;
                let Some(&esc) = pat.get(*i) else {
                    return Err(Status::failure("Character class not ended"));
                };
                let lit = match esc {
                    b't' => Some(b'\t'),
                    b'r' => Some(b'\r'),
                    b'n' => Some(b'\n'),
                    b'f' => Some(0x0c),
                    b'd' | b'l' | b's' | b'w' => {
                        match esc {
                            b'd' => set_digits(&mut bm),
                            b'l' => set_letters(&mut bm),
                            b's' => set_space(&mut bm),
                            _ => set_word(&mut bm, word),
                        }
                        // A shorthand cannot end a range.
                        set_norange(&mut bm, &mut ochr);
                        None
                    }
                    other => Some(other),
                };
                if let Some(c) = lit {
                    class_atom(&mut bm, &mut ochr, c, pat, *i);
                }
            }
            c => class_atom(&mut bm, &mut ochr, c, pat, *i),
        }
        *i += 1;
    }
    // Class ended with a dangling `-`.
    set_norange(&mut bm, &mut ochr);
    Ok((bm, negate))
}

/// Process one plain class atom: end a pending range, start one, or set a
/// single bit.
fn class_atom(bm: &mut BitMap, ochr: &mut Option<u8>, c: u8, pat: &[u8], i: usize) {
    if let Some(start) = ochr.take() {
        if c < start {
            // Wrong order: all three become plain characters.
            bm.set(start);
            bm.set(b'-');
            bm.set(c);
        } else {
            bm.set_range(start, c);
        }
    } else if pat.get(i + 1) == Some(&b'-') && pat.get(i + 2) != Some(&b']') {
        *ochr = Some(c);
    } else {
        bm.set(c);
    }
}

fn shorthand_class(esc: u8, word: &WordTable) -> MKind {
    let mut bm = BitMap::default();
    let negate = esc.is_ascii_uppercase();
    match esc.to_ascii_lowercase() {
        b'd' => set_digits(&mut bm),
        b'l' => set_letters(&mut bm),
        b's' => set_space(&mut bm),
        _ => set_word(&mut bm, word),
    }
    if negate { MKind::NotCcl(bm) } else { MKind::Ccl(bm) }
}

/// Compile a pattern body (options already stripped) into the forward
/// program.
pub fn compile(pat: &str, word: &WordTable) -> EdResult<Compiled> {
    let bytes = pat.as_bytes();
    let mut nodes: Vec<MNode> = Vec::new();
    let mut regical = false;
    let mut group_count = 0usize;
    let mut group_stack: Vec<usize> = Vec::new();
    let mut last_does_closure = false;
    let mut i = 0usize;

    let invalid_rep =
        || Status::failure(format!("Invalid repetition operand in RE pattern '{pat}'"));

    while i < bytes.len() {
        let pc = bytes[i];
        match pc {
            b'[' => {
                let (bm, negate) = cclmake(bytes, &mut i, word)?;
                nodes.push(MNode::plain(if negate {
                    MKind::NotCcl(bm)
                } else {
                    MKind::Ccl(bm)
                }));
                last_does_closure = true;
                regical = true;
            }
            b'^' => {
                nodes.push(MNode::plain(MKind::Bol));
                regical = true;
            }
            b'$' => {
                nodes.push(MNode::plain(MKind::Eol));
                regical = true;
            }
            b'.' => {
                nodes.push(MNode::plain(MKind::Any));
                last_does_closure = true;
                regical = true;
            }
            b'*' | b'+' => {
                if !last_does_closure {
                    return Err(invalid_rep());
                }
                let min = if pc == b'+' { 1 } else { 0 };
                attach_closure(&mut nodes, pat, min, None)?;
                last_does_closure = false;
                regical = true;
            }
            b'?' => {
                if last_does_closure {
                    attach_closure(&mut nodes, pat, 0, Some(1))?;
                    last_does_closure = false;
                    regical = true;
                } else {
                    // Closure modifier: make the previous closure lazy.
                    match nodes.last_mut().and_then(|n| n.closure.as_mut()) {
                        Some(cl) => cl.lazy = true,
                        None => return Err(invalid_rep()),
                    }
                }
            }
            b'{' => {
                if !last_does_closure {
                    if bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
                        return Err(invalid_rep());
                    }
                    nodes.push(MNode::plain(MKind::Lit(b'{')));
                    last_does_closure = true;
                    i += 1;
                    continue;
                }
                let (min, max) = parse_repetition(bytes, &mut i).ok_or_else(invalid_rep)?;
                attach_closure(&mut nodes, pat, min, max)?;
                last_does_closure = false;
                regical = true;
            }
            b'(' => {
                if group_count + 1 >= MAX_GROUPS {
                    return Err(Status::failure(format!(
                        "Too many groups in RE pattern '{pat}' (maximum is {})",
                        MAX_GROUPS - 1
                    )));
                }
                group_count += 1;
                group_stack.push(group_count);
                nodes.push(MNode::plain(MKind::GroupBegin(group_count)));
                last_does_closure = false;
                regical = true;
            }
            b')' => {
                let Some(n) = group_stack.pop() else {
                    return Err(Status::failure(format!(
                        "Unmatched right paren in RE pattern '{pat}'"
                    )));
                };
                nodes.push(MNode::plain(MKind::GroupEnd(n)));
                regical = true;
            }
            b'\\' => {
                regical = true;
                i += 1;
                match bytes.get(i) {
                    None => {
                        nodes.push(MNode::plain(MKind::Lit(b'\\')));
                        last_does_closure = true;
                        break;
                    }
                    Some(&esc) => match esc {
                        b'd' | b'D' | b'l' | b'L' | b's' | b'S' | b'w' | b'W' => {
                            nodes.push(MNode::plain(shorthand_class(esc, word)));
                            last_does_closure = true;
                        }
                        b'b' => nodes.push(MNode::plain(MKind::WordBound { negate: false })),
                        b'B' => nodes.push(MNode::plain(MKind::WordBound { negate: true })),
                        b'A' => nodes.push(MNode::plain(MKind::BufBegin)),
                        b'z' => nodes.push(MNode::plain(MKind::BufEnd)),
                        b'Z' => nodes.push(MNode::plain(MKind::BufEndAlt)),
                        other => {
                            let lit = match other {
                                b't' => b'\t',
                                b'r' => b'\r',
                                b'n' => b'\n',
                                b'f' => 0x0c,
                                c => c,
                            };
                            nodes.push(MNode::plain(MKind::Lit(lit)));
                            last_does_closure = true;
                        }
                    },
                }
            }
            c => {
                nodes.push(MNode::plain(MKind::Lit(c)));
                last_does_closure = true;
            }
        }
        i += 1;
    }

    if !group_stack.is_empty() {
        return Err(Status::failure(format!(
            "RE group not ended in pattern '{pat}'"
        )));
    }
    Ok(Compiled {
        nodes,
        group_count,
        regical,
    })
}

fn attach_closure(
    nodes: &mut Vec<MNode>,
    pat: &str,
    min: u32,
    max: Option<u32>,
) -> EdResult<()> {
    match nodes.last_mut() {
        Some(node) => {
            if matches!(node.kind, MKind::GroupEnd(_)) {
                return Err(Status::failure(format!(
                    "Closure on group not supported in RE pattern '{pat}'"
                )));
            }
            node.closure = Some(Closure {
                min,
                max,
                lazy: false,
            });
            Ok(())
        }
        None => Err(Status::failure(format!(
            "Invalid repetition operand in RE pattern '{pat}'"
        ))),
    }
}

/// Parse `{m}`, `{m,}`, or `{m,n}`. `i` points at `{` on entry and at `}`
/// on success.
fn parse_repetition(bytes: &[u8], i: &mut usize) -> Option<(u32, Option<u32>)> {
    let mut j = *i + 1;
    let mut read_num = |j: &mut usize| -> Option<u32> {
        let start = *j;
        while bytes.get(*j).is_some_and(|b| b.is_ascii_digit()) {
            *j += 1;
        }
        if *j == start {
            return None;
        }
        std::str::from_utf8(&bytes[start..*j]).ok()?.parse().ok()
    };
    let min = read_num(&mut j)?;
    match bytes.get(j) {
        Some(b'}') => {
            *i = j;
            Some((min, Some(min)))
        }
        Some(b',') => {
            j += 1;
            if bytes.get(j) == Some(&b'}') {
                *i = j;
                return Some((min, None));
            }
            let max = read_num(&mut j)?;
            if max == 0 || max < min || bytes.get(j) != Some(&b'}') {
                return None;
            }
            *i = j;
            Some((min, Some(max)))
        }
        _ => None,
    }
}
