//! Token stream over one logical command line.
//!
//! The lexer is re-entrant by construction: string interpolation and
//! `eval` open a fresh [`Lexer`] over the nested source with its own
//! terminator character, so nested expression evaluation never disturbs
//! the outer parse. String literal bodies are captured raw; escape and
//! interpolation processing happens at evaluation time.

use crate::token::Sym;
use core_status::{EdResult, Status};

/// Line comment lead-in.
pub const COMMENT_CH: char = '#';

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    /// Statement terminator: `None` runs to end of line, `Some('}')`
    /// stops at an interpolation close brace.
    term: Option<char>,
    /// Current (most recently scanned) symbol.
    pub sym: Sym,
}

impl Lexer {
    pub fn new(src: &str, term: Option<char>) -> EdResult<Self> {
        let mut lx = Self {
            chars: src.chars().collect(),
            pos: 0,
            term,
            sym: Sym::None,
        };
        lx.advance()?;
        Ok(lx)
    }

    /// Index just past the last consumed character (used by nested
    /// parses to resume the outer scan).
    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn have_sym(&self) -> bool {
        self.sym != Sym::None
    }

    /// Fail unless the whole statement was consumed.
    pub fn expect_end(&self) -> EdResult<()> {
        if self.have_sym() {
            return Err(Status::failure(format!(
                "Extraneous token '{:?}'",
                self.sym
            )));
        }
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// If the current symbol matches, advance and return true.
    pub fn accept(&mut self, sym: &Sym) -> EdResult<bool> {
        if &self.sym == sym {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn require(&mut self, sym: &Sym, what: &str) -> EdResult<()> {
        if &self.sym == sym {
            self.advance()
        } else {
            Err(Status::failure(format!("{what} expected")))
        }
    }

    /// Scan the next symbol into `self.sym`.
    pub fn advance(&mut self) -> EdResult<()> {
        while matches!(self.peek(), Some(c) if c == ' ' || c == '\t') {
            self.pos += 1;
        }
        let Some(c) = self.peek() else {
            self.sym = Sym::None;
            return Ok(());
        };
        if Some(c) == self.term {
            // Consume the terminator so the enclosing parse resumes
            // after it.
            self.pos += 1;
            self.sym = Sym::None;
            return Ok(());
        }
        if c == COMMENT_CH {
            self.pos = self.chars.len();
            self.sym = Sym::None;
            return Ok(());
        }
        self.sym = if c.is_ascii_digit() {
            self.scan_number()?
        } else if c == '"' || c == '\'' {
            self.scan_string(c)?
        } else if c == '?' {
            // `?c` is a character literal; a bare `?` is the ternary hook.
            match self.peek_at(1) {
                Some(n) if n != ' ' && n != '\t' => self.scan_char_literal()?,
                _ => {
                    self.pos += 1;
                    Sym::Hook
                }
            }
        } else if c == '$' {
            self.scan_dollar()?
        } else if c == '_' || c.is_alphabetic() {
            self.scan_ident()
        } else {
            self.scan_operator()?
        };
        Ok(())
    }

    fn scan_number(&mut self) -> EdResult<Sym> {
        let start = self.pos;
        let mut radix = 10;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            radix = 16;
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_digit(radix)) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(Status::failure("Malformed numeric literal"));
        }
        let text: String = self.chars[digits_start..self.pos].iter().collect();
        let n = i64::from_str_radix(&text, radix).map_err(|_| {
            let lit: String = self.chars[start..self.pos].iter().collect();
            Status::failure(format!("Numeric literal '{lit}' out of range"))
        })?;
        Ok(Sym::IntLit(n))
    }

    fn scan_string(&mut self, quote: char) -> EdResult<Sym> {
        self.pos += 1;
        let mut raw = String::new();
        loop {
            match self.bump() {
                None => return Err(Status::failure("String not terminated")),
                Some(c) if c == quote => break,
                Some('\\') => {
                    // Keep the escape pair raw for evaluation time.
                    raw.push('\\');
                    match self.bump() {
                        Some(e) => raw.push(e),
                        None => return Err(Status::failure("String not terminated")),
                    }
                }
                Some('\0') => {
                    return Err(Status::failure("Null byte in string literal"));
                }
                Some('#') if quote == '"' && self.peek() == Some('{') => {
                    // Interpolation: capture through the matching brace so
                    // quotes inside the expression do not end the literal.
                    raw.push('#');
                    raw.push('{');
                    self.pos += 1;
                    self.capture_interpolation(&mut raw)?;
                }
                Some(c) => raw.push(c),
            }
        }
        Ok(Sym::StrLit {
            raw,
            interp: quote == '"',
        })
    }

    /// Copy an interpolated expression body (after `#{`) into `raw`,
    /// through the matching `}`. Braces nest; string literals inside the
    /// expression are skipped opaquely.
    fn capture_interpolation(&mut self, raw: &mut String) -> EdResult<()> {
        let mut depth = 1usize;
        let mut in_str: Option<char> = None;
        loop {
            let Some(c) = self.bump() else {
                return Err(Status::failure("Interpolated expression not ended"));
            };
            raw.push(c);
            match in_str {
                Some(q) => {
                    if c == '\\' {
                        if let Some(e) = self.bump() {
                            raw.push(e);
                        }
                    } else if c == q {
                        in_str = None;
                    }
                }
                None => match c {
                    '"' | '\'' => in_str = Some(c),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                    _ => {}
                },
            }
        }
    }

    fn scan_char_literal(&mut self) -> EdResult<Sym> {
        self.pos += 1; // the '?'
        let c = self
            .bump()
            .ok_or_else(|| Status::failure("Character literal not terminated"))?;
        let v = if c == '\\' {
            let e = self
                .bump()
                .ok_or_else(|| Status::failure("Character literal not terminated"))?;
            match e {
                'n' => '\n' as i64,
                'r' => '\r' as i64,
                't' => '\t' as i64,
                'e' => 0x1b,
                's' => ' ' as i64,
                'f' => 0x0c,
                '0' => return Err(Status::failure("Null byte in character literal")),
                other => other as i64,
            }
        } else {
            c as i64
        };
        Ok(Sym::CharLit(v))
    }

    fn scan_dollar(&mut self) -> EdResult<Sym> {
        self.pos += 1;
        match self.peek() {
            Some('$') => Err(Status::failure("'$$' is reserved")),
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                let n: usize = text
                    .parse()
                    .map_err(|_| Status::failure(format!("Bad argument reference '${text}'")))?;
                Ok(Sym::NumVar(n))
            }
            Some(c) if c == '_' || c.is_alphabetic() => {
                let start = self.pos;
                while matches!(self.peek(), Some(d) if d == '_' || d.is_alphanumeric()) {
                    self.pos += 1;
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                Ok(Sym::GlobalVar(name))
            }
            _ => Err(Status::failure("Variable name expected after '$'")),
        }
    }

    fn scan_ident(&mut self) -> Sym {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == '_' || c.is_alphanumeric()) {
            self.pos += 1;
        }
        let mut query = false;
        if self.peek() == Some('?') {
            // Trailing '?' marks a query function name unless it starts a
            // character literal (`x ?y` cannot occur without whitespace).
            query = true;
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos - usize::from(query)]
            .iter()
            .collect();
        if !query {
            match name.as_str() {
                "nil" => return Sym::NilLit,
                "true" => return Sym::TrueLit,
                "false" => return Sym::FalseLit,
                "defn" => return Sym::DefnLit,
                "and" => return Sym::KwAnd,
                "or" => return Sym::KwOr,
                "not" => return Sym::KwNot,
                "in" => return Sym::KwIn,
                _ => {}
            }
        }
        Sym::Ident { name, query }
    }

    fn scan_operator(&mut self) -> EdResult<Sym> {
        let c = self.bump().expect("caller checked a char is present");
        let two = |lx: &mut Self, next: char| -> bool {
            if lx.peek() == Some(next) {
                lx.pos += 1;
                true
            } else {
                false
            }
        };
        let sym = match c {
            '(' => Sym::LParen,
            ')' => Sym::RParen,
            '[' => Sym::LBracket,
            ']' => Sym::RBracket,
            ',' => Sym::Comma,
            ':' => Sym::Colon,
            '~' => Sym::BitNot,
            '+' => {
                if two(self, '+') {
                    Sym::Incr
                } else if two(self, '=') {
                    Sym::AssignAdd
                } else {
                    Sym::Plus
                }
            }
            '-' => {
                if two(self, '-') {
                    Sym::Decr
                } else if two(self, '=') {
                    Sym::AssignSub
                } else {
                    Sym::Minus
                }
            }
            '*' => {
                if two(self, '*') {
                    Sym::Pow
                } else if two(self, '=') {
                    Sym::AssignMul
                } else {
                    Sym::Star
                }
            }
            '/' => {
                if two(self, '=') {
                    Sym::AssignDiv
                } else {
                    Sym::Slash
                }
            }
            '%' => {
                if two(self, '=') {
                    Sym::AssignMod
                } else {
                    Sym::Percent
                }
            }
            '<' => {
                if two(self, '<') {
                    if two(self, '=') {
                        Sym::AssignLShift
                    } else {
                        Sym::LShift
                    }
                } else if two(self, '=') {
                    Sym::Le
                } else {
                    Sym::Lt
                }
            }
            '>' => {
                if two(self, '>') {
                    if two(self, '=') {
                        Sym::AssignRShift
                    } else {
                        Sym::RShift
                    }
                } else if two(self, '=') {
                    Sym::Ge
                } else {
                    Sym::Gt
                }
            }
            '&' => {
                if two(self, '&') {
                    Sym::AndAnd
                } else if two(self, '=') {
                    Sym::AssignBitAnd
                } else {
                    Sym::BitAnd
                }
            }
            '|' => {
                if two(self, '|') {
                    Sym::OrOr
                } else if two(self, '=') {
                    Sym::AssignBitOr
                } else {
                    Sym::BitOr
                }
            }
            '^' => {
                if two(self, '=') {
                    Sym::AssignBitXor
                } else {
                    Sym::BitXor
                }
            }
            '!' => {
                if two(self, '=') {
                    Sym::Ne
                } else if two(self, '~') {
                    Sym::RegNe
                } else {
                    Sym::Not
                }
            }
            '=' => {
                if two(self, '=') {
                    Sym::EqEq
                } else if two(self, '~') {
                    Sym::RegEq
                } else if two(self, '>') {
                    Sym::NArgArrow
                } else {
                    Sym::Assign
                }
            }
            other => {
                return Err(Status::failure(format!("Unknown token '{other}'")));
            }
        };
        Ok(sym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_syms(src: &str) -> Vec<Sym> {
        let mut lx = Lexer::new(src, None).unwrap();
        let mut out = Vec::new();
        while lx.have_sym() {
            out.push(lx.sym.clone());
            lx.advance().unwrap();
        }
        out
    }

    #[test]
    fn scans_literals() {
        assert_eq!(
            all_syms("42 0x2a nil true false defn"),
            vec![
                Sym::IntLit(42),
                Sym::IntLit(42),
                Sym::NilLit,
                Sym::TrueLit,
                Sym::FalseLit,
                Sym::DefnLit
            ]
        );
    }

    #[test]
    fn scans_strings_raw() {
        let syms = all_syms(r#" "a\n#{x}" 'lit\'eral' "#);
        assert_eq!(
            syms,
            vec![
                Sym::StrLit {
                    raw: "a\\n#{x}".into(),
                    interp: true
                },
                Sym::StrLit {
                    raw: "lit\\'eral".into(),
                    interp: false
                },
            ]
        );
    }

    #[test]
    fn char_literal_vs_ternary_hook() {
        assert_eq!(all_syms("?a"), vec![Sym::CharLit('a' as i64)]);
        assert_eq!(all_syms(r"?\n"), vec![Sym::CharLit('\n' as i64)]);
        assert_eq!(
            all_syms("x ? 1 : 2"),
            vec![
                Sym::Ident {
                    name: "x".into(),
                    query: false
                },
                Sym::Hook,
                Sym::IntLit(1),
                Sym::Colon,
                Sym::IntLit(2)
            ]
        );
    }

    #[test]
    fn scans_variables() {
        assert_eq!(
            all_syms("$searchPat $3 local"),
            vec![
                Sym::GlobalVar("searchPat".into()),
                Sym::NumVar(3),
                Sym::Ident {
                    name: "local".into(),
                    query: false
                }
            ]
        );
        assert!(Lexer::new("$$", None).is_err());
    }

    #[test]
    fn query_identifier() {
        assert_eq!(
            all_syms("empty? x"),
            vec![
                Sym::Ident {
                    name: "empty".into(),
                    query: true
                },
                Sym::Ident {
                    name: "x".into(),
                    query: false
                }
            ]
        );
    }

    #[test]
    fn multi_char_operators() {
        assert_eq!(
            all_syms("a =~ b !~ c => d ** e <<= f"),
            vec![
                Sym::Ident {
                    name: "a".into(),
                    query: false
                },
                Sym::RegEq,
                Sym::Ident {
                    name: "b".into(),
                    query: false
                },
                Sym::RegNe,
                Sym::Ident {
                    name: "c".into(),
                    query: false
                },
                Sym::NArgArrow,
                Sym::Ident {
                    name: "d".into(),
                    query: false
                },
                Sym::Pow,
                Sym::Ident {
                    name: "e".into(),
                    query: false
                },
                Sym::AssignLShift,
                Sym::Ident {
                    name: "f".into(),
                    query: false
                },
            ]
        );
    }

    #[test]
    fn comment_ends_line() {
        assert_eq!(all_syms("1 # the rest is comment"), vec![Sym::IntLit(1)]);
    }

    #[test]
    fn terminator_stops_nested_parse() {
        let mut lx = Lexer::new("1 + 2} rest", Some('}')).unwrap();
        let mut n = 0;
        while lx.have_sym() {
            n += 1;
            lx.advance().unwrap();
        }
        assert_eq!(n, 3);
        assert_eq!(lx.consumed(), 6, "terminator consumed");
    }

    #[test]
    fn unterminated_string_is_error() {
        assert!(Lexer::new("\"abc", None).is_err());
    }
}
