//! Extended key codes and their round-trippable textual encoding.
//!
//! A key is a character code with modifier flags packed into the high
//! bits: `Ctrl`, `Meta`, the three prefix-key sequences, `Shift`, and
//! `FKey` for function keys. [`ektos`] renders a code to its key literal
//! (`C-a`, `M-x`, `ESC j`, `FN5`, ...) and [`stoek`] parses a literal
//! back; the pair round-trips exactly, which the keyboard-macro string
//! form depends on.

use bitflags::bitflags;
use core_status::{EdResult, Status};

bitflags! {
    /// Modifier bits packed above the 21-bit character payload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyMods: u32 {
        const CTRL  = 1 << 24;
        const META  = 1 << 25;
        const PREF1 = 1 << 26;
        const PREF2 = 1 << 27;
        const PREF3 = 1 << 28;
        const SHIFT = 1 << 29;
        const FKEY  = 1 << 30;
    }
}

const CHAR_MASK: u32 = (1 << 21) - 1;

/// An extended key: modifier flags plus a character payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtKey(u32);

impl ExtKey {
    pub fn new(mods: KeyMods, ch: char) -> Self {
        Self(mods.bits() | (ch as u32 & CHAR_MASK))
    }

    pub fn plain(ch: char) -> Self {
        Self::new(KeyMods::empty(), ch)
    }

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn from_code(code: u32) -> Self {
        Self(code)
    }

    pub fn mods(self) -> KeyMods {
        KeyMods::from_bits_truncate(self.0 & !CHAR_MASK)
    }

    pub fn ch(self) -> char {
        char::from_u32(self.0 & CHAR_MASK).unwrap_or('\u{FFFD}')
    }

    /// Normalize a raw input character: control bytes become
    /// `Ctrl`-flagged letters.
    pub fn from_raw_char(c: char) -> Self {
        let code = c as u32;
        if code < 0x20 && c != '\t' && c != '\r' && c != '\x1b' {
            Self::new(KeyMods::CTRL, char::from_u32(code + 0x60).unwrap_or(c))
        } else {
            Self::plain(c)
        }
    }
}

/// Named base keys that need a multi-character literal.
fn base_name(ch: char) -> Option<&'static str> {
    Some(match ch {
        ' ' => "SPC",
        '\t' => "TAB",
        '\r' => "RTN",
        '\x1b' => "ESC",
        '\x7f' => "DEL",
        _ => return None,
    })
}

fn name_base(name: &str) -> Option<char> {
    Some(match name {
        "SPC" => ' ',
        "TAB" => '\t',
        "RTN" => '\r',
        "ESC" => '\x1b',
        "DEL" => '\x7f',
        _ => return None,
    })
}

/// Encode a key to its textual literal.
pub fn ektos(key: ExtKey) -> String {
    let mods = key.mods();
    let mut out = String::new();
    // A prefix sequence renders as its prefix key followed by a space.
    if mods.contains(KeyMods::PREF1) {
        out.push_str("ESC ");
    } else if mods.contains(KeyMods::PREF2) {
        out.push_str("^X ");
    } else if mods.contains(KeyMods::PREF3) {
        out.push_str("^C ");
    }
    if mods.contains(KeyMods::SHIFT) {
        out.push_str("S-");
    }
    if mods.contains(KeyMods::CTRL) {
        out.push_str("C-");
    }
    if mods.contains(KeyMods::META) {
        out.push_str("M-");
    }
    if mods.contains(KeyMods::FKEY) {
        out.push_str("FN");
        out.push(key.ch());
    } else {
        match base_name(key.ch()) {
            Some(name) => out.push_str(name),
            None => out.push(key.ch()),
        }
    }
    out
}

/// Parse a key literal back to its code. Accepts the exact forms `ektos`
/// produces plus the caret form (`^A` = `C-a`).
pub fn stoek(lit: &str) -> EdResult<ExtKey> {
    let mut mods = KeyMods::empty();
    let mut rest = lit;

    let bad = || Status::failure(format!("Invalid key literal '{lit}'"));

    // Prefix sequence.
    for (prefix, flag) in [
        ("ESC ", KeyMods::PREF1),
        ("^X ", KeyMods::PREF2),
        ("^C ", KeyMods::PREF3),
    ] {
        if let Some(tail) = rest.strip_prefix(prefix) {
            mods |= flag;
            rest = tail;
            break;
        }
    }
    // Modifier dashes in canonical order.
    loop {
        if let Some(tail) = rest.strip_prefix("S-") {
            mods |= KeyMods::SHIFT;
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("C-") {
            mods |= KeyMods::CTRL;
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("M-") {
            mods |= KeyMods::META;
            rest = tail;
        } else {
            break;
        }
    }
    // Function key.
    if let Some(tail) = rest.strip_prefix("FN") {
        let mut chars = tail.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(bad());
        };
        return Ok(ExtKey::new(mods | KeyMods::FKEY, c));
    }
    // Caret control form.
    if let Some(tail) = rest.strip_prefix('^')
        && !tail.is_empty()
    {
        let mut chars = tail.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(bad());
        };
        return Ok(ExtKey::new(mods | KeyMods::CTRL, c.to_ascii_lowercase()));
    }
    // Named base.
    if let Some(c) = name_base(rest) {
        return Ok(ExtKey::new(mods, c));
    }
    let mut chars = rest.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return Err(bad());
    };
    Ok(ExtKey::new(mods, c))
}

/// Delimiters tried when encoding a keyboard macro to string form; the
/// first one absent from every key literal wins.
const KM_DELIMS: &[char] = &['\x14', '\t', ' ', '/', ';', ':', '+', '~'];

/// Encode a key sequence as a single string: a chosen delimiter character
/// followed by delimiter-joined key literals.
pub fn keys_to_string(keys: &[ExtKey]) -> EdResult<String> {
    if keys.is_empty() {
        return Ok(String::new());
    }
    let literals: Vec<String> = keys.iter().map(|&k| ektos(k)).collect();
    let delim = KM_DELIMS
        .iter()
        .copied()
        .find(|d| literals.iter().all(|l| !l.contains(*d)))
        .ok_or_else(|| Status::failure("No usable keyboard macro delimiter"))?;
    let mut out = String::new();
    for lit in literals {
        out.push(delim);
        out.push_str(&lit);
    }
    Ok(out)
}

/// Decode a keyboard-macro string back to its key sequence.
pub fn string_to_keys(s: &str) -> EdResult<Vec<ExtKey>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let mut chars = s.chars();
    let delim = chars
        .next()
        .ok_or_else(|| Status::failure("Empty keyboard macro string"))?;
    chars
        .as_str()
        .split(delim)
        .map(stoek)
        .collect::<EdResult<Vec<_>>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_modifiers() {
        assert_eq!(ektos(ExtKey::new(KeyMods::CTRL, 'a')), "C-a");
        assert_eq!(ektos(ExtKey::new(KeyMods::META, 'x')), "M-x");
        assert_eq!(ektos(ExtKey::new(KeyMods::PREF1, 'j')), "ESC j");
        assert_eq!(ektos(ExtKey::new(KeyMods::PREF2, 'f')), "^X f");
        assert_eq!(
            ektos(ExtKey::new(KeyMods::SHIFT | KeyMods::FKEY, '5')),
            "S-FN5"
        );
        assert_eq!(ektos(ExtKey::plain(' ')), "SPC");
        assert_eq!(ektos(ExtKey::plain('\x1b')), "ESC");
    }

    #[test]
    fn parses_canonical_and_caret_forms() {
        assert_eq!(stoek("C-a").unwrap(), ExtKey::new(KeyMods::CTRL, 'a'));
        assert_eq!(stoek("^A").unwrap(), ExtKey::new(KeyMods::CTRL, 'a'));
        assert_eq!(stoek("ESC j").unwrap(), ExtKey::new(KeyMods::PREF1, 'j'));
        assert_eq!(stoek("ESC").unwrap(), ExtKey::plain('\x1b'));
        assert_eq!(
            stoek("^X C-f").unwrap(),
            ExtKey::new(KeyMods::PREF2 | KeyMods::CTRL, 'f')
        );
        assert!(stoek("C-").is_err());
        assert!(stoek("FNxy").is_err());
        assert!(stoek("nope").is_err());
    }

    #[test]
    fn ektos_stoek_round_trip() {
        let keys = [
            ExtKey::plain('q'),
            ExtKey::new(KeyMods::CTRL, 'c'),
            ExtKey::new(KeyMods::META, '9'),
            ExtKey::new(KeyMods::PREF2, 'k'),
            ExtKey::new(KeyMods::PREF3 | KeyMods::CTRL, 'd'),
            ExtKey::new(KeyMods::FKEY, '1'),
            ExtKey::new(KeyMods::SHIFT | KeyMods::FKEY, '2'),
            ExtKey::plain(' '),
            ExtKey::plain('\t'),
            ExtKey::plain('\x7f'),
        ];
        for key in keys {
            let lit = ektos(key);
            assert_eq!(stoek(&lit).unwrap(), key, "literal {lit:?}");
        }
    }

    #[test]
    fn raw_control_chars_normalize() {
        let k = ExtKey::from_raw_char('\x01');
        assert_eq!(k, ExtKey::new(KeyMods::CTRL, 'a'));
        assert_eq!(ExtKey::from_raw_char('\t'), ExtKey::plain('\t'));
    }

    #[test]
    fn key_macro_string_round_trip() {
        let keys = vec![
            ExtKey::new(KeyMods::CTRL, 'x'),
            ExtKey::plain('h'),
            ExtKey::plain('i'),
            ExtKey::new(KeyMods::PREF1, 'z'),
            ExtKey::plain(' '),
        ];
        let s = keys_to_string(&keys).unwrap();
        let back = string_to_keys(&s).unwrap();
        assert_eq!(back, keys);
    }

    #[test]
    fn key_macro_picks_nonconflicting_delimiter() {
        // A literal containing the first delimiter candidates forces a
        // later choice.
        let keys = vec![ExtKey::plain('\x14')];
        let s = keys_to_string(&keys).unwrap();
        assert!(!s.is_empty());
        assert_eq!(string_to_keys(&s).unwrap(), keys);
    }

    #[test]
    fn empty_macro_is_empty_string() {
        assert_eq!(keys_to_string(&[]).unwrap(), "");
        assert!(string_to_keys("").unwrap().is_empty());
    }
}
