//! The script value model: a tagged variant with reference-shared arrays.
//!
//! Scalars (`nil`, booleans, integers, strings) copy by value; arrays are
//! handles onto shared storage, so assignment and argument passing observe
//! reference semantics. Cycles are legal — an array may contain itself —
//! and are broken during recursive walks (stringification, `quote`, deep
//! equality) by a mark bit on the array header that is set on entry and
//! cleared when the walk finishes.

use bitflags::bitflags;
use core_status::{EdResult, Status};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Shared array storage. The `mark` cell is only ever set transiently by a
/// traversal that clears it again before returning.
#[derive(Debug, Default)]
pub struct ArrayObj {
    pub elems: RefCell<Vec<Value>>,
    mark: Cell<bool>,
}

/// Reference-counted array handle. Cloning the handle aliases the storage.
#[derive(Debug, Clone, Default)]
pub struct ArrayHandle(Rc<ArrayObj>);

impl ArrayHandle {
    pub fn new(elems: Vec<Value>) -> Self {
        Self(Rc::new(ArrayObj {
            elems: RefCell::new(elems),
            mark: Cell::new(false),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.elems.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Option<Value> {
        self.0.elems.borrow().get(idx).cloned()
    }

    pub fn push(&self, v: Value) {
        self.0.elems.borrow_mut().push(v);
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.elems.borrow_mut().pop()
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        let mut elems = self.0.elems.borrow_mut();
        if elems.is_empty() {
            None
        } else {
            Some(elems.remove(0))
        }
    }

    /// Insert an element at the front.
    pub fn unshift(&self, v: Value) {
        self.0.elems.borrow_mut().insert(0, v);
    }

    /// Write an element. Writing at `len` extends the array by one; any
    /// larger index is an error.
    pub fn set(&self, idx: usize, v: Value) -> EdResult<()> {
        let mut elems = self.0.elems.borrow_mut();
        if idx < elems.len() {
            elems[idx] = v;
            Ok(())
        } else if idx == elems.len() {
            elems.push(v);
            Ok(())
        } else {
            Err(Status::failure(format!(
                "Array index {idx} out of range (have {} elements)",
                elems.len()
            )))
        }
    }

    pub fn same_storage(&self, other: &ArrayHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn marked(&self) -> bool {
        self.0.mark.get()
    }

    fn set_mark(&self, on: bool) {
        self.0.mark.set(on);
    }

    /// Build a detached deep copy, recursing through nested arrays up to
    /// `max_depth` levels. Shared sub-arrays become independent copies.
    pub fn deep_clone(&self, max_depth: usize) -> EdResult<ArrayHandle> {
        if max_depth == 0 {
            return Err(Status::failure("Maximum array depth exceeded"));
        }
        let src = self.0.elems.borrow();
        let mut out = Vec::with_capacity(src.len());
        for v in src.iter() {
            out.push(match v {
                Value::Array(a) => Value::Array(a.deep_clone(max_depth - 1)?),
                other => other.clone(),
            });
        }
        Ok(ArrayHandle::new(out))
    }
}

/// A script value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(ArrayHandle),
}

bitflags! {
    /// Controls for array flattening and value stringification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flatten: u8 {
        /// Keep nil elements when joining.
        const KEEP_NIL    = 1 << 0;
        /// Keep null-string elements when joining.
        const KEEP_NULL   = 1 << 1;
        /// Render nil as the literal `nil` rather than an empty string.
        const SHOW_NIL    = 1 << 2;
        /// Render booleans as `true`/`false` rather than an empty string.
        const SHOW_BOOL   = 1 << 3;
        /// Render a re-encountered array as `[...]` instead of failing.
        const FORCE_ARRAY = 1 << 4;
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn array(elems: Vec<Value>) -> Self {
        Value::Array(ArrayHandle::new(elems))
    }

    /// Truth rule: only `false`, `nil`, and the null string are false.
    /// Integer zero is true.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Strict integer dereference; no string parsing.
    pub fn as_int(&self) -> EdResult<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            _ => Err(Status::failure(format!(
                "Integer expected, got {}",
                self.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> EdResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(Status::failure(format!(
                "String expected, got {}",
                self.type_name()
            ))),
        }
    }

    pub fn as_array(&self) -> EdResult<&ArrayHandle> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(Status::failure(format!(
                "Array expected, got {}",
                self.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
        }
    }

    /// Empty test: nil, the null string, or an empty array.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Str(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Stringify for display or concatenation. Arrays flatten with the
    /// given delimiter; revisiting an in-progress array either emits
    /// `[...]` (`FORCE_ARRAY`) or fails with endless-recursion.
    pub fn to_display_string(&self, delim: &str, flags: Flatten) -> EdResult<String> {
        let mut out = String::new();
        let r = write_value(&mut out, self, delim, flags);
        clear_marks(self);
        r.map(|_| out)
    }

    /// Default stringification: empty for nil and booleans, bare digits for
    /// integers, elements comma-joined for arrays.
    pub fn coerce_str(&self) -> EdResult<String> {
        self.to_display_string(", ", Flatten::KEEP_NIL | Flatten::KEEP_NULL)
    }
}

fn write_value(out: &mut String, v: &Value, delim: &str, flags: Flatten) -> EdResult<()> {
    match v {
        Value::Nil => {
            if flags.contains(Flatten::SHOW_NIL) {
                out.push_str("nil");
            }
        }
        Value::Bool(b) => {
            if flags.contains(Flatten::SHOW_BOOL) {
                out.push_str(if *b { "true" } else { "false" });
            }
        }
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Str(s) => out.push_str(s),
        Value::Array(a) => {
            if a.marked() {
                if flags.contains(Flatten::FORCE_ARRAY) {
                    out.push_str("[...]");
                    return Ok(());
                }
                return Err(Status::failure("Endless recursion detected in array"));
            }
            a.set_mark(true);
            let elems = a.0.elems.borrow();
            let mut first = true;
            for el in elems.iter() {
                if el.is_nil() && !flags.contains(Flatten::KEEP_NIL) {
                    continue;
                }
                if matches!(el, Value::Str(s) if s.is_empty())
                    && !flags.contains(Flatten::KEEP_NULL)
                {
                    continue;
                }
                if !first {
                    out.push_str(delim);
                }
                first = false;
                write_value(out, el, delim, flags)?;
            }
        }
    }
    Ok(())
}

/// Clear traversal marks left on any array reachable from `v`. Safe to call
/// after a failed walk; recursion stops at already-cleared headers.
pub fn clear_marks(v: &Value) {
    if let Value::Array(a) = v {
        if !a.marked() {
            return;
        }
        a.set_mark(false);
        for el in a.0.elems.borrow().iter() {
            clear_marks(el);
        }
    }
}

/// Join array elements (or stringify a scalar) with a delimiter.
pub fn join(v: &Value, delim: &str, flags: Flatten) -> EdResult<String> {
    v.to_display_string(delim, flags)
}

/// Quote a value into source form that evaluates back to an equal value:
/// strings get escapes and double quotes, arrays render as `[...]`
/// literals, scalars render as their keywords or digits.
pub fn quote(v: &Value) -> EdResult<String> {
    let mut out = String::new();
    let r = quote_into(&mut out, v);
    clear_marks(v);
    r.map(|_| out)
}

fn quote_into(out: &mut String, v: &Value) -> EdResult<()> {
    match v {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                match ch {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '#' => out.push_str("\\#"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    '\x0c' => out.push_str("\\f"),
                    '\x1b' => out.push_str("\\e"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        Value::Array(a) => {
            if a.marked() {
                return Err(Status::failure("Endless recursion detected in array"));
            }
            a.set_mark(true);
            out.push('[');
            let elems = a.0.elems.borrow();
            for (i, el) in elems.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                quote_into(out, el)?;
            }
            out.push(']');
        }
    }
    Ok(())
}

/// Deep equality with cycle protection: two arrays that are the same
/// storage are equal; otherwise elements compare pairwise, and a revisited
/// pair (cycle) compares equal by identity of the traversal.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    fn eq_inner(a: &Value, b: &Value, seen: &mut Vec<(*const ArrayObj, *const ArrayObj)>) -> bool {
        match (a, b) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => {
                if x.same_storage(y) {
                    return true;
                }
                let pair = (Rc::as_ptr(&x.0), Rc::as_ptr(&y.0));
                if seen.contains(&pair) {
                    return true;
                }
                seen.push(pair);
                let xs = x.0.elems.borrow();
                let ys = y.0.elems.borrow();
                xs.len() == ys.len()
                    && xs.iter().zip(ys.iter()).all(|(p, q)| eq_inner(p, q, seen))
            }
            _ => false,
        }
    }
    eq_inner(a, b, &mut Vec::new())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_eq(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_display_string(", ", Flatten::KEEP_NIL | Flatten::KEEP_NULL) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("[...]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truth_rules() {
        assert!(!Value::Nil.to_bool());
        assert!(!Value::Bool(false).to_bool());
        assert!(!Value::str("").to_bool());
        assert!(Value::Int(0).to_bool(), "integer zero is true");
        assert!(Value::str("x").to_bool());
        assert!(Value::array(vec![]).to_bool());
    }

    #[test]
    fn arrays_share_storage_on_clone() {
        let a = ArrayHandle::new(vec![Value::Int(1)]);
        let b = a.clone();
        b.push(Value::Int(2));
        assert_eq!(a.len(), 2);
        assert!(a.same_storage(&b));
    }

    #[test]
    fn set_extends_only_at_length() {
        let a = ArrayHandle::new(vec![Value::Int(1)]);
        a.set(1, Value::Int(2)).unwrap();
        assert_eq!(a.len(), 2);
        assert!(a.set(5, Value::Int(9)).is_err());
    }

    #[test]
    fn join_drops_nil_and_null_by_default_flags() {
        let v = Value::array(vec![
            Value::Int(1),
            Value::Nil,
            Value::str(""),
            Value::str("x"),
        ]);
        assert_eq!(join(&v, ",", Flatten::empty()).unwrap(), "1,x");
        assert_eq!(
            join(&v, ",", Flatten::KEEP_NIL | Flatten::KEEP_NULL).unwrap(),
            "1,,,x"
        );
    }

    #[test]
    fn cyclic_array_fails_without_force() {
        let a = ArrayHandle::new(vec![Value::Int(1)]);
        a.push(Value::Array(a.clone()));
        let v = Value::Array(a);
        assert!(join(&v, ",", Flatten::empty()).is_err());
        // Marks must have been cleared so a second walk behaves identically.
        assert!(join(&v, ",", Flatten::empty()).is_err());
    }

    #[test]
    fn cyclic_array_renders_with_force() {
        let a = ArrayHandle::new(vec![Value::Int(1)]);
        a.push(Value::Array(a.clone()));
        let s = join(&Value::Array(a), ",", Flatten::FORCE_ARRAY).unwrap();
        assert_eq!(s, "1,[...]");
    }

    #[test]
    fn quote_round_trip_material() {
        let v = Value::str("a\"b\\c\nd");
        assert_eq!(quote(&v).unwrap(), "\"a\\\"b\\\\c\\nd\"");
        let v = Value::array(vec![Value::Nil, Value::Bool(true), Value::Int(-3)]);
        assert_eq!(quote(&v).unwrap(), "[nil, true, -3]");
    }

    #[test]
    fn deep_equality_handles_cycles() {
        let a = ArrayHandle::new(vec![Value::Int(1)]);
        a.push(Value::Array(a.clone()));
        let b = ArrayHandle::new(vec![Value::Int(1)]);
        b.push(Value::Array(b.clone()));
        assert!(value_eq(&Value::Array(a), &Value::Array(b)));
    }

    #[test]
    fn deep_clone_detaches() {
        let inner = ArrayHandle::new(vec![Value::Int(1)]);
        let outer = ArrayHandle::new(vec![Value::Array(inner.clone())]);
        let copy = outer.deep_clone(8).unwrap();
        inner.push(Value::Int(2));
        assert_eq!(copy.get(0).unwrap().as_array().unwrap().len(), 1);
    }
}
