//! Recursive-descent expression evaluation with precedence climbing.
//!
//! Evaluation happens during the parse, so short-circuit operators and
//! ternary branches thread a `live` flag: a dead parse consumes the same
//! tokens but performs no variable access, call, or side effect. L-values
//! are carried alongside values so assignment, compound assignment,
//! increment/decrement, parallel assignment, and array-element stores all
//! share one resolution path.

use crate::lexer::Lexer;
use crate::token::Sym;
use crate::var::{self, VarOp, VarRef};
use crate::{Callable, DEFN, Interp};
use core_search::match_in_string;
use core_status::{EdResult, Status};
use core_value::{Flatten, Value, value_eq};

#[derive(Debug, Clone)]
pub struct ExprVal {
    pub value: Value,
    pub lvalue: Option<VarRef>,
}

impl ExprVal {
    fn value(value: Value) -> Self {
        Self {
            value,
            lvalue: None,
        }
    }
}

/// Stringification used by concatenation and interpolation: nil and the
/// null string vanish, booleans spell themselves out.
fn concat_str(v: &Value) -> EdResult<String> {
    v.to_display_string(
        "",
        Flatten::KEEP_NIL | Flatten::KEEP_NULL | Flatten::SHOW_BOOL,
    )
}

/// Evaluate a whole expression statement, including parallel assignment
/// (`x, y, z = expr`).
pub fn eval_statement(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<Value> {
    let first = ge_assign(it, lx, live)?;
    if lx.sym != Sym::Comma {
        return Ok(first.value);
    }
    // Parallel assignment: collect the remaining targets.
    let mut targets = vec![first
        .lvalue
        .ok_or_else(|| Status::failure("Parallel assignment target is not a variable"))?];
    while lx.accept(&Sym::Comma)? {
        let t = ge_ternary(it, lx, live)?;
        targets.push(t.lvalue.ok_or_else(|| {
            Status::failure("Parallel assignment target is not a variable")
        })?);
    }
    lx.require(&Sym::Assign, "'=' in parallel assignment")?;
    let rhs = ge_assign(it, lx, live)?.value;
    if live {
        let arr = rhs.as_array().map_err(|_| {
            Status::failure("Parallel assignment requires an array value")
        })?;
        if arr.len() != targets.len() {
            return Err(Status::failure(format!(
                "Parallel assignment length mismatch ({} targets, {} values)",
                targets.len(),
                arr.len()
            )));
        }
        for (i, target) in targets.iter().enumerate() {
            let v = arr.get(i).unwrap_or(Value::Nil);
            var::write_var(it, target, v)?;
        }
    }
    Ok(rhs)
}

fn map_compound(op: &Sym) -> Option<Sym> {
    Some(match op {
        Sym::AssignAdd => Sym::Plus,
        Sym::AssignSub => Sym::Minus,
        Sym::AssignMul => Sym::Star,
        Sym::AssignDiv => Sym::Slash,
        Sym::AssignMod => Sym::Percent,
        Sym::AssignLShift => Sym::LShift,
        Sym::AssignRShift => Sym::RShift,
        Sym::AssignBitAnd => Sym::BitAnd,
        Sym::AssignBitOr => Sym::BitOr,
        Sym::AssignBitXor => Sym::BitXor,
        _ => return None,
    })
}

pub fn ge_assign(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let lhs = ge_ternary(it, lx, live)?;
    if !lx.sym.is_assign_op() {
        return Ok(lhs);
    }
    let op = lx.sym.clone();
    lx.advance()?;
    let lv = lhs
        .lvalue
        .clone()
        .ok_or_else(|| Status::failure("Left side of assignment is not a variable"))?;
    let rhs = ge_assign(it, lx, live)?;
    if !live {
        return Ok(ExprVal::value(Value::Nil));
    }
    let newval = match map_compound(&op) {
        None => rhs.value,
        Some(binop) => {
            let cur = var::read_var(it, &lv)?;
            apply_binop(it, &binop, cur, rhs.value, live)?
        }
    };
    var::write_var(it, &lv, newval.clone())?;
    Ok(ExprVal {
        value: newval,
        lvalue: Some(lv),
    })
}

fn ge_ternary(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let cond = ge_or(it, lx, live)?;
    if !lx.accept(&Sym::Hook)? {
        return Ok(cond);
    }
    let taken = live && cond.value.to_bool();
    let then = ge_ternary(it, lx, taken)?;
    lx.require(&Sym::Colon, "':' in conditional expression")?;
    let els = ge_ternary(it, lx, live && !cond.value.to_bool())?;
    Ok(ExprVal::value(if cond.value.to_bool() {
        then.value
    } else {
        els.value
    }))
}

fn ge_or(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_and(it, lx, live)?;
    while matches!(lx.sym, Sym::KwOr | Sym::OrOr) {
        lx.advance()?;
        let truth = lhs.value.to_bool();
        let rhs = ge_and(it, lx, live && !truth)?;
        let result = if truth { true } else { rhs.value.to_bool() };
        lhs = ExprVal::value(Value::Bool(result));
    }
    Ok(lhs)
}

fn ge_and(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_not(it, lx, live)?;
    while matches!(lx.sym, Sym::KwAnd | Sym::AndAnd) {
        lx.advance()?;
        let truth = lhs.value.to_bool();
        let rhs = ge_not(it, lx, live && truth)?;
        let result = truth && rhs.value.to_bool();
        lhs = ExprVal::value(Value::Bool(result));
    }
    Ok(lhs)
}

fn ge_not(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    if lx.accept(&Sym::KwNot)? {
        let operand = ge_not(it, lx, live)?;
        return Ok(ExprVal::value(Value::Bool(!operand.value.to_bool())));
    }
    ge_cmp(it, lx, live)
}

fn ge_cmp(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_bitor(it, lx, live)?;
    while matches!(
        lx.sym,
        Sym::Lt | Sym::Le | Sym::Gt | Sym::Ge | Sym::EqEq | Sym::Ne | Sym::RegEq | Sym::RegNe
    ) {
        let op = lx.sym.clone();
        lx.advance()?;
        let rhs = ge_bitor(it, lx, live)?;
        let value = if live {
            apply_binop(it, &op, lhs.value, rhs.value, live)?
        } else {
            Value::Nil
        };
        lhs = ExprVal::value(value);
    }
    Ok(lhs)
}

fn ge_bitor(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_bitxor(it, lx, live)?;
    while lx.sym == Sym::BitOr {
        lx.advance()?;
        let rhs = ge_bitxor(it, lx, live)?;
        lhs = binop_val(it, &Sym::BitOr, lhs, rhs, live)?;
    }
    Ok(lhs)
}

fn ge_bitxor(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_concat(it, lx, live)?;
    while lx.sym == Sym::BitXor {
        lx.advance()?;
        let rhs = ge_concat(it, lx, live)?;
        lhs = binop_val(it, &Sym::BitXor, lhs, rhs, live)?;
    }
    Ok(lhs)
}

/// `&` is bitwise AND on two integers and concatenation otherwise.
fn ge_concat(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_shift(it, lx, live)?;
    while lx.sym == Sym::BitAnd {
        lx.advance()?;
        let rhs = ge_shift(it, lx, live)?;
        lhs = binop_val(it, &Sym::BitAnd, lhs, rhs, live)?;
    }
    Ok(lhs)
}

fn ge_shift(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_additive(it, lx, live)?;
    while matches!(lx.sym, Sym::LShift | Sym::RShift) {
        let op = lx.sym.clone();
        lx.advance()?;
        let rhs = ge_additive(it, lx, live)?;
        lhs = binop_val(it, &op, lhs, rhs, live)?;
    }
    Ok(lhs)
}

fn ge_additive(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_multiplicative(it, lx, live)?;
    while matches!(lx.sym, Sym::Plus | Sym::Minus) {
        let op = lx.sym.clone();
        lx.advance()?;
        let rhs = ge_multiplicative(it, lx, live)?;
        lhs = binop_val(it, &op, lhs, rhs, live)?;
    }
    Ok(lhs)
}

fn ge_multiplicative(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut lhs = ge_unary(it, lx, live)?;
    while matches!(lx.sym, Sym::Star | Sym::Slash | Sym::Percent) {
        let op = lx.sym.clone();
        lx.advance()?;
        let rhs = ge_unary(it, lx, live)?;
        lhs = binop_val(it, &op, lhs, rhs, live)?;
    }
    Ok(lhs)
}

fn ge_unary(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    match lx.sym.clone() {
        Sym::Minus => {
            lx.advance()?;
            let v = ge_unary(it, lx, live)?;
            if !live {
                return Ok(ExprVal::value(Value::Nil));
            }
            Ok(ExprVal::value(Value::Int(v.value.as_int()?.wrapping_neg())))
        }
        Sym::Plus => {
            lx.advance()?;
            let v = ge_unary(it, lx, live)?;
            if !live {
                return Ok(ExprVal::value(Value::Nil));
            }
            v.value.as_int()?;
            Ok(ExprVal::value(v.value))
        }
        Sym::Not => {
            lx.advance()?;
            let v = ge_unary(it, lx, live)?;
            Ok(ExprVal::value(Value::Bool(!v.value.to_bool())))
        }
        Sym::BitNot => {
            lx.advance()?;
            let v = ge_unary(it, lx, live)?;
            if !live {
                return Ok(ExprVal::value(Value::Nil));
            }
            Ok(ExprVal::value(Value::Int(!v.value.as_int()?)))
        }
        Sym::Incr | Sym::Decr => {
            let delta = if lx.sym == Sym::Incr { 1 } else { -1 };
            lx.advance()?;
            let operand = ge_unary(it, lx, live)?;
            if !live {
                return Ok(ExprVal::value(Value::Nil));
            }
            let lv = operand
                .lvalue
                .ok_or_else(|| Status::failure("'++'/'--' requires a variable"))?;
            let new = Value::Int(operand.value.as_int()?.wrapping_add(delta));
            var::write_var(it, &lv, new.clone())?;
            Ok(ExprVal {
                value: new,
                lvalue: Some(lv),
            })
        }
        _ => ge_power(it, lx, live),
    }
}

fn ge_power(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let lhs = ge_postfix(it, lx, live)?;
    if !lx.accept(&Sym::Pow)? {
        return Ok(lhs);
    }
    let rhs = ge_power(it, lx, live)?; // right associative
    if !live {
        return Ok(ExprVal::value(Value::Nil));
    }
    let base = lhs.value.as_int()?;
    let exp = rhs.value.as_int()?;
    if exp < 0 {
        return Err(Status::failure("Negative exponent"));
    }
    let result = base
        .checked_pow(u32::try_from(exp).map_err(|_| Status::failure("Exponent too large"))?)
        .ok_or_else(|| Status::failure("Integer overflow in '**'"))?;
    Ok(ExprVal::value(Value::Int(result)))
}

fn ge_postfix(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    let mut val = primary(it, lx, live)?;
    loop {
        match lx.sym.clone() {
            Sym::LBracket => {
                lx.advance()?;
                let idx = ge_ternary(it, lx, live)?;
                lx.require(&Sym::RBracket, "']'")?;
                if !live {
                    val = ExprVal::value(Value::Nil);
                    continue;
                }
                let n = idx.value.as_int()?;
                let arr = val.value.as_array()?.clone();
                let index = usize::try_from(n).unwrap_or(usize::MAX);
                let elem = arr.get(index).unwrap_or(Value::Nil);
                val = ExprVal {
                    value: elem,
                    lvalue: Some(VarRef::ArrayElem { array: arr, index }),
                };
            }
            Sym::Incr | Sym::Decr => {
                // Postfix only applies to an lvalue; otherwise leave the
                // token for an enclosing parse (it cannot be valid there
                // either, but the error will name the real problem).
                let Some(lv) = val.lvalue.clone() else {
                    break;
                };
                let delta = if lx.sym == Sym::Incr { 1 } else { -1 };
                lx.advance()?;
                if !live {
                    val = ExprVal::value(Value::Nil);
                    continue;
                }
                let old = val.value.as_int()?;
                var::write_var(it, &lv, Value::Int(old.wrapping_add(delta)))?;
                val = ExprVal::value(Value::Int(old));
            }
            Sym::NArgArrow => {
                lx.advance()?;
                let n = if live { Some(val.value.as_int()?) } else { None };
                let Sym::Ident { name, query } = lx.sym.clone() else {
                    return Err(Status::failure("Command or function expected after '=>'"));
                };
                lx.advance()?;
                let full = callable_name(&name, query);
                let n = n.filter(|&v| v != DEFN);
                let result = call_callable(it, lx, live, &full, n)?;
                val = ExprVal::value(result);
            }
            _ => break,
        }
    }
    Ok(val)
}

/// True if this symbol can begin an expression (used to decide whether a
/// paren-less call has another argument to grab).
fn starts_expr(sym: &Sym) -> bool {
    matches!(
        sym,
        Sym::IntLit(_)
            | Sym::CharLit(_)
            | Sym::StrLit { .. }
            | Sym::NilLit
            | Sym::TrueLit
            | Sym::FalseLit
            | Sym::DefnLit
            | Sym::LParen
            | Sym::LBracket
            | Sym::GlobalVar(_)
            | Sym::NumVar(_)
            | Sym::Ident { .. }
            | Sym::Minus
            | Sym::Plus
            | Sym::Not
            | Sym::BitNot
            | Sym::Incr
            | Sym::Decr
            | Sym::KwNot
    )
}

fn callable_name(name: &str, query: bool) -> String {
    if query {
        format!("{name}?")
    } else {
        name.to_string()
    }
}

fn primary(it: &mut Interp, lx: &mut Lexer, live: bool) -> EdResult<ExprVal> {
    match lx.sym.clone() {
        Sym::IntLit(n) | Sym::CharLit(n) => {
            lx.advance()?;
            Ok(ExprVal::value(Value::Int(n)))
        }
        Sym::StrLit { raw, interp } => {
            lx.advance()?;
            if !live {
                return Ok(ExprVal::value(Value::Nil));
            }
            let s = eval_string_literal(it, &raw, interp)?;
            Ok(ExprVal::value(Value::Str(s)))
        }
        Sym::NilLit => {
            lx.advance()?;
            Ok(ExprVal::value(Value::Nil))
        }
        Sym::TrueLit => {
            lx.advance()?;
            Ok(ExprVal::value(Value::Bool(true)))
        }
        Sym::FalseLit => {
            lx.advance()?;
            Ok(ExprVal::value(Value::Bool(false)))
        }
        Sym::DefnLit => {
            lx.advance()?;
            Ok(ExprVal::value(Value::Int(DEFN)))
        }
        Sym::LParen => {
            lx.advance()?;
            let inner = ge_assign(it, lx, live)?;
            lx.require(&Sym::RParen, "')'")?;
            Ok(ExprVal::value(inner.value))
        }
        Sym::LBracket => {
            lx.advance()?;
            let mut elems = Vec::new();
            if lx.sym != Sym::RBracket {
                loop {
                    elems.push(ge_assign(it, lx, live)?.value);
                    if !lx.accept(&Sym::Comma)? {
                        break;
                    }
                }
            }
            lx.require(&Sym::RBracket, "']'")?;
            Ok(ExprVal::value(if live {
                Value::array(elems)
            } else {
                Value::Nil
            }))
        }
        Sym::GlobalVar(name) => {
            lx.advance()?;
            let writing = lx.sym.is_assign_op();
            // A dead parse must not fault on an unknown name, and neither
            // may a parallel-assignment target (identifier before a comma).
            let op = if writing || !live || lx.sym == Sym::Comma {
                VarOp::Write
            } else {
                VarOp::Read
            };
            let vref = var::find_dollar_var(it, &name, op)?;
            let value = if live && !writing {
                var::read_var(it, &vref)?
            } else {
                Value::Nil
            };
            Ok(ExprVal {
                value,
                lvalue: Some(vref),
            })
        }
        Sym::NumVar(n) => {
            lx.advance()?;
            if !live {
                return Ok(ExprVal {
                    value: Value::Nil,
                    lvalue: Some(VarRef::MacroArg(n)),
                });
            }
            let vref = var::find_macro_arg(it, n)?;
            let value = var::read_var(it, &vref)?;
            Ok(ExprVal {
                value,
                lvalue: Some(vref),
            })
        }
        Sym::Ident { name, query } => {
            lx.advance()?;
            let full = callable_name(&name, query);
            if lx.sym.is_assign_op() {
                // Assignment target: a local user variable.
                let vref = var::find_local_var(it, &full, VarOp::Write)?;
                return Ok(ExprVal {
                    value: Value::Nil,
                    lvalue: Some(vref),
                });
            }
            if it.lookup_callable(&full).is_some() {
                let result = call_callable(it, lx, live, &full, None)?;
                return Ok(ExprVal::value(result));
            }
            if !live {
                return Ok(ExprVal {
                    value: Value::Nil,
                    lvalue: Some(VarRef::Local(full)),
                });
            }
            // Plain local variable read. An unknown name directly before
            // a comma may be a parallel-assignment target, so resolution
            // is deferred to the write.
            match var::find_local_var(it, &full, VarOp::Read) {
                Ok(vref) => {
                    let value = var::read_var(it, &vref)?;
                    Ok(ExprVal {
                        value,
                        lvalue: Some(vref),
                    })
                }
                Err(_) if lx.sym == Sym::Comma => Ok(ExprVal {
                    value: Value::Nil,
                    lvalue: Some(var::find_local_var(it, &full, VarOp::Write)?),
                }),
                Err(e) => Err(e),
            }
        }
        Sym::None => Err(Status::failure("Expression expected")),
        other => Err(Status::failure(format!("Unexpected token '{other:?}'"))),
    }
}

/// Parse and (when live) invoke a command, function, or macro. Arguments
/// are comma-separated expressions pulled from the stream, bounded by the
/// callee's declared argument counts; parentheses are optional.
pub fn call_callable(
    it: &mut Interp,
    lx: &mut Lexer,
    live: bool,
    name: &str,
    n: Option<i64>,
) -> EdResult<Value> {
    let (min_args, max_args) = match it.lookup_callable(name) {
        Some(Callable::Builtin(spec)) => (spec.min_args, spec.max_args),
        Some(Callable::MacroBuf(mac)) => {
            let info = it
                .ed
                .buffers
                .by_name(&mac)
                .and_then(|b| b.macro_info.as_ref())
                .map(|mi| (mi.min_args, mi.max_args))
                .unwrap_or((0, -1));
            (info.0 as i16, info.1 as i16)
        }
        None => {
            return Err(Status::failure(format!(
                "No such command, function, or macro '{name}'"
            )));
        }
    };

    let parens = lx.accept(&Sym::LParen)?;
    let mut args: Vec<Value> = Vec::new();
    if parens {
        if lx.sym != Sym::RParen {
            loop {
                args.push(ge_assign(it, lx, live)?.value);
                if !lx.accept(&Sym::Comma)? {
                    break;
                }
            }
        }
        lx.require(&Sym::RParen, "')'")?;
    } else if max_args != 0 {
        while starts_expr(&lx.sym) {
            args.push(ge_assign(it, lx, live)?.value);
            if max_args >= 0 && args.len() as i16 >= max_args {
                break;
            }
            if !lx.accept(&Sym::Comma)? {
                break;
            }
        }
    }
    if (args.len() as i16) < min_args {
        return Err(Status::failure(format!(
            "Wrong number of arguments for '{name}' (have {}, need at least {min_args})",
            args.len()
        )));
    }
    if max_args >= 0 && args.len() as i16 > max_args {
        return Err(Status::failure(format!(
            "Wrong number of arguments for '{name}' (have {}, maximum {max_args})",
            args.len()
        )));
    }
    if !live {
        return Ok(Value::Nil);
    }
    match it.lookup_callable(name) {
        Some(Callable::Builtin(spec)) => (spec.handler)(it, n, args),
        Some(Callable::MacroBuf(mac)) => crate::exec::exec_buffer(it, &mac, n, args, None),
        None => Err(Status::failure(format!("No such command '{name}'"))),
    }
}

fn binop_val(
    it: &mut Interp,
    op: &Sym,
    lhs: ExprVal,
    rhs: ExprVal,
    live: bool,
) -> EdResult<ExprVal> {
    if !live {
        return Ok(ExprVal::value(Value::Nil));
    }
    Ok(ExprVal::value(apply_binop(
        it, op, lhs.value, rhs.value, live,
    )?))
}

/// Apply a binary operator to evaluated operands.
fn apply_binop(it: &mut Interp, op: &Sym, lhs: Value, rhs: Value, live: bool) -> EdResult<Value> {
    if !live {
        return Ok(Value::Nil);
    }
    let int_pair = |l: &Value, r: &Value| -> EdResult<(i64, i64)> { Ok((l.as_int()?, r.as_int()?)) };
    Ok(match op {
        Sym::Plus => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            Value::Int(a.wrapping_add(b))
        }
        Sym::Minus => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            Value::Int(a.wrapping_sub(b))
        }
        Sym::Star => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            Value::Int(a.wrapping_mul(b))
        }
        Sym::Slash => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            if b == 0 {
                return Err(Status::failure("Division by zero"));
            }
            Value::Int(a.wrapping_div(b))
        }
        Sym::Percent => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            if b == 0 {
                return Err(Status::failure("Division by zero"));
            }
            Value::Int(a.wrapping_rem(b))
        }
        Sym::LShift | Sym::RShift => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            if !(0..64).contains(&b) {
                return Err(Status::failure(format!("Shift amount {b} out of range")));
            }
            Value::Int(if *op == Sym::LShift {
                a.wrapping_shl(b as u32)
            } else {
                a.wrapping_shr(b as u32)
            })
        }
        Sym::BitOr => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            Value::Int(a | b)
        }
        Sym::BitXor => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            Value::Int(a ^ b)
        }
        Sym::BitAnd => {
            // Bitwise on two integers; concatenation otherwise.
            if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
                Value::Int(a & b)
            } else {
                let mut s = concat_str(&lhs)?;
                s.push_str(&concat_str(&rhs)?);
                Value::Str(s)
            }
        }
        Sym::EqEq => Value::Bool(value_eq(&lhs, &rhs)),
        Sym::Ne => Value::Bool(!value_eq(&lhs, &rhs)),
        Sym::Lt | Sym::Le | Sym::Gt | Sym::Ge => {
            let (a, b) = int_pair(&lhs, &rhs)?;
            Value::Bool(match op {
                Sym::Lt => a < b,
                Sym::Le => a <= b,
                Sym::Gt => a > b,
                _ => a >= b,
            })
        }
        Sym::RegEq | Sym::RegNe => {
            let subject = lhs.as_str()?.to_string();
            let pattern = rhs.as_str()?.to_string();
            let matched = string_match(it, &subject, &pattern)?;
            Value::Bool(if *op == Sym::RegEq { matched } else { !matched })
        }
        other => {
            return Err(Status::failure(format!(
                "Unsupported operator '{other:?}'"
            )));
        }
    })
}

/// `=~` support: compile the pattern into the string match record and
/// scan the subject. Groups remain available through `match N`.
pub fn string_match(it: &mut Interp, subject: &str, pattern: &str) -> EdResult<bool> {
    let global_exact = it.ed.global_exact();
    it.ed.str_match.set_pattern(pattern)?;
    // String matching always uses the RE engine.
    let word = it.ed.word.clone();
    it.ed.str_match.ensure_compiled(global_exact, true, &word)?;
    let exact = it.ed.str_match.exact_mode(global_exact);
    let found = match_in_string(subject, 0, &mut it.ed.str_match, &word, exact)?;
    Ok(found.is_some())
}

/// Process escapes and `#{...}` interpolation in a double-quoted string
/// body (or the minimal escapes of a single-quoted one).
pub fn eval_string_literal(it: &mut Interp, raw: &str, interpolated: bool) -> EdResult<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    if !interpolated {
        // Raw form: only \' and \\ collapse.
        while i < chars.len() {
            if chars[i] == '\\' && i + 1 < chars.len() && matches!(chars[i + 1], '\'' | '\\') {
                out.push(chars[i + 1]);
                i += 2;
            } else {
                out.push(chars[i]);
                i += 1;
            }
        }
        return Ok(out);
    }
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            i += 1;
            let Some(&e) = chars.get(i) else {
                out.push('\\');
                break;
            };
            i += 1;
            match e {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'e' => out.push('\x1b'),
                's' => out.push(' '),
                'f' => out.push('\x0c'),
                'x' => {
                    let v = scan_radix(&chars, &mut i, 16, 2)
                        .ok_or_else(|| Status::failure("Bad hex escape in string"))?;
                    push_byte(&mut out, v)?;
                }
                '0'..='7' => {
                    // Octal, up to 3 digits including this one.
                    i -= 1;
                    let v = scan_radix(&chars, &mut i, 8, 3)
                        .ok_or_else(|| Status::failure("Bad octal escape in string"))?;
                    push_byte(&mut out, v)?;
                }
                other => out.push(other),
            }
        } else if c == '#' && chars.get(i + 1) == Some(&'{') {
            // Nested expression: a fresh parse instance terminated by '}'.
            let rest: String = chars[i + 2..].iter().collect();
            let mut sub = Lexer::new(&rest, Some('}'))?;
            let value = ge_assign(it, &mut sub, true)?.value;
            if sub.have_sym() {
                return Err(Status::failure("Interpolated expression not ended"));
            }
            out.push_str(&concat_str(&value)?);
            i += 2 + sub.consumed();
        } else {
            out.push(c);
            i += 1;
        }
    }
    Ok(out)
}

fn push_byte(out: &mut String, v: u32) -> EdResult<()> {
    if v == 0 {
        return Err(Status::failure("Null byte not permitted in string literal"));
    }
    out.push(char::from_u32(v).ok_or_else(|| Status::failure("Escape value out of range"))?);
    Ok(())
}

fn scan_radix(chars: &[char], i: &mut usize, radix: u32, max_digits: usize) -> Option<u32> {
    // Allow the 0x prefix inside hex escapes (`\0x41` form arrives here
    // via the octal path reading `0`, so handle `x` lookahead too).
    if radix == 8 && chars.get(*i) == Some(&'0') && chars.get(*i + 1) == Some(&'x') {
        *i += 2;
        return scan_radix(chars, i, 16, 2);
    }
    let mut v: u32 = 0;
    let mut seen = 0;
    while seen < max_digits {
        match chars.get(*i).and_then(|c| c.to_digit(radix)) {
            Some(d) => {
                v = v * radix as u32 + d;
                *i += 1;
                seen += 1;
            }
            None => break,
        }
    }
    if seen == 0 { None } else { Some(v) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;
    use core_editor::Editor;

    fn interp() -> Interp {
        Interp::new(Editor::new(&Config::default()))
    }

    fn eval(it: &mut Interp, src: &str) -> EdResult<Value> {
        let mut lx = Lexer::new(src, None)?;
        let v = eval_statement(it, &mut lx, true)?;
        lx.expect_end()?;
        Ok(v)
    }

    #[test]
    fn arithmetic_precedence() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval(&mut it, "(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval(&mut it, "10 % 4 + 2 ** 3").unwrap(), Value::Int(10));
        assert_eq!(eval(&mut it, "-2 ** 2").unwrap(), Value::Int(-4));
        assert!(eval(&mut it, "1 / 0").is_err());
    }

    #[test]
    fn truth_and_short_circuit() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "0 and true").unwrap(), Value::Bool(true));
        assert_eq!(eval(&mut it, "nil || false").unwrap(), Value::Bool(false));
        assert_eq!(eval(&mut it, "not nil").unwrap(), Value::Bool(true));
        // The dead arm must not be evaluated (would divide by zero).
        assert_eq!(
            eval(&mut it, "false && 1 / 0 == 0").unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval(&mut it, "true || 1 / 0 == 0").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn ternary_evaluates_one_branch() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "true ? 1 : 1 / 0").unwrap(), Value::Int(1));
        assert_eq!(eval(&mut it, "false ? 1 / 0 : 2").unwrap(), Value::Int(2));
    }

    #[test]
    fn concat_and_bitand() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "6 & 3").unwrap(), Value::Int(2));
        assert_eq!(
            eval(&mut it, "\"a\" & 1 & nil & true").unwrap(),
            Value::str("a1true")
        );
    }

    #[test]
    fn assignment_and_compound() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "x = 5").unwrap(), Value::Int(5));
        assert_eq!(eval(&mut it, "x += 3").unwrap(), Value::Int(8));
        assert_eq!(eval(&mut it, "x").unwrap(), Value::Int(8));
        assert_eq!(eval(&mut it, "$g = x * 2").unwrap(), Value::Int(16));
        assert_eq!(eval(&mut it, "$g").unwrap(), Value::Int(16));
        assert!(eval(&mut it, "5 = 3").is_err());
        assert!(eval(&mut it, "undefined + 1").is_err());
    }

    #[test]
    fn incr_decr() {
        let mut it = interp();
        eval(&mut it, "n = 10").unwrap();
        assert_eq!(eval(&mut it, "++n").unwrap(), Value::Int(11));
        assert_eq!(eval(&mut it, "n++").unwrap(), Value::Int(11));
        assert_eq!(eval(&mut it, "n").unwrap(), Value::Int(12));
        assert_eq!(eval(&mut it, "--n").unwrap(), Value::Int(11));
    }

    #[test]
    fn arrays_index_and_reference_semantics() {
        let mut it = interp();
        eval(&mut it, "a = [1, 2, 3]").unwrap();
        assert_eq!(eval(&mut it, "a[1]").unwrap(), Value::Int(2));
        assert_eq!(eval(&mut it, "a[5]").unwrap(), Value::Nil);
        eval(&mut it, "a[1] = 20").unwrap();
        assert_eq!(eval(&mut it, "a[1]").unwrap(), Value::Int(20));
        // Writing one past the end extends; further is an error.
        eval(&mut it, "a[3] = 4").unwrap();
        assert_eq!(eval(&mut it, "length a").unwrap(), Value::Int(4));
        assert!(eval(&mut it, "a[9] = 1").is_err());
        // Assignment aliases the array storage.
        eval(&mut it, "b = a").unwrap();
        eval(&mut it, "b[0] = 100").unwrap();
        assert_eq!(eval(&mut it, "a[0]").unwrap(), Value::Int(100));
    }

    #[test]
    fn parallel_assignment() {
        let mut it = interp();
        let v = eval(&mut it, "x, y, z = [1, 2, 3]").unwrap();
        assert!(matches!(v, Value::Array(_)));
        assert_eq!(eval(&mut it, "y").unwrap(), Value::Int(2));
        assert_eq!(eval(&mut it, "z").unwrap(), Value::Int(3));
        assert!(eval(&mut it, "x, y = [1, 2, 3]").is_err(), "length mismatch");
        assert!(eval(&mut it, "x, 5 = [1, 2]").is_err());
    }

    #[test]
    fn string_escapes_and_interpolation() {
        let mut it = interp();
        assert_eq!(
            eval(&mut it, r#""Sum is #{1 + 2 * 3}""#).unwrap(),
            Value::str("Sum is 7")
        );
        assert_eq!(
            eval(&mut it, r#""tab\there\x41\101""#).unwrap(),
            Value::str("tab\thereAA")
        );
        eval(&mut it, "who = \"world\"").unwrap();
        assert_eq!(
            eval(&mut it, r#""hello #{who}!""#).unwrap(),
            Value::str("hello world!")
        );
        // Nested interpolation with a string containing a brace.
        assert_eq!(
            eval(&mut it, r#""v=#{"}" & 1}""#).unwrap(),
            Value::str("v=}1")
        );
        assert_eq!(
            eval(&mut it, r"'raw\n#{x}'").unwrap(),
            Value::str("raw\\n#{x}")
        );
        assert!(eval(&mut it, r#""bad\x00""#).is_err());
    }

    #[test]
    fn char_literals_are_ints() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "?A").unwrap(), Value::Int(65));
        assert_eq!(eval(&mut it, r"?\n").unwrap(), Value::Int(10));
    }

    #[test]
    fn comparisons() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "1 < 2").unwrap(), Value::Bool(true));
        assert_eq!(eval(&mut it, "2 <= 1").unwrap(), Value::Bool(false));
        assert_eq!(eval(&mut it, "\"ab\" == \"ab\"").unwrap(), Value::Bool(true));
        assert_eq!(eval(&mut it, "nil == false").unwrap(), Value::Bool(false));
        assert_eq!(
            eval(&mut it, "[1, [2]] == [1, [2]]").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn regexp_match_operator() {
        let mut it = interp();
        assert_eq!(
            eval(&mut it, r#""foo-bar" =~ "(\\w+)-""#).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&mut it, r#""nope" !~ "\\d+""#).unwrap(),
            Value::Bool(true)
        );
        // Groups of the last string match are accessible.
        assert_eq!(
            eval(&mut it, r#""foo-bar" =~ "(\\w+)-" ? match 1 : nil"#).unwrap(),
            Value::str("foo")
        );
    }

    #[test]
    fn defn_sentinel() {
        let mut it = interp();
        assert_eq!(eval(&mut it, "defn").unwrap(), Value::Int(DEFN));
    }
}
