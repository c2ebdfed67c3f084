//! Values crossing the script boundary
//!
//! A script hands the engine a function name plus a list of [`ScriptValue`]s.
//! [`marshal_args`] flattens and checks them into the engine's [`Arg`]s:
//!
//! - a list in the final position is spliced into the arguments (one level)
//! - a list anywhere else must hold only floats and becomes an `Arg::Array`
//! - null lists, empty lists, nested lists and void values are rejected

use crate::error::{EngineError, Result};
use crate::pfield::{BinaryOp, Handle, PField};
use std::fmt;

/// A value as the script layer sees it
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Float(f64),
    Str(String),
    Handle(Handle),
    /// `None` is a null list
    List(Option<Vec<ScriptValue>>),
    Void,
}

/// A marshaled argument
#[derive(Debug, Clone)]
pub enum Arg {
    Float(f64),
    Str(String),
    Handle(Handle),
    Array(Vec<f64>),
}

impl Arg {
    pub fn type_name(&self) -> &'static str {
        match self {
            Arg::Float(_) => "float",
            Arg::Str(_) => "string",
            Arg::Handle(_) => "handle",
            Arg::Array(_) => "array",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Arg::Handle(h) => Some(h),
            _ => None,
        }
    }
}

/// What a dispatched function hands back
#[derive(Debug, Clone)]
pub enum ReturnValue {
    Float(f64),
    Str(String),
    Handle(Handle),
}

impl ReturnValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReturnValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            ReturnValue::Handle(h) => Some(h),
            _ => None,
        }
    }

    /// Back into a script value, for chaining calls
    pub fn into_script(self) -> ScriptValue {
        match self {
            ReturnValue::Float(v) => ScriptValue::Float(v),
            ReturnValue::Str(s) => ScriptValue::Str(s),
            ReturnValue::Handle(h) => ScriptValue::Handle(h),
        }
    }
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Float(v) => write!(f, "{}", v),
            ReturnValue::Str(s) => write!(f, "\"{}\"", s),
            ReturnValue::Handle(h) => write!(f, "<handle, {} frames>", h.len()),
        }
    }
}

/// Convert script values into engine arguments for `func`
pub fn marshal_args(func: &str, values: &[ScriptValue]) -> Result<Vec<Arg>> {
    let mut args = Vec::with_capacity(values.len());
    let last = values.len().saturating_sub(1);

    for (i, value) in values.iter().enumerate() {
        match value {
            ScriptValue::Float(v) => args.push(Arg::Float(*v)),
            ScriptValue::Str(s) => args.push(Arg::Str(s.clone())),
            ScriptValue::Handle(h) => args.push(Arg::Handle(h.clone())),
            ScriptValue::Void => {
                return Err(EngineError::InvalidArgument {
                    func: func.to_owned(),
                    arg: i,
                })
            }
            ScriptValue::List(None) => {
                return Err(EngineError::NullList {
                    func: func.to_owned(),
                    arg: i,
                })
            }
            ScriptValue::List(Some(items)) if items.is_empty() => {
                return Err(EngineError::EmptyList {
                    func: func.to_owned(),
                    arg: i,
                })
            }
            ScriptValue::List(Some(items)) if i == last => splice(func, items, &mut args)?,
            ScriptValue::List(Some(items)) => {
                let floats: Option<Vec<f64>> = items
                    .iter()
                    .map(|item| match item {
                        ScriptValue::Float(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                match floats {
                    Some(array) => args.push(Arg::Array(array)),
                    None => {
                        return Err(EngineError::MixedList {
                            func: func.to_owned(),
                            arg: i,
                        })
                    }
                }
            }
        }
    }
    Ok(args)
}

/// Append a trailing list's items as individual arguments
fn splice(func: &str, items: &[ScriptValue], args: &mut Vec<Arg>) -> Result<()> {
    for item in items {
        let n = args.len();
        match item {
            ScriptValue::Float(v) => args.push(Arg::Float(*v)),
            ScriptValue::Str(s) => args.push(Arg::Str(s.clone())),
            ScriptValue::Handle(h) => args.push(Arg::Handle(h.clone())),
            ScriptValue::Void => {
                return Err(EngineError::InvalidArgument {
                    func: func.to_owned(),
                    arg: n,
                })
            }
            ScriptValue::List(None) => {
                return Err(EngineError::NullList {
                    func: func.to_owned(),
                    arg: n,
                })
            }
            ScriptValue::List(Some(inner)) if inner.is_empty() => {
                return Err(EngineError::EmptyList {
                    func: func.to_owned(),
                    arg: n,
                })
            }
            ScriptValue::List(Some(_)) => {
                return Err(EngineError::NestedList {
                    func: func.to_owned(),
                })
            }
        }
    }
    Ok(())
}

/// Apply `op` to two script operands.
///
/// Two floats give a float; if either side is a handle the float side is
/// wrapped in a constant field and the result is a new handle.
pub fn compose(left: &ScriptValue, right: &ScriptValue, op: BinaryOp) -> Result<ScriptValue> {
    let operand = |value: &ScriptValue, arg: usize| -> Result<Handle> {
        match value {
            ScriptValue::Float(v) => Ok(PField::constant(*v)),
            ScriptValue::Handle(h) => Ok(h.clone()),
            _ => Err(EngineError::ArgumentType {
                func: format!("operator {}", op),
                arg,
                expected: "float or handle",
            }),
        }
    };
    if let (ScriptValue::Float(a), ScriptValue::Float(b)) = (left, right) {
        return Ok(ScriptValue::Float(op.apply(*a, *b)));
    }
    let left = operand(left, 0)?;
    let right = operand(right, 1)?;
    Ok(ScriptValue::Handle(PField::binary(&left, &right, op)))
}

/// Fetch argument `i` as a float
pub fn float_arg(func: &str, args: &[Arg], i: usize) -> Result<f64> {
    match args.get(i) {
        Some(Arg::Float(v)) => Ok(*v),
        _ => Err(EngineError::ArgumentType {
            func: func.to_owned(),
            arg: i,
            expected: "float",
        }),
    }
}

/// Fetch argument `i` as a string
pub fn str_arg<'a>(func: &str, args: &'a [Arg], i: usize) -> Result<&'a str> {
    match args.get(i) {
        Some(Arg::Str(s)) => Ok(s),
        _ => Err(EngineError::ArgumentType {
            func: func.to_owned(),
            arg: i,
            expected: "string",
        }),
    }
}

/// Every argument from `start` on, which must all be floats
pub fn float_args(func: &str, args: &[Arg], start: usize) -> Result<Vec<f64>> {
    (start..args.len()).map(|i| float_arg(func, args, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(values: &[f64]) -> ScriptValue {
        ScriptValue::List(Some(values.iter().map(|&v| ScriptValue::Float(v)).collect()))
    }

    #[test]
    fn test_scalars_pass_through() {
        let args = marshal_args(
            "f",
            &[ScriptValue::Float(1.0), ScriptValue::Str("hi".into())],
        )
        .unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].as_f64(), Some(1.0));
        assert_eq!(args[1].as_str(), Some("hi"));
    }

    #[test]
    fn test_final_list_is_spliced() {
        let args = marshal_args("f", &[ScriptValue::Float(1.0), floats(&[2.0, 3.0])]).unwrap();
        let values: Vec<f64> = args.iter().filter_map(Arg::as_f64).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_inner_list_becomes_array() {
        let args = marshal_args("f", &[floats(&[2.0, 3.0]), ScriptValue::Float(1.0)]).unwrap();
        assert!(matches!(&args[0], Arg::Array(a) if a == &vec![2.0, 3.0]));
        assert_eq!(args[1].as_f64(), Some(1.0));
    }

    #[test]
    fn test_each_list_error_is_distinct() {
        let null = marshal_args("f", &[ScriptValue::List(None)]).unwrap_err();
        assert!(matches!(null, EngineError::NullList { arg: 0, .. }));

        let empty = marshal_args("f", &[ScriptValue::List(Some(vec![]))]).unwrap_err();
        assert!(matches!(empty, EngineError::EmptyList { arg: 0, .. }));

        let nested = marshal_args("f", &[ScriptValue::List(Some(vec![floats(&[1.0])]))]).unwrap_err();
        assert!(matches!(nested, EngineError::NestedList { .. }));

        let mixed = marshal_args(
            "f",
            &[
                ScriptValue::List(Some(vec![ScriptValue::Float(1.0), ScriptValue::Str("x".into())])),
                ScriptValue::Float(0.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(mixed, EngineError::MixedList { arg: 0, .. }));

        let void = marshal_args("f", &[ScriptValue::Float(0.0), ScriptValue::Void]).unwrap_err();
        assert!(matches!(void, EngineError::InvalidArgument { arg: 1, .. }));

        let messages = [null, empty, nested, mixed, void].map(|e| e.to_string());
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_spliced_list_may_hold_mixed_types() {
        let handle = PField::constant(2.0);
        let args = marshal_args(
            "f",
            &[ScriptValue::List(Some(vec![
                ScriptValue::Str("x".into()),
                ScriptValue::Handle(handle),
            ]))],
        )
        .unwrap();
        assert_eq!(args[0].type_name(), "string");
        assert_eq!(args[1].type_name(), "handle");
    }

    #[test]
    fn test_compose_operand_combinations() {
        let h = ScriptValue::Handle(PField::constant(3.0));
        let f = ScriptValue::Float(4.0);

        let hf = compose(&h, &f, BinaryOp::Plus).unwrap();
        let fh = compose(&f, &h, BinaryOp::Minus).unwrap();
        let hh = compose(&h, &h, BinaryOp::Mul).unwrap();
        let ff = compose(&f, &f, BinaryOp::Div).unwrap();

        let value = |v: &ScriptValue| match v {
            ScriptValue::Handle(h) => h.value_at(0),
            ScriptValue::Float(x) => *x,
            _ => f64::NAN,
        };
        assert_eq!(value(&hf), 7.0);
        assert_eq!(value(&fh), 1.0);
        assert_eq!(value(&hh), 9.0);
        assert_eq!(value(&ff), 1.0);

        assert!(compose(&ScriptValue::Str("x".into()), &f, BinaryOp::Plus).is_err());
    }
}
