//! Built-in functions.
//!
//! Each [`Intrinsic`] record drives both registrations: the binder defines a
//! symbol with [`Intrinsic::signature`], the VM defines the value in its
//! global scope.

use crate::lang::value::Value;
use crate::runtime::runtime_error::RuntimeErrorKind;
use crate::types::{Param, Type};
use std::fmt;
use std::io::Write;

/// What a native function can reach besides its arguments.
pub struct NativeContext<'a> {
    pub out: &'a mut dyn Write,
}

pub type NativeFn = fn(&mut NativeContext<'_>, Vec<Value>) -> Result<Value, RuntimeErrorKind>;

pub struct Intrinsic {
    pub name: &'static str,
    /// Ordered parameter names and types.
    pub params: &'static [(&'static str, fn() -> Type)],
    pub returns: fn() -> Type,
    /// Visible as a global name.
    pub global: bool,
    pub native: NativeFn,
}

impl Intrinsic {
    pub fn signature(&self) -> Type {
        let params = self
            .params
            .iter()
            .map(|(name, ty)| Param {
                name: name.to_string(),
                ty: ty(),
                has_default: false,
            })
            .collect();
        Type::function(params, (self.returns)())
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|(n, _)| *n == name)
    }
}

impl fmt::Debug for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intrinsic")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish()
    }
}

fn any() -> Type {
    Type::Any
}
fn none() -> Type {
    Type::NONE
}
fn int() -> Type {
    Type::INT
}
fn float() -> Type {
    Type::FLOAT
}
fn string() -> Type {
    Type::STRING
}
fn bool_() -> Type {
    Type::BOOL
}
fn number() -> Type {
    Type::union([Type::INT, Type::FLOAT])
}

static INTRINSICS: [Intrinsic; 5] = [
    Intrinsic {
        name: "print",
        params: &[("value", any)],
        returns: none,
        global: true,
        native: native_print,
    },
    Intrinsic {
        name: "len",
        params: &[("value", string)],
        returns: int,
        global: true,
        native: native_len,
    },
    Intrinsic {
        name: "str",
        params: &[("value", any)],
        returns: string,
        global: true,
        native: native_str,
    },
    Intrinsic {
        name: "sqrt",
        params: &[("value", number)],
        returns: float,
        global: true,
        native: native_sqrt,
    },
    Intrinsic {
        name: "assert",
        params: &[("condition", bool_), ("message", string)],
        returns: none,
        global: true,
        native: native_assert,
    },
];

pub fn all() -> &'static [Intrinsic] {
    &INTRINSICS
}

pub fn find(name: &str) -> Option<&'static Intrinsic> {
    INTRINSICS.iter().find(|i| i.name == name)
}

fn expected(name: &str, what: &str, got: &Value) -> RuntimeErrorKind {
    RuntimeErrorKind::TypeMismatch(format!(
        "{}() expects {}, got {}",
        name,
        what,
        got.type_name()
    ))
}

fn native_print(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> Result<Value, RuntimeErrorKind> {
    for arg in &args {
        writeln!(ctx.out, "{}", arg).map_err(|e| RuntimeErrorKind::Output(e.to_string()))?;
    }
    Ok(Value::None)
}

fn native_len(_: &mut NativeContext<'_>, args: Vec<Value>) -> Result<Value, RuntimeErrorKind> {
    match args.first() {
        Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        Some(Value::Object(props)) => Ok(Value::Int(props.len() as i64)),
        Some(other) => Err(expected("len", "a string", other)),
        None => Err(RuntimeErrorKind::MissingArgument("value".into())),
    }
}

fn native_str(_: &mut NativeContext<'_>, args: Vec<Value>) -> Result<Value, RuntimeErrorKind> {
    match args.first() {
        Some(value) => Ok(Value::string(value.to_string())),
        None => Err(RuntimeErrorKind::MissingArgument("value".into())),
    }
}

fn native_sqrt(_: &mut NativeContext<'_>, args: Vec<Value>) -> Result<Value, RuntimeErrorKind> {
    match args.first() {
        Some(value) => match value.as_f64() {
            Some(n) => Ok(Value::Float(n.sqrt())),
            None => Err(expected("sqrt", "a number", value)),
        },
        None => Err(RuntimeErrorKind::MissingArgument("value".into())),
    }
}

fn native_assert(_: &mut NativeContext<'_>, args: Vec<Value>) -> Result<Value, RuntimeErrorKind> {
    match (args.first(), args.get(1)) {
        (Some(Value::Bool(true)), _) => Ok(Value::None),
        (Some(Value::Bool(false)), message) => Err(RuntimeErrorKind::AssertFailed(
            message.map(|m| m.to_string()).unwrap_or_default(),
        )),
        (Some(other), _) => Err(expected("assert", "a bool", other)),
        (None, _) => Err(RuntimeErrorKind::MissingArgument("condition".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> (Result<Value, RuntimeErrorKind>, String) {
        let intrinsic = find(name).expect("intrinsic exists");
        let mut out = Vec::new();
        let result = (intrinsic.native)(&mut NativeContext { out: &mut out }, args);
        (result, String::from_utf8(out).expect("utf-8 output"))
    }

    #[test]
    fn test_print_writes_display_form() {
        let (result, out) = call("print", vec![Value::Float(7.0)]);
        assert_eq!(result, Ok(Value::None));
        assert_eq!(out, "7.0\n");
    }

    #[test]
    fn test_len_str_sqrt() {
        assert_eq!(call("len", vec![Value::string("héllo")]).0, Ok(Value::Int(5)));
        assert!(call("len", vec![Value::Int(3)]).0.is_err());
        assert_eq!(call("str", vec![Value::Int(42)]).0, Ok(Value::string("42")));
        assert_eq!(call("sqrt", vec![Value::Int(9)]).0, Ok(Value::Float(3.0)));
    }

    #[test]
    fn test_assert() {
        assert_eq!(call("assert", vec![Value::Bool(true), Value::string("ok")]).0, Ok(Value::None));
        assert_eq!(
            call("assert", vec![Value::Bool(false), Value::string("boom")]).0,
            Err(RuntimeErrorKind::AssertFailed("boom".into()))
        );
    }

    #[test]
    fn test_signatures() {
        let sig = find("assert").expect("assert exists").signature();
        assert_eq!(sig.to_string(), "fn(condition: bool, message: string) -> none");
        assert!(all().iter().all(|i| i.global));
    }
}
