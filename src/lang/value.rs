use crate::bytecode::ir::Bytecode;
use crate::runtime::intrinsics::Intrinsic;
use crate::runtime::scope::Scope;
use indexmap::IndexMap;
use std::rc::Rc;

/// Key of a runtime object property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    Int(i64),
    Str(Rc<str>),
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKey::Int(n) => write!(f, "{}", n),
            ObjectKey::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A user function value: parameter list, body and the scope it closed over.
#[derive(Debug)]
pub struct Closure {
    /// Parameter names with their optional default-value programs.
    pub params: Vec<(String, Option<Rc<Bytecode>>)>,
    pub body: Rc<Bytecode>,
    pub scope: Scope,
}

/// Runtime value in the Quill language.
///
/// Values are the only data that can exist on the VM operand stack. Strings,
/// objects and functions are reference counted so copies are cheap.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating-point number.
    Float(f64),
    Str(Rc<str>),
    Char(char),
    /// Object literal value: `{ x: 1, "y": 2 }`. Insertion order is kept.
    Object(Rc<IndexMap<ObjectKey, Value>>),
    Function(Rc<Closure>),
    Intrinsic(&'static Intrinsic),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Char(_) => "char",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Intrinsic(_) => "intrinsic",
        }
    }

    /// Falsy values are `0`, `0.0` and `false`; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts a value into an object key. Integral floats become `Int`
    /// keys so `o[1]` and `o[1.0]` address the same property.
    pub fn to_key(&self) -> Option<ObjectKey> {
        match self {
            Value::Int(n) => Some(ObjectKey::Int(*n)),
            Value::Float(n) if n.fract() == 0.0 && n.is_finite() => {
                Some(ObjectKey::Int(*n as i64))
            }
            Value::Str(s) => Some(ObjectKey::Str(s.clone())),
            Value::Char(c) => Some(ObjectKey::Str(Rc::from(c.to_string()))),
            _ => None,
        }
    }

    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }
}

/// Generic value equality: numbers compare across `int` and `float`,
/// functions and objects compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Intrinsic(a), Value::Intrinsic(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Char(c) => write!(f, "{}", c),
            Value::Object(props) => {
                write!(f, "{{ ")?;
                for (i, (key, value)) in props.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, " }}")
            }
            Value::Function(closure) => write!(f, "<fn/{}>", closure.params.len()),
            Value::Intrinsic(intrinsic) => write!(f, "<intrinsic {}>", intrinsic.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_crosses_kinds() {
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_ne!(Value::Int(3), Value::Float(3.5));
        assert_ne!(Value::Int(1), Value::Bool(true));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(Value::None.is_truthy());
    }

    #[test]
    fn test_integral_float_keys_normalize() {
        assert_eq!(Value::Float(2.0).to_key(), Some(ObjectKey::Int(2)));
        assert_eq!(Value::Float(2.5).to_key(), None);
        assert_eq!(
            Value::Char('k').to_key(),
            Some(ObjectKey::Str(Rc::from("k")))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(7.0).to_string(), "7.0");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        let mut props = IndexMap::new();
        props.insert(ObjectKey::Str(Rc::from("x")), Value::Int(1));
        props.insert(ObjectKey::Int(0), Value::string("a"));
        assert_eq!(Value::Object(Rc::new(props)).to_string(), "{ x: 1, 0: a }");
    }
}
