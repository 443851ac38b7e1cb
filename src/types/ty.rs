use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int,
    Float,
    String,
    Char,
    Bool,
    None,
}

impl PrimitiveKind {
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Int => "int",
            PrimitiveKind::Float => "float",
            PrimitiveKind::String => "string",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::None => "none",
        }
    }

    pub fn from_name(name: &str) -> Option<PrimitiveKind> {
        Some(match name {
            "int" => PrimitiveKind::Int,
            "float" => PrimitiveKind::Float,
            "string" => PrimitiveKind::String,
            "char" => PrimitiveKind::Char,
            "bool" => PrimitiveKind::Bool,
            "none" => PrimitiveKind::None,
            _ => return None,
        })
    }
}

/// The single value a literal type admits.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    String(String),
    Char(char),
    Bool(bool),
}

impl LiteralValue {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            LiteralValue::Int(_) => PrimitiveKind::Int,
            LiteralValue::Float(_) => PrimitiveKind::Float,
            LiteralValue::String(_) => PrimitiveKind::String,
            LiteralValue::Char(_) => PrimitiveKind::Char,
            LiteralValue::Bool(_) => PrimitiveKind::Bool,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int(n) => write!(f, "{}", n),
            LiteralValue::Float(n) => write!(f, "{:?}", n),
            LiteralValue::String(s) => write!(f, "{:?}", s),
            LiteralValue::Char(c) => write!(f, "{:?}", c),
            LiteralValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Literal key of an interface member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Str(String),
    Int(i64),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Str(s) => write!(f, "{}", s),
            PropertyKey::Int(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub params: Vec<Param>,
    pub ret: Box<Type>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceType {
    pub name: Option<String>,
    pub members: IndexMap<PropertyKey, Member>,
    /// Index signatures keyed by the primitive key type (`string` or `int`).
    pub index_signatures: IndexMap<PrimitiveKind, Type>,
}

impl InterfaceType {
    /// Looks up a literal member, falling back to the index signature that
    /// matches the key's kind.
    pub fn lookup(&self, key: &PropertyKey) -> Option<&Type> {
        if let Some(member) = self.members.get(key) {
            return Some(&member.ty);
        }
        let kind = match key {
            PropertyKey::Str(_) => PrimitiveKind::String,
            PropertyKey::Int(_) => PrimitiveKind::Int,
        };
        self.index_signatures.get(&kind)
    }
}

/// A Quill type. Types are immutable values compared structurally.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Any,
    Primitive(PrimitiveKind),
    Literal(LiteralValue),
    Named { name: String, args: Vec<Type> },
    Array(Box<Type>),
    Function(FunctionType),
    Interface(InterfaceType),
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Parenthesized(Box<Type>),
}

impl Type {
    pub const INT: Type = Type::Primitive(PrimitiveKind::Int);
    pub const FLOAT: Type = Type::Primitive(PrimitiveKind::Float);
    pub const STRING: Type = Type::Primitive(PrimitiveKind::String);
    pub const CHAR: Type = Type::Primitive(PrimitiveKind::Char);
    pub const BOOL: Type = Type::Primitive(PrimitiveKind::Bool);
    pub const NONE: Type = Type::Primitive(PrimitiveKind::None);

    /// Builds a union, absorbing nested unions and dropping structural
    /// duplicates. A single member collapses to itself and an empty union
    /// is `none`.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat: Vec<Type> = Vec::new();
        for member in members {
            match member {
                Type::Union(inner) => {
                    for ty in inner {
                        if !flat.contains(&ty) {
                            flat.push(ty);
                        }
                    }
                }
                ty => {
                    if !flat.contains(&ty) {
                        flat.push(ty);
                    }
                }
            }
        }
        match flat.len() {
            0 => Type::NONE,
            1 => flat.pop().unwrap_or(Type::NONE),
            _ => Type::Union(flat),
        }
    }

    pub fn function(params: Vec<Param>, ret: Type) -> Type {
        Type::Function(FunctionType {
            params,
            ret: Box::new(ret),
        })
    }

    /// Strips any number of `Parenthesized` wrappers.
    pub fn unwrap_parens(&self) -> &Type {
        let mut ty = self;
        while let Type::Parenthesized(inner) = ty {
            ty = inner;
        }
        ty
    }

    /// Literal types widen to their primitive; everything else is unchanged.
    pub fn widen(&self) -> Type {
        match self.unwrap_parens() {
            Type::Literal(value) => Type::Primitive(value.kind()),
            other => other.clone(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self.unwrap_parens(), Type::Any)
    }

    /// `IsAssignableTo`: can a value of type `self` be used where `target`
    /// is expected. Reflexive, not symmetric.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        let a = self.unwrap_parens();
        let b = target.unwrap_parens();

        if matches!(a, Type::Any) || matches!(b, Type::Any) {
            return true;
        }
        if let Type::Union(members) = a {
            return members.iter().any(|m| m.is_assignable_to(b));
        }
        if let Type::Union(members) = b {
            return members.iter().any(|m| a.is_assignable_to(m));
        }
        if let Type::Intersection(members) = b {
            return members.iter().all(|m| a.is_assignable_to(m));
        }
        if let Type::Intersection(members) = a {
            return members.iter().any(|m| m.is_assignable_to(b));
        }

        match (a, b) {
            (Type::Literal(x), Type::Literal(y)) => x == y,
            (Type::Literal(x), Type::Primitive(kind)) => x.kind() == *kind,
            (Type::Primitive(x), Type::Primitive(y)) => x == y,
            (Type::Array(x), Type::Array(y)) => x.is_assignable_to(y) && y.is_assignable_to(x),
            (Type::Function(x), Type::Function(y)) => {
                x.params.len() == y.params.len()
                    && x
                        .params
                        .iter()
                        .zip(&y.params)
                        .all(|(px, py)| py.ty.is_assignable_to(&px.ty))
                    && x.ret.is_assignable_to(&y.ret)
            }
            (Type::Interface(x), Type::Interface(y)) => {
                let members_ok = y.members.iter().all(|(key, required)| {
                    x.members
                        .get(key)
                        .is_some_and(|m| m.ty.is_assignable_to(&required.ty))
                });
                let indexes_ok = y.index_signatures.iter().all(|(kind, required)| {
                    x.index_signatures
                        .get(kind)
                        .is_some_and(|ty| ty.is_assignable_to(required))
                });
                members_ok && indexes_ok
            }
            (
                Type::Named { name: xn, args: xa },
                Type::Named { name: yn, args: ya },
            ) => {
                xn == yn
                    && xa.len() == ya.len()
                    && xa
                        .iter()
                        .zip(ya)
                        .all(|(x, y)| x.is_assignable_to(y) && y.is_assignable_to(x))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Primitive(kind) => write!(f, "{}", kind.name()),
            Type::Literal(value) => write!(f, "{}", value),
            Type::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<{}>", join(args, ", "))?;
                }
                Ok(())
            }
            Type::Array(element) => match &**element {
                Type::Union(_) | Type::Intersection(_) | Type::Function(_) => {
                    write!(f, "({})[]", element)
                }
                _ => write!(f, "{}[]", element),
            },
            Type::Function(func) => {
                write!(f, "fn(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let optional = if param.has_default { "?" } else { "" };
                    write!(f, "{}{}: {}", param.name, optional, param.ty)?;
                }
                write!(f, ") -> {}", func.ret)
            }
            Type::Interface(iface) => {
                if let Some(name) = &iface.name {
                    return write!(f, "{}", name);
                }
                let mut parts: Vec<String> = iface
                    .members
                    .iter()
                    .map(|(key, m)| {
                        let prefix = if m.mutable { "mut " } else { "" };
                        format!("{}{}: {}", prefix, key, m.ty)
                    })
                    .collect();
                parts.extend(
                    iface
                        .index_signatures
                        .iter()
                        .map(|(kind, ty)| format!("[{}]: {}", kind.name(), ty)),
                );
                if parts.is_empty() {
                    write!(f, "{{}}")
                } else {
                    write!(f, "{{ {} }}", parts.join("; "))
                }
            }
            Type::Union(members) => write!(f, "{}", join(members, " | ")),
            Type::Intersection(members) => write!(f, "{}", join(members, " & ")),
            Type::Parenthesized(inner) => write!(f, "({})", inner),
        }
    }
}

fn join(types: &[Type], sep: &str) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_int(n: i64) -> Type {
        Type::Literal(LiteralValue::Int(n))
    }

    fn param(name: &str, ty: Type) -> Param {
        Param {
            name: name.to_string(),
            ty,
            has_default: false,
        }
    }

    fn iface(members: &[(&str, Type)]) -> Type {
        let mut iface = InterfaceType::default();
        for (key, ty) in members {
            iface.members.insert(
                PropertyKey::Str(key.to_string()),
                Member {
                    ty: ty.clone(),
                    mutable: false,
                },
            );
        }
        Type::Interface(iface)
    }

    fn samples() -> Vec<Type> {
        vec![
            Type::Any,
            Type::INT,
            Type::STRING,
            Type::NONE,
            lit_int(3),
            Type::Literal(LiteralValue::String("on".into())),
            Type::Named {
                name: "Point".into(),
                args: vec![Type::INT],
            },
            Type::Array(Box::new(Type::FLOAT)),
            Type::function(vec![param("a", Type::INT)], Type::BOOL),
            iface(&[("x", Type::INT), ("y", Type::STRING)]),
            Type::union([Type::INT, Type::STRING]),
            Type::Intersection(vec![iface(&[("x", Type::INT)]), iface(&[("y", Type::INT)])]),
            Type::Parenthesized(Box::new(Type::CHAR)),
        ]
    }

    #[test]
    fn test_assignability_is_reflexive() {
        for ty in samples() {
            assert!(ty.is_assignable_to(&ty), "{} should be assignable to itself", ty);
        }
    }

    #[test]
    fn test_literal_widens_but_does_not_narrow() {
        let literals = [
            LiteralValue::Int(1),
            LiteralValue::Float(1.5),
            LiteralValue::String("s".into()),
            LiteralValue::Char('c'),
            LiteralValue::Bool(true),
        ];
        for value in literals {
            let prim = Type::Primitive(value.kind());
            let lit = Type::Literal(value);
            assert!(lit.is_assignable_to(&prim));
            assert!(!prim.is_assignable_to(&lit));
        }
        assert!(!lit_int(1).is_assignable_to(&lit_int(2)));
        assert!(!lit_int(1).is_assignable_to(&Type::FLOAT));
    }

    #[test]
    fn test_interface_width_subtyping() {
        let point = iface(&[("x", Type::INT), ("y", Type::INT)]);
        let point3 = iface(&[("x", Type::INT), ("y", Type::INT), ("z", Type::INT)]);
        let other = iface(&[("a", Type::INT)]);
        let wrong = iface(&[("x", Type::STRING), ("y", Type::INT)]);

        assert!(point3.is_assignable_to(&point));
        assert!(!point.is_assignable_to(&point3));
        assert!(!other.is_assignable_to(&point));
        assert!(!point.is_assignable_to(&other));
        assert!(!wrong.is_assignable_to(&point));
        assert!(point.is_assignable_to(&iface(&[])));
    }

    #[test]
    fn test_index_signatures() {
        let mut dict = InterfaceType::default();
        dict.index_signatures.insert(PrimitiveKind::String, Type::INT);
        let dict = Type::Interface(dict);

        let mut wants_float = InterfaceType::default();
        wants_float
            .index_signatures
            .insert(PrimitiveKind::String, Type::FLOAT);

        assert!(dict.is_assignable_to(&dict));
        assert!(!dict.is_assignable_to(&Type::Interface(wants_float)));
        assert!(!iface(&[("k", Type::INT)]).is_assignable_to(&dict));
    }

    #[test]
    fn test_unions_and_intersections() {
        let num = Type::union([Type::INT, Type::FLOAT]);
        assert!(Type::INT.is_assignable_to(&num));
        assert!(lit_int(4).is_assignable_to(&num));
        assert!(!Type::STRING.is_assignable_to(&num));

        let both = Type::Intersection(vec![iface(&[("x", Type::INT)]), iface(&[("y", Type::INT)])]);
        let xy = iface(&[("x", Type::INT), ("y", Type::INT)]);
        assert!(xy.is_assignable_to(&both));
        assert!(!iface(&[("x", Type::INT)]).is_assignable_to(&both));
        assert!(both.is_assignable_to(&iface(&[("y", Type::INT)])));
    }

    #[test]
    fn test_arrays_are_invariant() {
        let ints = Type::Array(Box::new(Type::INT));
        let lits = Type::Array(Box::new(lit_int(1)));
        assert!(ints.is_assignable_to(&Type::Array(Box::new(Type::INT))));
        assert!(!lits.is_assignable_to(&ints));
    }

    #[test]
    fn test_function_variance() {
        let takes_num = Type::function(
            vec![param("a", Type::union([Type::INT, Type::FLOAT]))],
            lit_int(1),
        );
        let takes_int = Type::function(vec![param("a", Type::INT)], Type::INT);

        assert!(takes_num.is_assignable_to(&takes_int));
        assert!(!takes_int.is_assignable_to(&takes_num));
        assert!(!takes_int.is_assignable_to(&Type::function(vec![], Type::INT)));
    }

    #[test]
    fn test_parenthesized_is_transparent() {
        let wrapped = Type::Parenthesized(Box::new(Type::Parenthesized(Box::new(Type::INT))));
        assert!(wrapped.is_assignable_to(&Type::INT));
        assert!(lit_int(2).is_assignable_to(&wrapped));
    }

    #[test]
    fn test_union_flattening() {
        let ty = Type::union([
            Type::INT,
            Type::union([Type::STRING, Type::INT]),
            Type::STRING,
        ]);
        assert_eq!(ty, Type::Union(vec![Type::INT, Type::STRING]));
        assert_eq!(Type::union([Type::BOOL]), Type::BOOL);
        assert_eq!(Type::union(Vec::new()), Type::NONE);
    }

    #[test]
    fn test_display() {
        let f = Type::function(
            vec![
                param("a", Type::INT),
                Param {
                    name: "b".into(),
                    ty: Type::STRING,
                    has_default: true,
                },
            ],
            Type::union([Type::INT, Type::NONE]),
        );
        assert_eq!(f.to_string(), "fn(a: int, b?: string) -> int | none");
        assert_eq!(
            iface(&[("x", Type::INT)]).to_string(),
            "{ x: int }"
        );
    }
}
