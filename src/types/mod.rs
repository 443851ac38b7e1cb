//! Structural type model and the assignability relation.

pub mod ty;

pub use ty::{
    FunctionType, InterfaceType, LiteralValue, Member, Param, PrimitiveKind, PropertyKey, Type,
};
