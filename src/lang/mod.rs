//! # Quill syntax tree and runtime values
//!
//! The syntax tree is produced by the parser and consumed by the binder and
//! the bytecode generator. Nodes live in a [`program::Program`] arena and are
//! addressed by [`node::NodeId`], so later passes can keep side tables keyed
//! by id instead of by reference.
//!
//! [`value::Value`] is what the virtual machine pushes, stores and returns.

pub mod node;
pub mod program;
pub mod value;
