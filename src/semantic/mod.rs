//! Binding and type checking.
//!
//! [`binder::bind`] produces a [`bound::BoundTree`] indexed by the same
//! [`NodeId`](crate::lang::node::NodeId)s as the syntax tree, and
//! [`checker::check`] validates it without modifying it.

pub mod binder;
pub mod bound;
pub mod checker;
pub mod operators;
pub mod symbols;
