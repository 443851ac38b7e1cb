//! Quill: a small statically checked scripting language compiled to a
//! compact stack bytecode.
//!
//! Source flows through [`frontend`] (tokens, syntax tree), [`semantic`]
//! (binding and type checking against [`types`]), [`bytecode`] (generation,
//! folding, the binary format) and finally [`runtime`]. [`pipeline`] strings
//! the stages together.

pub mod bytecode;
pub mod diagnostic;
pub mod frontend;
pub mod lang;
pub mod pipeline;
pub mod runtime;
pub mod semantic;
pub mod types;
