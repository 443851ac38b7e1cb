//! Execution: the stack VM, its scopes and the built-in functions.

pub mod intrinsics;
pub mod runtime_error;
pub mod scope;
pub mod vm;

pub use runtime_error::{RuntimeError, RuntimeErrorKind};
pub use vm::{Vm, VmConfig};
