pub mod compiler;
pub mod prelude;
pub mod program;
pub mod runtime;
pub mod value;

pub use compiler::{CompileError, Compiler};
pub use prelude::{Builtin, Prelude};
pub use program::{Function, Prog, Program};
pub use runtime::{Machine, MachineConfig, RuntimeError, RuntimeErrorKind, StackFrame};
pub use value::Value;
