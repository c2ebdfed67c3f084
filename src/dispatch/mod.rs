//! Function dispatch boundary
//!
//! Everything a score or script can call goes through here: argument
//! marshaling, operator composition and the name -> callable table.

pub mod arg;
pub mod registry;

pub use self::arg::{compose, float_arg, float_args, marshal_args, str_arg, Arg, ReturnValue, ScriptValue};
pub use self::registry::{BuiltinFn, Callable, FunctionRegistry};
