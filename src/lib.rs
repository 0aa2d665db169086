//! Front end for the Kaleidoscope toy language: a lexer, a precedence
//! climbing parser with user-definable operators, and lowering of the AST
//! into Cranelift IR, which a JIT compiles and runs.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod runtime;
pub mod token;
pub mod toplevel;

pub use codegen::Session;
pub use error::{Error, ErrorKind};
pub use runtime::HostFunctions;
pub use toplevel::{Driver, Options, Outcome};
