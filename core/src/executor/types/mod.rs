pub mod ast;
pub mod values;

pub use ast::{Expr, Span, Stmt};
pub use values::Val;
