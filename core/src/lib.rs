pub mod catalog;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod errors;
pub mod executor;
pub mod flow;
pub mod parser;
pub mod runtime;
pub mod types;

// Re-export main types
pub use types::*;

pub use catalog::{Catalog, CatalogHandle, Directive};
pub use compiler::{Compiler, SourceMap};
pub use debug::{DebugAdapter, DebugServer};
pub use flow::{Application, Flow};
pub use runtime::{RunOutcome, Runtime};
