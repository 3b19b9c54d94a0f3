//! Built-in operations every runtime provides.

mod data;
mod system;
mod wait;

use std::sync::Arc;

use super::events::EventSink;
use super::namespace::NamespaceBuilder;

pub use data::{Concat, Log, ParseJson, SetVariable, ToJson};
pub use system::{Fail, GetEnv};
pub use wait::Sleep;

/// Builder pre-populated with the built-in operations.
pub fn standard_ops(sink: Arc<dyn EventSink>) -> NamespaceBuilder {
    NamespaceBuilder::new()
        .register("dataProcessing.setVariable", SetVariable)
        .register("dataProcessing.log", Log::new(sink))
        .register("dataProcessing.concat", Concat)
        .register("dataProcessing.parseJson", ParseJson)
        .register("dataProcessing.toJson", ToJson)
        .register("wait.sleep", Sleep)
        .register("system.getEnv", GetEnv)
        .register("system.fail", Fail)
}
