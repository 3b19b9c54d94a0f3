//! Ambient block context.
//!
//! Each instrumented call runs inside a task-local scope holding its block
//! context, so code deep inside an operation (loggers in particular) can
//! attribute itself to the step without the context being threaded through
//! every signature. Nested scopes restore the outer value when they end.

use std::future::Future;

use crate::types::BlockContext;

tokio::task_local! {
    static CURRENT_BLOCK: BlockContext;
}

/// Run `fut` with `block` as the ambient context.
pub async fn scope<F: Future>(block: BlockContext, fut: F) -> F::Output {
    CURRENT_BLOCK.scope(block, fut).await
}

/// The ambient context, if called inside an instrumented call.
pub fn current_block() -> Option<BlockContext> {
    CURRENT_BLOCK.try_with(|block| block.clone()).ok()
}
