//! Validation Rules
//!
//! One rule per file:
//!
//! - `unknown_directive.rs` - step key missing from the catalog or malformed
//! - `required_input.rs` - required template inputs left empty
//! - `input_type.rs` - input types the coder cannot emit
//! - `output_name.rs` - output bindings that are not valid variable names
//! - `control_balance.rs` - unbalanced control markers, stray break/continue
//! - `disabled_control.rs` - structural steps switched off
//! - `retry_budget.rs` - retry strategy without retries

mod control_balance;
mod disabled_control;
mod input_type;
mod output_name;
mod required_input;
mod retry_budget;
mod unknown_directive;

pub use control_balance::ControlBalanceRule;
pub use disabled_control::DisabledControlRule;
pub use input_type::InputTypeRule;
pub use output_name::OutputNameRule;
pub use required_input::RequiredInputRule;
pub use retry_budget::RetryBudgetRule;
pub use unknown_directive::UnknownDirectiveRule;
