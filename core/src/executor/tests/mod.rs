mod helpers;

mod call_tests;
mod debug_hook_tests;
