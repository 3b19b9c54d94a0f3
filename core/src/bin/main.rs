//! RobotFlow CLI
//!
//! Compiles flow applications, runs compiled programs and drives debug
//! sessions. `robotflow run --inspect` is also what the debug adapter spawns.

use robotflow_core::cli;

#[tokio::main]
async fn main() {
    match cli::run_cli().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
