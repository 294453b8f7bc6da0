//! Loopscope CLI
//!
//! Runs, steps or translates a script and prints what the call stack, the
//! queues and the console do along the way.

use loopscope::cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
