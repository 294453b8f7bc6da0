use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, CONFIG_PATH_VAR};
use crate::interpreter::executor::{Interpreter, RunOutcome};
use crate::interpreter::translator::translate;
use crate::state::{RuntimeState, StoreEvent, Topic};

#[derive(Parser)]
#[command(name = "loopscope")]
#[command(about = "Loopscope - step through the JavaScript call stack and event loop", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Delay between instructions in milliseconds (overrides config)
    #[arg(long, global = true)]
    pub speed_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script with pacing and print its console output
    Run {
        /// Script path, or `-` for stdin
        file: PathBuf,

        /// Print every state event as a JSON line instead of console output
        #[arg(long)]
        trace: bool,
    },

    /// Step through a script without pacing, one line per step
    Step {
        /// Script path, or `-` for stdin
        file: PathBuf,

        /// Give up after this many steps
        #[arg(long, default_value = "10000")]
        max_steps: usize,
    },

    /// Print the translated instructions and diagnostics as JSON
    Parse {
        /// Script path, or `-` for stdin
        file: PathBuf,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    if let Some(config_path) = &cli.config {
        std::env::set_var(CONFIG_PATH_VAR, config_path);
    }

    // Load configuration before anything runs so errors surface first
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(speed_ms) = cli.speed_ms {
        config.step_delay_ms = speed_ms;
    }
    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Run { file, trace } => {
            let source = read_source(&file)?;
            let mut interpreter = Interpreter::from_config(&config);
            interpreter.init(translate(&source));

            if trace {
                interpreter.subscribe(Topic::All, Box::new(print_event));
            } else {
                interpreter.subscribe(Topic::Console, Box::new(print_console));
            }

            let controller = interpreter.controller();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    controller.stop();
                }
            });

            let outcome = interpreter.run().await.context("Run failed")?;
            info!(?outcome, steps = interpreter.state().step_count, "finished");
            if outcome == RunOutcome::Halted {
                std::process::exit(1);
            }
        }

        Commands::Step { file, max_steps } => {
            let source = read_source(&file)?;
            let mut interpreter = Interpreter::from_config(&config);
            interpreter.init(translate(&source));
            interpreter.subscribe(Topic::Console, Box::new(print_console));

            let mut steps = 0;
            loop {
                if steps >= max_steps {
                    anyhow::bail!("gave up after {} steps", max_steps);
                }
                let more = interpreter
                    .step()
                    .await
                    .with_context(|| format!("Step {} failed", steps + 1))?;
                steps += 1;
                println!("{}", step_summary(steps, interpreter.state()));
                if !more {
                    break;
                }
            }
        }

        Commands::Parse { file } => {
            let source = read_source(&file)?;
            let program = translate(&source);
            println!("{}", serde_json::to_string_pretty(&program)?);
        }
    }

    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // a subscriber may already be installed when called from a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read script from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_console(event: &StoreEvent, _state: &RuntimeState) {
    if let StoreEvent::Console(entry) = event {
        println!("{}", entry.text());
    }
}

fn print_event(event: &StoreEvent, _state: &RuntimeState) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("failed to encode event: {}", e),
    }
}

fn step_summary(step: usize, state: &RuntimeState) -> String {
    let stack: Vec<&str> = state.call_stack.iter().map(|f| f.name.as_str()).collect();
    let queues = &state.event_loop;
    format!(
        "[step {}] line {} | stack: {} | web apis: {} | callbacks: {} | microtasks: {}",
        step,
        state.current_line,
        if stack.is_empty() { "-".to_string() } else { stack.join(" > ") },
        queues.web_apis.len(),
        queues.callback_queue.len(),
        queues.microtask_queue.len(),
    )
}
