//! `nksp` command line tool: check scripts and dump scanner tokens.

use clap::{Parser, Subcommand};
use nksp_runtime::{ScriptVM, VmConfig, syntax_tokens};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "nksp", about = "NKSP instrument script tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a script and print its diagnostics.
    Check {
        /// Script file to check.
        file: PathBuf,
        /// Optional VM configuration (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the scanner's classified source tokens.
    Tokens {
        /// Script file to tokenize.
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(clean) => {
            if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool, String> {
    match cli.command {
        Command::Check { file, config } => {
            let source = std::fs::read_to_string(&file)
                .map_err(|e| format!("cannot read '{}': {}", file.display(), e))?;
            let vm_config = match config {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
                    VmConfig::from_toml_str(&text)?
                }
                None => VmConfig::default(),
            };
            let mut vm = ScriptVM::with_config(vm_config);
            let script = vm.load_script(&source, &Default::default());
            for issue in script.issues() {
                println!("{}", issue);
            }
            if script.has_errors() {
                return Ok(false);
            }
            println!(
                "OK: {} event handler(s), stack depth {}",
                script.event_handler_count(),
                script.required_stack_size()
            );
            Ok(true)
        }
        Command::Tokens { file } => {
            let source = std::fs::read_to_string(&file)
                .map_err(|e| format!("cannot read '{}': {}", file.display(), e))?;
            for tok in syntax_tokens(&source) {
                if tok.is_newline() {
                    continue;
                }
                println!(
                    "{}:{}\t{:?}\t{}",
                    tok.block.first_line,
                    tok.block.first_column,
                    tok.kind(),
                    tok.text.escape_debug()
                );
            }
            Ok(true)
        }
    }
}
