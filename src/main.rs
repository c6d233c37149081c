use std::fs;
use std::process;

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use carbon::diagnostics::Diagnostic;
use carbon::interpreter::interpret;
use carbon::program::compile;

#[derive(ClapParser)]
#[command(name = "carbon", about = "The Carbon expression-language interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Carbon file; the process exit code is main's return value
    Run { file: String },
    /// Resolve and type check a Carbon file without running it
    Check { file: String },
}

/// Log filter comes from `CARBON_LOG`, falling back to `RUST_LOG`,
/// defaulting to warnings only.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("CARBON_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    match &cli.command {
        Commands::Run { file } => cmd_run(file),
        Commands::Check { file } => cmd_check(file),
    }
}

fn read_file(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}", format!("Cannot open file '{}': {}", path, e).red());
            process::exit(1);
        }
    }
}

fn report(errors: &[Diagnostic]) -> ! {
    for diagnostic in errors {
        eprintln!("{} {}", "Error:".red(), diagnostic);
    }
    process::exit(1);
}

fn cmd_run(file: &str) {
    let source = read_file(file);
    let program = match compile(file, &source) {
        Ok(program) => program,
        Err(errors) => report(&errors),
    };
    match interpret(&program) {
        Ok(code) => process::exit(code as i32),
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            process::exit(1);
        }
    }
}

fn cmd_check(file: &str) {
    let source = read_file(file);
    match compile(file, &source) {
        Ok(_) => println!("{}: no errors", file),
        Err(errors) => report(&errors),
    }
}
