//! ViewForge CLI - compile views and manage the view cache
//!
//! Commands: compile, reset, flags
//! Compile output is JSON on stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use viewforge_core::{LocalFiles, Value, ViewError, ViewManager, ViewsConfig};

#[derive(Parser)]
#[command(name = "viewforge-cli")]
#[command(about = "ViewForge CLI - View Template Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON views configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging, and list every deleted file on reset
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a view and print the artifact
    Compile {
        /// View name, relative to the views directory, without extension
        view: String,

        /// Recompile even when the cached copy is fresh
        #[arg(short, long)]
        force: bool,

        /// JSON object of variables visible to compile-time blocks
        #[arg(long)]
        vars: Option<String>,
    },

    /// Delete every compiled view
    Reset,

    /// Print the configured compile flags
    Flags,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<ViewsConfig, ViewError> {
    match path {
        Some(path) => ViewsConfig::from_file(path),
        None => Ok(ViewsConfig::default()),
    }
}

fn compile(manager: ViewManager, view: &str, force: bool, vars: Option<&str>) -> Result<serde_json::Value, ViewError> {
    let globals: HashMap<String, Value> = match vars {
        Some(json) => serde_json::from_str(json)?,
        None => HashMap::new(),
    };
    let manager = manager.with_globals(globals);

    let cached = !force && manager.config().cache.enabled && manager.is_fresh(view)?;
    let artifact = if force { manager.compile(view)? } else { manager.get(view)? };

    Ok(serde_json::json!({
        "view": artifact.view,
        "filename": artifact.filename,
        "sourceHash": artifact.source_hash,
        "source": artifact.source,
        "cached": cached,
    }))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(r#"{{"error": "Failed to load config: {}"}}"#, e);
            return ExitCode::FAILURE;
        }
    };

    let manager = ViewManager::new(config, Arc::new(LocalFiles::new()));

    match cli.command {
        Commands::Compile { view, force, vars } => {
            match compile(manager, &view, force, vars.as_deref()) {
                Ok(output) => match serde_json::to_string_pretty(&output) {
                    Ok(json) => {
                        println!("{}", json);
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        eprintln!(r#"{{"error": "{}"}}"#, e);
                        ExitCode::FAILURE
                    }
                },
                Err(e) => {
                    let output = serde_json::json!({ "view": view, "error": e.to_string() });
                    println!("{}", output);
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Reset => match manager.reset() {
            Ok(report) if report.missing => {
                println!("Cache directory is missing, no cache to be cleaned.");
                ExitCode::SUCCESS
            }
            Ok(report) => {
                if cli.verbose {
                    for path in &report.deleted {
                        println!("[deleted] {}", path);
                    }
                }
                for failure in &report.failed {
                    println!("[errored] {}: {}", failure.path, failure.error);
                }
                println!("View cache has been cleared.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to reset view cache: {}", e);
                ExitCode::FAILURE
            }
        },

        Commands::Flags => {
            for flag in &manager.config().evaluate.flags {
                println!("{}", flag);
            }
            ExitCode::SUCCESS
        }
    }
}
