mod repl;
mod tui;

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use plotherd::cli::{self, Cli, Commands};
use plotherd::core::command::{Executable, PlotCommand};
use plotherd::core::error::PlotterError;
use plotherd::core::keys::read_keys;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), PlotterError> {
    let args = Cli::parse();
    let config = args.plotter_config();

    match args.command {
        Commands::Keys => {
            init_stderr_logging();
            let executable = Executable::parse(&config.executable)?;
            let keys = read_keys(&executable, config.sync_timeout);
            if keys.is_empty() {
                println!("No keys found.");
            }
            for key in keys {
                println!("Fingerprint: {}", key.fingerprint);
                println!("  Farmer public key: {}", key.farmer_public_key);
                println!("  Pool public key:   {}", key.pool_public_key);
            }
            Ok(())
        }
        Commands::Args(file) => {
            let executable = Executable::parse(&config.executable)?;
            for descriptor in cli::load_jobs(&file.jobs)? {
                let mut words = vec![executable.program.clone()];
                words.extend(executable.prefix_args.iter().cloned());
                words.extend(PlotCommand::from_descriptor(&descriptor, config.min_ram_mib).to_args());
                println!("{}: {}", descriptor.name, shell_words::join(words));
            }
            Ok(())
        }
        Commands::Run(run_args) => {
            let descriptors = cli::load_jobs(&run_args.jobs)?;
            if run_args.console {
                init_stderr_logging();
                repl::run(descriptors, &config, &run_args)
            } else {
                let log_root = config.log_dir.parent().unwrap_or(&config.log_dir);
                init_file_logging(log_root)?;
                tui::run(descriptors, &config, &run_args)
            }
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// The dashboard owns the terminal, so diagnostics go to a file instead.
fn init_file_logging(dir: &Path) -> Result<(), PlotterError> {
    fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("plotherd.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
