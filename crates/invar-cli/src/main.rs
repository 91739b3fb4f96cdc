//! Invar CLI - merged inventory variables and Kubernetes manifests

use clap::{Parser, Subcommand};
use invar_core::ResolveOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "invar")]
#[command(version)]
#[command(about = "Resolve Ansible-style inventories into merged variables and Kubernetes manifests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Inventory directory or comma separated host list
    #[arg(short, long, global = true, env = "INVAR_INVENTORY", default_value = "")]
    inventory: String,

    /// Additional variables as key=value or YAML/JSON, prefix a file name with @
    #[arg(short = 'e', long = "extra-vars", global = true)]
    extra_vars: Vec<String>,

    /// Colon separated groups to keep
    #[arg(short, long, global = true, default_value = "")]
    limit: String,

    /// Where imported variable sources are cached (default: .invar-cache)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Maximum number of containers resolved at once
    #[arg(long, global = true, default_value_t = 8)]
    concurrency: usize,

    /// Increase logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every group's variables as JSON, like `ansible-inventory --list`
    List,

    /// Resolve the containers declared in the inventory
    Containers {
        #[command(subcommand)]
        command: ContainersCommand,

        /// YAML or JSON file mapping image names to tags
        #[arg(long, global = true)]
        image_versions: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ContainersCommand {
    /// Print `image: tag` for every container
    Versions,

    /// Print Kubernetes manifests for every container
    Spec,
}

impl Cli {
    fn resolve_options(&self) -> ResolveOptions {
        let mut options = ResolveOptions::new(self.inventory.clone())
            .with_extra_vars(self.extra_vars.clone())
            .with_limit(self.limit.clone())
            .with_concurrency(self.concurrency);
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }
        options
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> error::Result<()> {
    let options = cli.resolve_options();

    match cli.command {
        Commands::List => commands::list::run(&options),

        Commands::Containers {
            command,
            image_versions,
        } => {
            let options = match image_versions {
                Some(path) => options.with_image_versions(path),
                None => options,
            };
            match command {
                ContainersCommand::Versions => commands::containers::versions(&options),
                ContainersCommand::Spec => commands::containers::spec(&options),
            }
        }
    }
}

fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code as u8)
        }
    }
}
