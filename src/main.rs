use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use server_backups::managers::backup::render_server;
use server_backups::utils::Interrupt;
use server_backups::{
    init_logging, BackupError, Backups, LoggingConfig, RunOptions, Selection,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "server-backups")]
#[command(about = "Hardlinked rsync snapshot backups of local and remote servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration directory holding defaults.yml and config.d/
    #[arg(short, long, default_value = "/etc/serverbackups", global = true)]
    config: PathBuf,

    /// Scratch directory for exclude files; the run lock is `<work dir>.lock`
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Also write logs to daily rotated files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Number of rotated log files to keep
    #[arg(long, default_value_t = 10, global = true)]
    log_max_files: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run backups
    Run(RunArgs),

    /// List all configured servers
    List,

    /// Validate the configuration directory
    Validate,

    /// Print the resolved configuration (passwords hidden)
    ShowConfig {
        /// Only this server
        #[arg(short, long)]
        server: Option<String>,
    },

    /// Show snapshots for a server and which ones retention keeps
    Snapshots {
        /// Server name
        #[arg(short, long)]
        server: String,
    },
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("selection")
        .required(true)
        .args(["all", "servers", "custom", "server", "cluster"])
))]
struct RunArgs {
    /// All configured servers, then custom backups
    #[arg(long)]
    all: bool,

    /// All configured servers only
    #[arg(long)]
    servers: bool,

    /// Custom backups only
    #[arg(long)]
    custom: bool,

    /// A single server
    #[arg(long, value_name = "NAME")]
    server: Option<String>,

    /// Every server in a cluster
    #[arg(long, value_name = "TAG")]
    cluster: Option<String>,

    /// Log commands without running them
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn selection(&self) -> Selection {
        if let Some(name) = &self.server {
            Selection::Server(name.clone())
        } else if let Some(tag) = &self.cluster {
            Selection::Cluster(tag.clone())
        } else if self.custom {
            Selection::Custom
        } else if self.servers {
            Selection::Servers
        } else {
            Selection::All
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging (must keep guard alive)
    let logging_config =
        LoggingConfig::from_args(cli.log_dir.as_deref(), &cli.log_level, cli.log_max_files);
    let _log_guard = init_logging(&logging_config)?;

    let mut backups = Backups::from_config_dir(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    if let Some(work_dir) = &cli.work_dir {
        backups = backups.with_work_dir(work_dir);
    }

    match cli.command {
        Commands::Run(args) => {
            if !args.dry_run && which::which("rsync").is_err() {
                eprintln!("rsync not found in PATH!");
                eprintln!();
                eprintln!("rsync is required on this machine for every backup.");
                std::process::exit(1);
            }

            let interrupt = Interrupt::new();
            interrupt.register_signals()?;

            let options = RunOptions {
                now: None,
                dry_run: args.dry_run,
                interrupt,
            };

            match backups.run(&args.selection(), &options) {
                Ok(summary) if summary.is_success() => {
                    println!("✓ Backups completed successfully");
                }
                Ok(summary) => {
                    eprintln!("✗ {} backup step(s) failed", summary.failure_count());
                    std::process::exit(1);
                }
                Err(BackupError::Interrupted { server }) => {
                    eprintln!("Interrupted during backup of '{}'", server);
                    std::process::exit(130);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::List => {
            println!("Configured servers:");
            for server in backups.servers() {
                let (source, destination) = server.topology();
                println!("  {}", server.name);
                println!("    Enabled: {}", server.enabled);
                println!("    Cluster: {}", server.cluster.as_deref().unwrap_or("-"));
                println!("    Source: {}", source);
                println!(
                    "    Destination: {} {}",
                    destination, server.destination.path
                );
                println!();
            }
        }

        Commands::Validate => {
            println!("Configuration is valid!");
            println!("Servers: {}", backups.servers().len());
            println!(
                "Enabled: {}",
                backups.servers().iter().filter(|s| s.enabled).count()
            );
        }

        Commands::ShowConfig { server } => {
            let servers: Vec<_> = match &server {
                Some(name) => vec![backups
                    .server(name)
                    .ok_or_else(|| BackupError::UnknownServer(name.clone()))?],
                None => backups.servers().iter().collect(),
            };
            for server in servers {
                print!("{}", render_server(server)?);
            }
        }

        Commands::Snapshots { server } => {
            let overview = backups.snapshots(&server)?;

            println!("=== Snapshots for server: {} ===\n", server);
            if overview.snapshots.is_empty() {
                println!("No snapshots found");
            }
            for snapshot in &overview.snapshots {
                match overview.plan.tier(snapshot.name()) {
                    Some(tier) => println!("  {}  keep ({})", snapshot, tier),
                    None => println!("  {}  delete", snapshot),
                }
            }
            println!(
                "\nTotal: {} snapshot(s), {} to delete on next run",
                overview.snapshots.len(),
                overview.plan.delete.len()
            );
        }
    }

    Ok(())
}
