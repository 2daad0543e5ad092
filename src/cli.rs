use crate::backup::{self, run_backup};
use crate::clone::GitCli;
use crate::config::{Config, DEFAULT_API_URL, DEFAULT_HOST, Token, Verbosity};
use crate::github::GithubClient;
use crate::logging;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "ghbackup",
    about = "Clone every repo owned by a GitHub account into a timestamped directory",
    after_help = r#"EXAMPLES:
    ghbackup --username alice --pat ghp_xxx              Back up into ../YYYYMMDD-HHMMSS
    GITHUB_TOKEN=ghp_xxx ghbackup --username alice -v INFO
    ghbackup --username alice --pat ghp_xxx --dry-run    List what would be cloned
    ghbackup --username alice --pat ghp_xxx -l backup.log --backup-root /srv/backups"#
)]
struct Cli {
    /// GitHub username
    #[arg(long)]
    username: String,

    /// GitHub personal access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pat: String,

    /// Verbosity/Log level
    #[arg(short, long, value_enum, ignore_case = true, default_value = "ERROR")]
    verbosity: Verbosity,

    /// Store log to this file (rotated at 50000 bytes, 2 backups)
    #[arg(short, long, value_name = "PATH")]
    logfile: Option<PathBuf>,

    /// Base URL of the GitHub REST API
    #[arg(long, default_value = DEFAULT_API_URL, help_heading = "Server")]
    api_url: String,

    /// Host that owned repos' clone URLs point at
    #[arg(long, default_value = DEFAULT_HOST, help_heading = "Server")]
    host: String,

    /// Directory the timestamped backup directory is created in
    #[arg(long, default_value = "..", value_name = "DIR")]
    backup_root: PathBuf,

    /// List repos without cloning
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.username, Token::new(self.pat));
        config.verbosity = self.verbosity;
        config.logfile = self.logfile;
        config.api_url = self.api_url;
        config.host = self.host;
        config.backup_root = self.backup_root;
        config.dry_run = self.dry_run;
        config
    }
}

/// Parse arguments, install logging and run the backup. Every failure after
/// logging is up goes through the log; anything earlier goes to stderr.
pub fn run() -> ExitCode {
    let config = Cli::parse().into_config();
    if let Err(e) = logging::init(&config) {
        eprintln!("error: {e:?}");
        return ExitCode::FAILURE;
    }

    match execute(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn execute(config: &Config) -> Result<()> {
    let start = Instant::now();
    info!("Starting backup for {}", config.username);

    let lister = GithubClient::new(config)?;

    if config.dry_run {
        let planned = backup::plan(config, &lister)?;
        println!("\n--- Dry run ---");
        let total = planned.len();
        for (i, (url, dest)) in planned.iter().enumerate() {
            println!("  [{}/{}] {} -> {}", i + 1, total, url, dest.display());
        }
        println!("\nTotal: {total} repos");
        return Ok(());
    }

    let cloner = GitCli::new(config.token.clone());
    run_backup(config, &lister, &cloner)?;

    info!(
        "Successfully finished in {}",
        logging::format_elapsed(start.elapsed())
    );
    Ok(())
}
