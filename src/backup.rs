use crate::clone::Cloner;
use crate::config::{Config, Token};
use crate::github::{self, RepositoryLister};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// One run's destination: `<root>/<YYYYMMDD-HHMMSS>`.
#[derive(Debug)]
pub struct BackupSession {
    pub timestamp: String,
    pub directory: PathBuf,
}

impl BackupSession {
    pub fn create(root: &Path) -> Result<Self> {
        Self::create_at(root, Local::now().naive_local())
    }

    /// Fails if the directory is already there; a backup never merges into
    /// an older one.
    pub fn create_at(root: &Path, now: NaiveDateTime) -> Result<Self> {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let directory = root.join(&timestamp);
        fs::create_dir(&directory).with_context(|| {
            format!("failed to create backup directory: {}", directory.display())
        })?;
        info!("Backing up to: {}", directory.display());
        Ok(Self {
            timestamp,
            directory,
        })
    }

    pub fn destination(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

/// List everything the account can see and keep what it owns.
pub fn discover(config: &Config, lister: &dyn RepositoryLister) -> Result<HashMap<String, String>> {
    let repos = lister
        .list_repositories()
        .context("failed to list repositories")?;
    info!("Found {} accessible repo(s)", repos.len());
    let owned = github::filter_owned(repos, &config.host, &config.username);
    info!("{} repo(s) owned by {}", owned.len(), config.username);
    Ok(owned)
}

/// What a dry run would clone, sorted by name: the redacted clone URL and
/// the destination under a `<timestamp>` placeholder. Creates nothing.
pub fn plan(config: &Config, lister: &dyn RepositoryLister) -> Result<Vec<(String, PathBuf)>> {
    let repos = discover(config, lister)?;
    let placeholder = config.backup_root.join("<timestamp>");
    let mut planned: Vec<(String, String, PathBuf)> = repos
        .iter()
        .map(|(name, git_url)| {
            let url = github::authenticated_url(git_url, &config.token);
            (name.to_lowercase(), config.token.redact(&url), placeholder.join(name))
        })
        .collect();
    planned.sort();
    Ok(planned
        .into_iter()
        .map(|(_, url, dest)| (url, dest))
        .collect())
}

/// Clone each repo into the session directory, stopping at the first
/// failure. Returns the number of repos cloned.
pub fn clone_all(
    session: &BackupSession,
    repos: &HashMap<String, String>,
    token: &Token,
    cloner: &dyn Cloner,
) -> Result<usize> {
    let total = repos.len();
    for (i, (name, git_url)) in repos.iter().enumerate() {
        let dest = session.destination(name);
        let url = github::authenticated_url(git_url, token);
        info!("[{}/{total}] cloning {name}", i + 1);
        debug!("git clone {} {}", token.redact(&url), dest.display());
        cloner
            .clone_repository(&url, &dest)
            .with_context(|| format!("failed to clone {name}"))?;
    }
    Ok(total)
}

/// Full pipeline: discover, create the session directory, clone.
pub fn run_backup(
    config: &Config,
    lister: &dyn RepositoryLister,
    cloner: &dyn Cloner,
) -> Result<BackupSession> {
    let repos = discover(config, lister)?;
    let session = BackupSession::create(&config.backup_root)?;
    let cloned = clone_all(&session, &repos, &config.token, cloner)?;
    info!("Cloned {cloned} repo(s) into backup {}", session.timestamp);
    Ok(session)
}
