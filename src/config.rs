use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_HOST: &str = "github.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARN")]
    Warn,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "CRITICAL")]
    Critical,
}

impl Verbosity {
    /// tracing has nothing above ERROR, so CRITICAL collapses onto it.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Debug => LevelFilter::DEBUG,
            Verbosity::Info => LevelFilter::INFO,
            Verbosity::Warn => LevelFilter::WARN,
            Verbosity::Error | Verbosity::Critical => LevelFilter::ERROR,
        }
    }
}

/// Personal access token. Never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replace every occurrence of the token in `text` with `***`.
    pub fn redact(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }
        text.replace(&self.0, "***")
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Everything a run needs, built once from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub token: Token,
    pub verbosity: Verbosity,
    pub logfile: Option<PathBuf>,
    pub api_url: String,
    pub host: String,
    pub backup_root: PathBuf,
    pub dry_run: bool,
}

impl Config {
    pub fn new(username: impl Into<String>, token: Token) -> Self {
        Self {
            username: username.into(),
            token,
            verbosity: Verbosity::Error,
            logfile: None,
            api_url: DEFAULT_API_URL.to_string(),
            host: DEFAULT_HOST.to_string(),
            backup_root: PathBuf::from(".."),
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_is_redacted() {
        let token = Token::new("ghp_secret");
        assert_eq!(format!("{token:?}"), "Token(***)");

        let cfg = Config::new("alice", token);
        assert!(!format!("{cfg:?}").contains("ghp_secret"));
    }

    #[test]
    fn redact_replaces_every_occurrence() {
        let token = Token::new("abc");
        assert_eq!(
            token.redact("https://abc@github.com/x/abc"),
            "https://***@github.com/x/***"
        );
        assert_eq!(Token::new("").redact("plain"), "plain");
    }

    #[test]
    fn critical_maps_to_error() {
        assert_eq!(Verbosity::Critical.level_filter(), LevelFilter::ERROR);
        assert_eq!(Verbosity::Debug.level_filter(), LevelFilter::DEBUG);
        assert_eq!(Verbosity::Warn.level_filter(), LevelFilter::WARN);
    }

    #[test]
    fn defaults_point_at_github_and_parent_dir() {
        let cfg = Config::new("alice", Token::new("t"));
        assert_eq!(cfg.api_url, "https://api.github.com");
        assert_eq!(cfg.host, "github.com");
        assert_eq!(cfg.backup_root, PathBuf::from(".."));
        assert_eq!(cfg.verbosity, Verbosity::Error);
        assert!(!cfg.dry_run);
    }
}
