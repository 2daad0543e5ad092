use crate::config::Token;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("failed to execute: {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("clone of {url} into {dest} failed ({status})\n{stderr}")]
    Failed {
        url: String,
        dest: String,
        status: ExitStatus,
        stderr: String,
    },
}

pub trait Cloner {
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<(), CloneError>;
}

/// Clones by shelling out to `git clone`. stdout passes through; stderr is
/// kept for the error. Credential prompts are disabled so a bad token fails
/// instead of blocking.
pub struct GitCli {
    program: String,
    token: Token,
}

impl GitCli {
    /// `token` is only used to scrub URLs out of error messages.
    pub fn new(token: Token) -> Self {
        Self {
            program: "git".to_string(),
            token,
        }
    }

    #[cfg(test)]
    fn with_program(program: &str, token: Token) -> Self {
        Self {
            program: program.to_string(),
            token,
        }
    }
}

impl Cloner for GitCli {
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<(), CloneError> {
        let output = Command::new(&self.program)
            .arg("clone")
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| CloneError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloneError::Failed {
                url: self.token.redact(url),
                dest: dest.display().to_string(),
                status: output.status,
                stderr: self.token.redact(stderr.trim()),
            });
        }
        Ok(())
    }
}
