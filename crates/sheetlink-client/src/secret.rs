//! Secret references in configuration values.
//!
//! `client_id` and `client_secret` in `config.toml` may point elsewhere
//! instead of holding the secret inline:
//!
//! | Value | Source |
//! |-------|--------|
//! | `env::NAME` | environment variable `NAME` |
//! | `file::/path` | first line of the file |
//! | `pass::entry` | first line of `pass show entry` |
//! | anything else | the value itself |

use std::path::Path;
use std::process::Command;

/// A parsed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// Inline value.
    Plain(&'a str),
    /// Environment variable name.
    Env(&'a str),
    /// File path.
    File(&'a str),
    /// `pass` store entry.
    Pass(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Parses a configuration value.
    pub fn parse(value: &'a str) -> Self {
        if let Some(name) = value.strip_prefix("env::") {
            Self::Env(name)
        } else if let Some(path) = value.strip_prefix("file::") {
            Self::File(path)
        } else if let Some(entry) = value.strip_prefix("pass::") {
            Self::Pass(entry)
        } else {
            Self::Plain(value)
        }
    }

    /// Returns true for values stored outside the config file.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    /// Fetches the secret.
    pub fn resolve(&self) -> Result<String, String> {
        match *self {
            Self::Plain(value) => Ok(value.to_string()),
            Self::Env(name) => {
                std::env::var(name).map_err(|_| format!("environment variable `{}` is not set", name))
            }
            Self::File(path) => {
                let content = std::fs::read_to_string(Path::new(path))
                    .map_err(|e| format!("failed to read secret file {}: {}", path, e))?;
                first_line(&content).ok_or_else(|| format!("secret file {} is empty", path))
            }
            Self::Pass(entry) => {
                let output = Command::new("pass")
                    .args(["show", entry])
                    .output()
                    .map_err(|e| format!("failed to run `pass show {}`: {}", entry, e))?;
                if !output.status.success() {
                    return Err(format!(
                        "`pass show {}` failed ({}): {}",
                        entry,
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ));
                }
                first_line(&String::from_utf8_lossy(&output.stdout))
                    .ok_or_else(|| format!("`pass show {}` produced no output", entry))
            }
        }
    }
}

fn first_line(content: &str) -> Option<String> {
    content
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}

/// Resolves a configuration value that may be a secret reference.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}
