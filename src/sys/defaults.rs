//! The boolean preference the daemon drives, read and written through the
//! `defaults` command.

use std::io;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::common::config::ToggleSettings;

#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("failed to run defaults: {0}")]
    Spawn(#[from] io::Error),
    #[error("defaults exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unexpected preference value {0:?}")]
    Unparseable(String),
}

pub trait Toggle: Send + Sync {
    fn read(&self) -> Result<bool, ToggleError>;
    fn write(&self, enabled: bool) -> Result<(), ToggleError>;
}

pub struct DefaultsToggle {
    domain: String,
    key: String,
}

impl DefaultsToggle {
    pub fn new(settings: &ToggleSettings) -> Self {
        DefaultsToggle {
            domain: settings.domain.clone(),
            key: settings.key.clone(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, ToggleError> {
        let output = Command::new("defaults").args(args).output()?;
        if !output.status.success() {
            return Err(ToggleError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Toggle for DefaultsToggle {
    fn read(&self) -> Result<bool, ToggleError> {
        let value = self.run(&["read", &self.domain, &self.key])?;
        parse_bool(&value).ok_or(ToggleError::Unparseable(value))
    }

    fn write(&self, enabled: bool) -> Result<(), ToggleError> {
        let value = if enabled { "true" } else { "false" };
        debug!(domain = %self.domain, key = %self.key, enabled, "Writing preference");
        self.run(&["write", &self.domain, &self.key, "-bool", value])?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn defaults_output_forms_are_understood() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }
}
