use crate::debugger::command::TextEncoding;
use crate::debugger::dispatcher::DEFAULT_ASM_HEADER_OFFSET;
use crate::debugger::{ConfigProvider, Error};
use serde::Deserialize;
use std::fs::read_to_string;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Session configuration, usually loaded from `~/.config/gdbs/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the debugger executable or a program name looked up in `PATH`.
    pub debugger: Option<String>,
    pub encoding: TextEncoding,
    pub show_command_log: bool,
    pub show_annotations: bool,
    pub start_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub disassembly_header_offset: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debugger: Some("gdb".to_string()),
            encoding: TextEncoding::default(),
            show_command_log: false,
            show_annotations: false,
            start_timeout_ms: 5000,
            poll_interval_ms: 100,
            disassembly_header_offset: DEFAULT_ASM_HEADER_OFFSET,
        }
    }
}

impl SessionConfig {
    const DEFAULT_PATH: &'static str = ".config/gdbs/config.toml";

    pub fn parse(data: &str) -> Result<Self, Error> {
        Ok(toml::de::from_str(data)?)
    }

    /// Load configuration from file.
    /// Without explicit path a missing default file means default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match home::home_dir() {
                Some(home) => (home.join(Self::DEFAULT_PATH), false),
                None => return Ok(Self::default()),
            },
        };

        match read_to_string(&path) {
            Ok(data) => Self::parse(&data),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl ConfigProvider for SessionConfig {
    fn debugger_path(&self) -> Option<PathBuf> {
        let debugger = self.debugger.as_deref().filter(|d| !d.trim().is_empty())?;

        let path = PathBuf::from(debugger);
        if path.exists() {
            return Some(path);
        }
        // bare program name, unresolved one is reported as not found by the session
        Some(which::which(debugger).unwrap_or(path))
    }

    fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    fn show_command_log(&self) -> bool {
        self.show_command_log
    }

    fn show_annotations(&self) -> bool {
        self.show_annotations
    }

    fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn asm_header_offset(&self) -> usize {
        self.disassembly_header_offset
    }
}
