//! PDF Toolbox Library
//!
//! Launcher bar for a directory of PDF tools: discovers `launch_*` scripts,
//! starts them below the bar and collects their output.

pub mod config;
pub mod dialogs;
pub mod discovery;
pub mod error;
pub mod geometry;
pub mod gui;
pub mod launcher;
pub mod process;
pub mod process_group;
pub mod tool_log;

use anyhow::{bail, Context};
use std::path::PathBuf;

use crate::discovery::Platform;
use crate::geometry::{primary_display, Rect};
use crate::launcher::LauncherOptions;

/// Command-line flags for the launcher binary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupFlags {
    /// Toolbox root, defaults to the current directory
    pub root: Option<PathBuf>,
    /// Display size override (`--display 1920x1080`)
    pub display: Option<Rect>,
    /// Print discovered tools and exit
    pub list: bool,
    /// Print configuration status and exit
    pub status: bool,
}

impl StartupFlags {
    /// Parse arguments, not including the program name
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = StartupFlags::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--root" => {
                    let value = args.next().context("--root needs a directory")?;
                    flags.root = Some(PathBuf::from(value));
                }
                "--display" => {
                    let value = args.next().context("--display needs a WIDTHxHEIGHT value")?;
                    match Rect::parse_size(&value) {
                        Some(rect) => flags.display = Some(rect),
                        None => bail!("Invalid display size '{}', expected WIDTHxHEIGHT", value),
                    }
                }
                "--list" => flags.list = true,
                "--status" => flags.status = true,
                other => tracing::warn!("Ignoring unknown argument: {}", other),
            }
        }

        Ok(flags)
    }

    pub fn launcher_options(&self) -> anyhow::Result<LauncherOptions> {
        let root_dir = match &self.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("Failed to read the current directory")?,
        };

        Ok(LauncherOptions {
            root_dir,
            platform: Platform::current(),
            display: self.display.unwrap_or_else(primary_display),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let flags = StartupFlags::parse(args(&[
            "--root",
            "/opt/toolbox",
            "--display",
            "2560x1440",
            "--list",
            "--verbose",
        ]))
        .unwrap();

        assert_eq!(flags.root, Some(PathBuf::from("/opt/toolbox")));
        assert_eq!(flags.display, Some(Rect::new(0, 0, 2560, 1440)));
        assert!(flags.list);
        assert!(!flags.status);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(StartupFlags::parse(args(&["--root"])).is_err());
        assert!(StartupFlags::parse(args(&["--display", "wide"])).is_err());
        assert_eq!(StartupFlags::parse(args(&[])).unwrap(), StartupFlags::default());
    }

    #[test]
    fn test_launcher_options_use_overrides() {
        let flags = StartupFlags {
            root: Some(PathBuf::from("tools")),
            display: Some(Rect::new(0, 0, 1280, 720)),
            ..Default::default()
        };

        let options = flags.launcher_options().unwrap();
        assert_eq!(options.root_dir, PathBuf::from("tools"));
        assert_eq!(options.display, Rect::new(0, 0, 1280, 720));
    }
}
