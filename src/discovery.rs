/// Tool discovery by scanning for `launch_<tool>.<ext>` scripts
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LauncherError, Result};

/// Prefix every launch script name starts with
pub const LAUNCH_PREFIX: &str = "launch_";

/// Operating system flavor of the launch scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    /// Extension (with dot) of the launch scripts for this platform
    pub fn launcher_extension(&self) -> &'static str {
        match self {
            Platform::Windows => ".bat",
            Platform::Unix => ".sh",
        }
    }
}

/// Button group a tool is shown in. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolCategory {
    Organize,
    Recognize,
    Convert,
    Print,
    Other,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::Organize => write!(f, "Organize"),
            ToolCategory::Recognize => write!(f, "Text & OCR"),
            ToolCategory::Convert => write!(f, "Convert"),
            ToolCategory::Print => write!(f, "Print"),
            ToolCategory::Other => write!(f, "Other"),
        }
    }
}

/// Keyword to category table. First hit wins, so more specific keywords
/// come before the generic ones.
pub const CATEGORY_KEYWORDS: &[(&str, ToolCategory)] = &[
    // Page manipulation
    ("split", ToolCategory::Organize),
    ("combin", ToolCategory::Organize),
    ("merge", ToolCategory::Organize),
    ("reorder", ToolCategory::Organize),
    ("rotate", ToolCategory::Organize),
    ("remove", ToolCategory::Organize),
    ("add", ToolCategory::Organize),
    // Text recognition
    ("ocr", ToolCategory::Recognize),
    ("extract", ToolCategory::Recognize),
    ("text", ToolCategory::Recognize),
    // Document conversion
    ("convert", ToolCategory::Convert),
    ("markdown", ToolCategory::Convert),
    ("md", ToolCategory::Convert),
    // Layout for printing
    ("print", ToolCategory::Print),
    ("image", ToolCategory::Print),
];

/// Keyword to button glyph table
pub const TOOL_ICONS: &[(&str, &str)] = &[
    ("split", "✂️"),
    ("merge", "🔗"),
    ("combin", "🔗"),
    ("compress", "📦"),
    ("ocr", "👁️"),
    ("rotate", "🔄"),
    ("extract", "📤"),
    ("convert", "🔀"),
    ("watermark", "💧"),
    ("encrypt", "🔒"),
    ("decrypt", "🔓"),
    ("metadata", "📋"),
    ("preview", "👀"),
    ("reorder", "📑"),
    ("remove", "🗑️"),
    ("print", "🖨️"),
    ("add", "➕"),
    ("info", "ℹ️"),
];

pub const DEFAULT_ICON: &str = "📄";

/// Words rendered fully upper-case in display names
const ACRONYMS: &[&str] = &["pdf", "ocr", "md"];

/// Metadata for one launchable tool, fixed at discovery time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// The `<tool>` part of `launch_<tool>.<ext>`
    pub name: String,
    pub display_name: String,
    pub category: ToolCategory,
    pub icon: &'static str,
    /// Path to the platform launch script
    pub launch_command: PathBuf,
    /// Position in the sorted discovery result
    pub discovered_at: usize,
}

impl ToolDescriptor {
    /// Build a descriptor from a launch script path, if the file name matches
    pub fn from_script(path: &Path, platform: Platform) -> Option<Self> {
        let name = tool_name_from_file(path.file_name()?.to_str()?, platform)?;

        Some(ToolDescriptor {
            display_name: format_display_name(&name),
            category: categorize(&name),
            icon: icon_for(&name),
            launch_command: path.to_path_buf(),
            discovered_at: 0,
            name,
        })
    }

    /// Label shown on the launcher button
    pub fn button_label(&self) -> String {
        format!("{} {}", self.icon, self.display_name)
    }
}

/// Extract `<tool>` from `launch_<tool><ext>`
pub fn tool_name_from_file(file_name: &str, platform: Platform) -> Option<String> {
    let name = file_name
        .strip_prefix(LAUNCH_PREFIX)?
        .strip_suffix(platform.launcher_extension())?;

    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// `pdf_md_converter` -> `PDF MD Converter`
pub fn format_display_name(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            if ACRONYMS.contains(&lower.as_str()) {
                return lower.to_uppercase();
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn categorize(name: &str) -> ToolCategory {
    let name_lower = name.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| name_lower.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(ToolCategory::Other)
}

pub fn icon_for(name: &str) -> &'static str {
    let name_lower = name.to_lowercase();
    TOOL_ICONS
        .iter()
        .find(|(keyword, _)| name_lower.contains(keyword))
        .map(|(_, icon)| *icon)
        .unwrap_or(DEFAULT_ICON)
}

/// Scan `dir` for launch scripts, surfacing an unreadable directory as an error
pub fn try_discover(dir: &Path, platform: Platform) -> Result<Vec<ToolDescriptor>> {
    let entries = fs::read_dir(dir).map_err(|source| LauncherError::Discovery {
        path: dir.to_path_buf(),
        source,
    })?;

    // Sorted so a symlink and its target always collapse to the same entry
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();

    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut tools = Vec::new();

    for path in paths {
        // Follows symlinks; directories and dangling links are not tools
        if !fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
            continue;
        }

        let Some(tool) = ToolDescriptor::from_script(&path, platform) else {
            continue;
        };

        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            tools.push(tool);
        }
    }

    tools.sort_by(|a, b| {
        (a.category, &a.display_name, &a.launch_command)
            .cmp(&(b.category, &b.display_name, &b.launch_command))
    });
    for (index, tool) in tools.iter_mut().enumerate() {
        tool.discovered_at = index;
    }

    Ok(tools)
}

/// Scan `dir` for launch scripts. An unreadable directory yields no tools.
pub fn discover(dir: &Path, platform: Platform) -> Vec<ToolDescriptor> {
    match try_discover(dir, platform) {
        Ok(tools) => {
            tracing::info!("Discovered {} tools in {}", tools.len(), dir.display());
            tools
        }
        Err(e) => {
            tracing::warn!("Tool discovery failed: {}", e);
            Vec::new()
        }
    }
}

/// Group an already sorted tool list by category, keeping category order
pub fn group_by_category(tools: &[ToolDescriptor]) -> Vec<(ToolCategory, Vec<&ToolDescriptor>)> {
    let mut groups: Vec<(ToolCategory, Vec<&ToolDescriptor>)> = Vec::new();

    for tool in tools {
        match groups.last_mut() {
            Some((category, members)) if *category == tool.category => members.push(tool),
            _ => groups.push((tool.category, vec![tool])),
        }
    }

    groups
}
