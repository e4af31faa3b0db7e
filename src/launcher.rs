/// Launcher state and lifecycle
///
/// `LauncherState` is the one owner of everything the launcher mutates:
/// configuration, discovered tools, bar and display rectangles, the process
/// registry and the output log. The GUI holds it and calls into it from its
/// event loop; nothing here is global.
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{ConfigStore, EnvSource, GlobalConfig};
use crate::discovery::{discover, Platform, ToolDescriptor};
use crate::error::{LauncherError, Result};
use crate::geometry::{allocate, Rect, WindowGeometry};
use crate::process::{
    spawn_tool, ExitedTool, ProcessRegistry, RunId, ShutdownReport, ToolOutput,
};
use crate::tool_log::{Severity, ToolLog};

/// Height of the slim launcher bar
pub const BAR_HEIGHT: u32 = 70;
/// Gap between the bar and the display edges
pub const BAR_PADDING: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherPhase {
    NotStarted,
    Running,
    ShuttingDown,
    Terminated,
}

impl LauncherPhase {
    pub fn can_transition(&self, next: LauncherPhase) -> bool {
        matches!(
            (self, next),
            (LauncherPhase::NotStarted, LauncherPhase::Running)
                | (LauncherPhase::Running, LauncherPhase::ShuttingDown)
                | (LauncherPhase::ShuttingDown, LauncherPhase::Terminated)
        )
    }
}

/// Where the launcher looks for tools and how it sizes itself
#[derive(Debug, Clone)]
pub struct LauncherOptions {
    /// Toolbox root: holds the launch scripts and `config/`
    pub root_dir: PathBuf,
    pub platform: Platform,
    pub display: Rect,
}

/// Initial bar rectangle: full display width minus padding, at the top
pub fn initial_bar_rect(display: &Rect) -> Rect {
    Rect::new(
        display.x + BAR_PADDING as i32,
        display.y + BAR_PADDING as i32,
        display.width.saturating_sub(2 * BAR_PADDING),
        BAR_HEIGHT,
    )
}

pub struct LauncherState {
    phase: LauncherPhase,
    root_dir: PathBuf,
    platform: Platform,
    store: ConfigStore,
    config: GlobalConfig,
    tools: Vec<ToolDescriptor>,
    display: Rect,
    bar: Rect,
    registry: ProcessRegistry,
    log: ToolLog,
    output_tx: Sender<ToolOutput>,
    output_rx: Receiver<ToolOutput>,
}

impl LauncherState {
    /// Load configuration. Tools are discovered by [`LauncherState::start`].
    pub fn new(options: LauncherOptions, env: &impl EnvSource) -> Self {
        let store = ConfigStore::new(&options.root_dir);
        let config = store.load(env);
        let (output_tx, output_rx) = unbounded();

        LauncherState {
            phase: LauncherPhase::NotStarted,
            bar: initial_bar_rect(&options.display),
            display: options.display,
            root_dir: options.root_dir,
            platform: options.platform,
            store,
            config,
            tools: Vec::new(),
            registry: ProcessRegistry::new(),
            log: ToolLog::default(),
            output_tx,
            output_rx,
        }
    }

    fn transition(&mut self, next: LauncherPhase) -> Result<()> {
        if !self.phase.can_transition(next) {
            return Err(LauncherError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!("Launcher {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Discover tools and enter the running phase
    pub fn start(&mut self) -> Result<()> {
        self.transition(LauncherPhase::Running)?;
        self.refresh_tools();
        Ok(())
    }

    pub fn phase(&self) -> LauncherPhase {
        self.phase
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn log(&self) -> &ToolLog {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn display(&self) -> Rect {
        self.display
    }

    pub fn bar(&self) -> Rect {
        self.bar
    }

    /// Rescan the root directory for launch scripts
    pub fn refresh_tools(&mut self) {
        self.tools = discover(&self.root_dir, self.platform);
    }

    /// Record where the bar actually is after the window system placed it
    pub fn set_bar_rect(&mut self, bar: Rect) {
        if bar != self.bar {
            tracing::debug!("Launcher bar moved to {:?}", bar);
            self.bar = bar;
        }
    }

    /// Tool area for the current bar and display, computed fresh each call
    pub fn tool_geometry(&self) -> WindowGeometry {
        allocate(&self.bar, &self.display)
    }

    /// Launch the tool at `index` with the current tool geometry
    pub fn launch(&mut self, index: usize) -> Result<RunId> {
        let tool = self
            .tools
            .get(index)
            .cloned()
            .ok_or(LauncherError::UnknownTool(index))?;
        let geometry = self.tool_geometry();
        if geometry.is_cramped() {
            tracing::warn!("Tool area {:?} is smaller than usable", geometry);
        }

        self.log.separator(&tool.name);
        self.log
            .info(Some(&tool.name), format!("Launching {}...", tool.display_name));

        match spawn_tool(&tool, &geometry, &self.root_dir, self.platform, &self.output_tx) {
            Ok(running) => {
                self.log.info(Some(&tool.name), running.summary.clone());
                Ok(self.registry.register(running))
            }
            Err(e) => {
                tracing::error!("Failed to launch {}: {}", tool.name, e);
                self.log
                    .error(Some(&tool.name), format!("Failed to launch: {}", e));
                Err(e)
            }
        }
    }

    /// Whether a tool with this name already has a live process
    pub fn is_tool_running(&self, index: usize) -> bool {
        self.tools
            .get(index)
            .map(|tool| self.registry.is_running(&tool.name))
            .unwrap_or(false)
    }

    /// Move pending tool output into the log and drop exited tools
    pub fn poll(&mut self) -> Vec<ExitedTool> {
        // Tools log progress on stderr too, so neither stream marks errors
        for output in self.output_rx.try_iter() {
            self.log.info(Some(&output.tool_name), output.line);
        }

        let exited = self.registry.reap();
        for tool in &exited {
            let code = tool
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let severity = if tool.exit_code == Some(0) {
                Severity::Info
            } else {
                Severity::Error
            };
            self.log.push(
                Some(&tool.tool_name),
                format!("Process exited with code: {}", code),
                severity,
            );
        }
        exited
    }

    /// Close every running tool, keeping the launcher open
    pub fn close_all(&mut self, grace: Duration) -> ShutdownReport {
        let report = self.registry.terminate_all(grace);
        self.log_shutdown(&report);
        report
    }

    fn log_shutdown(&mut self, report: &ShutdownReport) {
        for name in report.graceful.iter().chain(&report.killed) {
            self.log.info(Some(name), "Terminated");
        }
        for (name, error) in &report.failed {
            self.log
                .error(Some(name), format!("Failed to terminate: {}", error));
        }
    }

    /// Replace the configuration and persist it. On failure the new value
    /// stays in memory so the user can retry.
    pub fn update_config(&mut self, config: GlobalConfig) -> Result<()> {
        self.config = config;
        self.store.save(&self.config)
    }

    /// Terminate all tools and finish. Safe to call only once.
    pub fn shutdown(&mut self, grace: Duration) -> Result<ShutdownReport> {
        self.transition(LauncherPhase::ShuttingDown)?;
        tracing::info!(
            "Shutting down with {} running tools",
            self.registry.running_count()
        );

        let report = self.close_all(grace);
        self.transition(LauncherPhase::Terminated)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn options(root: &Path) -> LauncherOptions {
        LauncherOptions {
            root_dir: root.to_path_buf(),
            platform: Platform::Unix,
            display: Rect::new(0, 0, 1920, 1080),
        }
    }

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_phase_transitions() {
        assert!(LauncherPhase::NotStarted.can_transition(LauncherPhase::Running));
        assert!(LauncherPhase::Running.can_transition(LauncherPhase::ShuttingDown));
        assert!(LauncherPhase::ShuttingDown.can_transition(LauncherPhase::Terminated));
        assert!(!LauncherPhase::NotStarted.can_transition(LauncherPhase::Terminated));
        assert!(!LauncherPhase::Terminated.can_transition(LauncherPhase::Running));
    }

    #[test]
    fn test_start_discovers_tools() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("launch_pdf_ocr.sh"), "exit 0\n").unwrap();
        fs::write(dir.path().join("launch_pdf_splitter.sh"), "exit 0\n").unwrap();

        let mut state = LauncherState::new(options(dir.path()), &no_env());
        assert_eq!(state.phase(), LauncherPhase::NotStarted);
        assert!(state.tools().is_empty());

        state.start().unwrap();
        assert_eq!(state.phase(), LauncherPhase::Running);
        assert_eq!(state.tools().len(), 2);
        assert!(state.start().is_err());
    }

    #[test]
    fn test_missing_root_starts_with_no_tools() {
        let dir = tempdir().unwrap();
        let mut state = LauncherState::new(options(&dir.path().join("gone")), &no_env());

        state.start().unwrap();
        assert!(state.tools().is_empty());
        assert_eq!(state.config().settings.timeout, 60);
    }

    #[test]
    fn test_geometry_follows_bar() {
        let dir = tempdir().unwrap();
        let mut state = LauncherState::new(options(dir.path()), &no_env());

        assert_eq!(state.bar(), Rect::new(10, 10, 1900, 70));
        assert_eq!(state.tool_geometry().y, 80);

        state.set_bar_rect(Rect::new(0, 0, 1920, 40));
        let geometry = state.tool_geometry();
        assert_eq!(
            (geometry.x, geometry.y, geometry.width, geometry.height),
            (0, 40, 1920, 1040)
        );
    }

    #[test]
    fn test_launch_missing_script_is_spawn_error() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("launch_pdf_ocr.sh");
        fs::write(&script, "exit 0\n").unwrap();

        let mut state = LauncherState::new(options(dir.path()), &no_env());
        state.start().unwrap();
        fs::remove_file(&script).unwrap();

        let err = state.launch(0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Spawn);
        assert!(state.registry().is_empty());
        assert!(state.log().entries().any(|e| e.is_error()));

        assert!(matches!(state.launch(7), Err(LauncherError::UnknownTool(7))));
    }

    #[test]
    fn test_update_config_keeps_value_on_failure() {
        let dir = tempdir().unwrap();
        let mut state = LauncherState::new(options(dir.path()), &no_env());
        fs::write(dir.path().join("config"), "").unwrap();

        let mut config = state.config().clone();
        config.azure_openai.endpoint = "https://retry".to_string();

        assert!(state.update_config(config).is_err());
        assert_eq!(state.config().azure_openai.endpoint, "https://retry");
    }

    #[test]
    fn test_update_config_persists() {
        let dir = tempdir().unwrap();
        let mut state = LauncherState::new(options(dir.path()), &no_env());

        let mut config = state.config().clone();
        config.settings.timeout = 120;
        state.update_config(config).unwrap();

        let reloaded = LauncherState::new(options(dir.path()), &no_env());
        assert_eq!(reloaded.config().settings.timeout, 120);
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_poll_and_shutdown() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("launch_pdf_hello.sh"), "echo hello\nexit 1\n").unwrap();
        fs::write(dir.path().join("launch_pdf_waiter.sh"), "exec sleep 30\n").unwrap();

        let mut state = LauncherState::new(options(dir.path()), &no_env());
        state.start().unwrap();

        let hello = state
            .tools()
            .iter()
            .position(|t| t.name == "pdf_hello")
            .unwrap();
        let waiter = state
            .tools()
            .iter()
            .position(|t| t.name == "pdf_waiter")
            .unwrap();

        state.launch(hello).unwrap();
        state.launch(waiter).unwrap();
        assert!(state.is_tool_running(waiter));

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let mut exited = Vec::new();
        while exited.is_empty() && std::time::Instant::now() < deadline {
            exited = state.poll();
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(exited.len(), 1);
        assert_eq!(exited[0].exit_code, Some(1));

        // Reader threads may still be flushing
        std::thread::sleep(Duration::from_millis(200));
        state.poll();
        let texts: Vec<&str> = state.log().entries().map(|e| e.text.as_str()).collect();
        assert!(texts.contains(&"hello"));
        assert!(texts.contains(&"Process exited with code: 1"));

        let report = state.shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(report.closed_count(), 1);
        assert_eq!(state.phase(), LauncherPhase::Terminated);
        assert!(state.registry().is_empty());
        assert!(state.shutdown(Duration::from_secs(1)).is_err());
    }
}
