/// Tool process spawning, tracking and termination
///
/// Each tool runs as an independent OS process. The launcher keeps one
/// [`RunningTool`] per child in a [`ProcessRegistry`] that lives on the UI
/// thread; only the output reader threads run elsewhere, and they talk to
/// the UI thread through a channel.
use chrono::{DateTime, Local};
use crossbeam::channel::Sender;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use sysinfo::System;

use crate::discovery::{Platform, ToolDescriptor};
use crate::error::{LauncherError, Result};
use crate::geometry::WindowGeometry;
use crate::process_group::{descendants, kill_strays, Descendant, ProcessGroup};

/// Grace period between the polite stop request and the hard kill
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Registry-assigned identifier of a launched tool instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One line written by a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub pid: u32,
    pub tool_name: String,
    pub stream: Stream,
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Stop requested, waiting for the process to exit on its own
    Stopping,
    Stopped {
        exit_code: Option<i32>,
    },
}

impl ProcessState {
    /// Running -> Stopping -> Stopped, or Running -> Stopped directly
    pub fn can_transition(&self, next: &ProcessState) -> bool {
        matches!(
            (self, next),
            (ProcessState::Running, ProcessState::Stopping)
                | (ProcessState::Running, ProcessState::Stopped { .. })
                | (ProcessState::Stopping, ProcessState::Stopped { .. })
        )
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self, ProcessState::Stopped { .. })
    }
}

/// How a tool gets started
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Log line written after a successful start
    pub summary: String,
}

impl LaunchPlan {
    /// Prefer running the tool's Python script with the venv interpreter.
    /// Otherwise go through the platform launch script.
    pub fn resolve(tool: &ToolDescriptor, root: &Path, platform: Platform) -> Self {
        let python = venv_python(root, platform);

        if let Some(script) = find_tool_script(root, &tool.name) {
            if python.exists() {
                return LaunchPlan {
                    summary: format!("Started: {}", file_label(&script)),
                    program: python.into_os_string(),
                    args: vec![script.into_os_string()],
                };
            }
        }

        let script = tool.launch_command.clone().into_os_string();
        let summary = format!("Started via script: {}", file_label(&tool.launch_command));
        match platform {
            Platform::Windows => LaunchPlan {
                program: "cmd".into(),
                args: vec!["/c".into(), script],
                summary,
            },
            Platform::Unix => LaunchPlan {
                program: "sh".into(),
                args: vec![script],
                summary,
            },
        }
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn venv_python(root: &Path, platform: Platform) -> PathBuf {
    match platform {
        Platform::Windows => root.join("venv").join("Scripts").join("python.exe"),
        Platform::Unix => root.join("venv").join("bin").join("python"),
    }
}

/// Python entry point for a tool: `src/pdf_<name>.py` or a close variant
pub fn find_tool_script(root: &Path, tool_name: &str) -> Option<PathBuf> {
    let src = root.join("src");
    [
        format!("pdf_{}.py", tool_name),
        format!("pdf_{}.py", tool_name.replace('_', "")),
        format!("{}.py", tool_name),
    ]
    .into_iter()
    .map(|name| src.join(name))
    .find(|path| path.is_file())
}

/// A launched tool process and the group of everything it started
#[derive(Debug)]
pub struct RunningTool {
    pub tool_name: String,
    pub display_name: String,
    pub pid: u32,
    pub started_at: DateTime<Local>,
    /// Log line describing how the tool was started
    pub summary: String,
    state: ProcessState,
    child: Child,
    group: ProcessGroup,
}

impl RunningTool {
    pub fn state(&self) -> ProcessState {
        self.state
    }

    fn transition(&mut self, next: ProcessState) {
        if self.state.can_transition(&next) {
            self.state = next;
        } else {
            tracing::debug!(
                "Ignoring {:?} -> {:?} for {} (pid {})",
                self.state,
                next,
                self.tool_name,
                self.pid
            );
        }
    }

    /// Check for exit without blocking. Returns the exit code once stopped.
    pub fn try_reap(&mut self) -> Option<Option<i32>> {
        if let ProcessState::Stopped { exit_code } = self.state {
            return Some(exit_code);
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.transition(ProcessState::Stopped {
                    exit_code: status.code(),
                });
                Some(status.code())
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to poll {} (pid {}): {}", self.tool_name, self.pid, e);
                None
            }
        }
    }

    /// The launched process has exited and nothing it started is left
    pub fn has_exited(&mut self) -> bool {
        self.try_reap().is_some() && self.group.is_empty()
    }

    /// Ask the whole group to exit. Returns false when no signal could be sent.
    pub fn request_stop(&mut self) -> bool {
        let delivered = self.group.terminate();
        if delivered {
            self.transition(ProcessState::Stopping);
        }
        delivered
    }

    /// Kill every process in the group and wait for the launched one
    pub fn force_kill(&mut self) -> std::io::Result<()> {
        self.group.kill()?;

        if self.state.is_alive() {
            let status = self.child.wait()?;
            self.transition(ProcessState::Stopped {
                exit_code: status.code(),
            });
        }
        Ok(())
    }
}

/// Start a tool with its window geometry in the environment.
///
/// The child runs with `root` as working directory. Its stdout and stderr
/// are streamed line by line into `output`.
pub fn spawn_tool(
    tool: &ToolDescriptor,
    geometry: &WindowGeometry,
    root: &Path,
    platform: Platform,
    output: &Sender<ToolOutput>,
) -> Result<RunningTool> {
    if !tool.launch_command.is_file() {
        return Err(LauncherError::ScriptNotFound(tool.launch_command.clone()));
    }

    let plan = LaunchPlan::resolve(tool, root, platform);
    let mut command = plan.command();
    command
        .current_dir(root)
        .envs(geometry.env_vars())
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    ProcessGroup::prepare(&mut command);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = command.spawn().map_err(|source| LauncherError::Spawn {
        tool: tool.display_name.clone(),
        source,
    })?;
    let pid = child.id();

    let group = match ProcessGroup::attach(&child) {
        Ok(group) => group,
        Err(source) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(LauncherError::Spawn {
                tool: tool.display_name.clone(),
                source,
            });
        }
    };

    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, pid, &tool.name, Stream::Stdout, output.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, pid, &tool.name, Stream::Stderr, output.clone());
    }

    tracing::info!(
        "Spawned {} (pid {}) at {}",
        tool.name,
        pid,
        geometry.placement_string()
    );

    Ok(RunningTool {
        tool_name: tool.name.clone(),
        display_name: tool.display_name.clone(),
        pid,
        started_at: Local::now(),
        summary: plan.summary,
        state: ProcessState::Running,
        child,
        group,
    })
}

fn spawn_reader<R>(reader: R, pid: u32, tool_name: &str, stream: Stream, tx: Sender<ToolOutput>)
where
    R: Read + Send + 'static,
{
    let tool_name = tool_name.to_string();
    let thread_name = format!("{}-{:?}", tool_name, stream).to_lowercase();

    let spawned = std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buffer = Vec::new();
            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buffer).trim_end().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        tracing::debug!("[{}] {}", tool_name, line);
                        let output = ToolOutput {
                            pid,
                            tool_name: tool_name.clone(),
                            stream,
                            line,
                        };
                        if tx.send(output).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Error reading output of {}: {}", tool_name, e);
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Could not start output reader: {}", e);
    }
}

/// A tool that has exited and left the registry
#[derive(Debug, Clone, PartialEq)]
pub struct ExitedTool {
    pub id: RunId,
    pub tool_name: String,
    pub display_name: String,
    pub exit_code: Option<i32>,
}

/// Outcome of terminating every registered tool
#[derive(Debug, Default, Clone)]
pub struct ShutdownReport {
    /// Exited after the stop request
    pub graceful: Vec<String>,
    /// Needed a hard kill
    pub killed: Vec<String>,
    /// Had already exited before shutdown started
    pub already_exited: Vec<String>,
    /// Could not be killed: (tool name, error)
    pub failed: Vec<(String, String)>,
}

impl ShutdownReport {
    /// Tools that were running when shutdown began
    pub fn closed_count(&self) -> usize {
        self.graceful.len() + self.killed.len()
    }
}

/// Every tool process started by this launcher
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    tools: Vec<(RunId, RunningTool)>,
    next_id: u64,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: RunningTool) -> RunId {
        let id = RunId(self.next_id);
        self.next_id += 1;
        self.tools.push((id, tool));
        id
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools that have not fully exited yet
    pub fn running_count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_running(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|(_, t)| t.tool_name == tool_name)
    }

    /// Remove and return every tool whose process group is gone
    pub fn reap(&mut self) -> Vec<ExitedTool> {
        let mut exited = Vec::new();

        self.tools.retain_mut(|(id, tool)| {
            if !tool.has_exited() {
                return true;
            }
            exited.push(ExitedTool {
                id: *id,
                tool_name: tool.tool_name.clone(),
                display_name: tool.display_name.clone(),
                exit_code: tool.try_reap().flatten(),
            });
            false
        });

        exited
    }

    /// Stop every tool group: polite request first, hard kill after
    /// `grace`, then a sweep for descendants that left their group.
    /// The registry is empty afterwards.
    pub fn terminate_all(&mut self, grace: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        for exited in self.reap() {
            report.already_exited.push(exited.tool_name);
        }
        if self.tools.is_empty() {
            return report;
        }

        let mut system = System::new();
        system.refresh_processes();
        let strays: Vec<Descendant> = self
            .tools
            .iter()
            .flat_map(|(_, tool)| descendants(&system, tool.pid))
            .collect();

        let mut pending: Vec<RunningTool> = Vec::new();
        for (_, mut tool) in self.tools.drain(..) {
            if tool.request_stop() {
                tracing::info!("Requested {} (pid {}) to stop", tool.tool_name, tool.pid);
                pending.push(tool);
            } else {
                kill_into_report(tool, &mut report);
            }
        }

        let deadline = Instant::now() + grace;
        while !pending.is_empty() && Instant::now() < deadline {
            pending.retain_mut(|tool| {
                if tool.has_exited() {
                    report.graceful.push(tool.tool_name.clone());
                    false
                } else {
                    true
                }
            });
            if !pending.is_empty() {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        for tool in pending {
            tracing::warn!("{} did not exit within {:?}, killing", tool.tool_name, grace);
            kill_into_report(tool, &mut report);
        }

        kill_strays(&mut system, &strays);
        report
    }
}

fn kill_into_report(mut tool: RunningTool, report: &mut ShutdownReport) {
    match tool.force_kill() {
        Ok(()) => report.killed.push(tool.tool_name),
        Err(e) => {
            tracing::error!("Failed to kill {} (pid {}): {}", tool.tool_name, tool.pid, e);
            report.failed.push((tool.tool_name, e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{allocate, Rect};
    #[cfg(unix)]
    use crate::process_group::pid_alive;
    use crossbeam::channel::{unbounded, Receiver};
    use std::fs;
    use tempfile::tempdir;

    fn descriptor(dir: &Path, name: &str, body: &str) -> ToolDescriptor {
        let path = dir.join(format!("launch_{}.sh", name));
        fs::write(&path, body).unwrap();
        ToolDescriptor::from_script(&path, Platform::Unix).unwrap()
    }

    fn geometry() -> WindowGeometry {
        allocate(&Rect::new(0, 0, 1920, 40), &Rect::new(0, 0, 1920, 1080))
    }

    fn wait_for_exit(registry: &mut ProcessRegistry) -> Vec<ExitedTool> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let exited = registry.reap();
            if !exited.is_empty() || Instant::now() > deadline {
                return exited;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn collect_lines(rx: &Receiver<ToolOutput>, count: usize) -> Vec<ToolOutput> {
        (0..count)
            .filter_map(|_| rx.recv_timeout(Duration::from_secs(10)).ok())
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        let stopped = ProcessState::Stopped { exit_code: Some(0) };
        assert!(ProcessState::Running.can_transition(&ProcessState::Stopping));
        assert!(ProcessState::Running.can_transition(&stopped));
        assert!(ProcessState::Stopping.can_transition(&stopped));
        assert!(!stopped.can_transition(&ProcessState::Running));
        assert!(!ProcessState::Stopping.can_transition(&ProcessState::Running));
        assert!(!stopped.is_alive());
    }

    #[test]
    fn test_missing_script_leaves_registry_unchanged() {
        let dir = tempdir().unwrap();
        let tool = descriptor(dir.path(), "pdf_ocr", "exit 0\n");
        fs::remove_file(&tool.launch_command).unwrap();

        let (tx, _rx) = unbounded();
        let mut registry = ProcessRegistry::new();

        let result = spawn_tool(&tool, &geometry(), dir.path(), Platform::Unix, &tx);
        assert!(matches!(result, Err(LauncherError::ScriptNotFound(_))));
        assert!(registry.is_empty());
        assert!(registry.reap().is_empty());
    }

    #[test]
    fn test_plan_falls_back_to_launch_script() {
        let dir = tempdir().unwrap();
        let tool = descriptor(dir.path(), "pdf_ocr", "exit 0\n");

        let plan = LaunchPlan::resolve(&tool, dir.path(), Platform::Unix);
        assert_eq!(plan.program, OsString::from("sh"));
        assert_eq!(plan.summary, "Started via script: launch_pdf_ocr.sh");

        let windows = LaunchPlan::resolve(&tool, dir.path(), Platform::Windows);
        assert_eq!(windows.program, OsString::from("cmd"));
        assert_eq!(windows.args[0], OsString::from("/c"));
    }

    #[test]
    fn test_plan_prefers_venv_python() {
        let dir = tempdir().unwrap();
        let tool = descriptor(dir.path(), "pdf_ocr", "exit 0\n");
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src").join("pdf_ocr.py"), "").unwrap();
        fs::create_dir_all(dir.path().join("venv").join("bin")).unwrap();
        fs::write(dir.path().join("venv").join("bin").join("python"), "").unwrap();

        let plan = LaunchPlan::resolve(&tool, dir.path(), Platform::Unix);
        assert_eq!(plan.summary, "Started: pdf_ocr.py");
        assert!(Path::new(&plan.program).ends_with("venv/bin/python"));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_passes_geometry_and_captures_output() {
        let dir = tempdir().unwrap();
        let tool = descriptor(
            dir.path(),
            "pdf_echo",
            "echo \"geometry=$TOOL_WINDOW_X,$TOOL_WINDOW_Y,$TOOL_WINDOW_WIDTH,$TOOL_WINDOW_HEIGHT\"\n\
             echo \"cwd=$(pwd)\"\n\
             echo oops >&2\n\
             exit 3\n",
        );

        let (tx, rx) = unbounded();
        let mut registry = ProcessRegistry::new();
        let running = spawn_tool(&tool, &geometry(), dir.path(), Platform::Unix, &tx).unwrap();
        assert_eq!(running.state(), ProcessState::Running);
        let id = registry.register(running);
        assert!(registry.is_running("pdf_echo"));

        let mut lines = collect_lines(&rx, 3);
        lines.sort_by(|a, b| a.line.cmp(&b.line));
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].line, "geometry=0,40,1920,1040");
        assert_eq!(lines[2].line, "oops");
        assert_eq!(lines[2].stream, Stream::Stderr);

        let cwd = lines[0].line.strip_prefix("cwd=").unwrap();
        assert_eq!(
            fs::canonicalize(cwd).unwrap(),
            fs::canonicalize(dir.path()).unwrap()
        );

        let exited = wait_for_exit(&mut registry);
        assert_eq!(exited.len(), 1);
        assert_eq!(exited[0].id, id);
        assert_eq!(exited[0].exit_code, Some(3));
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_all_stops_gracefully() {
        let dir = tempdir().unwrap();
        let tool = descriptor(dir.path(), "pdf_sleeper", "exec sleep 30\n");

        let (tx, _rx) = unbounded();
        let mut registry = ProcessRegistry::new();
        let running = spawn_tool(&tool, &geometry(), dir.path(), Platform::Unix, &tx).unwrap();
        registry.register(running);

        let report = registry.terminate_all(Duration::from_secs(5));
        assert_eq!(report.graceful, vec!["pdf_sleeper".to_string()]);
        assert!(report.killed.is_empty());
        assert_eq!(report.closed_count(), 1);
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_all_stops_tool_started_by_script() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("tool.pid");
        let tool = descriptor(
            dir.path(),
            "pdf_ocr",
            "sh -c 'echo $$ > tool.pid; exec sleep 30'\necho done\n",
        );

        let (tx, _rx) = unbounded();
        let mut registry = ProcessRegistry::new();
        let running = spawn_tool(&tool, &geometry(), dir.path(), Platform::Unix, &tx).unwrap();
        let script_pid = running.pid;
        registry.register(running);

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut tool_pid = None;
        while tool_pid.is_none() && Instant::now() < deadline {
            tool_pid = fs::read_to_string(&pid_file)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok());
            std::thread::sleep(POLL_INTERVAL);
        }
        let tool_pid = tool_pid.unwrap();
        assert_ne!(tool_pid, script_pid);
        assert!(pid_alive(tool_pid));

        let report = registry.terminate_all(Duration::from_secs(5));
        assert_eq!(report.closed_count(), 1);
        assert!(registry.is_empty());

        let deadline = Instant::now() + Duration::from_secs(5);
        while pid_alive(tool_pid) && Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
        }
        assert!(!pid_alive(tool_pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_reap_waits_for_background_children() {
        let dir = tempdir().unwrap();
        let tool = descriptor(dir.path(), "pdf_split", "sleep 30 &\nexit 0\n");

        let (tx, _rx) = unbounded();
        let mut registry = ProcessRegistry::new();
        let mut running = spawn_tool(&tool, &geometry(), dir.path(), Platform::Unix, &tx).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while running.try_reap().is_none() && Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
        }
        registry.register(running);

        // The script exited but its background child keeps the tool alive
        assert!(registry.reap().is_empty());
        assert!(registry.is_running("pdf_split"));

        let report = registry.terminate_all(Duration::from_secs(5));
        assert_eq!(report.closed_count(), 1);
        assert!(report.already_exited.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_all_kills_stubborn_tools() {
        let dir = tempdir().unwrap();
        let tool = descriptor(
            dir.path(),
            "pdf_stubborn",
            "trap '' TERM\nwhile true; do sleep 1; done\n",
        );

        let (tx, _rx) = unbounded();
        let mut registry = ProcessRegistry::new();
        let running = spawn_tool(&tool, &geometry(), dir.path(), Platform::Unix, &tx).unwrap();
        registry.register(running);

        // Let the shell install its trap
        std::thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        let report = registry.terminate_all(Duration::from_millis(300));
        assert_eq!(report.killed, vec!["pdf_stubborn".to_string()]);
        assert!(report.graceful.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_all_reports_exited_tools() {
        let dir = tempdir().unwrap();
        let tool = descriptor(dir.path(), "pdf_quick", "exit 0\n");

        let (tx, _rx) = unbounded();
        let mut registry = ProcessRegistry::new();
        let mut running = spawn_tool(&tool, &geometry(), dir.path(), Platform::Unix, &tx).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while running.try_reap().is_none() && Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
        }
        registry.register(running);

        let report = registry.terminate_all(Duration::from_secs(1));
        assert_eq!(report.already_exited, vec!["pdf_quick".to_string()]);
        assert_eq!(report.closed_count(), 0);
    }
}
