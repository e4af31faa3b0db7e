/// OS grouping of a tool process and everything it starts
///
/// A launch script is usually a shell that runs the real tool in the
/// foreground. Signalling only the shell would leave the tool running, so
/// every stop and kill goes to the whole group: a process group on Unix,
/// a kill-on-close job object on Windows.
use std::io;
use std::process::{Child, Command};
use sysinfo::{Pid, System};

#[cfg(unix)]
pub struct ProcessGroup {
    pgid: nix::unistd::Pid,
}

#[cfg(unix)]
impl ProcessGroup {
    /// Make the child lead a new process group
    pub fn prepare(command: &mut Command) {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    pub fn attach(child: &Child) -> io::Result<Self> {
        Ok(ProcessGroup {
            pgid: nix::unistd::Pid::from_raw(child.id() as i32),
        })
    }

    /// Send SIGTERM to every member. False when nothing could be signalled.
    pub fn terminate(&self) -> bool {
        nix::sys::signal::killpg(self.pgid, nix::sys::signal::Signal::SIGTERM).is_ok()
    }

    pub fn kill(&self) -> io::Result<()> {
        use nix::errno::Errno;
        match nix::sys::signal::killpg(self.pgid, nix::sys::signal::Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    /// No member is left. A leader that exited but was not reaped still counts.
    pub fn is_empty(&self) -> bool {
        matches!(
            nix::sys::signal::killpg(self.pgid, None),
            Err(nix::errno::Errno::ESRCH)
        )
    }
}

#[cfg(windows)]
pub struct ProcessGroup {
    job: windows::Win32::Foundation::HANDLE,
}

#[cfg(windows)]
impl ProcessGroup {
    pub fn prepare(_command: &mut Command) {}

    /// Put the child into a job that kills its members when closed
    pub fn attach(child: &Child) -> io::Result<Self> {
        use std::os::windows::io::AsRawHandle;
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::HANDLE;
        use windows::Win32::System::JobObjects::{
            AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation,
            SetInformationJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
            JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
        };

        let to_io = |e: windows::core::Error| io::Error::new(io::ErrorKind::Other, e);

        let job = unsafe { CreateJobObjectW(None, PCWSTR::null()) }.map_err(to_io)?;
        let group = ProcessGroup { job };

        let mut limits = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
        limits.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;

        unsafe {
            SetInformationJobObject(
                group.job,
                JobObjectExtendedLimitInformation,
                &limits as *const _ as *const std::ffi::c_void,
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            )
            .map_err(to_io)?;
            AssignProcessToJobObject(group.job, HANDLE(child.as_raw_handle() as isize))
                .map_err(to_io)?;
        }

        Ok(group)
    }

    /// Console tools have no polite stop signal on Windows
    pub fn terminate(&self) -> bool {
        false
    }

    pub fn kill(&self) -> io::Result<()> {
        use windows::Win32::System::JobObjects::TerminateJobObject;
        unsafe { TerminateJobObject(self.job, 1) }
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    pub fn is_empty(&self) -> bool {
        use windows::Win32::System::JobObjects::{
            JobObjectBasicAccountingInformation, QueryInformationJobObject,
            JOBOBJECT_BASIC_ACCOUNTING_INFORMATION,
        };

        let mut info = JOBOBJECT_BASIC_ACCOUNTING_INFORMATION::default();
        let queried = unsafe {
            QueryInformationJobObject(
                self.job,
                JobObjectBasicAccountingInformation,
                &mut info as *mut _ as *mut std::ffi::c_void,
                std::mem::size_of::<JOBOBJECT_BASIC_ACCOUNTING_INFORMATION>() as u32,
                None,
            )
        };
        queried.is_ok() && info.ActiveProcesses == 0
    }
}

#[cfg(windows)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;
        unsafe {
            let _ = CloseHandle(self.job);
        }
    }
}

impl std::fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProcessGroup")
    }
}

/// A process seen under a tool, identified by pid and start time so a
/// recycled pid is never mistaken for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descendant {
    pub pid: Pid,
    pub start_time: u64,
}

/// Every live descendant of `root`, found by walking parent links
pub fn descendants(system: &System, root: u32) -> Vec<Descendant> {
    let mut found: Vec<Descendant> = Vec::new();
    let mut frontier = vec![Pid::from_u32(root)];

    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) && !found.iter().any(|d| d.pid == *pid) {
                found.push(Descendant {
                    pid: *pid,
                    start_time: process.start_time(),
                });
                frontier.push(*pid);
            }
        }
    }

    found
}

/// Kill descendants that left their tool's group and are still running.
/// Returns how many were killed.
pub fn kill_strays(system: &mut System, strays: &[Descendant]) -> usize {
    if strays.is_empty() {
        return 0;
    }
    system.refresh_processes();

    let mut killed = 0;
    for stray in strays {
        if let Some(process) = system.process(stray.pid) {
            if process.start_time() == stray.start_time && process.kill() {
                tracing::warn!("Killed stray tool process {}", stray.pid);
                killed += 1;
            }
        }
    }
    killed
}

/// Whether `pid` is a running process. Zombies count as exited.
#[cfg(all(test, unix))]
pub(crate) fn pid_alive(pid: u32) -> bool {
    let pid = nix::unistd::Pid::from_raw(pid as i32);
    if nix::sys::signal::kill(pid, None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => true,
    }
}
