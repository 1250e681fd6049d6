use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

use crate::error::{LivenessError, ProcessNotFound};

/// Uniquely identifies one process instance. The OS reuses PIDs, so the start
/// time (seconds since the epoch) is part of the identity. A start time of 0
/// means the platform did not report one; such identities compare by PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub start_time: u64,
}

impl ProcessIdentity {
    pub fn new(pid: u32, start_time: u64) -> Self {
        Self { pid, start_time }
    }

    /// True if `current` (read from the live table) is the same instance.
    pub fn same_instance(&self, current: &ProcessIdentity) -> bool {
        self.pid == current.pid
            && (self.start_time == 0 || current.start_time == 0 || self.start_time == current.start_time)
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pid, self.start_time)
    }
}

/// Descriptive metadata captured from the process table at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMetadata {
    pub identity: ProcessIdentity,
    /// Command name as reported by the OS (what patterns are matched against).
    pub name: String,
    /// Path of the executable, or the command name when the path is hidden.
    pub executable: String,
    pub command_line: String,
}

/// One row of a process table enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub identity: ProcessIdentity,
    pub name: String,
}

/// Read-only view of the operating system's process table.
///
/// Implementations may cache between calls (hence `&mut self`), but every call
/// reflects the OS state at the moment it is made.
pub trait ProcessTable {
    fn exists(&mut self, pid: u32) -> bool;

    fn metadata(&mut self, pid: u32) -> Result<ProcessMetadata, ProcessNotFound>;

    /// Reports whether the exact instance named by `identity` is still running.
    /// A process that ended (or whose PID now belongs to a different process)
    /// is `Ok(false)`; `Err` is reserved for failures to perform the check.
    fn is_alive(&mut self, identity: &ProcessIdentity) -> Result<bool, LivenessError>;

    /// Enumerates every process visible to the caller, in no particular order.
    fn list_all(&mut self) -> Box<dyn Iterator<Item = ProcessEntry> + '_>;
}

/// [`ProcessTable`] backed by `sysinfo`.
pub struct SysinfoTable {
    sys: System,
}

impl SysinfoTable {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    fn refresh(&mut self, pid: Option<Pid>, with_details: bool) {
        let kind = if with_details {
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet)
        } else {
            ProcessRefreshKind::new()
        };
        match pid {
            Some(pid) => self
                .sys
                .refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, kind),
            None => self
                .sys
                .refresh_processes_specifics(ProcessesToUpdate::All, true, kind),
        };
    }

    /// Looks up a process that is actually running. Zombies have already exited
    /// and are treated as absent.
    fn running(&self, pid: Pid) -> Option<&sysinfo::Process> {
        self.sys
            .process(pid)
            .filter(|p| p.status() != ProcessStatus::Zombie)
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoTable {
    fn exists(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.refresh(Some(pid), false);
        self.running(pid).is_some()
    }

    fn metadata(&mut self, pid: u32) -> Result<ProcessMetadata, ProcessNotFound> {
        let sys_pid = Pid::from_u32(pid);
        self.refresh(Some(sys_pid), true);
        let process = self.running(sys_pid).ok_or(ProcessNotFound { pid })?;

        let name = process.name().to_string_lossy().into_owned();
        let executable = process
            .exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| name.clone());
        let command_line = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(ProcessMetadata {
            identity: ProcessIdentity::new(pid, process.start_time()),
            name,
            executable,
            command_line,
        })
    }

    /// `sysinfo` does not surface access errors, so this only ever resolves
    /// to alive or ended.
    fn is_alive(&mut self, identity: &ProcessIdentity) -> Result<bool, LivenessError> {
        let pid = Pid::from_u32(identity.pid);
        self.refresh(Some(pid), false);
        Ok(self
            .running(pid)
            .map(|p| identity.same_instance(&ProcessIdentity::new(identity.pid, p.start_time())))
            .unwrap_or(false))
    }

    fn list_all(&mut self) -> Box<dyn Iterator<Item = ProcessEntry> + '_> {
        self.refresh(None, false);
        Box::new(
            self.sys
                .processes()
                .values()
                // Linux reports threads as tasks sharing the parent's name.
                .filter(|p| p.thread_kind().is_none() && p.status() != ProcessStatus::Zombie)
                .map(|p| ProcessEntry {
                    identity: ProcessIdentity::new(p.pid().as_u32(), p.start_time()),
                    name: p.name().to_string_lossy().into_owned(),
                }),
        )
    }
}

/// Outcome of a successful liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Ended,
}

/// A process selected for watching. Metadata is captured once, when the
/// process is first selected, and never refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub identity: ProcessIdentity,
    pub name: String,
    pub executable: String,
    pub command_line: String,
    pub label: Option<String>,
}

impl ProcessRecord {
    /// Captures `pid` from the table. Fails if the process is not running at
    /// this instant.
    pub fn create(
        table: &mut dyn ProcessTable,
        pid: u32,
        label: Option<&str>,
    ) -> Result<Self, ProcessNotFound> {
        let meta = table.metadata(pid)?;
        Ok(Self {
            identity: meta.identity,
            name: meta.name,
            executable: meta.executable,
            command_line: meta.command_line,
            label: label.map(str::to_string),
        })
    }

    pub fn pid(&self) -> u32 {
        self.identity.pid
    }

    /// Checks the original identity, so a recycled PID reads as `Ended`.
    pub fn check_alive(&self, table: &mut dyn ProcessTable) -> Result<Liveness, LivenessError> {
        if table.is_alive(&self.identity)? {
            Ok(Liveness::Alive)
        } else {
            Ok(Liveness::Ended)
        }
    }

    fn started_at(&self) -> Option<DateTime<Local>> {
        if self.identity.start_time == 0 {
            return None;
        }
        let secs = i64::try_from(self.identity.start_time).ok()?;
        Local.timestamp_opt(secs, 0).single()
    }

    /// Multi-line human readable description used in logs and message bodies.
    pub fn describe(&self) -> String {
        let mut out = format!("PID {}: {}", self.pid(), self.executable);
        if let Some(label) = &self.label {
            out.push_str(&format!(" [{label}]"));
        }
        if let Some(started) = self.started_at() {
            out.push_str(&format!("\n  Started: {}", started.format("%Y-%m-%d %H:%M:%S")));
        }
        let command = if self.command_line.is_empty() {
            &self.name
        } else {
            &self.command_line
        };
        out.push_str(&format!("\n  Command: {command}"));
        out
    }

    /// Substitutes `{executable}`, `{name}`, `{pid}` and `{label}` in `template`.
    pub fn subject(&self, template: &str) -> String {
        template
            .replace("{executable}", &self.executable)
            .replace("{name}", &self.name)
            .replace("{pid}", &self.pid().to_string())
            .replace("{label}", self.label.as_deref().unwrap_or(""))
    }
}
