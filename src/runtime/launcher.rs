// SPDX-License-Identifier: MIT

//! Starts the worker process.
//!
//! The worker is this same executable, re-run with the worker-mode marker.
//! A sandbox identity, when supplied, has to be attached while the process
//! is being created; it cannot be added to a process that is already running.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use super::{
    conv::to_wide,
    error::{FollowerError, OsCode},
    identity::IdentityRef,
    mode::{VERBOSE_MARKER, WORKER_MARKER},
};

/// Program and arguments for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    /// The worker invocation for `program`: the program plus the worker marker.
    pub fn new(program: &Path, forward_verbose: bool) -> Self {
        let mut args = vec![OsString::from(WORKER_MARKER)];
        if forward_verbose {
            args.push(OsString::from(VERBOSE_MARKER));
        }
        Self { program: program.to_path_buf(), args }
    }

    /// The worker invocation for the running executable.
    pub fn for_current_exe(forward_verbose: bool) -> Result<Self, FollowerError> {
        let exe = std::env::current_exe().map_err(|e| {
            warn!(error = %e, "failed to get executable path");
            FollowerError::Io(e)
        })?;
        Ok(Self::new(&exe, forward_verbose))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// The full, quoted, NUL-terminated command line.
    pub fn command_line(&self) -> Result<Vec<u16>, FollowerError> {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(to_wide(self.program.as_os_str()));
        for arg in &self.args {
            parts.push(to_wide(arg));
        }
        quote_command_line(&parts)
    }
}

/// Process-creation attribute describing the capabilities granted to a
/// sandboxed worker.  The capability list is always empty.
#[derive(Debug)]
pub struct SecurityCapabilities<'a, Sid> {
    pub identity: &'a Sid,
    pub capabilities: &'a [Sid],
}

impl<'a, Sid> SecurityCapabilities<'a, Sid> {
    pub fn least_privilege(identity: &'a Sid) -> Self {
        Self { identity, capabilities: &[] }
    }
}

/// Creates processes.  The Win32 implementation lives in `spawn_windows`.
pub trait ProcessSpawner {
    type Sid;
    type Process;

    fn spawn(
        &mut self,
        command_line: &[u16],
        capabilities: Option<SecurityCapabilities<'_, Self::Sid>>,
    ) -> Result<Self::Process, OsCode>;
}

/// Start the worker.  There is no retry; a failure here ends startup.
pub fn spawn<S: ProcessSpawner>(
    spawner: &mut S,
    command: &WorkerCommand,
    identity: Option<&IdentityRef<S::Sid>>,
) -> Result<S::Process, FollowerError> {
    let cmdline = command.command_line()?;
    debug!(program = %command.program().display(), args = ?command.args(), "worker command line");
    match identity {
        Some(id) => info!(identity = id.name(), "spawning worker process in sandbox"),
        None => info!("spawning worker process normally"),
    }
    let caps = identity.map(|id| SecurityCapabilities::least_privilege(id.sid()));
    match spawner.spawn(&cmdline, caps) {
        Ok(process) => {
            info!(sandboxed = identity.is_some(), "worker process spawned");
            Ok(process)
        }
        Err(code) => {
            warn!(%code, "failed to spawn worker process");
            Err(FollowerError::Spawn(code))
        }
    }
}

/// Quote the program and arguments into one Windows command line.
///
/// See "Everyone quotes command line arguments the wrong way":
///   https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way
pub fn quote_command_line(parts: &[Vec<u16>]) -> Result<Vec<u16>, FollowerError> {
    let mut ret = vec![];
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            ret.push(' ' as u16);
        }
        append_arg(&mut ret, part)?;
    }
    ret.push(0); // NUL terminator
    Ok(ret)
}

fn append_arg(cmd: &mut Vec<u16>, arg: &[u16]) -> Result<(), FollowerError> {
    if arg.contains(&0) {
        return Err(FollowerError::CommandLine("nul character found in argument".to_string()));
    }
    if !requires_quoting(arg) {
        cmd.extend_from_slice(arg);
        return Ok(());
    }

    cmd.push('"' as u16);
    let mut backslash_count = 0;
    for &c in arg {
        if c == '\\' as u16 {
            backslash_count += 1;
            continue;
        }
        if c == '"' as u16 {
            // Escape all the backslashes, and add one for the escaped '"'.
            cmd.extend(std::iter::repeat_n('\\' as u16, backslash_count * 2 + 1));
        } else {
            // Backslashes aren't special here.
            cmd.extend(std::iter::repeat_n('\\' as u16, backslash_count));
        }
        cmd.push(c);
        backslash_count = 0;
    }

    // Trailing backslashes are doubled so the closing '"' stays a quote.
    cmd.extend(std::iter::repeat_n('\\' as u16, backslash_count * 2));
    cmd.push('"' as u16);
    Ok(())
}

fn requires_quoting(val: &[u16]) -> bool {
    val.is_empty() || val.iter().any(|&b| char_requires_quoting(b))
}

fn char_requires_quoting(b: u16) -> bool {
    b == ' ' as u16
    || b == '\t' as u16
    || b == '\n' as u16
    || b == 0x0bu16  // vertical tab
    || b == '"' as u16
}

/// Render a command line for the log.
pub fn display_command_line(cmdline: &[u16]) -> String {
    let end = cmdline.iter().position(|&c| c == 0).unwrap_or(cmdline.len());
    String::from_utf16_lossy(&cmdline[..end])
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Records spawn requests and hands out numbered processes.
    #[derive(Default)]
    pub struct RecordingSpawner {
        pub calls: Vec<(String, Option<(String, usize)>)>,
        pub fail: Option<OsCode>,
    }

    impl ProcessSpawner for RecordingSpawner {
        type Sid = String;
        type Process = u32;

        fn spawn(
            &mut self,
            command_line: &[u16],
            capabilities: Option<SecurityCapabilities<'_, String>>,
        ) -> Result<u32, OsCode> {
            self.calls.push((
                display_command_line(command_line),
                capabilities.map(|c| (c.identity.clone(), c.capabilities.len())),
            ));
            match self.fail {
                Some(code) => Err(code),
                None => Ok(1000 + self.calls.len() as u32),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::RecordingSpawner;
    use super::*;
    use crate::runtime::identity::{fake::MemoryStore, IdentityProfile, SandboxIdentityManager};

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn quoted(parts: &[&str]) -> String {
        let parts: Vec<Vec<u16>> = parts.iter().map(|p| wide(p)).collect();
        let out = quote_command_line(&parts).expect("quoting should succeed");
        assert_eq!(out.last(), Some(&0));
        display_command_line(&out)
    }

    #[test]
    fn worker_command_appends_the_worker_marker() {
        let cmd = WorkerCommand::new(Path::new("follower.exe"), false);
        assert_eq!(display_command_line(&cmd.command_line().unwrap()), "follower.exe --child");

        let cmd = WorkerCommand::new(Path::new("follower.exe"), true);
        assert_eq!(display_command_line(&cmd.command_line().unwrap()), "follower.exe --child --verbose");
    }

    #[test]
    fn worker_command_quotes_paths_with_spaces() {
        let dir = tempfile::Builder::new().prefix("window follower").tempdir().unwrap();
        let exe = dir.path().join("follower.exe");
        std::fs::write(&exe, b"").unwrap();
        let cmd = WorkerCommand::new(&exe, false);
        let line = display_command_line(&cmd.command_line().unwrap());
        assert!(line.starts_with('"'), "program path not quoted: {}", line);
        assert!(line.ends_with("\" --child"), "unexpected command line: {}", line);
    }

    #[test]
    fn quote_no_quoting_needed() {
        assert_eq!(quoted(&["prog.exe", "foo", "bar"]), "prog.exe foo bar");
    }

    #[test]
    fn quote_with_space_and_empty() {
        assert_eq!(quoted(&["prog.exe", "with space"]), "prog.exe \"with space\"");
        assert_eq!(quoted(&["prog.exe", ""]), "prog.exe \"\"");
    }

    #[test]
    fn quote_backslashes() {
        // Backslashes alone are not enough to trigger quoting.
        assert_eq!(quoted(&["prog.exe", "abc\\"]), "prog.exe abc\\");
        // Trailing backslashes inside quotes are doubled.
        assert_eq!(quoted(&["prog.exe", "a b\\"]), "prog.exe \"a b\\\\\"");
        // Backslashes before a quote are escaped along with the quote.
        assert_eq!(quoted(&["prog.exe", "a\\\\\"b"]), "prog.exe \"a\\\\\\\\\\\"b\"");
        assert_eq!(
            quoted(&["pr og.exe", "\\some\\directory with\\spaces", "argument2"]),
            "\"pr og.exe\" \"\\some\\directory with\\spaces\" argument2",
        );
    }

    #[test]
    fn quote_rejects_nul() {
        let err = quote_command_line(&[vec![b'a' as u16, 0, b'b' as u16]]).unwrap_err();
        assert!(matches!(err, FollowerError::CommandLine(_)));
    }

    #[test]
    fn spawn_without_identity_passes_no_capabilities() {
        let mut spawner = RecordingSpawner::default();
        let cmd = WorkerCommand::new(Path::new("w.exe"), false);
        let process = spawn(&mut spawner, &cmd, None).unwrap();
        assert_eq!(process, 1001);
        assert_eq!(spawner.calls, vec![("w.exe --child".to_string(), None)]);
    }

    #[test]
    fn spawn_with_identity_attaches_empty_capability_set() {
        let mut ids = SandboxIdentityManager::new(MemoryStore::default());
        let id = ids.ensure_identity(&IdentityProfile::new("Test.Container", "d", "d")).unwrap();
        let mut spawner = RecordingSpawner::default();
        let cmd = WorkerCommand::new(Path::new("w.exe"), false);
        spawn(&mut spawner, &cmd, Some(&id)).unwrap();
        assert_eq!(spawner.calls[0].1, Some((id.sid().clone(), 0)));
    }

    #[test]
    fn spawn_failure_carries_the_os_code() {
        let mut spawner = RecordingSpawner { fail: Some(OsCode(2)), ..Default::default() };
        let cmd = WorkerCommand::new(Path::new("missing.exe"), false);
        match spawn(&mut spawner, &cmd, None) {
            Err(FollowerError::Spawn(code)) => assert_eq!(code, OsCode(2)),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(spawner.calls.len(), 1, "spawn must not retry");
    }
}
