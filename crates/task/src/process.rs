//! External process lifecycle control.
//!
//! Every stage process runs in its own process group so termination can
//! address the whole tree (`kill(-pgid, ...)`). Waiting goes through
//! `wait4(2)` on a blocking thread so the exit status carries resource
//! usage, which `std`'s `ExitStatus` does not expose.

use dagrun_core::{Error, ResourceUsage, Result, KILL_GRACE};
use std::process::{ChildStderr, ChildStdout, Command};
use std::time::Duration;

/// How a stage's process exited
#[derive(Debug, Clone, Copy)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub usage: ResourceUsage,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The exit code, folding death-by-signal into the shell convention
    /// (128 + signal) so the well-known OOM status 137 is recognized either
    /// way the kernel reports it.
    pub fn status_code(&self) -> Option<i32> {
        self.code.or_else(|| self.signal.map(|s| 128 + s))
    }

    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exited with status {code}"),
            (None, Some(sig)) => format!("terminated by signal {sig}"),
            (None, None) => "stopped without an exit status".to_string(),
        }
    }
}

/// A spawned stage process with its pipe ends taken out
pub struct SpawnedProcess {
    pub pid: u32,
    pub pgid: i32,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Start `cmd` in a fresh process group.
pub fn spawn(mut cmd: Command, operation: &str) -> Result<SpawnedProcess> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::io(format!("spawning {operation}"), e))?;
    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // The child is reaped through wait4, not Child::wait; dropping the
    // handle neither kills nor waits.
    drop(child);

    Ok(SpawnedProcess {
        pid,
        // process_group(0) makes the child the leader of a group whose id is
        // its own pid
        pgid: pid as i32,
        stdout,
        stderr,
    })
}

/// Reap the process and read its resource usage from the exit status.
pub async fn wait_with_usage(pid: u32) -> Result<ExitReport> {
    let report = tokio::task::spawn_blocking(move || wait4(pid as libc::pid_t))
        .await
        .map_err(|e| Error::scheduler(format!("wait task for pid {pid} aborted: {e}")))??;
    Ok(report)
}

fn wait4(pid: libc::pid_t) -> Result<ExitReport> {
    let mut status: libc::c_int = 0;
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

    loop {
        let rc = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(Error::io(format!("waiting for process {pid}"), err));
        }
        break;
    }

    let (code, signal) = if libc::WIFEXITED(status) {
        (Some(libc::WEXITSTATUS(status)), None)
    } else if libc::WIFSIGNALED(status) {
        (None, Some(libc::WTERMSIG(status)))
    } else {
        (None, None)
    };

    Ok(ExitReport {
        code,
        signal,
        usage: decode_rusage(&usage),
    })
}

fn decode_rusage(usage: &libc::rusage) -> ResourceUsage {
    ResourceUsage {
        // ru_maxrss is reported in kibibytes on Linux
        max_rss_kib: usage.ru_maxrss.max(0) as u64,
        user_time: timeval_duration(&usage.ru_utime),
        system_time: timeval_duration(&usage.ru_stime),
    }
}

fn timeval_duration(tv: &libc::timeval) -> Duration {
    Duration::new(tv.tv_sec.max(0) as u64, (tv.tv_usec.max(0) as u32) * 1_000)
}

/// Ask a process group to terminate, then kill it unconditionally after the
/// grace period. Returns an error if the group no longer exists.
pub fn terminate_group(pgid: i32) -> Result<()> {
    let rc = unsafe { libc::kill(-pgid, libc::SIGTERM) };
    if rc != 0 {
        return Err(Error::io(
            format!("signalling process group {pgid}"),
            std::io::Error::last_os_error(),
        ));
    }

    tokio::spawn(async move {
        tokio::time::sleep(KILL_GRACE).await;
        unsafe { libc::kill(-pgid, libc::SIGKILL) };
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[tokio::test]
    async fn reports_exit_code_and_usage() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("exit 7")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let spawned = spawn(cmd, "sh").unwrap();
        let report = wait_with_usage(spawned.pid).await.unwrap();

        assert_eq!(report.code, Some(7));
        assert!(!report.success());
        assert_eq!(report.status_code(), Some(7));
    }

    #[tokio::test]
    async fn folds_signal_death_into_shell_convention() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("kill -9 $$")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let spawned = spawn(cmd, "sh").unwrap();
        let report = wait_with_usage(spawned.pid).await.unwrap();

        assert_eq!(report.code, None);
        assert_eq!(report.signal, Some(libc::SIGKILL));
        assert_eq!(report.status_code(), Some(137));
    }

    #[tokio::test]
    async fn terminate_group_stops_a_sleeping_process() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("sleep 30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let spawned = spawn(cmd, "sh").unwrap();
        terminate_group(spawned.pgid).unwrap();
        let report = wait_with_usage(spawned.pid).await.unwrap();

        assert_eq!(report.signal, Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn terminating_a_dead_group_errors() {
        // A pgid that cannot exist: pid 1's group cannot be signalled by us,
        // and a freshly-reaped child's group is gone. Use an absurd value.
        assert!(terminate_group(i32::MAX - 1).is_err());
    }
}
