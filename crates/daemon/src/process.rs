//! Shared helpers for external media processes.
//!
//! Signal delivery by pid, stderr draining, and exit-notification plumbing
//! used by both the stream supervisor and the recording controller.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::sync::watch;
use tracing::debug;

/// Request graceful termination (SIGTERM) of a process by pid.
#[cfg(unix)]
pub fn request_termination(pid: u32) {
    // The pid may already be gone; a failed kill is not an error here.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

/// Forcibly kill (SIGKILL) a process by pid.
#[cfg(unix)]
pub fn force_kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub fn request_termination(_pid: u32) {}

#[cfg(not(unix))]
pub fn force_kill(_pid: u32) {}

/// Drain a child's stderr line by line into the log.
///
/// ffmpeg writes progress and warnings to stderr; a full, unread pipe
/// buffer would eventually block the process, so every piped stderr gets
/// one of these tasks.
pub fn spawn_stderr_drain(tool: &'static str, camera_id: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                debug!(camera_id = %camera_id, tool, "{}", trimmed);
            }
        }
    });
}

/// Wait until the exit notification fires.
///
/// Resolves immediately if the process already exited; a dropped sender
/// (monitor task gone) counts as exited.
pub async fn await_exit(exited: &mut watch::Receiver<bool>) {
    while !*exited.borrow() {
        if exited.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_await_exit_resolves_on_notification() {
        let (tx, mut rx) = watch::channel(false);

        let waiter = tokio::spawn(async move {
            await_exit(&mut rx).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve after notification")
            .unwrap();
    }

    #[tokio::test]
    async fn test_await_exit_resolves_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), await_exit(&mut rx))
            .await
            .expect("dropped sender should unblock the waiter");
    }

    #[tokio::test]
    async fn test_await_exit_immediate_when_already_exited() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_millis(100), await_exit(&mut rx))
            .await
            .expect("already-exited process should not block");
    }
}
