use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};

/// Name of the pid file recorded inside each account's profile directory.
pub const PID_FILE: &str = "engine.pid";

pub struct ProcessHandle {
    child: Child,
    stdin_tx: mpsc::Sender<String>,
    pid_file: PathBuf,
}

impl ProcessHandle {
    /// Spawns the automation host with piped stdio. Stdout lines are
    /// forwarded to `line_tx`, stderr is logged. The child runs in its own
    /// process group and its pid is recorded in the profile directory so a
    /// later run can reap an orphaned browser tree.
    pub async fn spawn(
        host_dir: &Path,
        profile_dir: &Path,
        command: &str,
        args: &[&str],
        line_tx: mpsc::Sender<String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(host_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::SpawnFailed(e.to_string()))?;

        let stdout = child.stdout.take().ok_or(EngineError::NotRunning)?;
        let stderr = child.stderr.take().ok_or(EngineError::NotRunning)?;
        let stdin = child.stdin.take().ok_or(EngineError::NotRunning)?;

        let pid_file = profile_dir.join(PID_FILE);
        if let Some(pid) = child.id() {
            if let Err(e) = std::fs::write(&pid_file, pid.to_string()) {
                tracing::warn!(error = %e, "Failed to record engine pid");
            }
        }

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(100);

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!("engine stderr: {}", line);
            }
        });

        Ok(Self {
            child,
            stdin_tx,
            pid_file,
        })
    }

    pub async fn send(&self, line: &str) -> Result<()> {
        let msg = if line.ends_with('\n') {
            line.to_string()
        } else {
            format!("{}\n", line)
        };

        self.stdin_tx
            .send(msg)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(EngineError::Io)?;
        let _ = std::fs::remove_file(&self.pid_file);
        Ok(())
    }

    pub fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        self.child.try_wait().map_err(EngineError::Io)
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}
