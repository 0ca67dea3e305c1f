/// Child process lifecycle for one tracked worker, generalized from the
/// teacher's single-client manager to "one of N workers of a given role."
///
/// Spawns `worker --role <role> --dispatcher <addr> --id <id>`, tracks
/// liveness via `try_wait`, and auto-restarts on an unexpected exit with
/// the same capped-backoff shape the teacher uses for its own child.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crawl_protocol::messages::WorkerRole;

pub enum ProcessStatus {
    Running,
    Exited(Option<i32>),
    NotStarted,
}

pub struct ProcessManager {
    pub role: WorkerRole,
    pub id: String,
    worker_bin: PathBuf,
    dispatcher_addr: String,
    child: Option<Child>,
    last_exit: Option<Instant>,
    restart_count: u32,
}

impl ProcessManager {
    pub fn new(role: WorkerRole, id: String, worker_bin: PathBuf, dispatcher_addr: String) -> Self {
        Self { role, id, worker_bin, dispatcher_addr, child: None, last_exit: None, restart_count: 0 }
    }

    pub fn pid(&self) -> Option<i64> {
        self.child.as_ref().map(|c| c.id() as i64)
    }

    pub fn spawn(&mut self) -> std::io::Result<()> {
        let child = Command::new(&self.worker_bin)
            .args(["--role", self.role.as_str(), "--dispatcher", &self.dispatcher_addr, "--id", &self.id])
            .spawn()?;
        info!(role = self.role.as_str(), id = %self.id, pid = child.id(), "spawned worker process");
        self.child = Some(child);
        Ok(())
    }

    pub fn check(&mut self) -> ProcessStatus {
        let Some(child) = self.child.as_mut() else { return ProcessStatus::NotStarted };
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code();
                warn!(role = self.role.as_str(), id = %self.id, exit_code = ?code, "worker process exited");
                self.child = None;
                self.last_exit = Some(Instant::now());
                ProcessStatus::Exited(code)
            }
            Ok(None) => ProcessStatus::Running,
            Err(e) => {
                warn!(role = self.role.as_str(), id = %self.id, error = %e, "error checking worker process");
                self.child = None;
                ProcessStatus::Exited(None)
            }
        }
    }

    pub fn should_restart(&self) -> bool {
        match self.last_exit {
            Some(last) => {
                let backoff_secs = std::cmp::min(self.restart_count as u64 * 2, 30).max(2);
                last.elapsed() >= Duration::from_secs(backoff_secs)
            }
            None => true,
        }
    }

    pub fn restart(&mut self) -> std::io::Result<()> {
        self.restart_count += 1;
        warn!(role = self.role.as_str(), id = %self.id, restart_count = self.restart_count, "restarting worker");
        self.spawn()
    }

    pub fn reset_backoff(&mut self) {
        if self.restart_count > 0 && self.last_exit.map_or(false, |t| t.elapsed() > Duration::from_secs(60)) {
            self.restart_count = 0;
        }
    }

    /// Graceful-then-kill shutdown: SIGTERM (unix) or a plain kill elsewhere,
    /// waited out up to `timeout` before a hard kill.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let Some(child) = self.child.as_mut() else { return true };

        #[cfg(unix)]
        {
            // Shelling out to `kill` avoids pulling in a signals crate for one SIGTERM.
            let _ = Command::new("kill").arg(child.id().to_string()).status();
        }
        #[cfg(not(unix))]
        {
            let _ = child.kill();
        }

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(role = self.role.as_str(), id = %self.id, exit_code = ?status.code(), "worker shut down gracefully");
                    self.child = None;
                    return true;
                }
                Ok(None) => {
                    if start.elapsed() >= timeout {
                        warn!(role = self.role.as_str(), id = %self.id, "worker did not exit in time, killing");
                        let _ = child.kill();
                        let _ = child.wait();
                        self.child = None;
                        return false;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(_) => {
                    self.child = None;
                    return false;
                }
            }
        }
    }
}
