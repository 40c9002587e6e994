use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a tracked child was spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Sync,
    Async,
}

#[derive(Debug, Clone)]
struct TrackedProcess {
    pid: u32,
    kind: ProcessKind,
}

/// Grace period between the termination request and the forced kill.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Process-wide registry of children the orchestrator has spawned.
///
/// Adapters register a child's pid before handing it work and unregister
/// after observing its exit; a shutdown signal sweeps whatever is still
/// live. The sweep iterates a snapshot of the registry so registrations
/// racing the sweep are neither lost nor double-killed.
pub struct ProcessManager {
    next_token: AtomicU64,
    live: DashMap<u64, TrackedProcess>,
    handlers_installed: AtomicBool,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            live: DashMap::new(),
            handlers_installed: AtomicBool::new(false),
        }
    }

    /// Adds a child to the live set. The returned token is the handle for
    /// [`ProcessManager::unregister`].
    pub fn register(&self, pid: u32, kind: ProcessKind) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.live.insert(token, TrackedProcess { pid, kind });
        debug!("Registered {:?} process pid={} token={}", kind, pid, token);
        token
    }

    /// Removes a child after its exit has been observed.
    pub fn unregister(&self, token: u64) {
        if self.live.remove(&token).is_some() {
            debug!("Unregistered process token={}", token);
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Sends a graceful termination signal to every live child, waits up to
    /// the grace period, then forces termination on survivors.
    pub async fn cleanup_all(&self) {
        let snapshot: Vec<(u64, TrackedProcess)> = self
            .live
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        if snapshot.is_empty() {
            return;
        }

        info!("Terminating {} live child process(es)", snapshot.len());

        for (_, proc) in &snapshot {
            terminate(proc.pid);
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        loop {
            if !snapshot.iter().any(|(_, proc)| is_alive(proc.pid)) {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }

        for (_, proc) in &snapshot {
            if is_alive(proc.pid) {
                warn!(
                    "{:?} process pid={} survived SIGTERM, killing",
                    proc.kind, proc.pid
                );
                force_kill(proc.pid);
            }
        }

        for (token, _) in &snapshot {
            self.live.remove(token);
        }
    }

    /// Installs interrupt/termination handlers that sweep the registry and
    /// exit with code 130. Idempotent; safe to call from any task.
    pub fn install_signal_handlers(self: &Arc<Self>) {
        if self.handlers_installed.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            warn!("Shutdown signal received, sweeping child processes");
            manager.cleanup_all().await;
            std::process::exit(130);
        });
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}

#[cfg(not(unix))]
fn force_kill(_pid: u32) {}

#[cfg(not(unix))]
fn is_alive(_pid: u32) -> bool {
    false
}
