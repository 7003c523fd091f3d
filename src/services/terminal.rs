use crate::constants::buffers::{PTY_CHANNEL_DEPTH, PTY_READ_CHUNK};
use crate::errors::AgentError;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("failed to allocate pseudo-terminal: {0}")]
    Allocate(String),
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("failed to resize terminal: {0}")]
    Resize(String),
    #[error("terminal session is closed")]
    Closed,
    #[error("terminal io failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TerminalError> for AgentError {
    fn from(err: TerminalError) -> Self {
        match err {
            TerminalError::Allocate(_) | TerminalError::Spawn { .. } => {
                AgentError::connection(err.to_string())
            }
            TerminalError::Resize(_) => AgentError::internal(err.to_string()),
            TerminalError::Closed | TerminalError::Io(_) => AgentError::command(err.to_string()),
        }
    }
}

/// Handles released exactly once, by the exit watcher or by `close`.
struct Descriptors {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
}

struct SessionState {
    exited: AtomicBool,
    exit_code: Mutex<Option<u32>>,
    descriptors: Mutex<Option<Descriptors>>,
    exit_tx: watch::Sender<bool>,
}

impl SessionState {
    /// Returns true for the single caller that actually released the handles.
    fn release(&self) -> bool {
        let taken = self
            .descriptors
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        taken.is_some()
    }

    fn mark_exited(&self, code: Option<u32>) {
        *self.exit_code.lock().unwrap_or_else(|err| err.into_inner()) = code;
        self.exited.store(true, Ordering::SeqCst);
        self.release();
        let _ = self.exit_tx.send(true);
    }

    fn write_all(&self, data: &[u8]) -> Result<usize, TerminalError> {
        let mut guard = self
            .descriptors
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let descriptors = guard.as_mut().ok_or(TerminalError::Closed)?;
        descriptors.writer.write_all(data)?;
        descriptors.writer.flush()?;
        Ok(data.len())
    }
}

/// A child process attached to a pseudo-terminal.
///
/// Reads yield raw chunks exactly as the pty produced them; there is no line
/// buffering or framing at this layer. A background watcher releases the pty
/// as soon as the child exits.
pub struct TerminalSession {
    program: String,
    state: Arc<SessionState>,
    output: mpsc::Receiver<Vec<u8>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
    exit_rx: watch::Receiver<bool>,
}

impl TerminalSession {
    pub fn open(
        program: &str,
        args: &[String],
        cols: u16,
        rows: u16,
    ) -> Result<Self, TerminalError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| TerminalError::Allocate(err.to_string()))?;

        let mut builder = CommandBuilder::new(program);
        builder.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            builder.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|err| TerminalError::Spawn {
                program: program.to_string(),
                reason: err.to_string(),
            })?;
        drop(pair.slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();
        let handles = pair
            .master
            .try_clone_reader()
            .and_then(|reader| pair.master.take_writer().map(|writer| (reader, writer)));
        let (mut reader, writer) = match handles {
            Ok(handles) => handles,
            Err(err) => {
                let _ = killer.kill();
                let _ = child.wait();
                return Err(TerminalError::Allocate(err.to_string()));
            }
        };

        let (exit_tx, exit_rx) = watch::channel(false);
        let state = Arc::new(SessionState {
            exited: AtomicBool::new(false),
            exit_code: Mutex::new(None),
            descriptors: Mutex::new(Some(Descriptors {
                master: pair.master,
                writer,
            })),
            exit_tx,
        });

        let (output_tx, output) = mpsc::channel::<Vec<u8>>(PTY_CHANNEL_DEPTH);
        std::thread::spawn(move || {
            let mut buf = [0u8; PTY_READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(ref err) if err.kind() == IoErrorKind::Interrupted => continue,
                    // EIO once the child side is gone.
                    Err(_) => break,
                }
            }
        });

        let watcher_state = state.clone();
        std::thread::spawn(move || {
            let code = child.wait().ok().map(|status| status.exit_code());
            watcher_state.mark_exited(code);
        });

        Ok(Self {
            program: program.to_string(),
            state,
            output,
            killer: Mutex::new(killer),
            pid,
            exit_rx,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Next chunk of output; `None` once the stream has ended.
    pub async fn read(&mut self) -> Option<Vec<u8>> {
        self.output.recv().await
    }

    pub async fn write(&self, data: &[u8]) -> Result<usize, TerminalError> {
        let state = self.state.clone();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || state.write_all(&data))
            .await
            .map_err(|err| TerminalError::Io(std::io::Error::other(err.to_string())))?
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        let guard = self
            .state
            .descriptors
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let descriptors = guard.as_ref().ok_or(TerminalError::Closed)?;
        descriptors
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| TerminalError::Resize(err.to_string()))
    }

    pub fn has_exited(&self) -> bool {
        self.state.exited.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.state
            .descriptors
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    pub fn exit_code(&self) -> Option<u32> {
        *self
            .state
            .exit_code
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    /// Resolves once the exit watcher has observed the child exiting.
    pub async fn wait_exit(&self) {
        let mut rx = self.exit_rx.clone();
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Idempotent. After a natural exit this is a no-op; otherwise the child
    /// and its process group get SIGKILL and the pty handles are released here.
    pub fn close(&self) {
        if self.has_exited() {
            return;
        }
        self.force_kill();
        self.state.release();
    }

    fn force_kill(&self) {
        if self.pid.map(sigkill_group).unwrap_or(false) {
            return;
        }
        if let Ok(mut killer) = self.killer.lock() {
            let _ = killer.kill();
        }
    }
}

/// The child leads its own session, so its pid is also its group id.
#[cfg(unix)]
fn sigkill_group(pid: u32) -> bool {
    let pid = pid as libc::pid_t;
    unsafe { libc::kill(-pid, libc::SIGKILL) == 0 || libc::kill(pid, libc::SIGKILL) == 0 }
}

#[cfg(not(unix))]
fn sigkill_group(_pid: u32) -> bool {
    false
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_creates_no_session() {
        let err = TerminalSession::open("/definitely/not/a/binary", &[], 80, 24)
            .err()
            .expect("spawn must fail");
        let agent: AgentError = err.into();
        assert_eq!(agent.kind, crate::errors::ErrorKind::Connection);
    }

    #[test]
    fn closed_error_maps_to_command_error() {
        let agent: AgentError = TerminalError::Closed.into();
        assert_eq!(agent.kind, crate::errors::ErrorKind::Command);
    }
}
