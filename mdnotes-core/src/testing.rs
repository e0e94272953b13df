//! In-memory stand-ins for the runtime, the native window layer and the
//! desktop launcher.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::Mutex;
use url::Url;

use crate::gatekeeper::{Launcher, NavigationGatekeeper};
use crate::manager::WindowHost;
use crate::registry::WindowId;
use crate::runtime::{NotesRuntime, RuntimeError, SessionId};

#[derive(Debug, Default)]
pub struct RuntimeLog {
    pub opened: Vec<(SessionId, PathBuf)>,
    pub closed: Vec<SessionId>,
    pub live: BTreeSet<SessionId>,
    pub released: usize,
}

impl RuntimeLog {
    pub fn open_count(&self) -> usize {
        self.live.len()
    }
}

pub type SharedLog = Arc<Mutex<RuntimeLog>>;

/// Hands out the lowest free id starting at 1, so ids get reused the way a
/// real runtime may reuse them.
pub struct FakeRuntime {
    port: u16,
    log: SharedLog,
    failing: Vec<PathBuf>,
    panicking: Vec<PathBuf>,
    gates: Vec<(PathBuf, mpsc::Receiver<()>)>,
}

impl FakeRuntime {
    pub fn new(port: u16) -> (Self, SharedLog) {
        let log = SharedLog::default();
        let runtime = Self {
            port,
            log: log.clone(),
            failing: Vec::new(),
            panicking: Vec::new(),
            gates: Vec::new(),
        };
        (runtime, log)
    }

    pub fn failing_on(mut self, path: &str) -> Self {
        self.failing.push(PathBuf::from(path));
        self
    }

    pub fn panicking_on(mut self, path: &str) -> Self {
        self.panicking.push(PathBuf::from(path));
        self
    }

    /// Opens of `path` hang until the returned sender fires (or five
    /// seconds pass, so a failing test cannot wedge the runtime thread).
    pub fn blocking_on(mut self, path: &str) -> (Self, mpsc::Sender<()>) {
        let (release, gate) = mpsc::channel();
        self.gates.push((PathBuf::from(path), gate));
        (self, release)
    }
}

impl NotesRuntime for FakeRuntime {
    fn open_notes(&mut self, path: &Path) -> Result<SessionId, RuntimeError> {
        if let Some((_, gate)) = self.gates.iter().find(|(p, _)| p == path) {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        if self.panicking.iter().any(|p| p == path) {
            panic!("runtime exploded opening {}", path.display());
        }
        if self.failing.iter().any(|p| p == path) {
            return Err(RuntimeError::OpenFailed {
                path: path.display().to_string(),
                reason: "no such directory".into(),
            });
        }

        let mut log = self.log.lock();
        let id = (1..=u8::MAX)
            .map(SessionId)
            .find(|id| !log.live.contains(id))
            .ok_or_else(|| RuntimeError::OpenFailed {
                path: path.display().to_string(),
                reason: "out of session ids".into(),
            })?;
        log.live.insert(id);
        log.opened.push((id, path.to_path_buf()));
        Ok(id)
    }

    fn close_notes(&mut self, id: SessionId) {
        let mut log = self.log.lock();
        log.live.remove(&id);
        log.closed.push(id);
    }

    fn server_port(&self) -> u16 {
        self.port
    }
}

impl Drop for FakeRuntime {
    fn drop(&mut self) {
        self.log.lock().released += 1;
    }
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    pub created: Vec<(WindowId, String)>,
    pub attached: Vec<(WindowId, String, NavigationGatekeeper)>,
    pub failures: Vec<WindowId>,
    pub released: Vec<WindowId>,
}

impl WindowHost for RecordingHost {
    fn create_window(&mut self, window: WindowId, title: &str) {
        self.created.push((window, title.to_string()));
    }

    fn attach_session(
        &mut self,
        window: WindowId,
        base_url: &str,
        gatekeeper: NavigationGatekeeper,
    ) {
        self.attached.push((window, base_url.to_string(), gatekeeper));
    }

    fn show_open_failure(&mut self, window: WindowId, _error: &RuntimeError) {
        self.failures.push(window);
    }

    fn release_window(&mut self, window: WindowId) {
        self.released.push(window);
    }
}

#[derive(Debug, Default)]
pub struct RecordingLauncher {
    opened: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn open_external(&self, url: &Url) -> Result<(), String> {
        self.opened.lock().push(url.to_string());
        if self.fail {
            Err("no default browser".to_string())
        } else {
            Ok(())
        }
    }
}
