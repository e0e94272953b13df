//! Facade over the external notes runtime.
//!
//! The runtime parses and serves a notes directory over local HTTP. The shell
//! only ever talks to it through [`NotesRuntime`]: open a path and get back a
//! session id, close a session, and read the port all sessions are served on.
//!
//! The runtime is owned by one dedicated thread. [`RuntimeClient`] is the
//! shared, cloneable handle the rest of the crate uses: it queues commands for
//! that thread and never calls the runtime itself, so nothing on the UI loop
//! waits for a slow open. Commands run in the order they were queued. When the
//! last client is dropped the thread finishes the queue, releases the runtime
//! and is joined.

use std::ffi::CString;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::events::{EventSender, ShellEvent};
use crate::registry::WindowId;

/// Runtime-assigned identifier of an open notes session.
///
/// Only unique among currently open sessions; the runtime may hand the same
/// value out again once a session is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u8);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to create notes runtime: {0}")]
    CreateFailed(String),
    #[error("path cannot be passed to the notes runtime: {0}")]
    InvalidPath(String),
    #[error("notes runtime could not open {path}: {reason}")]
    OpenFailed { path: String, reason: String },
    #[error("notes runtime panicked: {0}")]
    WorkerPanicked(String),
    #[error("notes runtime thread is no longer running")]
    Unavailable,
}

/// The four operations the external runtime exposes. Releasing the runtime
/// is the implementor's `Drop`.
pub trait NotesRuntime: Send {
    fn open_notes(&mut self, path: &Path) -> Result<SessionId, RuntimeError>;

    /// Must tolerate ids that are already closed or were never issued.
    fn close_notes(&mut self, id: SessionId);

    fn server_port(&self) -> u16;
}

/// Result of a successful open: the session id plus the port it is served on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedSession {
    pub id: SessionId,
    pub port: u16,
}

enum OpenReply {
    /// Post a [`ShellEvent::SessionOpened`] for this window.
    Event {
        window: WindowId,
        events: EventSender,
    },
    Direct(oneshot::Sender<Result<OpenedSession, RuntimeError>>),
}

enum Command {
    Open { path: PathBuf, reply: OpenReply },
    Close(SessionId),
    Port(oneshot::Sender<u16>),
    Release,
}

/// The runtime thread and the queue feeding it.
struct RuntimeThread {
    commands: mpsc::UnboundedSender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl Drop for RuntimeThread {
    fn drop(&mut self) {
        // Anything queued before this still runs.
        let _ = self.commands.send(Command::Release);
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            log::error!("Notes runtime thread panicked while releasing the runtime");
        }
    }
}

/// Shared handle to the one runtime instance.
///
/// Every method only queues work, except the ones documented as blocking,
/// which wait for the runtime thread to reach them and must stay off the UI
/// loop.
#[derive(Clone)]
pub struct RuntimeClient {
    inner: Arc<RuntimeThread>,
}

impl fmt::Debug for RuntimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClient")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl RuntimeClient {
    /// Move `runtime` onto its own thread.
    pub fn new(runtime: impl NotesRuntime + 'static) -> Result<Self, RuntimeError> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let runtime: Box<dyn NotesRuntime> = Box::new(runtime);
        let worker = thread::Builder::new()
            .name("mdnotes-runtime".to_string())
            .spawn(move || run_runtime(runtime, receiver))
            .map_err(|e| RuntimeError::CreateFailed(format!("no runtime thread: {e}")))?;

        Ok(Self {
            inner: Arc::new(RuntimeThread {
                commands,
                worker: Some(worker),
            }),
        })
    }

    /// Best-effort close. Unknown or already-closed ids are the runtime's
    /// problem and never surface here.
    pub fn close(&self, id: SessionId) {
        if self.inner.commands.send(Command::Close(id)).is_err() {
            log::warn!("Notes runtime is gone, session {} not closed", id);
        }
    }

    /// Blocking. Waits for every command queued before it.
    pub fn server_port(&self) -> Result<u16, RuntimeError> {
        let (reply, port) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Port(reply))
            .map_err(|_| RuntimeError::Unavailable)?;
        port.blocking_recv().map_err(|_| RuntimeError::Unavailable)
    }

    /// Blocking. Open `path` and read the server port right after.
    pub fn open_session(&self, path: &Path) -> Result<OpenedSession, RuntimeError> {
        let (reply, opened) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Open {
                path: path.to_path_buf(),
                reply: OpenReply::Direct(reply),
            })
            .map_err(|_| RuntimeError::Unavailable)?;
        opened.blocking_recv().map_err(|_| RuntimeError::Unavailable)?
    }

    /// Queue an open of `path` for `window`. The outcome is posted back as
    /// [`ShellEvent::SessionOpened`], including when the runtime thread is
    /// gone.
    ///
    /// If nobody is listening by the time the open finishes, the freshly
    /// opened session is closed again so it cannot leak.
    pub fn request_open(&self, window: WindowId, path: PathBuf, events: EventSender) {
        let command = Command::Open {
            path,
            reply: OpenReply::Event {
                window,
                events,
            },
        };
        let Err(mpsc::error::SendError(unsent)) = self.inner.commands.send(command) else {
            return;
        };

        log::error!("Notes runtime is gone, cannot open notes for {}", window);
        if let Command::Open {
            path,
            reply: OpenReply::Event { window, events },
        } = unsent
        {
            let failed = ShellEvent::SessionOpened {
                window,
                path,
                result: Err(RuntimeError::Unavailable),
            };
            if events.send(failed).is_err() {
                log::warn!("Event loop is gone, dropping open failure for {}", window);
            }
        }
    }

    pub fn downgrade(&self) -> WeakRuntimeClient {
        WeakRuntimeClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same runtime instance.
    pub fn same_runtime(&self, other: &RuntimeClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn run_runtime(
    mut runtime: Box<dyn NotesRuntime>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Open { path, reply } => {
                let result = open_guarded(runtime.as_mut(), &path);
                deliver_open(runtime.as_mut(), path, result, reply);
            }
            Command::Close(id) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| runtime.close_notes(id))) {
                    log::error!(
                        "Notes runtime panicked closing session {}: {}",
                        id,
                        panic_message(payload.as_ref())
                    );
                } else {
                    log::info!("Closed notes session {}", id);
                }
            }
            Command::Port(reply) => {
                let _ = reply.send(runtime.server_port());
            }
            Command::Release => break,
        }
    }
    drop(runtime);
    log::debug!("Notes runtime thread finished");
}

fn open_guarded(
    runtime: &mut dyn NotesRuntime,
    path: &Path,
) -> Result<OpenedSession, RuntimeError> {
    let opened = catch_unwind(AssertUnwindSafe(|| -> Result<OpenedSession, RuntimeError> {
        let id = runtime.open_notes(path)?;
        Ok(OpenedSession {
            id,
            port: runtime.server_port(),
        })
    }));
    match opened {
        Ok(Ok(opened)) => {
            log::info!(
                "Opened notes {} as session {} on port {}",
                path.display(),
                opened.id,
                opened.port
            );
            Ok(opened)
        }
        Ok(Err(e)) => Err(e),
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            log::error!("Notes runtime panicked opening {}: {}", path.display(), msg);
            Err(RuntimeError::WorkerPanicked(msg))
        }
    }
}

fn deliver_open(
    runtime: &mut dyn NotesRuntime,
    path: PathBuf,
    result: Result<OpenedSession, RuntimeError>,
    reply: OpenReply,
) {
    let unclaimed = match reply {
        OpenReply::Direct(reply) => reply.send(result).err(),
        OpenReply::Event { window, events } => {
            let event = ShellEvent::SessionOpened {
                window,
                path,
                result,
            };
            match events.send(event) {
                Ok(()) => None,
                Err(unsent) => {
                    log::warn!("Event loop is gone, dropping open result for {}", window);
                    match unsent.0 {
                        ShellEvent::SessionOpened { result, .. } => Some(result),
                        _ => None,
                    }
                }
            }
        }
    };

    if let Some(Ok(opened)) = unclaimed {
        log::info!("Nobody took session {}, closing it", opened.id);
        runtime.close_notes(opened.id);
    }
}

/// Non-owning reference to a [`RuntimeClient`]'s runtime.
#[derive(Clone)]
pub struct WeakRuntimeClient {
    inner: Weak<RuntimeThread>,
}

impl WeakRuntimeClient {
    pub fn upgrade(&self) -> Option<RuntimeClient> {
        self.inner.upgrade().map(|inner| RuntimeClient { inner })
    }
}

/// Holds at most one live runtime per slot.
///
/// Meant to live in a `static` next to a runtime binding so that every
/// caller in the process shares one instance. The slot does not keep the
/// runtime alive; once every client is dropped the runtime is released and
/// the next `get_or_create` builds a fresh one.
pub struct RuntimeSlot {
    current: Mutex<Option<WeakRuntimeClient>>,
}

impl Default for RuntimeSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeSlot {
    pub const fn new() -> Self {
        Self {
            current: parking_lot::const_mutex(None),
        }
    }

    pub fn get_or_create<R, F>(&self, create: F) -> Result<RuntimeClient, RuntimeError>
    where
        R: NotesRuntime + 'static,
        F: FnOnce() -> Result<R, RuntimeError>,
    {
        let mut current = self.current.lock();
        if let Some(client) = current.as_ref().and_then(WeakRuntimeClient::upgrade) {
            return Ok(client);
        }

        let client = RuntimeClient::new(create()?)?;
        *current = Some(client.downgrade());
        Ok(client)
    }
}

/// Convert a path to a C string for the runtime boundary.
///
/// The bytes are passed through untouched; the only thing rejected is an
/// interior NUL, which would silently truncate the path on the other side.
pub fn path_to_c_string(path: &Path) -> Result<CString, RuntimeError> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path.to_string_lossy().into_owned().into_bytes();

    CString::new(bytes).map_err(|e| {
        RuntimeError::InvalidPath(format!(
            "{} contains a NUL byte at {}",
            path.display(),
            e.nul_position()
        ))
    })
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::event_channel;
    use crate::testing::FakeRuntime;

    fn client(runtime: FakeRuntime) -> RuntimeClient {
        RuntimeClient::new(runtime).unwrap()
    }

    /// A client whose runtime thread has already gone away.
    fn stopped_client() -> RuntimeClient {
        let (commands, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        RuntimeClient {
            inner: Arc::new(RuntimeThread {
                commands,
                worker: None,
            }),
        }
    }

    #[test]
    fn session_id_displays_as_decimal() {
        assert_eq!(SessionId(7).to_string(), "7");
        assert_eq!(SessionId(255).to_string(), "255");
    }

    #[test]
    fn clones_share_one_runtime_and_release_once() {
        let (runtime, log) = FakeRuntime::new(4000);
        let client = client(runtime);
        let other = client.clone();
        assert!(client.same_runtime(&other));

        let opened = other.open_session(Path::new("/notes")).unwrap();
        assert_eq!(client.server_port().unwrap(), 4000);
        client.close(opened.id);

        drop(client);
        assert_eq!(log.lock().released, 0);
        drop(other);
        assert_eq!(log.lock().released, 1);
        assert_eq!(log.lock().closed, vec![opened.id]);
    }

    #[test]
    fn close_of_unknown_id_is_harmless() {
        let (runtime, log) = FakeRuntime::new(4000);
        let client = client(runtime);
        client.close(SessionId(42));
        client.close(SessionId(42));
        client.server_port().unwrap();
        assert_eq!(log.lock().closed, vec![SessionId(42), SessionId(42)]);
    }

    #[test]
    fn open_session_reports_port() {
        let (runtime, _log) = FakeRuntime::new(52341);
        let client = client(runtime);
        let opened = client.open_session(Path::new("/notes")).unwrap();
        assert_eq!(opened.port, 52341);
        assert_eq!(opened.id, SessionId(1));
    }

    #[test]
    fn queued_commands_run_in_order() {
        let (runtime, log) = FakeRuntime::new(4000);
        let client = client(runtime);
        let first = client.open_session(Path::new("/a")).unwrap();
        client.close(first.id);
        let second = client.open_session(Path::new("/b")).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(log.lock().open_count(), 1);
    }

    #[test]
    fn close_does_not_wait_for_a_slow_open() {
        let (runtime, log) = FakeRuntime::new(4000);
        let (runtime, gate) = runtime.blocking_on("/slow");
        let client = client(runtime);
        let (tx, mut rx) = event_channel();

        client.request_open(WindowId::from_raw(1), PathBuf::from("/slow"), tx);
        let started = std::time::Instant::now();
        client.close(SessionId(9));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(log.lock().closed.is_empty());

        gate.send(()).unwrap();
        assert!(matches!(
            rx.blocking_recv(),
            Some(ShellEvent::SessionOpened { result: Ok(_), .. })
        ));
        client.server_port().unwrap();
        assert_eq!(log.lock().closed, vec![SessionId(9)]);
    }

    #[test]
    fn release_waits_for_queued_work() {
        let (runtime, log) = FakeRuntime::new(4000);
        let client = client(runtime);
        client.close(SessionId(1));
        client.close(SessionId(2));
        drop(client);

        let log = log.lock();
        assert_eq!(log.closed, vec![SessionId(1), SessionId(2)]);
        assert_eq!(log.released, 1);
    }

    #[test]
    fn stopped_runtime_reports_unavailable() {
        let client = stopped_client();
        assert!(matches!(client.server_port(), Err(RuntimeError::Unavailable)));
        assert!(matches!(
            client.open_session(Path::new("/notes")),
            Err(RuntimeError::Unavailable)
        ));
        client.close(SessionId(1));
    }

    #[test]
    fn open_on_stopped_runtime_still_reports_back() {
        let client = stopped_client();
        let (tx, mut rx) = event_channel();
        let window = WindowId::from_raw(4);

        client.request_open(window, PathBuf::from("/notes"), tx);

        match rx.try_recv().unwrap() {
            ShellEvent::SessionOpened {
                window: w,
                path,
                result,
            } => {
                assert_eq!(w, window);
                assert_eq!(path, PathBuf::from("/notes"));
                assert!(matches!(result, Err(RuntimeError::Unavailable)));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn slot_hands_out_the_same_runtime() {
        let slot = RuntimeSlot::new();
        let (runtime, log) = FakeRuntime::new(4000);
        let first = slot.get_or_create(|| Ok(runtime)).unwrap();
        let second = slot
            .get_or_create(|| -> Result<FakeRuntime, RuntimeError> {
                panic!("a second runtime must not be created")
            })
            .unwrap();
        assert!(first.same_runtime(&second));

        drop(first);
        drop(second);
        assert_eq!(log.lock().released, 1);
    }

    #[test]
    fn slot_recreates_after_release() {
        let slot = RuntimeSlot::new();
        let (runtime, _) = FakeRuntime::new(4000);
        let first = slot.get_or_create(|| Ok(runtime)).unwrap();
        drop(first);

        let (runtime, _) = FakeRuntime::new(4001);
        let second = slot.get_or_create(|| Ok(runtime)).unwrap();
        assert_eq!(second.server_port().unwrap(), 4001);
    }

    #[test]
    fn slot_propagates_create_failure() {
        let slot = RuntimeSlot::new();
        let result = slot.get_or_create(|| -> Result<FakeRuntime, RuntimeError> {
            Err(RuntimeError::CreateFailed("no runtime".into()))
        });
        assert!(matches!(result, Err(RuntimeError::CreateFailed(_))));
    }

    #[test]
    fn path_with_spaces_and_unicode_passes_through() {
        let path = Path::new("/home/user/My Notes/日記 #1");
        let c = path_to_c_string(path).unwrap();
        assert_eq!(c.to_str().unwrap(), "/home/user/My Notes/日記 #1");
    }

    #[test]
    fn path_with_interior_nul_is_rejected() {
        let err = path_to_c_string(Path::new("/notes\0/evil")).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidPath(_)));
    }

    #[test]
    fn request_open_posts_result() {
        let (runtime, _log) = FakeRuntime::new(4000);
        let client = client(runtime);
        let (tx, mut rx) = event_channel();
        let window = WindowId::from_raw(3);

        client.request_open(window, PathBuf::from("/notes"), tx);

        match rx.blocking_recv().unwrap() {
            ShellEvent::SessionOpened {
                window: w,
                path,
                result,
            } => {
                assert_eq!(w, window);
                assert_eq!(path, PathBuf::from("/notes"));
                assert_eq!(
                    result.unwrap(),
                    OpenedSession {
                        id: SessionId(1),
                        port: 4000
                    }
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn runtime_panic_becomes_an_open_error() {
        let (runtime, _log) = FakeRuntime::new(4000);
        let client = client(runtime.panicking_on("/boom"));
        let (tx, mut rx) = event_channel();

        client.request_open(WindowId::from_raw(1), PathBuf::from("/boom"), tx);

        match rx.blocking_recv().unwrap() {
            ShellEvent::SessionOpened { result, .. } => {
                assert!(matches!(result, Err(RuntimeError::WorkerPanicked(_))));
            }
            other => panic!("unexpected event {:?}", other),
        }

        // The runtime thread survives the panic.
        assert!(client.open_session(Path::new("/fine")).is_ok());
    }

    #[test]
    fn opened_session_is_closed_when_nobody_listens() {
        let (runtime, log) = FakeRuntime::new(4000);
        let client = client(runtime);
        let (tx, rx) = event_channel();
        drop(rx);

        client.request_open(WindowId::from_raw(1), PathBuf::from("/notes"), tx);
        client.server_port().unwrap();

        assert_eq!(log.lock().closed, vec![SessionId(1)]);
        assert_eq!(log.lock().open_count(), 0);
    }
}
