//! Ties windows to runtime sessions.
//!
//! The manager runs on the UI loop. It creates a window as soon as a
//! directory is chosen, queues the open on the runtime thread, and attaches
//! the session's content once the open comes back as an event. Closing a
//! window queues the close of its session; the UI loop never waits on the
//! runtime. The registry is only touched from
//! [`SessionWindowManager::handle_event`] and friends, so open results and
//! close notifications are applied in the order they were queued.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::events::{EventReceiver, EventSender, ShellEvent};
use crate::gatekeeper::{Launcher, NavigationGatekeeper};
use crate::registry::{Completion, SessionRegistry, WindowId};
use crate::runtime::{OpenedSession, RuntimeClient, RuntimeError};
use crate::session::{self, Session};

/// The native side of the manager: everything that touches real windows.
pub trait WindowHost {
    /// Create and show a window with placeholder content.
    fn create_window(&mut self, window: WindowId, title: &str);

    /// Replace the placeholder with a web view on `base_url` whose
    /// navigations are decided by `gatekeeper`.
    fn attach_session(
        &mut self,
        window: WindowId,
        base_url: &str,
        gatekeeper: NavigationGatekeeper,
    );

    /// The open for `window` failed; the window stays up without content.
    fn show_open_failure(&mut self, window: WindowId, error: &RuntimeError);

    /// The window is gone. Called once per close notification, so it may be
    /// called for windows the host has already dropped.
    fn release_window(&mut self, window: WindowId);
}

/// What to do with a session whose window closed before its open finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Close it as soon as the open reports back.
    #[default]
    CloseImmediately,
    /// Leave it open in the runtime until the runtime is released.
    Leak,
}

pub struct SessionWindowManager<H: WindowHost> {
    runtime: RuntimeClient,
    host: H,
    events: EventSender,
    launcher: Arc<dyn Launcher>,
    registry: SessionRegistry,
    orphan_policy: OrphanPolicy,
    last_window: u64,
}

impl<H: WindowHost> SessionWindowManager<H> {
    /// `events` is where runtime workers post their results; its receiver
    /// must be fed back into [`SessionWindowManager::handle_event`].
    pub fn new(
        runtime: RuntimeClient,
        host: H,
        events: EventSender,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            runtime,
            host,
            events,
            launcher,
            registry: SessionRegistry::new(),
            orphan_policy: OrphanPolicy::default(),
            last_window: 0,
        }
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    pub fn handle_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::DirectoryChosen(path) => {
                self.open_notes(path);
            }
            ShellEvent::SessionOpened {
                window,
                path,
                result,
            } => self.on_session_opened(window, &path, result),
            ShellEvent::WindowClosed(window) => self.on_window_closed(window),
        }
    }

    /// Open a window for the chosen directory and start opening its session.
    /// A cancelled prompt (`None`) changes nothing.
    pub fn open_notes(&mut self, chosen: Option<PathBuf>) -> Option<WindowId> {
        let Some(path) = chosen else {
            log::debug!("Open prompt cancelled");
            return None;
        };

        let window = self.next_window_id();
        self.host.create_window(window, &session::window_title(&path));
        self.registry.begin(window);
        log::debug!("Opening notes {} for {}", path.display(), window);
        self.runtime.request_open(window, path, self.events.clone());
        Some(window)
    }

    pub fn on_session_opened(
        &mut self,
        window: WindowId,
        path: &Path,
        result: Result<OpenedSession, RuntimeError>,
    ) {
        let opened = match result {
            Ok(opened) => opened,
            Err(err) => {
                log::error!("Could not open notes {} for {}: {}", path.display(), window, err);
                if self.registry.fail(window) {
                    self.host.show_open_failure(window, &err);
                }
                return;
            }
        };

        match self.registry.complete(window, opened.id) {
            Completion::Registered => {
                let session = Session::new(opened.id, path.to_path_buf(), opened.port);
                let gatekeeper =
                    NavigationGatekeeper::new(session.trusted_origin(), self.launcher.clone());
                let base_url = session.base_url();
                log::info!("{} showing session {} at {}", window, session.id, base_url);
                self.host.attach_session(window, &base_url, gatekeeper);
            }
            Completion::Orphaned => match self.orphan_policy {
                OrphanPolicy::CloseImmediately => {
                    log::info!(
                        "{} closed before session {} finished opening, closing it",
                        window,
                        opened.id
                    );
                    self.runtime.close(opened.id);
                }
                OrphanPolicy::Leak => {
                    log::warn!(
                        "{} closed before session {} finished opening, leaving it open",
                        window,
                        opened.id
                    );
                }
            },
        }
    }

    /// Close the session owned by `window`, if any. Safe to repeat.
    pub fn on_window_closed(&mut self, window: WindowId) {
        let was_pending = self.registry.is_pending(window);
        match self.registry.remove(window) {
            Some(id) => {
                log::info!("{} closed, closing session {}", window, id);
                self.runtime.close(id);
            }
            None if was_pending => {
                log::debug!("{} closed while its session was still opening", window)
            }
            None => log::debug!("{} closed without a session", window),
        }
        self.host.release_window(window);
    }

    /// Close every registered session. Used at process teardown, before the
    /// runtime is released.
    pub fn close_all(&mut self) {
        for (window, id) in self.registry.drain_sessions() {
            log::info!("Shutting down: closing session {} of {}", id, window);
            self.runtime.close(id);
        }
    }

    /// Tear down at process exit.
    ///
    /// Stops `events` from taking new results, closes the sessions of
    /// results that were already queued, closes every registered session and
    /// then releases the runtime. Returns once the runtime is released; an
    /// open still running finishes first and, finding nobody listening,
    /// closes its own session.
    pub fn shutdown(mut self, events: &mut EventReceiver) {
        events.close();
        while let Ok(event) = events.try_recv() {
            if let ShellEvent::SessionOpened {
                window,
                result: Ok(opened),
                ..
            } = event
            {
                log::info!("Shutting down: closing session {} opened for {}", opened.id, window);
                self.runtime.close(opened.id);
            }
        }
        self.close_all();
        drop(self);
        log::debug!("Session manager shut down");
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn next_window_id(&mut self) -> WindowId {
        self.last_window += 1;
        WindowId::from_raw(self.last_window)
    }
}
