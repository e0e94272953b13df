//! Events delivered to the session window manager on the UI loop.
//!
//! The native layer pushes user actions and window-closed notifications, and
//! runtime workers push open results. Everything goes through one channel so
//! the manager sees them in a single order.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::registry::WindowId;
use crate::runtime::{OpenedSession, RuntimeError};

#[derive(Debug)]
pub enum ShellEvent {
    /// Result of the directory prompt. `None` means the user cancelled.
    DirectoryChosen(Option<PathBuf>),
    /// A runtime open issued for `window` finished.
    SessionOpened {
        window: WindowId,
        path: PathBuf,
        result: Result<OpenedSession, RuntimeError>,
    },
    /// The native window with this id is closing.
    WindowClosed(WindowId),
}

pub type EventSender = mpsc::UnboundedSender<ShellEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ShellEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
