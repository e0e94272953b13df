use std::collections::HashMap;
use std::fmt;

use crate::runtime::SessionId;

/// Opaque window handle, assigned when the window is created and stored by
/// the native layer alongside its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Window exists, its runtime open has not come back yet.
    Pending,
    Open(SessionId),
}

/// What became of a finished open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The window is still around and now owns the session.
    Registered,
    /// The window went away first; nobody owns the session.
    Orphaned,
}

/// Which window owns which open session.
///
/// A window has at most one entry. An `Open` entry exists exactly while the
/// runtime has that session open on the window's behalf, so removing one is
/// always paired with closing its session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: HashMap<WindowId, Slot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an open is in flight for `window`. Returns `false` if the
    /// window already has an entry, which is left untouched.
    pub fn begin(&mut self, window: WindowId) -> bool {
        if self.slots.contains_key(&window) {
            log::warn!("{} already has a session entry", window);
            return false;
        }
        self.slots.insert(window, Slot::Pending);
        true
    }

    pub fn complete(&mut self, window: WindowId, id: SessionId) -> Completion {
        match self.slots.get(&window).copied() {
            Some(Slot::Pending) => {
                self.slots.insert(window, Slot::Open(id));
                Completion::Registered
            }
            Some(Slot::Open(existing)) => {
                log::warn!(
                    "{} already owns session {}, not taking session {}",
                    window,
                    existing,
                    id
                );
                Completion::Orphaned
            }
            None => Completion::Orphaned,
        }
    }

    /// Drop a pending entry whose open failed. Returns whether one existed.
    pub fn fail(&mut self, window: WindowId) -> bool {
        if self.is_pending(window) {
            self.slots.remove(&window);
            true
        } else {
            false
        }
    }

    /// Forget `window`. Yields its session only if one was open, so a second
    /// removal, or a removal while the open is in flight, yields nothing.
    pub fn remove(&mut self, window: WindowId) -> Option<SessionId> {
        match self.slots.remove(&window) {
            Some(Slot::Open(id)) => Some(id),
            Some(Slot::Pending) | None => None,
        }
    }

    pub fn is_pending(&self, window: WindowId) -> bool {
        matches!(self.slots.get(&window), Some(Slot::Pending))
    }

    pub fn session_for(&self, window: WindowId) -> Option<SessionId> {
        match self.slots.get(&window) {
            Some(Slot::Open(id)) => Some(*id),
            _ => None,
        }
    }

    /// Number of open sessions. Pending opens are not counted.
    pub fn len(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Open(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        self.slots.len() - self.len()
    }

    pub fn sessions(&self) -> Vec<(WindowId, SessionId)> {
        let mut sessions: Vec<_> = self
            .slots
            .iter()
            .filter_map(|(window, slot)| match slot {
                Slot::Open(id) => Some((*window, *id)),
                Slot::Pending => None,
            })
            .collect();
        sessions.sort();
        sessions
    }

    /// Empty the registry, returning every open session. Pending opens are
    /// forgotten and will complete as orphans.
    pub fn drain_sessions(&mut self) -> Vec<(WindowId, SessionId)> {
        let sessions = self.sessions();
        self.slots.clear();
        sessions
    }
}
