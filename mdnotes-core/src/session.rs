use std::path::{Path, PathBuf};

use crate::gatekeeper::TrustedOrigin;
use crate::runtime::SessionId;

pub const SESSION_SCHEME: &str = "http";
pub const SESSION_HOST: &str = "localhost";

/// One notes directory being served by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub path: PathBuf,
    pub port: u16,
}

impl Session {
    pub fn new(id: SessionId, path: PathBuf, port: u16) -> Self {
        Self { id, path, port }
    }

    /// Where the session's content is served; also its trusted origin.
    pub fn base_url(&self) -> String {
        session_base_url(self.id, self.port)
    }

    pub fn trusted_origin(&self) -> TrustedOrigin {
        TrustedOrigin::new(SESSION_SCHEME, SESSION_HOST, self.port)
    }

    pub fn title(&self) -> String {
        window_title(&self.path)
    }
}

/// `http://localhost:<port>/<id>/static/`
pub fn session_base_url(id: SessionId, port: u16) -> String {
    format!("{}://{}:{}/{}/static/", SESSION_SCHEME, SESSION_HOST, port, id)
}

/// Window title for a notes directory: the path as the user picked it.
pub fn window_title(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
