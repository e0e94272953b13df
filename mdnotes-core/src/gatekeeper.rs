//! Navigation policy for a session's web view.
//!
//! A notes window may only load pages from its own session server. Anything
//! else a note links to is handed to the desktop's default handler and never
//! loaded in place.

use std::fmt;
use std::sync::Arc;

use url::Url;

/// Scheme, host and port a web view may navigate within.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedOrigin {
    scheme: String,
    host: String,
    port: u16,
}

impl TrustedOrigin {
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    /// Origin of an absolute URL. `None` when the URL has no host or no
    /// port (explicit or scheme default).
    pub fn from_url(raw: &str) -> Option<Self> {
        Url::parse(raw).ok().as_ref().and_then(Self::of)
    }

    fn of(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(Self::new(url.scheme(), host, port))
    }

    pub fn matches(&self, url: &Url) -> bool {
        Self::of(url).as_ref() == Some(self)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for TrustedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Same origin: load in the web view.
    Allow,
    /// Foreign origin: not loaded in place, handed to the desktop instead.
    OpenExternally,
    /// Not a URL with an origin at all: dropped.
    Block,
}

impl NavigationDecision {
    pub fn loads_in_view(self) -> bool {
        matches!(self, NavigationDecision::Allow)
    }
}

/// Hands a URL to whatever the desktop uses to open links.
pub trait Launcher: Send + Sync {
    fn open_external(&self, url: &Url) -> Result<(), String>;
}

/// Opens URLs with the system default application.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn open_external(&self, url: &Url) -> Result<(), String> {
        open::that_detached(url.as_str()).map_err(|e| format!("open-in-browser failed: {e}"))
    }
}

#[derive(Clone)]
pub struct NavigationGatekeeper {
    origin: TrustedOrigin,
    launcher: Arc<dyn Launcher>,
}

impl fmt::Debug for NavigationGatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationGatekeeper")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl NavigationGatekeeper {
    pub fn new(origin: TrustedOrigin, launcher: Arc<dyn Launcher>) -> Self {
        Self { origin, launcher }
    }

    pub fn origin(&self) -> &TrustedOrigin {
        &self.origin
    }

    /// Decide what to do with a requested navigation to `raw`.
    ///
    /// `OpenExternally` has already handed the URL to the launcher by the
    /// time it is returned, whether or not the launcher succeeded.
    pub fn decide(&self, raw: &str) -> NavigationDecision {
        self.decide_as(raw, true)
    }

    /// Like [`NavigationGatekeeper::decide`], for navigations the user did
    /// not start (subframes, scripts, redirects). A foreign origin is
    /// blocked instead of handed to the desktop.
    pub fn decide_unprompted(&self, raw: &str) -> NavigationDecision {
        self.decide_as(raw, false)
    }

    fn decide_as(&self, raw: &str, hand_off: bool) -> NavigationDecision {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Blocking unparseable navigation '{}': {}", raw, e);
                return NavigationDecision::Block;
            }
        };

        let Some(origin) = TrustedOrigin::of(&url) else {
            log::debug!("Blocking navigation without an origin: {}", url);
            return NavigationDecision::Block;
        };

        if origin == self.origin {
            return NavigationDecision::Allow;
        }
        if !hand_off {
            log::debug!("Blocking {} not started by the user", url);
            return NavigationDecision::Block;
        }

        match self.launcher.open_external(&url) {
            Ok(()) => log::info!("Opened {} outside of {}", url, self.origin),
            Err(e) => log::warn!("Failed to hand {} to the desktop: {}", url, e),
        }
        NavigationDecision::OpenExternally
    }
}
