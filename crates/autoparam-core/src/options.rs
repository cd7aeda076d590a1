//! Driver construction options.
//!
//! Options can be set in code with the chained setters, or loaded with
//! [`DriverOptions::load`] which layers:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. environment variables prefixed with `AUTOPARAM_`
//!    (for example `AUTOPARAM_AUTO_INTERRUPTS=false`).
//!
//! ```toml
//! auto_interrupts = true
//! blocking = false
//! autoconnect = true
//! ```

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AutoparamResult;

/// Environment prefix recognized by [`DriverOptions::load`].
pub const ENV_PREFIX: &str = "AUTOPARAM_";

/// Options passed to the host framework and the dispatcher when a driver is
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Notify interrupt subscribers after every successful read or write
    /// whose handler left propagation at [`crate::Propagate::Default`].
    pub auto_interrupts: bool,
    /// The driver blocks while talking to the device, so the host should
    /// give the port its own thread. Passed through to the host framework;
    /// the dispatcher does not act on it.
    pub blocking: bool,
    /// Ask the host to connect the port automatically. Passed through to the
    /// host framework; the dispatcher does not act on it.
    pub autoconnect: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            auto_interrupts: true,
            blocking: false,
            autoconnect: true,
        }
    }
}

impl DriverOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set [`DriverOptions::auto_interrupts`].
    pub fn auto_interrupts(mut self, enable: bool) -> Self {
        self.auto_interrupts = enable;
        self
    }

    /// Set [`DriverOptions::blocking`].
    pub fn blocking(mut self, enable: bool) -> Self {
        self.blocking = enable;
        self
    }

    /// Set [`DriverOptions::autoconnect`].
    pub fn autoconnect(mut self, enable: bool) -> Self {
        self.autoconnect = enable;
        self
    }

    /// Load options from defaults, `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> AutoparamResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading driver options");
            figment = figment.merge(Toml::file(path));
        }
        let options: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        Ok(options)
    }
}
