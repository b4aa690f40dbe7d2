//! Capability domains.
//!
//! A [`Domain`] is a bitmask naming the runtime configurations a component is
//! eligible to run under. The engine runs with one active domain, chosen at
//! launch; components whose declared mask does not fit it are skipped at
//! registration time.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

bitflags! {
    /// Runtime configurations a component may run under.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct Domain: u32 {
        /// No configuration.
        const NONE = 0x00;
        /// The editor.
        const EDITOR = 0x01;
        /// A game client.
        const CLIENT = 0x02;
        /// A server with a user interface.
        const SERVER_UI = 0x04;
        /// A headless server.
        const SERVER_NO_UI = 0x08;

        /// Any server.
        const SERVER = Self::SERVER_UI.bits() | Self::SERVER_NO_UI.bits();
        /// Every configuration that presents a user interface.
        const UI = Self::EDITOR.bits() | Self::CLIENT.bits() | Self::SERVER_UI.bits();
        /// Everything except the editor.
        const NO_EDITOR = Self::CLIENT.bits() | Self::SERVER.bits();

        /// Every configuration, including ones not named here.
        const ALL = u32::MAX;
    }
}

impl Domain {
    /// Returns true if a component declaring `required` may run under `self`.
    ///
    /// `ALL` and the empty mask always match. Otherwise every bit of the
    /// required mask must be present in the active domain.
    #[must_use]
    pub fn admits(self, required: Domain) -> bool {
        required == Domain::ALL || required.is_empty() || self.contains(required)
    }

    /// Human-readable name for the mask, or `None` for unnamed combinations.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(domain, _)| *domain == self)
            .map(|(_, name)| *name)
    }
}

const NAMES: [(Domain, &str); 9] = [
    (Domain::NONE, "None"),
    (Domain::EDITOR, "Editor"),
    (Domain::CLIENT, "Client"),
    (Domain::SERVER_UI, "Server UI"),
    (Domain::SERVER_NO_UI, "Server No UI"),
    (Domain::SERVER, "Server"),
    (Domain::UI, "UI"),
    (Domain::NO_EDITOR, "No Editor"),
    (Domain::ALL, "All"),
];

impl Default for Domain {
    fn default() -> Self {
        Domain::ALL
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Custom({:#x})", self.bits()),
        }
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain({self})")
    }
}

/// Launch mode selected on the command line.
///
/// Each mode maps to the active [`Domain`] of the engine. The editor hosts a
/// client and a server view, so it runs with every domain enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LaunchMode {
    /// Nothing is eligible except components declaring `ALL`.
    None,
    /// Editor: every domain.
    #[default]
    Editor,
    /// Game client.
    Client,
    /// Server with a user interface.
    Server,
    /// Headless server.
    ServerNoUi,
}

impl LaunchMode {
    /// The active domain for this launch mode.
    #[must_use]
    pub fn domain(self) -> Domain {
        match self {
            LaunchMode::None => Domain::NONE,
            LaunchMode::Editor => Domain::ALL,
            LaunchMode::Client => Domain::CLIENT,
            LaunchMode::Server => Domain::SERVER_UI,
            LaunchMode::ServerNoUi => Domain::SERVER_NO_UI,
        }
    }

    /// The command-line spelling of this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchMode::None => "none",
            LaunchMode::Editor => "editor",
            LaunchMode::Client => "client",
            LaunchMode::Server => "server",
            LaunchMode::ServerNoUi => "server_no_ui",
        }
    }
}

impl FromStr for LaunchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LaunchMode::None),
            "editor" => Ok(LaunchMode::Editor),
            "client" => Ok(LaunchMode::Client),
            "server" => Ok(LaunchMode::Server),
            "server_no_ui" | "server-no-ui" => Ok(LaunchMode::ServerNoUi),
            other => Err(Error::new(ErrorKind::InvalidConfig(format!(
                "unknown launch mode '{other}' (expected editor, client, server, server_no_ui or none)"
            )))),
        }
    }
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
