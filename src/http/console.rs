//! Console modes of the management endpoint.

use serde::{Deserialize, Serialize};

/// What the endpoint serves under `/console`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleMode {
    /// Full administration console.
    #[default]
    Console,
    /// Process runs admin-only; the console shows a notice page.
    AdminOnly,
    /// Secondary host controller; the console lives on the primary.
    SecondaryHost,
    /// No console at all.
    NoConsole,
}

impl ConsoleMode {
    pub fn has_console(&self) -> bool {
        !matches!(self, ConsoleMode::NoConsole)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleMode::Console => "console",
            ConsoleMode::AdminOnly => "admin-only",
            ConsoleMode::SecondaryHost => "secondary-host",
            ConsoleMode::NoConsole => "no-console",
        }
    }

    /// Short notice rendered on the console landing page.
    pub fn landing_notice(&self) -> Option<&'static str> {
        match self {
            ConsoleMode::Console => Some("Management console"),
            ConsoleMode::AdminOnly => {
                Some("The server is running in admin-only mode; the console is restricted")
            }
            ConsoleMode::SecondaryHost => {
                Some("This host is managed by its primary host controller; use the console there")
            }
            ConsoleMode::NoConsole => None,
        }
    }
}
