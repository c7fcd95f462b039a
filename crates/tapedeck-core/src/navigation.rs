use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::debug;

use crate::api::TapeBackend;
use crate::store::{LoadOutcome, TapeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Main,
    Directory,
    DevMode,
}

impl Screen {
    pub fn as_str(self) -> &'static str {
        match self {
            Screen::Main => "main",
            Screen::Directory => "directory",
            Screen::DevMode => "dev",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Screen {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" | "home" => Ok(Screen::Main),
            "directory" | "dir" => Ok(Screen::Directory),
            "dev" | "devmode" => Ok(Screen::DevMode),
            other => Err(anyhow!("unknown screen: {other}")),
        }
    }
}

/// Exactly one screen is visible at a time.
#[derive(Debug, Clone, Default)]
pub struct NavigationController {
    current: Screen,
}

impl NavigationController {
    pub fn current(&self) -> Screen {
        self.current
    }

    pub fn is_visible(&self, screen: Screen) -> bool {
        self.current == screen
    }

    /// Switches screens. Entering the directory loads a fresh snapshot; the
    /// returned outcome is `None` when no load was needed.
    #[tracing::instrument(skip(self, store, backend))]
    pub async fn navigate_to(
        &mut self,
        screen: Screen,
        store: &TapeStore,
        backend: &dyn TapeBackend,
    ) -> Option<LoadOutcome> {
        debug!(from = %self.current, to = %screen, "navigating");
        self.current = screen;
        if screen == Screen::Directory {
            Some(store.load(backend).await)
        } else {
            None
        }
    }
}
