//! Persisted color theme preference.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{Storage, keys};

/// Color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Gray,
}

impl Theme {
    /// The stored value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Gray => "gray",
        }
    }

    /// The theme after this one: light, dark, gray, light.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Gray,
            Self::Gray => Self::Light,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "gray" => Ok(Self::Gray),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

/// Reads and writes the theme under [`keys::THEME`].
#[derive(Clone)]
pub struct ThemeStore {
    storage: Arc<dyn Storage>,
}

impl ThemeStore {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The saved theme. Missing, unknown or unreadable values give `Light`.
    #[must_use]
    pub fn load(&self) -> Theme {
        match self.storage.get(keys::THEME) {
            Ok(Some(raw)) => raw.parse().unwrap_or_default(),
            Ok(None) => Theme::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read theme preference");
                Theme::default()
            }
        }
    }

    /// Save `theme`. Failures are logged and ignored.
    pub fn set(&self, theme: Theme) -> Theme {
        if let Err(e) = self.storage.set(keys::THEME, theme.as_str()) {
            warn!(error = %e, "Failed to save theme preference");
        }
        theme
    }

    /// Switch to the next theme and save it.
    pub fn toggle(&self) -> Theme {
        self.set(self.load().next())
    }
}
