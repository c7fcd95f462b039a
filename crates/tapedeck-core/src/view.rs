use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    List,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    NameAsc,
    PlaysAsc,
    PlaysDesc,
    RecentAsc,
    RecentDesc,
    #[default]
    None,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::NameAsc,
        SortKey::PlaysAsc,
        SortKey::PlaysDesc,
        SortKey::RecentAsc,
        SortKey::RecentDesc,
        SortKey::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::NameAsc => "name-asc",
            SortKey::PlaysAsc => "plays-asc",
            SortKey::PlaysDesc => "plays-desc",
            SortKey::RecentAsc => "recent-asc",
            SortKey::RecentDesc => "recent-desc",
            SortKey::None => "none",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| {
                anyhow!(
                    "unknown sort key: {s} (expected name-asc, plays-asc, plays-desc, \
                     recent-asc, recent-desc or none)"
                )
            })
    }
}

/// Process-local directory view state. Free-text search and the genre filter
/// never compose: setting one clears the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    mode: ViewMode,
    search_term: String,
    sort_key: SortKey,
    genre_filter: BTreeSet<String>,
}

impl ViewState {
    pub fn new(sort_key: SortKey) -> Self {
        Self {
            sort_key,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn genre_filter(&self) -> &BTreeSet<String> {
        &self.genre_filter
    }

    pub fn sort_control_visible(&self) -> bool {
        self.mode == ViewMode::List
    }

    pub fn toggle_mode(&mut self) -> ViewMode {
        self.mode = match self.mode {
            ViewMode::List => ViewMode::Grid,
            ViewMode::Grid => ViewMode::List,
        };
        self.search_term.clear();
        debug!(mode = ?self.mode, "toggled directory view");
        self.mode
    }

    pub fn set_search(&mut self, term: &str) {
        self.search_term = term.to_string();
        if !self.genre_filter.is_empty() {
            debug!("search replaces active genre filter");
            self.genre_filter.clear();
        }
    }

    pub fn set_sort(&mut self, key: SortKey) {
        self.sort_key = key;
    }

    /// Only the list view has a genre filter; applying a non-empty one
    /// drops the search term.
    pub fn apply_genres<I>(&mut self, genres: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.genre_filter = genres
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        if !self.genre_filter.is_empty() {
            self.search_term.clear();
        }
    }

    pub fn clear_genres(&mut self) {
        self.genre_filter.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{SortKey, ViewMode, ViewState};

    #[test]
    fn toggle_clears_search_and_hides_sort() {
        let mut view = ViewState::default();
        view.set_search("abba");
        assert!(view.sort_control_visible());

        assert_eq!(view.toggle_mode(), ViewMode::Grid);
        assert_eq!(view.search_term(), "");
        assert!(!view.sort_control_visible());

        view.set_search("x");
        assert_eq!(view.toggle_mode(), ViewMode::List);
        assert_eq!(view.search_term(), "");
    }

    #[test]
    fn search_and_genres_are_mutually_exclusive() {
        let mut view = ViewState::default();
        view.set_search("live");
        view.apply_genres(vec!["rock".to_string()]);
        assert_eq!(view.search_term(), "");
        assert_eq!(view.genre_filter().len(), 1);

        view.set_search("blue");
        assert!(view.genre_filter().is_empty());
        assert_eq!(view.search_term(), "blue");

        view.apply_genres(vec!["  ".to_string()]);
        assert_eq!(view.search_term(), "blue");
    }

    #[test]
    fn sort_keys_parse_from_their_labels() {
        for key in SortKey::ALL {
            assert_eq!(key.as_str().parse::<SortKey>().expect("parse key"), key);
        }
        assert!("loudest".parse::<SortKey>().is_err());
    }
}
