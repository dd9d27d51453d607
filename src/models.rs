use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_path(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            _ => Err(anyhow::anyhow!("media kind must be 'movie' or 'tv'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub kind: MediaKind,
    pub tmdb_id: i32,
}

impl ItemKey {
    pub fn movie(tmdb_id: i32) -> Self {
        Self {
            kind: MediaKind::Movie,
            tmdb_id,
        }
    }

    pub fn tv(tmdb_id: i32) -> Self {
        Self {
            kind: MediaKind::Tv,
            tmdb_id,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.tmdb_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WatchStatus {
    Watching {
        progress: f64,
    },
    Watched,
    OnHold,
    Dropped,
    // unknown `type` tags decode here; serde wants it last
    #[default]
    #[serde(other)]
    NotInWatchlist,
}

impl WatchStatus {
    pub fn from_progress(progress: f64) -> Self {
        let progress = clamp_progress(progress);
        if progress >= 1.0 {
            WatchStatus::Watched
        } else if progress > 0.0 {
            WatchStatus::Watching { progress }
        } else {
            WatchStatus::NotInWatchlist
        }
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            WatchStatus::NotInWatchlist => StatusKind::NotInWatchlist,
            WatchStatus::Watching { .. } => StatusKind::Watching,
            WatchStatus::Watched => StatusKind::Watched,
            WatchStatus::OnHold => StatusKind::OnHold,
            WatchStatus::Dropped => StatusKind::Dropped,
        }
    }

    pub fn display_title(&self) -> &'static str {
        match self {
            WatchStatus::Watching { .. } => "Watching",
            WatchStatus::Watched => "Completed",
            WatchStatus::OnHold => "On Hold",
            WatchStatus::Dropped => "Dropped",
            WatchStatus::NotInWatchlist => "Plan to Watch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    NotInWatchlist,
    Watching,
    Watched,
    OnHold,
    Dropped,
}

pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub local_id: u64,
    pub kind: MediaKind,
    pub tmdb_id: i32,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub runtime_minutes: Option<u32>,
    #[serde(default)]
    pub number_of_seasons: u32,
    #[serde(default)]
    pub number_of_episodes: u32,
    pub show_status: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub status: WatchStatus,
    #[serde(default)]
    pub progress: f64,
    pub added_at: DateTime<Utc>,
}

impl LibraryItem {
    pub fn new(key: ItemKey, title: impl Into<String>) -> Self {
        Self {
            local_id: 0,
            kind: key.kind,
            tmdb_id: key.tmdb_id,
            title: title.into(),
            overview: String::new(),
            poster_path: None,
            backdrop_path: None,
            release_date: None,
            runtime_minutes: None,
            number_of_seasons: 0,
            number_of_episodes: 0,
            show_status: None,
            genres: Vec::new(),
            rating: 0,
            status: WatchStatus::NotInWatchlist,
            progress: 0.0,
            added_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey {
            kind: self.kind,
            tmdb_id: self.tmdb_id,
        }
    }

    pub fn apply_status(&mut self, status: WatchStatus) {
        match status {
            WatchStatus::Watched => {
                self.progress = 1.0;
                self.status = WatchStatus::Watched;
            }
            WatchStatus::Watching { progress } => {
                let progress = clamp_progress(progress);
                self.progress = progress;
                self.status = WatchStatus::Watching { progress };
            }
            // progress is kept from before the pause
            WatchStatus::OnHold => self.status = WatchStatus::OnHold,
            WatchStatus::Dropped | WatchStatus::NotInWatchlist => {
                self.progress = 0.0;
                self.status = status;
            }
        }
    }

    /// Returns `false` and leaves the item untouched when `total` is zero.
    /// A zero roll-up keeps an explicit `OnHold`/`Dropped` status.
    pub fn apply_episode_rollup(&mut self, watched: usize, total: u32) -> bool {
        if total == 0 {
            return false;
        }
        let watched = watched.min(total as usize);
        let progress = watched as f64 / f64::from(total);
        match WatchStatus::from_progress(progress) {
            WatchStatus::NotInWatchlist
                if matches!(self.status, WatchStatus::OnHold | WatchStatus::Dropped) =>
            {
                self.progress = 0.0;
            }
            derived => self.apply_status(derived),
        }
        true
    }

    pub fn is_watched(&self) -> bool {
        matches!(self.status, WatchStatus::Watched)
    }

    pub fn is_watching(&self) -> bool {
        matches!(self.status, WatchStatus::Watching { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub show: ItemKey,
    pub season_number: i32,
    pub episode_number: i32,
    pub tmdb_id: Option<i32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: String,
    pub air_date: Option<NaiveDate>,
    pub still_path: Option<String>,
    #[serde(default)]
    pub is_watched: bool,
    #[serde(default)]
    pub rating: u8,
}

impl Episode {
    pub fn bare(show: ItemKey, season_number: i32, episode_number: i32) -> Self {
        Self {
            show,
            season_number,
            episode_number,
            tmdb_id: None,
            name: String::new(),
            overview: String::new(),
            air_date: None,
            still_path: None,
            is_watched: false,
            rating: 0,
        }
    }

    pub fn number(&self) -> (i32, i32) {
        (self.season_number, self.episode_number)
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}
