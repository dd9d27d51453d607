use crate::library::Library;
use crate::models::{Episode, ItemKey};
use crate::region::Region;
use crate::tmdb::Provider;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const EPISODES_ERROR: &str = "Failed to load episodes. Please try again.";
pub const PROVIDERS_ERROR: &str = "Failed to load watch providers.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// The selection moved on while the fetch was in flight; the result was dropped.
    Stale,
    Failed,
}

#[derive(Debug, Default)]
struct SessionState {
    selected_season: i32,
    episodes: Vec<Episode>,
    episodes_error: Option<String>,
    providers: Vec<Provider>,
    providers_region: Option<Region>,
    providers_error: Option<String>,
}

pub struct DetailSession {
    key: ItemKey,
    library: Arc<Library>,
    state: Mutex<SessionState>,
}

impl DetailSession {
    pub fn new(library: Arc<Library>, key: ItemKey) -> Self {
        Self {
            key,
            library,
            state: Mutex::new(SessionState {
                selected_season: 1,
                ..SessionState::default()
            }),
        }
    }

    pub fn key(&self) -> ItemKey {
        self.key
    }

    pub async fn select_season(&self, season: i32) {
        self.state.lock().await.selected_season = season;
    }

    pub async fn selected_season(&self) -> i32 {
        self.state.lock().await.selected_season
    }

    pub async fn load_episodes(&self) -> LoadOutcome {
        let season = {
            let mut state = self.state.lock().await;
            state.episodes_error = None;
            state.selected_season
        };
        let result = self.library.load_season(self.key, season).await;

        let mut state = self.state.lock().await;
        if state.selected_season != season {
            debug!(
                item = %self.key,
                fetched = season,
                selected = state.selected_season,
                "Discarding stale season fetch"
            );
            return LoadOutcome::Stale;
        }
        match result {
            Ok(episodes) => {
                state.episodes = episodes;
                LoadOutcome::Applied
            }
            Err(e) => {
                warn!("Failed to load season {} of {}: {}", season, self.key, e);
                state.episodes_error = Some(EPISODES_ERROR.to_string());
                LoadOutcome::Failed
            }
        }
    }

    pub async fn episodes(&self) -> Vec<Episode> {
        self.state.lock().await.episodes.clone()
    }

    pub async fn episodes_error(&self) -> Option<String> {
        self.state.lock().await.episodes_error.clone()
    }

    pub async fn refresh_providers(&self) -> LoadOutcome {
        let region = self.library.region().get();
        let result = self.library.providers_in(self.key, &region).await;

        let mut state = self.state.lock().await;
        if self.library.region().get() != region {
            return LoadOutcome::Stale;
        }
        match result {
            Ok(providers) => {
                state.providers = providers;
                state.providers_region = Some(region);
                state.providers_error = None;
                LoadOutcome::Applied
            }
            Err(e) => {
                warn!("Failed to load watch providers for {}: {}", self.key, e);
                state.providers_error = Some(PROVIDERS_ERROR.to_string());
                LoadOutcome::Failed
            }
        }
    }

    pub async fn providers(&self) -> Vec<Provider> {
        self.state.lock().await.providers.clone()
    }

    pub async fn providers_region(&self) -> Option<Region> {
        self.state.lock().await.providers_region.clone()
    }

    pub async fn providers_error(&self) -> Option<String> {
        self.state.lock().await.providers_error.clone()
    }

    pub fn follow_region(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.library.region().subscribe();
        let session: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.refresh_providers().await;
            }
        })
    }
}
