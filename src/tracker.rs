use crate::error::LibraryError;
use crate::library::{catalog_error, merge_episode};
use crate::models::{Episode, ItemKey, LibraryItem, MediaKind, WatchStatus};
use crate::store::{LibraryStore, WriteBatch};
use crate::tmdb::CatalogApi;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::debug;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemChanged {
    pub key: ItemKey,
    pub status: WatchStatus,
    pub progress: f64,
}

pub struct WatchTracker {
    catalog: Arc<dyn CatalogApi>,
    store: Arc<dyn LibraryStore>,
    // entries live as long as the tracker; removing an item keeps its lock
    locks: Mutex<HashMap<ItemKey, Arc<Mutex<()>>>>,
    events: broadcast::Sender<ItemChanged>,
}

impl WatchTracker {
    pub fn new(catalog: Arc<dyn CatalogApi>, store: Arc<dyn LibraryStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            catalog,
            store,
            locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemChanged> {
        self.events.subscribe()
    }

    pub async fn lock(&self, key: ItemKey) -> OwnedMutexGuard<()> {
        let item_lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        item_lock.lock_owned().await
    }

    pub async fn set_status(
        &self,
        key: ItemKey,
        status: WatchStatus,
    ) -> Result<LibraryItem, LibraryError> {
        let _guard = self.lock(key).await;
        let mut item = self.load(key).await?;
        let previous = item.status;
        let status = match status {
            WatchStatus::Watching { .. }
                if item.kind == MediaKind::Tv && item.number_of_episodes > 0 =>
            {
                let watched = self.watched_count(key).await?;
                let total = item.number_of_episodes as usize;
                WatchStatus::Watching {
                    progress: watched.min(total) as f64 / total as f64,
                }
            }
            other => other,
        };
        item.apply_status(status);
        let item = self
            .commit(WriteBatch::new().put_item(item), key)
            .await?
            .ok_or(LibraryError::ItemNotFound(key))?;
        debug!(
            item = %key,
            from = ?previous,
            to = ?item.status,
            progress = item.progress,
            "Watch status set"
        );
        Ok(item)
    }

    pub async fn record_episode_watched(
        &self,
        key: ItemKey,
        season: i32,
        episode: i32,
        watched: bool,
    ) -> Result<LibraryItem, LibraryError> {
        let fetched = self.resolve_episode(key, season, episode).await?;
        let _guard = self.lock(key).await;
        self.record_locked(key, season, episode, watched, fetched)
            .await
    }

    /// Returns `None` when every loaded episode is already watched.
    pub async fn mark_next_episode_watched(
        &self,
        key: ItemKey,
    ) -> Result<Option<Episode>, LibraryError> {
        let _guard = self.lock(key).await;
        let show = self.load(key).await?;
        if show.kind != MediaKind::Tv {
            return Err(LibraryError::NotAShow(key));
        }
        let episodes = self.store.episodes(key).await.map_err(LibraryError::Store)?;
        let Some(mut next) = episodes.into_iter().find(|e| !e.is_watched) else {
            return Ok(None);
        };
        self.record_locked(key, next.season_number, next.episode_number, true, None)
            .await?;
        next.is_watched = true;
        Ok(Some(next))
    }

    // Looks the episode up in the catalog when it has not been stored yet.
    // Runs outside the item lock.
    async fn resolve_episode(
        &self,
        key: ItemKey,
        season: i32,
        episode: i32,
    ) -> Result<Option<Episode>, LibraryError> {
        let show = self.load(key).await?;
        if show.kind != MediaKind::Tv {
            return Err(LibraryError::NotAShow(key));
        }
        let stored = self
            .store
            .episode(key, season, episode)
            .await
            .map_err(LibraryError::Store)?;
        if stored.is_some() {
            return Ok(None);
        }
        let remote = self
            .catalog
            .season_episodes(key.tmdb_id, season)
            .await
            .map_err(catalog_error)?
            .into_iter()
            .find(|e| e.season_number == season && e.episode_number == episode)
            .ok_or(LibraryError::EpisodeNotFound {
                show: key,
                season,
                episode,
            })?;
        Ok(Some(merge_episode(key, remote, None)))
    }

    async fn record_locked(
        &self,
        key: ItemKey,
        season: i32,
        episode: i32,
        watched: bool,
        fetched: Option<Episode>,
    ) -> Result<LibraryItem, LibraryError> {
        let mut show = self.load(key).await?;
        if show.kind != MediaKind::Tv {
            return Err(LibraryError::NotAShow(key));
        }

        let episodes = self.store.episodes(key).await.map_err(LibraryError::Store)?;
        let mut target = episodes
            .iter()
            .find(|e| e.number() == (season, episode))
            .cloned()
            .or(fetched)
            .ok_or(LibraryError::EpisodeNotFound {
                show: key,
                season,
                episode,
            })?;
        target.is_watched = watched;

        let watched_count = episodes
            .iter()
            .filter(|e| e.number() != (season, episode) && e.is_watched)
            .count()
            + usize::from(watched);

        let mut batch = WriteBatch::new().put_episode(target);
        if show.apply_episode_rollup(watched_count, show.number_of_episodes) {
            batch = batch.put_item(show.clone());
        } else {
            debug!(item = %key, "No episode count for show, status left unchanged");
        }

        let show = self.commit(batch, key).await?.unwrap_or(show);
        debug!(
            item = %key,
            season,
            episode,
            watched,
            watched_count,
            status = ?show.status,
            progress = show.progress,
            "Episode progress recorded"
        );
        Ok(show)
    }

    async fn load(&self, key: ItemKey) -> Result<LibraryItem, LibraryError> {
        self.store
            .item(key)
            .await
            .map_err(LibraryError::Store)?
            .ok_or(LibraryError::ItemNotFound(key))
    }

    async fn watched_count(&self, key: ItemKey) -> Result<usize, LibraryError> {
        let episodes = self.store.episodes(key).await.map_err(LibraryError::Store)?;
        Ok(episodes.iter().filter(|e| e.is_watched).count())
    }

    async fn commit(
        &self,
        batch: WriteBatch,
        key: ItemKey,
    ) -> Result<Option<LibraryItem>, LibraryError> {
        let stored = self.store.apply(batch).await.map_err(LibraryError::Store)?;
        let Some(item) = stored.into_iter().find(|i| i.key() == key) else {
            return Ok(None);
        };
        let _ = self.events.send(ItemChanged {
            key,
            status: item.status,
            progress: item.progress,
        });
        Ok(Some(item))
    }
}
