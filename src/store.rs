use crate::models::{Episode, ItemKey, LibraryItem, MediaKind, StatusKind};
use crate::region::Region;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn item(&self, key: ItemKey) -> Result<Option<LibraryItem>>;
    async fn items(&self, query: &ItemQuery) -> Result<Vec<LibraryItem>>;
    async fn episode(&self, show: ItemKey, season: i32, episode: i32) -> Result<Option<Episode>>;
    async fn episodes(&self, show: ItemKey) -> Result<Vec<Episode>>;
    /// Writes the whole batch or nothing. Returns the stored items with their local ids.
    async fn apply(&self, batch: WriteBatch) -> Result<Vec<LibraryItem>>;
    async fn region(&self) -> Result<Option<Region>>;
    async fn set_region(&self, region: Region) -> Result<()>;

    async fn upsert_item(&self, item: LibraryItem) -> Result<LibraryItem> {
        let key = item.key();
        self.apply(WriteBatch::new().put_item(item))
            .await?
            .pop()
            .with_context(|| format!("store returned no record for {key}"))
    }

    async fn upsert_episode(&self, episode: Episode) -> Result<()> {
        self.apply(WriteBatch::new().put_episode(episode)).await?;
        Ok(())
    }

    async fn delete_item(&self, key: ItemKey) -> Result<()> {
        self.apply(WriteBatch::new().delete_item(key)).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    items: Vec<LibraryItem>,
    episodes: Vec<Episode>,
    deletes: Vec<ItemKey>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_item(mut self, item: LibraryItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn put_episode(mut self, episode: Episode) -> Self {
        self.episodes.push(episode);
        self
    }

    pub fn put_episodes(mut self, episodes: impl IntoIterator<Item = Episode>) -> Self {
        self.episodes.extend(episodes);
        self
    }

    pub fn delete_item(mut self, key: ItemKey) -> Self {
        self.deletes.push(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.episodes.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemQuery {
    pub kind: Option<MediaKind>,
    pub status: Option<StatusKind>,
    pub min_rating: Option<u8>,
    pub title: Option<String>,
}

impl ItemQuery {
    pub fn kind(kind: MediaKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn matches(&self, item: &LibraryItem) -> bool {
        self.kind.map_or(true, |k| k == item.kind)
            && self.status.map_or(true, |s| s == item.status.kind())
            && self.min_rating.map_or(true, |r| item.rating >= r)
            && self.title.as_deref().map_or(true, |t| {
                item.title.to_lowercase().contains(&t.to_lowercase())
            })
    }
}

type EpisodeId = (ItemKey, i32, i32);

#[derive(Debug, Clone, Default)]
struct State {
    next_local_id: u64,
    items: BTreeMap<ItemKey, LibraryItem>,
    episodes: BTreeMap<EpisodeId, Episode>,
    region: Option<Region>,
}

impl State {
    fn apply(&mut self, batch: WriteBatch) -> Vec<LibraryItem> {
        for key in batch.deletes {
            self.items.remove(&key);
            self.episodes.retain(|(show, _, _), _| *show != key);
        }
        let mut stored = Vec::with_capacity(batch.items.len());
        for mut item in batch.items {
            item.local_id = match self.items.get(&item.key()) {
                Some(existing) => existing.local_id,
                None => {
                    self.next_local_id += 1;
                    self.next_local_id
                }
            };
            self.items.insert(item.key(), item.clone());
            stored.push(item);
        }
        for episode in batch.episodes {
            let id = (episode.show, episode.season_number, episode.episode_number);
            self.episodes.insert(id, episode);
        }
        stored
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    next_local_id: u64,
    #[serde(default)]
    items: Vec<LibraryItem>,
    #[serde(default)]
    episodes: Vec<Episode>,
    region: Option<Region>,
}

impl From<&State> for Snapshot {
    fn from(state: &State) -> Self {
        Self {
            next_local_id: state.next_local_id,
            items: state.items.values().cloned().collect(),
            episodes: state.episodes.values().cloned().collect(),
            region: state.region.clone(),
        }
    }
}

impl From<Snapshot> for State {
    fn from(snapshot: Snapshot) -> Self {
        let max_id = snapshot.items.iter().map(|i| i.local_id).max().unwrap_or(0);
        Self {
            next_local_id: snapshot.next_local_id.max(max_id),
            items: snapshot.items.into_iter().map(|i| (i.key(), i)).collect(),
            episodes: snapshot
                .episodes
                .into_iter()
                .map(|e| ((e.show, e.season_number, e.episode_number), e))
                .collect(),
            region: snapshot.region,
        }
    }
}

#[derive(Debug)]
pub struct JsonStore {
    path: Option<PathBuf>,
    state: RwLock<State>,
}

impl JsonStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let snapshot: Snapshot = serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse library file {}", path.display()))?;
                info!(
                    "Loaded {} items and {} episodes from {}",
                    snapshot.items.len(),
                    snapshot.episodes.len(),
                    path.display()
                );
                State::from(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No library file at {}, starting empty", path.display());
                State::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read library file {}", path.display()))
            }
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(State::default()),
        }
    }

    async fn persist(&self, state: &State) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_vec_pretty(&Snapshot::from(state))
            .context("Failed to serialize library")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!("Persisted library to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for JsonStore {
    async fn item(&self, key: ItemKey) -> Result<Option<LibraryItem>> {
        Ok(self.state.read().await.items.get(&key).cloned())
    }

    async fn items(&self, query: &ItemQuery) -> Result<Vec<LibraryItem>> {
        let state = self.state.read().await;
        let mut items: Vec<LibraryItem> = state
            .items
            .values()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.title.cmp(&b.title).then(a.key().cmp(&b.key())));
        Ok(items)
    }

    async fn episode(&self, show: ItemKey, season: i32, episode: i32) -> Result<Option<Episode>> {
        Ok(self
            .state
            .read()
            .await
            .episodes
            .get(&(show, season, episode))
            .cloned())
    }

    async fn episodes(&self, show: ItemKey) -> Result<Vec<Episode>> {
        let state = self.state.read().await;
        Ok(state
            .episodes
            .range((show, i32::MIN, i32::MIN)..=(show, i32::MAX, i32::MAX))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<Vec<LibraryItem>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let stored = staged.apply(batch);
        self.persist(&staged).await?;
        *state = staged;
        Ok(stored)
    }

    async fn region(&self) -> Result<Option<Region>> {
        Ok(self.state.read().await.region.clone())
    }

    async fn set_region(&self, region: Region) -> Result<()> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        staged.region = Some(region);
        self.persist(&staged).await?;
        *state = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WatchStatus;

    fn show(id: i32, title: &str) -> LibraryItem {
        let mut item = LibraryItem::new(ItemKey::tv(id), title);
        item.number_of_episodes = 10;
        item
    }

    #[tokio::test]
    async fn upsert_assigns_and_keeps_local_ids() {
        let store = JsonStore::in_memory();
        let first = store.upsert_item(show(1, "Dark")).await.unwrap();
        let second = store.upsert_item(show(2, "Andor")).await.unwrap();
        assert_eq!(first.local_id, 1);
        assert_eq!(second.local_id, 2);

        let mut renamed = first.clone();
        renamed.title = "Dark (2017)".to_string();
        renamed.local_id = 0;
        let updated = store.upsert_item(renamed).await.unwrap();
        assert_eq!(updated.local_id, 1);
        assert_eq!(store.items(&ItemQuery::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn movie_and_show_ids_do_not_collide() {
        let store = JsonStore::in_memory();
        store.upsert_item(show(7, "Show")).await.unwrap();
        store
            .upsert_item(LibraryItem::new(ItemKey::movie(7), "Movie"))
            .await
            .unwrap();
        assert_eq!(store.item(ItemKey::tv(7)).await.unwrap().unwrap().title, "Show");
        assert_eq!(store.item(ItemKey::movie(7)).await.unwrap().unwrap().title, "Movie");
    }

    #[tokio::test]
    async fn delete_cascades_to_episodes() {
        let store = JsonStore::in_memory();
        let key = ItemKey::tv(1);
        let other = ItemKey::tv(2);
        store
            .apply(
                WriteBatch::new()
                    .put_item(show(1, "Dark"))
                    .put_item(show(2, "Andor"))
                    .put_episode(Episode::bare(key, 1, 2))
                    .put_episode(Episode::bare(key, 1, 1))
                    .put_episode(Episode::bare(other, 1, 1)),
            )
            .await
            .unwrap();
        let numbers: Vec<_> = store
            .episodes(key)
            .await
            .unwrap()
            .iter()
            .map(Episode::number)
            .collect();
        assert_eq!(numbers, vec![(1, 1), (1, 2)]);

        store.delete_item(key).await.unwrap();
        assert!(store.item(key).await.unwrap().is_none());
        assert!(store.episodes(key).await.unwrap().is_empty());
        assert_eq!(store.episodes(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_filters_and_sorts_by_title() {
        let store = JsonStore::in_memory();
        let mut watched = show(1, "Succession");
        watched.apply_status(WatchStatus::Watched);
        watched.rating = 5;
        store.upsert_item(watched).await.unwrap();
        store.upsert_item(show(2, "Andor")).await.unwrap();
        store
            .upsert_item(LibraryItem::new(ItemKey::movie(3), "Arrival"))
            .await
            .unwrap();

        let shows = store.items(&ItemQuery::kind(MediaKind::Tv)).await.unwrap();
        let titles: Vec<_> = shows.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Andor", "Succession"]);

        let query = ItemQuery {
            status: Some(StatusKind::Watched),
            min_rating: Some(4),
            ..ItemQuery::default()
        };
        assert_eq!(store.items(&query).await.unwrap().len(), 1);

        let query = ItemQuery {
            title: Some("ARR".to_string()),
            ..ItemQuery::default()
        };
        assert_eq!(store.items(&query).await.unwrap()[0].title, "Arrival");
    }

    #[tokio::test]
    async fn reopens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        {
            let store = JsonStore::open(&path).await.unwrap();
            store.upsert_item(show(1, "Dark")).await.unwrap();
            store
                .upsert_episode(Episode::bare(ItemKey::tv(1), 1, 1))
                .await
                .unwrap();
            store.set_region(Region::parse("GB").unwrap()).await.unwrap();
        }
        let store = JsonStore::open(&path).await.unwrap();
        assert_eq!(store.item(ItemKey::tv(1)).await.unwrap().unwrap().local_id, 1);
        assert_eq!(store.episodes(ItemKey::tv(1)).await.unwrap().len(), 1);
        assert_eq!(store.region().await.unwrap().unwrap().as_str(), "GB");

        let next = store.upsert_item(show(2, "Andor")).await.unwrap();
        assert_eq!(next.local_id, 2);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("library.json");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        let store = JsonStore::open(&path).await.unwrap();
        store.upsert_item(show(1, "Dark")).await.unwrap();

        tokio::fs::remove_dir_all(path.parent().unwrap()).await.unwrap();
        assert!(store.upsert_item(show(2, "Andor")).await.is_err());
        assert!(store.item(ItemKey::tv(2)).await.unwrap().is_none());
        assert_eq!(store.items(&ItemQuery::default()).await.unwrap().len(), 1);
    }
}
