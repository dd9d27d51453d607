use crate::error::LibraryError;
use crate::models::{Episode, ItemKey, LibraryItem, MediaKind, MAX_RATING};
use crate::region::{Region, RegionSetting};
use crate::stats::{self, LibraryStats};
use crate::store::{ItemQuery, LibraryStore, WriteBatch};
use crate::tmdb::{self, CatalogApi, CatalogEpisode, Detail, MovieDetail, Provider, ShowDetail, Summary};
use crate::tracker::WatchTracker;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct Library {
    catalog: Arc<dyn CatalogApi>,
    store: Arc<dyn LibraryStore>,
    tracker: WatchTracker,
    region: RegionSetting,
    region_write: Mutex<()>,
}

impl Library {
    pub fn new(catalog: Arc<dyn CatalogApi>, store: Arc<dyn LibraryStore>, region: RegionSetting) -> Self {
        let tracker = WatchTracker::new(catalog.clone(), store.clone());
        Self {
            catalog,
            store,
            tracker,
            region,
            region_write: Mutex::new(()),
        }
    }

    pub async fn open(
        catalog: Arc<dyn CatalogApi>,
        store: Arc<dyn LibraryStore>,
        fallback: Region,
    ) -> anyhow::Result<Self> {
        let region = store.region().await?.unwrap_or(fallback);
        info!("Watch provider region: {}", region);
        Ok(Self::new(catalog, store, RegionSetting::new(region)))
    }

    pub fn tracker(&self) -> &WatchTracker {
        &self.tracker
    }

    pub fn region(&self) -> &RegionSetting {
        &self.region
    }

    pub async fn set_region(&self, region: Region) -> Result<bool, LibraryError> {
        // store and setting must agree after concurrent changes
        let _guard = self.region_write.lock().await;
        self.store
            .set_region(region.clone())
            .await
            .map_err(LibraryError::Store)?;
        let changed = self.region.set(region.clone());
        if changed {
            info!("Region changed to {}", region);
        }
        Ok(changed)
    }

    pub async fn trending(&self, kind: MediaKind) -> Result<Vec<Summary>, LibraryError> {
        self.catalog.trending(kind).await.map_err(catalog_error)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Summary>, LibraryError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.catalog.search(query).await.map_err(catalog_error)?;
        Ok(tmdb::titles_only(results))
    }

    pub async fn add(&self, kind: MediaKind, tmdb_id: i32) -> Result<LibraryItem, LibraryError> {
        if tmdb_id <= 0 {
            return Err(LibraryError::InvalidId(tmdb_id));
        }
        let key = ItemKey { kind, tmdb_id };
        let detail = self.catalog.detail(kind, tmdb_id).await.map_err(catalog_error)?;

        let _guard = self.tracker.lock(key).await;
        let existing = self.store.item(key).await.map_err(LibraryError::Store)?;
        let mut item = existing.clone().unwrap_or_else(|| LibraryItem::new(key, ""));
        match detail {
            Detail::Movie(movie) => fill_from_movie(&mut item, movie),
            Detail::Show(show) => fill_from_show(&mut item, show),
        }
        let stored = self.store.upsert_item(item).await.map_err(LibraryError::Store)?;
        if existing.is_some() {
            info!("Refreshed '{}' ({})", stored.title, key);
        } else {
            info!("Added '{}' ({}) to the library", stored.title, key);
        }
        Ok(stored)
    }

    pub async fn remove(&self, key: ItemKey) -> Result<(), LibraryError> {
        let _guard = self.tracker.lock(key).await;
        self.item(key).await?;
        self.store.delete_item(key).await.map_err(LibraryError::Store)?;
        info!("Removed {} from the library", key);
        Ok(())
    }

    pub async fn item(&self, key: ItemKey) -> Result<LibraryItem, LibraryError> {
        self.store
            .item(key)
            .await
            .map_err(LibraryError::Store)?
            .ok_or(LibraryError::ItemNotFound(key))
    }

    pub async fn list(&self, query: &ItemQuery) -> Result<Vec<LibraryItem>, LibraryError> {
        self.store.items(query).await.map_err(LibraryError::Store)
    }

    pub async fn rate(&self, key: ItemKey, rating: u8) -> Result<LibraryItem, LibraryError> {
        check_rating(rating)?;
        let _guard = self.tracker.lock(key).await;
        let mut item = self.item(key).await?;
        item.rating = rating;
        self.store.upsert_item(item).await.map_err(LibraryError::Store)
    }

    pub async fn rate_episode(
        &self,
        key: ItemKey,
        season: i32,
        episode: i32,
        rating: u8,
    ) -> Result<Episode, LibraryError> {
        check_rating(rating)?;
        let _guard = self.tracker.lock(key).await;
        let mut stored = self
            .store
            .episode(key, season, episode)
            .await
            .map_err(LibraryError::Store)?
            .ok_or(LibraryError::EpisodeNotFound {
                show: key,
                season,
                episode,
            })?;
        stored.rating = rating;
        self.store
            .upsert_episode(stored.clone())
            .await
            .map_err(LibraryError::Store)?;
        Ok(stored)
    }

    pub async fn load_season(&self, key: ItemKey, season: i32) -> Result<Vec<Episode>, LibraryError> {
        let show = self.item(key).await?;
        if show.kind != MediaKind::Tv {
            return Err(LibraryError::NotAShow(key));
        }
        let fetched = self
            .catalog
            .season_episodes(key.tmdb_id, season)
            .await
            .map_err(catalog_error)?;

        let _guard = self.tracker.lock(key).await;
        let known = self.store.episodes(key).await.map_err(LibraryError::Store)?;
        let merged: Vec<Episode> = fetched
            .into_iter()
            .map(|remote| {
                let local = known
                    .iter()
                    .find(|e| e.number() == (remote.season_number, remote.episode_number));
                merge_episode(key, remote, local)
            })
            .collect();
        self.store
            .apply(WriteBatch::new().put_episodes(merged.clone()))
            .await
            .map_err(LibraryError::Store)?;
        Ok(merged)
    }

    pub async fn episodes(&self, key: ItemKey) -> Result<Vec<Episode>, LibraryError> {
        self.store.episodes(key).await.map_err(LibraryError::Store)
    }

    pub async fn next_episode(&self, key: ItemKey) -> Result<Option<Episode>, LibraryError> {
        Ok(self.episodes(key).await?.into_iter().find(|e| !e.is_watched))
    }

    pub async fn providers(&self, key: ItemKey) -> Result<Vec<Provider>, LibraryError> {
        let region = self.region.get();
        self.providers_in(key, &region).await
    }

    pub async fn providers_in(&self, key: ItemKey, region: &Region) -> Result<Vec<Provider>, LibraryError> {
        let response = self
            .catalog
            .watch_providers(key.kind, key.tmdb_id)
            .await
            .map_err(catalog_error)?;
        Ok(tmdb::providers_for_region(&response, region))
    }

    pub async fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let items = self.list(&ItemQuery::default()).await?;
        Ok(stats::compute(&items))
    }
}

pub(crate) fn catalog_error(err: anyhow::Error) -> LibraryError {
    warn!("Catalog request failed: {:#}", err);
    LibraryError::Catalog(err)
}

fn check_rating(rating: u8) -> Result<(), LibraryError> {
    if rating > MAX_RATING {
        return Err(LibraryError::InvalidRating(rating));
    }
    Ok(())
}

fn fill_from_movie(item: &mut LibraryItem, movie: MovieDetail) {
    item.title = movie.title;
    item.overview = movie.overview;
    item.poster_path = movie.poster_path;
    item.backdrop_path = movie.backdrop_path;
    item.release_date = tmdb::parse_date(movie.release_date.as_deref());
    item.runtime_minutes = movie.runtime;
    item.genres = movie.genres.into_iter().map(|g| g.name).collect();
}

fn fill_from_show(item: &mut LibraryItem, show: ShowDetail) {
    item.title = show.name;
    item.overview = show.overview;
    item.poster_path = show.poster_path;
    item.backdrop_path = show.backdrop_path;
    item.release_date = tmdb::parse_date(show.first_air_date.as_deref());
    item.number_of_seasons = show.number_of_seasons;
    item.number_of_episodes = show.number_of_episodes;
    item.show_status = show.status.filter(|s| !s.is_empty());
    item.genres = show.genres.into_iter().map(|g| g.name).collect();
}

pub(crate) fn merge_episode(show: ItemKey, remote: CatalogEpisode, local: Option<&Episode>) -> Episode {
    Episode {
        show,
        season_number: remote.season_number,
        episode_number: remote.episode_number,
        tmdb_id: Some(remote.id),
        name: remote.name,
        overview: remote.overview,
        air_date: tmdb::parse_date(remote.air_date.as_deref()),
        still_path: remote.still_path,
        is_watched: local.is_some_and(|e| e.is_watched),
        rating: local.map_or(0, |e| e.rating),
    }
}
