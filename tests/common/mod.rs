#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ratchet::library::Library;
use ratchet::models::MediaKind;
use ratchet::region::{Region, RegionSetting};
use ratchet::store::{JsonStore, LibraryStore};
use ratchet::tmdb::{
    CatalogApi, CatalogEpisode, CountryProviders, Genre, MovieDetail, Provider, SearchMediaType,
    SearchResult, SeasonSummary, ShowDetail, Summary, WatchProviderResponse,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const BREAKING_BAD: i32 = 1396;
pub const INCEPTION: i32 = 27205;

/// Holds `season_episodes` for one season until released.
pub struct SeasonGate {
    pub season: i32,
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeCatalog {
    movies: Mutex<HashMap<i32, MovieDetail>>,
    shows: Mutex<HashMap<i32, ShowDetail>>,
    seasons: Mutex<HashMap<(i32, i32), Vec<CatalogEpisode>>>,
    providers: Mutex<HashMap<(MediaKind, i32), WatchProviderResponse>>,
    gate: Mutex<Option<Arc<SeasonGate>>>,
    failing: AtomicBool,
    pub provider_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_movie(self, id: i32, title: &str, runtime: u32) -> Self {
        self.movies.lock().unwrap().insert(
            id,
            MovieDetail {
                id,
                title: title.to_string(),
                overview: format!("{title} overview"),
                poster_path: Some(format!("/{id}.jpg")),
                backdrop_path: None,
                release_date: Some("2010-07-15".to_string()),
                runtime: Some(runtime),
                vote_average: 8.4,
                genres: vec![Genre {
                    id: 878,
                    name: "Science Fiction".to_string(),
                }],
            },
        );
        self
    }

    /// Registers a show whose seasons have the given episode counts, numbered from 1.
    pub fn with_show(self, id: i32, name: &str, season_sizes: &[u32]) -> Self {
        let mut seasons = Vec::new();
        for (index, size) in season_sizes.iter().enumerate() {
            let season = index as i32 + 1;
            seasons.push(SeasonSummary {
                id: id * 100 + season,
                name: format!("Season {season}"),
                season_number: season,
                episode_count: *size,
                poster_path: None,
            });
            let episodes = (1..=*size as i32)
                .map(|episode| episode_fixture(id, season, episode))
                .collect();
            self.seasons.lock().unwrap().insert((id, season), episodes);
        }
        self.shows.lock().unwrap().insert(
            id,
            ShowDetail {
                id,
                name: name.to_string(),
                overview: format!("{name} overview"),
                poster_path: Some(format!("/{id}.jpg")),
                backdrop_path: Some(format!("/{id}-backdrop.jpg")),
                first_air_date: Some("2008-01-20".to_string()),
                number_of_seasons: season_sizes.len() as u32,
                number_of_episodes: season_sizes.iter().sum(),
                vote_average: 8.9,
                status: Some("Ended".to_string()),
                genres: vec![Genre {
                    id: 18,
                    name: "Drama".to_string(),
                }],
                seasons,
            },
        );
        self
    }

    pub fn with_providers(self, kind: MediaKind, id: i32, response: WatchProviderResponse) -> Self {
        self.providers.lock().unwrap().insert((kind, id), response);
        self
    }

    pub fn rename_episode(&self, show: i32, season: i32, episode: i32, name: &str) {
        let mut seasons = self.seasons.lock().unwrap();
        if let Some(e) = seasons
            .get_mut(&(show, season))
            .and_then(|eps| eps.iter_mut().find(|e| e.episode_number == episode))
        {
            e.name = name.to_string();
        }
    }

    pub fn gate_season(&self, season: i32) -> Arc<SeasonGate> {
        let gate = Arc::new(SeasonGate {
            season,
            entered: Notify::new(),
            release: Notify::new(),
        });
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("TMDB API error: 503 Service Unavailable"));
        }
        Ok(())
    }
}

fn episode_fixture(show: i32, season: i32, episode: i32) -> CatalogEpisode {
    CatalogEpisode {
        id: show * 10_000 + season * 100 + episode,
        name: format!("Episode {episode}"),
        overview: String::new(),
        episode_number: episode,
        season_number: season,
        still_path: Some(format!("/still-{season}-{episode}.jpg")),
        air_date: Some("2008-01-20".to_string()),
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn trending(&self, kind: MediaKind) -> Result<Vec<Summary>> {
        self.check()?;
        let summaries = match kind {
            MediaKind::Movie => self
                .movies
                .lock()
                .unwrap()
                .values()
                .map(|m| Summary {
                    id: m.id,
                    kind,
                    title: m.title.clone(),
                    overview: m.overview.clone(),
                    poster_path: m.poster_path.clone(),
                    backdrop_path: m.backdrop_path.clone(),
                    date: m.release_date.clone(),
                    vote_average: m.vote_average,
                })
                .collect(),
            MediaKind::Tv => self
                .shows
                .lock()
                .unwrap()
                .values()
                .map(|s| Summary {
                    id: s.id,
                    kind,
                    title: s.name.clone(),
                    overview: s.overview.clone(),
                    poster_path: s.poster_path.clone(),
                    backdrop_path: s.backdrop_path.clone(),
                    date: s.first_air_date.clone(),
                    vote_average: s.vote_average,
                })
                .collect(),
        };
        Ok(summaries)
    }

    async fn movie_detail(&self, id: i32) -> Result<MovieDetail> {
        self.check()?;
        self.movies
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("TMDB API error: 404 Not Found"))
    }

    async fn show_detail(&self, id: i32) -> Result<ShowDetail> {
        self.check()?;
        self.shows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("TMDB API error: 404 Not Found"))
    }

    async fn season_episodes(&self, show_id: i32, season: i32) -> Result<Vec<CatalogEpisode>> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate.filter(|g| g.season == season) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.check()?;
        Ok(self
            .seasons
            .lock()
            .unwrap()
            .get(&(show_id, season))
            .cloned()
            .unwrap_or_default())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.check()?;
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let query = query.to_lowercase();
        let mut results: Vec<SearchResult> = self
            .shows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.name.to_lowercase().contains(&query))
            .map(|s| SearchResult {
                id: s.id,
                media_type: SearchMediaType::Tv,
                title: None,
                release_date: None,
                name: Some(s.name.clone()),
                first_air_date: s.first_air_date.clone(),
                poster_path: s.poster_path.clone(),
                backdrop_path: None,
                overview: Some(s.overview.clone()),
                vote_average: Some(s.vote_average),
            })
            .collect();
        results.push(SearchResult {
            id: 17419,
            media_type: SearchMediaType::Person,
            title: None,
            release_date: None,
            name: Some("Bryan Cranston".to_string()),
            first_air_date: None,
            poster_path: None,
            backdrop_path: None,
            overview: None,
            vote_average: None,
        });
        Ok(results)
    }

    async fn watch_providers(&self, kind: MediaKind, id: i32) -> Result<WatchProviderResponse> {
        self.check()?;
        self.provider_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .providers
            .lock()
            .unwrap()
            .get(&(kind, id))
            .cloned()
            .unwrap_or_else(|| WatchProviderResponse {
                id,
                results: HashMap::new(),
            }))
    }
}

pub fn provider(id: i32, name: &str) -> Provider {
    Provider {
        provider_id: id,
        provider_name: name.to_string(),
        logo_path: Some(format!("/logo-{id}.png")),
    }
}

/// US: Netflix streaming plus Apple TV to buy, Netflix listed again under buy.
/// GB: Amazon to rent.
pub fn us_gb_providers(id: i32) -> WatchProviderResponse {
    let netflix = provider(8, "Netflix");
    let apple = provider(2, "Apple TV");
    let amazon = provider(10, "Amazon Video");
    WatchProviderResponse {
        id,
        results: HashMap::from([
            (
                "US".to_string(),
                CountryProviders {
                    link: Some(format!("https://www.themoviedb.org/tv/{id}/watch?locale=US")),
                    flatrate: Some(vec![netflix.clone()]),
                    rent: None,
                    buy: Some(vec![apple, netflix]),
                },
            ),
            (
                "GB".to_string(),
                CountryProviders {
                    link: None,
                    flatrate: None,
                    rent: Some(vec![amazon]),
                    buy: None,
                },
            ),
        ]),
    }
}

pub fn default_catalog() -> FakeCatalog {
    FakeCatalog::default()
        .with_show(BREAKING_BAD, "Breaking Bad", &[10, 13])
        .with_movie(INCEPTION, "Inception", 148)
        .with_providers(MediaKind::Tv, BREAKING_BAD, us_gb_providers(BREAKING_BAD))
}

pub fn library_with(catalog: Arc<FakeCatalog>) -> Arc<Library> {
    library_on(catalog, Arc::new(JsonStore::in_memory()))
}

pub fn library_on(catalog: Arc<FakeCatalog>, store: Arc<dyn LibraryStore>) -> Arc<Library> {
    Arc::new(Library::new(
        catalog,
        store,
        RegionSetting::new(Region::default()),
    ))
}

/// Polls `check` until it holds or two seconds pass.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
