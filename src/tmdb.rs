use crate::models::MediaKind;
use crate::region::Region;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";
const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";
const BACKDROP_BASE: &str = "https://image.tmdb.org/t/p/w1280";

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn trending(&self, kind: MediaKind) -> Result<Vec<Summary>>;
    async fn movie_detail(&self, id: i32) -> Result<MovieDetail>;
    async fn show_detail(&self, id: i32) -> Result<ShowDetail>;
    async fn season_episodes(&self, show_id: i32, season: i32) -> Result<Vec<CatalogEpisode>>;
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
    async fn watch_providers(&self, kind: MediaKind, id: i32) -> Result<WatchProviderResponse>;

    async fn detail(&self, kind: MediaKind, id: i32) -> Result<Detail> {
        match kind {
            MediaKind::Movie => self.movie_detail(id).await.map(Detail::Movie),
            MediaKind::Tv => self.show_detail(id).await.map(Detail::Show),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub id: i32,
    pub kind: MediaKind,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub date: Option<String>,
    pub vote_average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMediaType {
    Movie,
    Tv,
    Person,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: i32,
    pub media_type: SearchMediaType,
    pub title: Option<String>,
    pub release_date: Option<String>,
    pub name: Option<String>,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    pub vote_average: Option<f64>,
}

impl SearchResult {
    pub fn into_summary(self) -> Option<Summary> {
        let kind = match self.media_type {
            SearchMediaType::Movie => MediaKind::Movie,
            SearchMediaType::Tv => MediaKind::Tv,
            SearchMediaType::Person => return None,
        };
        let (title, date) = match kind {
            MediaKind::Movie => (self.title, self.release_date),
            MediaKind::Tv => (self.name, self.first_air_date),
        };
        Some(Summary {
            id: self.id,
            kind,
            title: title.unwrap_or_else(|| "Unknown".to_string()),
            overview: self.overview.unwrap_or_default(),
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            date,
            vote_average: self.vote_average.unwrap_or_default(),
        })
    }
}

pub fn titles_only(results: Vec<SearchResult>) -> Vec<Summary> {
    results
        .into_iter()
        .filter_map(SearchResult::into_summary)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub id: i32,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub runtime: Option<u32>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowDetail {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub number_of_seasons: u32,
    #[serde(default)]
    pub number_of_episodes: u32,
    #[serde(default)]
    pub vote_average: f64,
    pub status: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub seasons: Vec<SeasonSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub id: i32,
    pub name: String,
    pub season_number: i32,
    #[serde(default)]
    pub episode_count: u32,
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Detail {
    Movie(MovieDetail),
    Show(ShowDetail),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEpisode {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub overview: String,
    pub episode_number: i32,
    pub season_number: i32,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeasonDetail {
    #[serde(default)]
    episodes: Vec<CatalogEpisode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchProviderResponse {
    pub id: i32,
    #[serde(default)]
    pub results: HashMap<String, CountryProviders>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountryProviders {
    pub link: Option<String>,
    pub flatrate: Option<Vec<Provider>>,
    pub rent: Option<Vec<Provider>>,
    pub buy: Option<Vec<Provider>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id: i32,
    pub provider_name: String,
    pub logo_path: Option<String>,
}

impl Provider {
    pub fn logo_url(&self) -> Option<String> {
        self.logo_path.as_deref().map(poster_url)
    }
}

/// Flatrate, rent and buy offers merged so each provider appears once, first offer wins.
pub fn merge_providers(country: &CountryProviders) -> Vec<Provider> {
    let offers = [&country.flatrate, &country.rent, &country.buy];
    offers
        .into_iter()
        .flatten()
        .flatten()
        .fold(Vec::new(), |mut merged: Vec<Provider>, provider| {
            if !merged.iter().any(|p| p.provider_id == provider.provider_id) {
                merged.push(provider.clone());
            }
            merged
        })
}

pub fn providers_for_region(response: &WatchProviderResponse, region: &Region) -> Vec<Provider> {
    response
        .results
        .get(region.as_str())
        .map(merge_providers)
        .unwrap_or_default()
}

pub fn poster_url(path: &str) -> String {
    format!("{POSTER_BASE}{path}")
}

pub fn backdrop_url(path: &str) -> String {
    format!("{BACKDROP_BASE}{path}")
}

pub fn parse_date(date: Option<&str>) -> Option<NaiveDate> {
    date.filter(|d| !d.is_empty())
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let user_agent = format!("ratchet/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}{path}?api_key={}", self.base_url, self.api_key);
        for (key, value) in query {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!("GET {}", path);
        let res = self
            .client
            .get(self.endpoint(path, query))
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{} -> {}: {}", path, status, text));
        }
        let parsed: T = serde_json::from_str(&text)
            .with_context(|| format!("JSON parse failed for {path}"))?;
        Ok(parsed)
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn trending(&self, kind: MediaKind) -> Result<Vec<Summary>> {
        #[derive(Deserialize)]
        struct TrendingEntry {
            id: i32,
            title: Option<String>,
            name: Option<String>,
            overview: Option<String>,
            poster_path: Option<String>,
            backdrop_path: Option<String>,
            release_date: Option<String>,
            first_air_date: Option<String>,
            vote_average: Option<f64>,
        }
        #[derive(Deserialize)]
        struct TrendingResponse {
            results: Vec<TrendingEntry>,
        }

        let path = format!("/trending/{}/week", kind.as_path());
        let data: TrendingResponse = self.get_json(&path, &[]).await?;
        Ok(data
            .results
            .into_iter()
            .map(|e| Summary {
                id: e.id,
                kind,
                title: e.title.or(e.name).unwrap_or_else(|| "Unknown".to_string()),
                overview: e.overview.unwrap_or_default(),
                poster_path: e.poster_path,
                backdrop_path: e.backdrop_path,
                date: e.release_date.or(e.first_air_date),
                vote_average: e.vote_average.unwrap_or_default(),
            })
            .collect())
    }

    async fn movie_detail(&self, id: i32) -> Result<MovieDetail> {
        self.get_json(&format!("/movie/{id}"), &[("language", "en-US")])
            .await
    }

    async fn show_detail(&self, id: i32) -> Result<ShowDetail> {
        self.get_json(&format!("/tv/{id}"), &[("language", "en-US")])
            .await
    }

    async fn season_episodes(&self, show_id: i32, season: i32) -> Result<Vec<CatalogEpisode>> {
        let detail: SeasonDetail = self
            .get_json(&format!("/tv/{show_id}/season/{season}"), &[("language", "en-US")])
            .await?;
        Ok(detail.episodes)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        #[derive(Deserialize)]
        struct SearchResponse {
            results: Vec<serde_json::Value>,
        }

        let data: SearchResponse = self
            .get_json("/search/multi", &[("query", query), ("language", "en-US")])
            .await?;
        // Entries with a media_type we don't model (collections, etc.) are skipped.
        Ok(data
            .results
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    async fn watch_providers(&self, kind: MediaKind, id: i32) -> Result<WatchProviderResponse> {
        self.get_json(&format!("/{}/{id}/watch/providers", kind.as_path()), &[])
            .await
    }
}
