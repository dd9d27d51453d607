use crate::config::Settings;
use crate::error::LibraryError;
use crate::library::Library;
use crate::models::{Episode, ItemKey, LibraryItem, MediaKind, WatchStatus};
use crate::region::{Region, KNOWN_COUNTRIES};
use crate::stats::LibraryStats;
use crate::store::{ItemQuery, JsonStore, LibraryStore};
use crate::tmdb::{self, CatalogApi, Provider, Summary, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::TypedHeader;
use constant_time_eq::constant_time_eq;
use headers::authorization::{Authorization, Bearer};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    pub api_token: Option<Arc<str>>,
}

pub async fn run_server(settings: Settings) -> Result<()> {
    let catalog: Arc<dyn CatalogApi> = Arc::new(TmdbClient::new(
        settings.tmdb_api_key.clone(),
        settings.tmdb_base_url.clone(),
    )?);
    let store: Arc<dyn LibraryStore> = Arc::new(JsonStore::open(&settings.data_path).await?);
    let library = Arc::new(Library::open(catalog, store, settings.region.clone()).await?);
    if settings.api_token.is_none() {
        warn!("API_TOKEN not set, the API is open to anyone who can reach it");
    }

    let state = AppState {
        library,
        api_token: settings.api_token.as_deref().map(Arc::from),
    };
    let app = build_router(state);

    info!("Listening on {}", settings.bind_addr);
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/trending/:kind", get(trending))
        .route("/search", get(search))
        .route("/library", get(list_library).post(add_item))
        .route("/library/:kind/:id", get(get_item).delete(remove_item))
        .route("/library/:kind/:id/status", put(set_status))
        .route("/library/:kind/:id/rating", put(rate_item))
        .route("/library/:kind/:id/providers", get(providers))
        .route("/library/:kind/:id/episodes", get(list_episodes))
        .route("/library/:kind/:id/seasons/:season", get(load_season))
        .route(
            "/library/:kind/:id/seasons/:season/episodes/:episode",
            put(record_episode),
        )
        .route(
            "/library/:kind/:id/seasons/:season/episodes/:episode/rating",
            put(rate_episode),
        )
        .route("/library/:kind/:id/next", post(mark_next_episode))
        .route("/settings/region", get(get_region).put(set_region))
        .route("/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for LibraryError {
    fn into_response(self) -> Response {
        let status = match &self {
            LibraryError::ItemNotFound(_) | LibraryError::EpisodeNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            LibraryError::NotAShow(_)
            | LibraryError::InvalidRating(_)
            | LibraryError::InvalidId(_)
            | LibraryError::InvalidRegion(_) => StatusCode::BAD_REQUEST,
            LibraryError::Catalog(_) => StatusCode::BAD_GATEWAY,
            LibraryError::Store(e) => {
                error!("Library write failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({ "status": "error", "message": self.user_message() });
        (status, Json(body)).into_response()
    }
}

async fn require_token(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = state.api_token.as_deref() {
        let presented = bearer.as_ref().map(|TypedHeader(auth)| auth.token());
        let valid = presented
            .map(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
            .unwrap_or(false);
        if !valid {
            warn!("Rejecting request to {}: invalid or missing token", request.uri().path());
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "error", "message": "Invalid or missing API token" })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: LibraryItem,
    pub status_title: &'static str,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
}

impl From<LibraryItem> for ItemView {
    fn from(item: LibraryItem) -> Self {
        Self {
            status_title: item.status.display_title(),
            poster_url: item.poster_path.as_deref().map(tmdb::poster_url),
            backdrop_url: item.backdrop_path.as_deref().map(tmdb::backdrop_url),
            item,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EpisodeView {
    #[serde(flatten)]
    pub episode: Episode,
    pub still_url: Option<String>,
}

impl From<Episode> for EpisodeView {
    fn from(episode: Episode) -> Self {
        Self {
            still_url: episode.still_path.as_deref().map(tmdb::poster_url),
            episode,
        }
    }
}

fn show_key(kind: MediaKind, id: i32) -> Result<ItemKey, LibraryError> {
    let key = ItemKey { kind, tmdb_id: id };
    if kind != MediaKind::Tv {
        return Err(LibraryError::NotAShow(key));
    }
    Ok(key)
}

fn episode_views(episodes: Vec<Episode>) -> Vec<EpisodeView> {
    episodes.into_iter().map(EpisodeView::from).collect()
}

async fn trending(
    State(state): State<AppState>,
    Path(kind): Path<MediaKind>,
) -> Result<Json<Vec<Summary>>, LibraryError> {
    Ok(Json(state.library.trending(kind).await?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Summary>>, LibraryError> {
    Ok(Json(state.library.search(&params.query).await?))
}

async fn list_library(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<Vec<ItemView>>, LibraryError> {
    let items = state.library.list(&query).await?;
    Ok(Json(items.into_iter().map(ItemView::from).collect()))
}

#[derive(Debug, Deserialize)]
struct AddItem {
    kind: MediaKind,
    tmdb_id: i32,
}

async fn add_item(
    State(state): State<AppState>,
    Json(body): Json<AddItem>,
) -> Result<(StatusCode, Json<ItemView>), LibraryError> {
    let item = state.library.add(body.kind, body.tmdb_id).await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

async fn get_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(MediaKind, i32)>,
) -> Result<Json<ItemView>, LibraryError> {
    let item = state.library.item(ItemKey { kind, tmdb_id: id }).await?;
    Ok(Json(item.into()))
}

async fn remove_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(MediaKind, i32)>,
) -> Result<StatusCode, LibraryError> {
    state.library.remove(ItemKey { kind, tmdb_id: id }).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    State(state): State<AppState>,
    Path((kind, id)): Path<(MediaKind, i32)>,
    Json(status): Json<WatchStatus>,
) -> Result<Json<ItemView>, LibraryError> {
    let item = state
        .library
        .tracker()
        .set_status(ItemKey { kind, tmdb_id: id }, status)
        .await?;
    Ok(Json(item.into()))
}

#[derive(Debug, Deserialize)]
struct RatingBody {
    rating: u8,
}

async fn rate_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(MediaKind, i32)>,
    Json(body): Json<RatingBody>,
) -> Result<Json<ItemView>, LibraryError> {
    let item = state
        .library
        .rate(ItemKey { kind, tmdb_id: id }, body.rating)
        .await?;
    Ok(Json(item.into()))
}

#[derive(Debug, Serialize)]
struct ProvidersView {
    region: Region,
    providers: Vec<Provider>,
}

async fn providers(
    State(state): State<AppState>,
    Path((kind, id)): Path<(MediaKind, i32)>,
) -> Result<Json<ProvidersView>, LibraryError> {
    let key = ItemKey { kind, tmdb_id: id };
    state.library.item(key).await?;
    let region = state.library.region().get();
    let providers = state.library.providers_in(key, &region).await?;
    Ok(Json(ProvidersView { region, providers }))
}

async fn list_episodes(
    State(state): State<AppState>,
    Path((kind, id)): Path<(MediaKind, i32)>,
) -> Result<Json<Vec<EpisodeView>>, LibraryError> {
    let episodes = state.library.episodes(show_key(kind, id)?).await?;
    Ok(Json(episode_views(episodes)))
}

async fn load_season(
    State(state): State<AppState>,
    Path((kind, id, season)): Path<(MediaKind, i32, i32)>,
) -> Result<Json<Vec<EpisodeView>>, LibraryError> {
    let episodes = state.library.load_season(show_key(kind, id)?, season).await?;
    Ok(Json(episode_views(episodes)))
}

#[derive(Debug, Deserialize)]
struct WatchedBody {
    watched: bool,
}

async fn record_episode(
    State(state): State<AppState>,
    Path((kind, id, season, episode)): Path<(MediaKind, i32, i32, i32)>,
    Json(body): Json<WatchedBody>,
) -> Result<Json<ItemView>, LibraryError> {
    let show = state
        .library
        .tracker()
        .record_episode_watched(show_key(kind, id)?, season, episode, body.watched)
        .await?;
    Ok(Json(show.into()))
}

async fn rate_episode(
    State(state): State<AppState>,
    Path((kind, id, season, episode)): Path<(MediaKind, i32, i32, i32)>,
    Json(body): Json<RatingBody>,
) -> Result<Json<EpisodeView>, LibraryError> {
    let episode = state
        .library
        .rate_episode(show_key(kind, id)?, season, episode, body.rating)
        .await?;
    Ok(Json(episode.into()))
}

async fn mark_next_episode(
    State(state): State<AppState>,
    Path((kind, id)): Path<(MediaKind, i32)>,
) -> Result<Json<Option<EpisodeView>>, LibraryError> {
    let marked = state
        .library
        .tracker()
        .mark_next_episode_watched(show_key(kind, id)?)
        .await?;
    Ok(Json(marked.map(EpisodeView::from)))
}

#[derive(Debug, Serialize)]
struct RegionView {
    region: Region,
    country_name: Option<&'static str>,
    known_countries: Vec<(&'static str, &'static str)>,
}

fn region_view(region: Region) -> RegionView {
    RegionView {
        country_name: region.country_name(),
        region,
        known_countries: KNOWN_COUNTRIES.iter().map(|(c, n)| (*c, *n)).collect(),
    }
}

async fn get_region(State(state): State<AppState>) -> Json<RegionView> {
    Json(region_view(state.library.region().get()))
}

#[derive(Debug, Deserialize)]
struct RegionBody {
    region: String,
}

async fn set_region(
    State(state): State<AppState>,
    Json(body): Json<RegionBody>,
) -> Result<Json<RegionView>, LibraryError> {
    let region = Region::parse(&body.region)?;
    state.library.set_region(region.clone()).await?;
    Ok(Json(region_view(region)))
}

async fn stats(State(state): State<AppState>) -> Result<Json<LibraryStats>, LibraryError> {
    Ok(Json(state.library.stats().await?))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
