//! JSON API over the snapshot store

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use trendwatch_common::{Language, LanguageError, Period, RankedItem};

use crate::store::{SnapshotStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    store: Arc<SnapshotStore>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid language specified: {0}")]
    Language(#[from] LanguageError),

    #[error("Some error with loading: {0}")]
    Store(#[from] StoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Language(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendingParams {
    /// Comma separated store keys; empty means the follow set
    #[serde(default)]
    pub langs: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapeParams {
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LanguageScrape {
    pub lang: &'static Language,
    pub items: Vec<RankedItem>,
    pub scraped: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub period: Period,
    pub langs: Vec<LanguageScrape>,
    pub store_duration_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub lang: &'static Language,
    pub history: Vec<DateTime<Utc>>,
}

pub fn router(store: Arc<SnapshotStore>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/trending", get(trending))
        .route("/api/v1/history/{lang}", get(history))
        .route("/api/v1/scrape/{lang}/{taken_at}", get(scrape))
        .route("/api/v1/follows", get(follows))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

/// Serve the API on `addr` until the process exits.
pub async fn serve(store: Arc<SnapshotStore>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Unrecognised or missing periods fall back to daily.
fn parse_period(raw: Option<&str>) -> Period {
    raw.and_then(|p| p.parse().ok()).unwrap_or_default()
}

/// Requested languages in order, duplicates dropped. `None` when the
/// request didn't name any.
fn parse_langs(raw: Option<&str>) -> Result<Option<Vec<&'static Language>>, LanguageError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let mut langs: Vec<&'static Language> = Vec::new();
    for key in raw.split(',').map(str::trim) {
        let lang = Language::parse(key)?;
        if !langs.contains(&lang) {
            langs.push(lang);
        }
    }
    Ok(Some(langs))
}

/// Run a store read on the blocking pool; redb reads hit the disk.
async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SnapshotStore) -> Result<T, ApiError> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

async fn trending(
    State(state): State<AppState>,
    Query(params): Query<TrendingParams>,
) -> Result<Json<TrendingResponse>, ApiError> {
    let period = parse_period(params.period.as_deref());
    let requested = parse_langs(params.langs.as_deref())?;

    let response = with_store(&state, move |store| {
        let langs = match requested {
            Some(langs) => langs,
            None => store.follows()?,
        };

        let started = Instant::now();
        let mut scrapes = Vec::with_capacity(langs.len());
        for lang in langs {
            match store.latest(lang, period) {
                Ok((items, scraped)) => scrapes.push(LanguageScrape { lang, items, scraped }),
                Err(e) if e.is_absence() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(TrendingResponse {
            period,
            langs: scrapes,
            store_duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    })
    .await?;

    Ok(Json(response))
}

async fn history(
    State(state): State<AppState>,
    Path(lang): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let lang = Language::parse(&lang)?;
    let history = with_store(&state, move |store| Ok(store.scrape_history(lang)?)).await?;
    Ok(Json(HistoryResponse { lang, history }))
}

/// One exact snapshot, addressed by the RFC3339 timestamp from the history.
async fn scrape(
    State(state): State<AppState>,
    Path((lang, taken_at)): Path<(String, String)>,
    Query(params): Query<ScrapeParams>,
) -> Result<Json<Vec<RankedItem>>, ApiError> {
    let lang = Language::parse(&lang)?;
    let period = parse_period(params.period.as_deref());
    let taken_at = DateTime::parse_from_rfc3339(&taken_at)
        .map_err(|e| ApiError::BadRequest(format!("invalid timestamp '{}': {}", taken_at, e)))?
        .with_timezone(&Utc);

    let items = with_store(&state, move |store| match store.get_scrape(lang, period, taken_at) {
        Ok(items) => Ok(items),
        Err(
            e @ (StoreError::NoScrapesForLanguage(_)
            | StoreError::SnapshotNotFound { .. }
            | StoreError::PeriodNotRecorded { .. }),
        ) => Err(ApiError::NotFound(e.to_string())),
        Err(e) => Err(e.into()),
    })
    .await?;
    Ok(Json(items))
}

async fn follows(State(state): State<AppState>) -> Result<Json<Vec<&'static str>>, ApiError> {
    let mut keys = with_store(&state, |store| {
        Ok(store.follows()?.iter().map(|l| l.store_key).collect::<Vec<&'static str>>())
    })
    .await?;
    keys.sort_unstable();
    Ok(Json(keys))
}
