use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rewind_core::config::{database_path, state_dir};
use rewind_core::{
    Config, Error, History, HistoryPage, Maintenance, RevertKind, RevertStatus, Reverter, Schema,
    Storage,
};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

const NO_MORE_COMMITS: &str = "No more commits to show.";
const DIFF_TOO_LARGE: &str =
    "The diff is too large to show here. Please use some git client. Thank you.";
const MERGE_CONFLICT: &str = "Error: Overwritten changes can not be reverted.";
const NOTHING_TO_COMMIT: &str =
    "There was nothing to commit. Current state is the same as the one you want rollback to.";
const VIOLATED_INTEGRITY: &str = "Error: Objects with missing references cannot be restored. \
     For example we cannot restore comment where the related post was deleted.";

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<Storage>>,
    pub config: Arc<Config>,
    pub schema: Arc<Schema>,
    pub maintenance: Maintenance,
}

impl AppState {
    /// Opens the repository rooted at `root`, creating its state directory.
    pub fn open(root: &Path) -> rewind_core::Result<Self> {
        fs::create_dir_all(state_dir(root))?;
        let config = Config::load(root)?;
        let storage = Storage::new(database_path(root))?;
        Ok(Self::new(storage, config, Maintenance::new(&state_dir(root))))
    }

    pub fn new(storage: Storage, config: Config, maintenance: Maintenance) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            schema: Arc::new(config.schema()),
            config: Arc::new(config),
            maintenance,
        }
    }

    fn lock_storage(&self) -> rewind_core::Result<MutexGuard<'_, Storage>> {
        self.storage
            .lock()
            .map_err(|_| Error::LockFailed("storage mutex poisoned".to_string()))
    }

    fn history<'a>(&'a self, storage: &'a Storage) -> History<'a, Storage> {
        History::new(storage, &self.schema)
            .with_commits_per_page(self.config.history.commits_per_page)
            .with_max_diff_bytes(self.config.diff.max_bytes)
    }
}

/// Error body shared by every route: `{code, message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({"code": self.code, "message": self.message}));
        (self.status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::CommitNotFound(_) | Error::AmbiguousRevision(_) => {
                Self::new(StatusCode::NOT_FOUND, "error", err.to_string())
            }
            Error::NotRevertible(_, _) => Self::new(StatusCode::FORBIDDEN, "error", err.to_string()),
            Error::PayloadTooLarge { .. } => {
                Self::new(StatusCode::FORBIDDEN, "error", DIFF_TOO_LARGE)
            }
            Error::InvalidPath(_) => Self::new(StatusCode::BAD_REQUEST, "error", err.to_string()),
            _ => {
                warn!(error = %err, "Request failed");
                Self::internal(err.to_string())
            }
        }
    }
}

fn revert_response(status: RevertStatus) -> Response {
    match status {
        RevertStatus::Ok => Json(true).into_response(),
        RevertStatus::NothingToCommit => {
            ApiError::new(StatusCode::OK, "updated", NOTHING_TO_COMMIT).into_response()
        }
        RevertStatus::MergeConflict => {
            ApiError::new(StatusCode::FORBIDDEN, "error", MERGE_CONFLICT).into_response()
        }
        RevertStatus::ViolatedReferentialIntegrity => {
            ApiError::new(StatusCode::FORBIDDEN, "error", VIOLATED_INTEGRITY).into_response()
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/commits", get(get_commits))
        .route("/undo", post(undo))
        .route("/rollback", post(rollback))
        .route("/can-revert", get(can_revert))
        .route("/diff", get(get_diff))
        .route("/should-update", get(should_update))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.api.require_auth {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match (presented, state.config.api.token.as_deref()) {
        (Some(presented), Some(expected)) if presented == expected => next.run(request).await,
        _ => ApiError::new(StatusCode::UNAUTHORIZED, "error", "Unauthorized").into_response(),
    }
}

/// Runs store work off the async workers; file locks and SQLite block.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> rewind_core::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: usize,
}

async fn get_commits(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let page = blocking(move || {
        let _read = state.maintenance.read()?;
        let storage = state.lock_storage()?;
        state.history(&storage).page(query.page)
    })
    .await?;

    if page.is_exhausted() {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "notice", NO_MORE_COMMITS));
    }
    Ok(Json(page))
}

#[derive(Deserialize)]
struct CommitQuery {
    commit: String,
}

async fn undo(State(state): State<AppState>, Query(query): Query<CommitQuery>) -> Response {
    revert(state, RevertKind::Undo, query.commit).await
}

async fn rollback(State(state): State<AppState>, Query(query): Query<CommitQuery>) -> Response {
    revert(state, RevertKind::Rollback, query.commit).await
}

async fn revert(state: AppState, kind: RevertKind, commit: String) -> Response {
    info!(operation = kind.as_str(), commit = %commit, "Revert requested");

    let result = blocking(move || {
        state.maintenance.with_exclusive(|| {
            let storage = state.lock_storage()?;
            let reverter = Reverter::new(&*storage, &state.schema);
            match kind {
                RevertKind::Undo => reverter.undo(&commit),
                RevertKind::Rollback => reverter.rollback(&commit),
            }
        })
    })
    .await;

    match result {
        Ok(status) => revert_response(status),
        Err(err) => err.into_response(),
    }
}

async fn can_revert(State(state): State<AppState>) -> Result<Json<bool>, ApiError> {
    let clean = blocking(move || {
        let _read = state.maintenance.read()?;
        let storage = state.lock_storage()?;
        let reverter = Reverter::new(&*storage, &state.schema);
        reverter.can_revert()
    })
    .await?;
    Ok(Json(clean))
}

async fn get_diff(
    State(state): State<AppState>,
    Query(query): Query<CommitQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let diff = blocking(move || {
        let _read = state.maintenance.read()?;
        let storage = state.lock_storage()?;
        state.history(&storage).diff(&query.commit)
    })
    .await?;
    Ok(Json(json!({ "diff": diff })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShouldUpdateQuery {
    latest_commit: String,
}

async fn should_update(
    State(state): State<AppState>,
    Query(query): Query<ShouldUpdateQuery>,
) -> Result<Json<bool>, ApiError> {
    let stale = blocking(move || {
        let _read = state.maintenance.read()?;
        let storage = state.lock_storage()?;
        state.history(&storage).should_update(&query.latest_commit)
    })
    .await?;
    Ok(Json(stale))
}
