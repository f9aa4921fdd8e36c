//! HTTP API server.
//!
//! Exposes the upload, listing, search, and auth surface as a JSON API.
//! Every response shares one envelope: `{"success": true, "data": ...}` on
//! the happy path, `{"success": false, "message": ...}` on errors.
//!
//! # Endpoints
//!
//! | Method   | Path                          | Auth | Description |
//! |----------|-------------------------------|------|-------------|
//! | `POST`   | `/api/auth/register`          | no   | Create an account, returns a token |
//! | `POST`   | `/api/auth/login`             | no   | Exchange credentials for a token |
//! | `GET`    | `/api/auth/profile`           | yes  | Current user profile |
//! | `PUT`    | `/api/auth/profile`           | yes  | Update the display name |
//! | `POST`   | `/api/upload`                 | yes  | Multipart upload, queues indexing |
//! | `GET`    | `/api/files`                  | yes  | Paginated listing of own files |
//! | `GET`    | `/api/files/{id}`             | yes  | Metadata for one file |
//! | `GET`    | `/api/download/{id}`          | yes  | Raw file bytes |
//! | `DELETE` | `/api/files/{id}`             | yes  | Remove file, metadata, and index entry |
//! | `GET`    | `/api/search`                 | yes  | Full-text search over own files |
//! | `GET`    | `/api/suggestions`            | yes  | Filename suggestions |
//! | `GET`    | `/api/stats`                  | yes  | Aggregate counts for the owner |
//! | `GET`    | `/health`                     | no   | Liveness probe |
//!
//! All `/api` routes sit behind the per-IP rate limiter. CORS permits all
//! origins, methods, and headers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::index::SearchIndex;
use crate::models::{file_extension, FileRecord, ListFilter, SortDir, SortKey, User};
use crate::pipeline::{self, Indexer};
use crate::ratelimit::{self, RateLimiter};
use crate::search::{self, SearchParams};
use crate::store::MetadataStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MetadataStore,
    /// `None` when the index failed to open; search endpoints degrade to 500
    /// while uploads and downloads keep working.
    pub search: Option<Arc<SearchIndex>>,
    pub indexer: Option<Indexer>,
    pub limiter: RateLimiter,
}

/// Starts the HTTP server. Binds to `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let pool = db::connect(&config).await?;
    crate::migrate::apply(&pool).await?;
    let store = MetadataStore::new(pool);

    tokio::fs::create_dir_all(&config.uploads.dir).await?;

    // Index failure is non-fatal: uploads still land in the store and a
    // later reindex sweep catches them up.
    let (search, indexer) = match SearchIndex::open(&config.index.path) {
        Ok(index) => {
            let index = Arc::new(index);
            let (indexer, _workers) =
                pipeline::start_workers(&config.indexer, store.clone(), Arc::clone(&index));
            (Some(index), Some(indexer))
        }
        Err(err) => {
            tracing::error!(error = %err, "search index unavailable, serving degraded");
            (None, None)
        }
    };

    let state = AppState {
        limiter: RateLimiter::new(&config.rate_limit),
        config,
        store,
        search,
        indexer,
    };
    let app = build_app(state);

    tracing::info!(%bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Builds the full router. Separated from [`run_server`] so tests can mount
/// the app on an ephemeral listener.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/profile", get(handle_profile).put(handle_update_profile))
        .route("/upload", post(handle_upload))
        .route("/files", get(handle_list))
        .route("/files/{id}", get(handle_detail).delete(handle_delete))
        .route("/download/{id}", get(handle_download))
        .route("/search", get(handle_search))
        .route("/suggestions", get(handle_suggestions))
        .route("/stats", get(handle_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::limit,
        ));

    // Body limit leaves headroom for multipart framing around the payload.
    let body_limit = state.config.uploads.max_size_bytes as usize + 64 * 1024;

    Router::new()
        .nest("/api", api)
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

fn ok_message<T: Serialize>(message: &str, data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": message, "data": data }))
}

// ============ Auth ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: String,
    password: String,
    full_name: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    id: String,
    email: String,
    full_name: String,
    role: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role.clone(),
        }
    }
}

async fn handle_register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(AppError::Validation("Invalid email address".into()));
    }
    if body.password.chars().count() < 6 {
        return Err(AppError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }
    if body.full_name.trim().is_empty() {
        return Err(AppError::Validation("Full name is required".into()));
    }
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Validation("Email already registered".into()));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash: crate::auth::hash_password(&body.password)?,
        full_name: body.full_name.trim().to_string(),
        role: "user".to_string(),
        is_active: true,
        created_at: chrono::Utc::now().timestamp(),
    };
    state.store.create_user(&user).await?;

    let token = crate::auth::issue_token(
        &user.id,
        &user.email,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        ok_message(
            "User registered",
            json!({ "token": token, "user": UserView::from(&user) }),
        ),
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_ascii_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    if !user.is_active || !crate::auth::verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let token = crate::auth::issue_token(
        &user.id,
        &user.email,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )?;
    Ok(ok(json!({ "token": token, "user": UserView::from(&user) })))
}

async fn handle_profile(user: AuthUser) -> Json<serde_json::Value> {
    ok(json!({
        "id": user.id,
        "email": user.email,
        "fullName": user.full_name,
        "role": user.role,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRequest {
    full_name: String,
}

async fn handle_update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ProfileRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let full_name = body.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::Validation("Full name is required".into()));
    }
    state.store.update_full_name(&user.id, full_name).await?;
    Ok(ok_message(
        "Profile updated",
        json!({
            "id": user.id,
            "email": user.email,
            "fullName": full_name,
            "role": user.role,
        }),
    ))
}

// ============ Files ============

async fn handle_upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload: Option<(String, Option<String>, axum::body::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("Malformed multipart body".into()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::Validation("Missing filename".into()))?;
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|_| AppError::Validation("Failed to read upload body".into()))?;
        upload = Some((original_name, content_type, data));
        break;
    }
    let Some((original_name, content_type, data)) = upload else {
        return Err(AppError::Validation("No file provided".into()));
    };

    let extension = file_extension(&original_name);
    if !state
        .config
        .uploads
        .allowed_extensions
        .iter()
        .any(|allowed| allowed == &extension)
    {
        let shown = if extension.is_empty() { "(none)" } else { extension.as_str() };
        return Err(AppError::Validation(format!(
            "File type not allowed: {}",
            shown
        )));
    }
    if data.len() as u64 > state.config.uploads.max_size_bytes {
        return Err(AppError::Validation("File too large".into()));
    }

    let id = generate_file_id(&extension);
    let storage_path = state.config.uploads.dir.join(&id);
    tokio::fs::write(&storage_path, &data)
        .await
        .map_err(|err| AppError::Internal(anyhow::anyhow!("failed to persist upload: {}", err)))?;

    let mime_type = content_type.unwrap_or_else(|| {
        mime_guess::from_path(&original_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    let record = FileRecord {
        id: id.clone(),
        owner_id: user.id.clone(),
        original_name,
        storage_path: storage_path.to_string_lossy().into_owned(),
        mime_type,
        file_type: extension,
        size_bytes: data.len() as i64,
        uploaded_at: chrono::Utc::now().timestamp(),
        indexed: false,
    };
    state.store.create(&record).await?;

    match &state.indexer {
        Some(indexer) => indexer.submit(&id),
        None => tracing::warn!(file_id = %id, "indexer offline, file stays unindexed"),
    }
    tracing::info!(file_id = %id, owner = %user.id, "file uploaded");

    Ok((StatusCode::CREATED, ok_message("File uploaded", record)))
}

/// Storage id: upload instant plus a random suffix, keeping the original
/// extension so type checks survive the rename.
fn generate_file_id(extension: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000_000..1_000_000_000);
    format!(
        "file-{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        suffix,
        extension
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    /// Type filter, e.g. `pdf`; matched as a MIME-type substring.
    file_type: Option<String>,
    indexed: Option<bool>,
}

async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let sort = query
        .sort_by
        .as_deref()
        .and_then(SortKey::parse)
        .unwrap_or_default();
    let dir = query
        .sort_order
        .as_deref()
        .and_then(SortDir::parse)
        .unwrap_or_default();
    let filter = ListFilter {
        mime_contains: query
            .file_type
            .as_deref()
            .map(|s| s.trim_start_matches('.').to_string())
            .filter(|s| !s.is_empty()),
        indexed: query.indexed,
    };

    let (files, total) = state
        .store
        .list_by_owner(&user.id, &filter, sort, dir, page, limit)
        .await?;
    let total_pages = (total + limit - 1) / limit;

    Ok(ok(json!({
        "files": files,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": total_pages,
        },
    })))
}

async fn handle_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state
        .store
        .find_by_id(&id, &user.id)
        .await?
        .ok_or(AppError::NotFound("File"))?;

    // A content preview comes from the index when the document made it in.
    let search = state
        .search
        .as_ref()
        .and_then(|index| index.get_by_id(&id).ok().flatten())
        .map(|doc| {
            let preview: String = doc.content.chars().take(200).collect();
            json!({ "contentPreview": preview, "contentLength": doc.content.chars().count() })
        });

    Ok(ok(json!({ "file": record, "search": search })))
}

async fn handle_download(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .store
        .find_by_id(&id, &user.id)
        .await?
        .ok_or(AppError::NotFound("File"))?;

    let bytes = tokio::fs::read(PathBuf::from(&record.storage_path))
        .await
        .map_err(|_| AppError::NotFound("File"))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.mime_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    let disposition = format!(
        "attachment; filename=\"{}\"",
        record.original_name.replace('"', "")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or(HeaderValue::from_static("attachment")),
    );
    Ok((headers, bytes))
}

async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state
        .store
        .find_by_id(&id, &user.id)
        .await?
        .ok_or(AppError::NotFound("File"))?;

    state.store.delete(&id, &user.id).await?;
    if let Err(err) = tokio::fs::remove_file(&record.storage_path).await {
        tracing::warn!(file_id = %id, error = %err, "stored file already gone");
    }
    if let Some(index) = &state.search {
        if let Err(err) = index.remove(&id) {
            tracing::warn!(file_id = %id, error = %err, "failed to remove index entry");
        }
    }
    tracing::info!(file_id = %id, owner = %user.id, "file deleted");

    Ok(ok_message("File deleted", json!({ "id": id })))
}

// ============ Search ============

async fn handle_search(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let index = state.search.as_ref().ok_or(AppError::SearchUnavailable)?;
    let response = search::run_search(&state.store, index, &user.id, &params).await?;
    Ok(ok(response))
}

#[derive(Deserialize)]
struct SuggestQuery {
    #[serde(default, alias = "query")]
    q: String,
}

async fn handle_suggestions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SuggestQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let index = state.search.as_ref().ok_or(AppError::SearchUnavailable)?;
    let suggestions = search::suggest(index, &user.id, &params.q)?;
    Ok(ok(json!({ "suggestions": suggestions })))
}

async fn handle_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state.store.stats(Some(&user.id)).await?;
    Ok(ok(stats))
}

// ============ Health ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
