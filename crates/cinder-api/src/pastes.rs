use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{Extensions, HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::warn;

use cinder_engine::{
    CreateOptions, EditOptions, ForkOptions, Protection, ViewOutcome, ViewerContext,
};
use cinder_types::api::{
    CreatePasteRequest, CreatePasteResponse, EditPasteRequest, EncryptionRequest,
    ForkPasteRequest, ForkPasteResponse, PasteResponse, RecentPaste, RevisionResponse,
    RevisionSummary, ViewQuery,
};
use cinder_types::models::EncryptionMethod;

use crate::auth::{optional_principal, require_principal};
use crate::{ApiError, AppState, viewer};

pub const PASSWORD_HEADER: &str = "x-paste-password";

const DEFAULT_RECENT: u32 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u32>,
}

/// Run an engine call on the blocking pool. Key derivation and SQLite
/// both block.
async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> cinder_engine::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// The capability from `?key=` or the password from `X-Paste-Password`.
///
/// The header is read as raw UTF-8 so passwords outside visible ASCII
/// work. A header that is not UTF-8 is rejected rather than ignored.
fn credential(query: &ViewQuery, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    if let Some(key) = query.key.as_deref().filter(|k| !k.is_empty()) {
        return Ok(Some(key.to_string()));
    }
    headers
        .get(PASSWORD_HEADER)
        .map(|v| {
            std::str::from_utf8(v.as_bytes())
                .map(str::to_string)
                .map_err(|_| ApiError::BadRequest("X-Paste-Password must be UTF-8".into()))
        })
        .transpose()
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn paste_response(state: &AppState, outcome: ViewOutcome) -> PasteResponse {
    let paste = outcome.paste;
    let access_link = outcome
        .access_key
        .map(|key| state.access_link(&paste.short_id, &key));
    PasteResponse {
        short_id: paste.short_id,
        title: paste.title,
        language: paste.language,
        content: outcome.content,
        views: paste.views,
        size: paste.size,
        visibility: paste.visibility,
        expiration: paste.expiration,
        expires_at: paste.expires_at,
        created_at: paste.created_at,
        burn_after_read: paste.burn_after_read,
        burned: outcome.burned,
        comments_enabled: paste.comments_enabled,
        encryption_method: paste.encryption_method,
        forked_from_id: paste.forked_from_id,
        fork_count: paste.fork_count,
        is_owner: outcome.is_owner,
        access_link,
    }
}

// -- Create --

/// POST /pastes
pub async fn create_paste(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreatePasteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(payload)?;
    let owner = optional_principal(&headers, &state.jwt_secret)?;

    let protection = match req.encryption {
        EncryptionRequest::None => Protection::None,
        EncryptionRequest::Password { password } => Protection::Password(password),
        EncryptionRequest::Random => Protection::RandomKey,
    };
    let opts = CreateOptions {
        owner,
        title: req.title,
        language: req.language,
        expiration: req.expiration,
        visibility: req.visibility,
        burn_after_read: req.burn_after_read,
        comments_enabled: req.comments_enabled,
        protection,
    };

    let service = state.service.clone();
    let content = req.content;
    let created = blocking(move || service.create_paste(&content, opts)).await?;

    let url = match &created.capability {
        Some(capability) => state.access_link(&created.paste.short_id, &capability.to_base64url()),
        None => state.paste_url(&created.paste.short_id),
    };

    Ok((
        StatusCode::CREATED,
        Json(CreatePasteResponse {
            short_id: created.paste.short_id,
            url,
            encryption_method: created.paste.encryption_method,
            expires_at: created.paste.expires_at,
        }),
    ))
}

// -- Read --

async fn load_view(
    state: &AppState,
    short_id: String,
    query: &ViewQuery,
    headers: &HeaderMap,
    jar: CookieJar,
    extensions: &Extensions,
) -> Result<(CookieJar, ViewOutcome), ApiError> {
    let principal = optional_principal(headers, &state.jwt_secret)?;
    let (jar, viewer_identity) = viewer::identify(jar, headers, extensions);
    let ctx = ViewerContext {
        principal,
        viewer_identity,
    };
    let credential = credential(query, headers)?;

    let service = state.service.clone();
    let outcome =
        blocking(move || service.view_paste(&short_id, &ctx, credential.as_deref())).await?;
    Ok((jar, outcome))
}

/// GET /pastes/{short_id}?key=
pub async fn view_paste(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
    extensions: Extensions,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let (jar, outcome) = load_view(&state, short_id, &query, &headers, jar, &extensions).await?;
    Ok((jar, Json(paste_response(&state, outcome))))
}

/// GET /raw/{short_id}?key=
pub async fn raw_paste(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
    extensions: Extensions,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let (jar, outcome) = load_view(&state, short_id, &query, &headers, jar, &extensions).await?;
    Ok((
        jar,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        outcome.content,
    ))
}

/// GET /pastes/recent?limit=
pub async fn recent_pastes(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT);
    let service = state.service.clone();
    let pastes = blocking(move || service.recent_public(limit)).await?;

    let items: Vec<RecentPaste> = pastes
        .into_iter()
        .map(|p| RecentPaste {
            short_id: p.short_id,
            title: p.title,
            language: p.language,
            views: p.views,
            created_at: p.created_at,
        })
        .collect();
    Ok(Json(items))
}

// -- Write --

/// PUT /pastes/{short_id}
pub async fn edit_paste(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
    payload: Result<Json<EditPasteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(payload)?;
    let principal = require_principal(&headers, &state.jwt_secret)?;
    let credential = credential(&query, &headers)?;
    let opts = EditOptions {
        title: req.title,
        language: req.language,
        edit_description: req.edit_description,
    };

    let service = state.service.clone();
    let content = req.content;
    let body = content.clone();
    let paste = blocking(move || {
        service.edit_paste(&short_id, Some(principal), &content, opts, credential.as_deref())
    })
    .await?;

    let access_key = (paste.encryption_method == EncryptionMethod::RandomKey)
        .then(|| paste.encryption_salt.clone())
        .flatten();
    Ok(Json(paste_response(
        &state,
        ViewOutcome {
            paste,
            content: body,
            burned: false,
            first_view: false,
            is_owner: true,
            access_key,
        },
    )))
}

/// DELETE /pastes/{short_id}
pub async fn delete_paste(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_principal(&headers, &state.jwt_secret)?;
    let service = state.service.clone();
    blocking(move || service.delete_paste(&short_id, Some(principal))).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pastes/{short_id}/fork?key=. The body is optional.
pub async fn fork_paste(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let owner = optional_principal(&headers, &state.jwt_secret)?;
    let credential = credential(&query, &headers)?;
    let req: ForkPasteRequest = if body.is_empty() {
        ForkPasteRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            warn!("Rejected fork request for {}: {}", short_id, e);
            ApiError::BadRequest(e.to_string())
        })?
    };
    let opts = ForkOptions {
        owner,
        title: req.title,
        visibility: req.visibility,
        expiration: req.expiration,
    };

    let service = state.service.clone();
    let source = short_id.clone();
    let fork =
        blocking(move || service.fork_paste(&source, opts, credential.as_deref())).await?;

    Ok((
        StatusCode::CREATED,
        Json(ForkPasteResponse {
            url: state.paste_url(&fork.short_id),
            short_id: fork.short_id,
            forked_from: short_id,
        }),
    ))
}

// -- Revisions --

/// GET /pastes/{short_id}/revisions
pub async fn list_revisions(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let principal = optional_principal(&headers, &state.jwt_secret)?;
    let service = state.service.clone();
    let revisions = blocking(move || service.list_revisions(&short_id, principal)).await?;

    let items: Vec<RevisionSummary> = revisions
        .into_iter()
        .map(|r| RevisionSummary {
            revision_number: r.revision_number,
            title: r.title,
            language: r.language,
            edit_description: r.edit_description,
            created_at: r.created_at,
        })
        .collect();
    Ok(Json(items))
}

/// GET /pastes/{short_id}/revisions/{revision}?key=
pub async fn get_revision(
    State(state): State<AppState>,
    Path((short_id, revision_number)): Path<(String, u32)>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let principal = optional_principal(&headers, &state.jwt_secret)?;
    let credential = credential(&query, &headers)?;
    let service = state.service.clone();
    let view = blocking(move || {
        service.get_revision(&short_id, principal, revision_number, credential.as_deref())
    })
    .await?;

    let r = view.revision;
    Ok(Json(RevisionResponse {
        revision_number: r.revision_number,
        title: r.title,
        language: r.language,
        content: view.content,
        edit_description: r.edit_description,
        created_at: r.created_at,
    }))
}

/// GET /health. Liveness check that also touches the database.
pub async fn health(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    let service = state.service.clone();
    blocking(move || service.ping()).await?;
    Ok("ok")
}
