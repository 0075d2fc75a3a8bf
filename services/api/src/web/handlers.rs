//! services/api/src/web/handlers.rs
//!
//! The process-boundary routes. Thin glue: each handler loads the
//! caller's session, invokes one core component, and shapes the
//! response. All invariants live in `tipline_core`.

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tipline_core::auth::{self, AuthError};
use tipline_core::domain::{FileUpload, Receipt, Source};
use tipline_core::inbox::{self, InboxError};
use tipline_core::intake::{self, IntakeError};
use tipline_core::session::{generate_tab_id, SourceSession};
use tipline_core::codename;
use tracing::error;
use uuid::Uuid;

use crate::web::state::{AppState, SessionStore};

type HandlerError = (StatusCode, String);

//=========================================================================================
// Session plumbing
//=========================================================================================

fn cookie_sid(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("sid="))
        .map(str::to_string)
}

async fn open_session(state: &AppState, headers: &HeaderMap) -> (String, SourceSession) {
    if let Some(sid) = cookie_sid(headers) {
        let session = state.sessions.load(&sid).await.unwrap_or_default();
        return (sid, session);
    }
    (SessionStore::new_sid(), SourceSession::new())
}

fn session_cookie(sid: &str) -> String {
    format!("sid={sid}; HttpOnly; SameSite=Strict; Path=/")
}

fn internal(err: impl std::fmt::Display) -> HandlerError {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "An unexpected error occurred.".to_string(),
    )
}

/// Resolve the authenticated source for this session, or 401.
async fn require_source(
    state: &AppState,
    session: &SourceSession,
) -> Result<(Source, String), HandlerError> {
    let unauthorized = || (StatusCode::UNAUTHORIZED, "Not logged in.".to_string());
    if !session.logged_in {
        return Err(unauthorized());
    }
    let codename = session.codename.clone().ok_or_else(unauthorized)?;
    let source = state
        .store
        .find_by_filesystem_id(&codename::filesystem_id(&codename))
        .await
        .map_err(internal)?
        .ok_or_else(unauthorized)?;
    Ok((source, codename))
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize)]
pub struct GenerateResponse {
    pub codename: String,
    pub tab_id: String,
}

#[derive(Deserialize)]
pub struct CreateForm {
    pub tab_id: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub codename: String,
}

#[derive(Serialize)]
pub struct ReplyView {
    pub filename: String,
    pub message: String,
    pub date: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct LookupResponse {
    pub source_uuid: Uuid,
    pub codename: String,
    pub token: Option<String>,
    pub allow_document_uploads: bool,
    pub new_account: bool,
    pub replies: Vec<ReplyView>,
}

#[derive(Deserialize)]
pub struct DeleteForm {
    pub reply_filename: String,
}

#[derive(Serialize)]
pub struct Notice {
    pub message: String,
}

fn notice(message: &str) -> Json<Notice> {
    Json(Notice {
        message: message.to_string(),
    })
}

/// A redirect that still tells the caller why it was redirected.
fn redirect_with_notice(location: &'static str, message: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location)],
        notice(message),
    )
        .into_response()
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET / - service index.
pub async fn index_handler() -> impl IntoResponse {
    notice("Share and accept documents securely.")
}

/// GET /generate - fresh codename bound to a fresh browser tab.
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let (sid, mut session) = open_session(&state, &headers).await;
    if session.logged_in {
        // Already logged in: creating another account now would shadow
        // the current one.
        return Ok(redirect_with_notice(
            "/lookup",
            "You were redirected because you are already logged in. \
             If you want to create a new account, you should log out first.",
        ));
    }

    let codename = auth::generate_unique_codename(state.store.as_ref())
        .await
        .map_err(internal)?;
    let tab_id = generate_tab_id();
    session.bind(tab_id.clone(), codename.clone());
    state.sessions.save(&sid, session).await;

    Ok((
        [(header::SET_COOKIE, session_cookie(&sid))],
        Json(GenerateResponse { codename, tab_id }),
    )
        .into_response())
}

/// POST /create - establish the identity bound to the caller's tab.
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<CreateForm>,
) -> Result<Response, HandlerError> {
    let (sid, mut session) = open_session(&state, &headers).await;
    if session.logged_in {
        return Ok(redirect_with_notice(
            "/lookup",
            "You are already logged in. Please verify your codename, \
             as it may differ from the one displayed on the previous page.",
        ));
    }

    let result = auth::create_account(
        &mut session,
        &form.tab_id,
        state.store.as_ref(),
        state.storage.as_ref(),
    )
    .await;
    // The session carries the outcome either way: logged in on success,
    // fully cleared on a duplicate.
    state.sessions.save(&sid, session).await;

    match result {
        Ok(_) => Ok(Redirect::to("/lookup").into_response()),
        Err(AuthError::DuplicateIdentity) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "There was a problem creating your account. Please try again.".to_string(),
        )),
        Err(AuthError::UnknownTab) => Err((
            StatusCode::BAD_REQUEST,
            "Unknown or expired tab. Please generate a codename again.".to_string(),
        )),
        Err(other) => Err(internal(other)),
    }
}

/// POST /login - resume an identity by codename.
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, HandlerError> {
    let (sid, mut session) = open_session(&state, &headers).await;

    match auth::login(&mut session, &form.codename, state.store.as_ref()).await {
        Ok(_) => {
            state.sessions.save(&sid, session).await;
            Ok((
                [(header::SET_COOKIE, session_cookie(&sid))],
                Redirect::to("/lookup"),
            )
                .into_response())
        }
        // Generic message: never reveal whether the codename exists.
        Err(AuthError::InvalidCodename) => Err((
            StatusCode::UNAUTHORIZED,
            "Sorry, that is not a recognized codename.".to_string(),
        )),
        Err(other) => Err(internal(other)),
    }
}

/// GET /lookup - the source's inbox.
pub async fn lookup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<LookupResponse>, HandlerError> {
    let (_sid, session) = open_session(&state, &headers).await;
    let (source, codename) = require_source(&state, &session).await?;

    let replies = inbox::list(
        &source,
        &codename,
        state.store.as_ref(),
        state.storage.as_ref(),
        state.vault.as_ref(),
    )
    .await
    .map_err(internal)?;

    Ok(Json(LookupResponse {
        source_uuid: source.uuid,
        codename,
        token: session.token.as_ref().map(|t| t.token.clone()),
        allow_document_uploads: state.config.allow_document_uploads,
        new_account: session.new_account,
        replies: replies
            .into_iter()
            .map(|r| ReplyView {
                filename: r.reply.filename,
                message: r.plaintext,
                date: r.date,
            })
            .collect(),
    }))
}

fn receipt_text(receipt: Receipt) -> &'static str {
    match receipt {
        Receipt::FirstSubmission => {
            "Thank you for sending this information to us. Please check back later for replies."
        }
        Receipt::Message => "Thanks! We received your message.",
        Receipt::Document => "Thanks! We received your document.",
        Receipt::MessageAndDocument => "Thanks! We received your message and document.",
    }
}

/// POST /submit - accept a message and/or a document.
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Notice>, HandlerError> {
    let (_sid, session) = open_session(&state, &headers).await;
    let (source, codename) = require_source(&state, &session).await?;

    let mut msg: Option<String> = None;
    let mut fh: Option<FileUpload> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        match field.name() {
            Some("msg") => {
                msg = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
                );
            }
            Some("fh") => {
                let filename = field
                    .file_name()
                    .unwrap_or("attachment")
                    .to_string();
                let contents = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                if !contents.is_empty() {
                    fh = Some(FileUpload {
                        filename,
                        contents: contents.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    // Submissions are sealed at rest; make sure the key exists even if
    // the caller skipped the inbox (which provisions it lazily).
    if state
        .vault
        .fingerprint(&source.filesystem_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        state
            .vault
            .gen_key_pair(&source.filesystem_id, &codename)
            .await
            .map_err(internal)?;
    }

    let outcome = intake::submit(
        &source,
        msg.as_deref(),
        fh.as_ref(),
        state.config.allow_document_uploads,
        state.store.as_ref(),
        state.storage.as_ref(),
        state.checksums.as_ref(),
    )
    .await;

    match outcome {
        Ok(outcome) => Ok(notice(receipt_text(outcome.receipt))),
        Err(IntakeError::EmptySubmission) => {
            let wording = if state.config.allow_document_uploads {
                "You must enter a message or choose a file to submit."
            } else {
                "You must enter a message."
            };
            Err((StatusCode::BAD_REQUEST, wording.to_string()))
        }
        Err(other) => Err(internal(other)),
    }
}

/// POST /delete - soft-delete one reply from the inbox.
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<DeleteForm>,
) -> Result<Json<Notice>, HandlerError> {
    let (_sid, session) = open_session(&state, &headers).await;
    let (source, _codename) = require_source(&state, &session).await?;

    match inbox::delete(&source, &form.reply_filename, state.store.as_ref()).await {
        Ok(()) => Ok(notice("Reply deleted")),
        Err(InboxError::OwnershipViolation) => {
            Err((StatusCode::NOT_FOUND, "Reply not found.".to_string()))
        }
        Err(other) => Err(internal(other)),
    }
}

/// POST /delete-all - soft-delete the whole inbox.
pub async fn delete_all_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Notice>, HandlerError> {
    let (_sid, session) = open_session(&state, &headers).await;
    let (source, _codename) = require_source(&state, &session).await?;

    inbox::delete_all(&source, state.store.as_ref())
        .await
        .map_err(internal)?;
    Ok(notice("All replies have been deleted"))
}

/// GET /logout - clear all session state.
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let (sid, session) = open_session(&state, &headers).await;
    if session.logged_in {
        state.sessions.remove(&sid).await;
        Ok(notice("Your session has been cleared.").into_response())
    } else {
        Ok(Redirect::to("/").into_response())
    }
}
