use axum::extract::{Multipart, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::usecases::u101_import_contacts::error::{MappingError, ParseError, SessionError};
use crate::usecases::u101_import_contacts::executor::{ImportError, UploadError};
use crate::usecases::u101_import_contacts::session::CancelOutcome;
use crate::usecases::u101_import_contacts::{ImportExecutor, SqlEntityStore};
use contracts::usecases::u101_import_contacts::{
    CommitAccepted, ImportStep, MatchingStats, UpdateMappingRequest, UploadResponse,
};

// ============================================================================
// UseCase u101: Import Contacts
// ============================================================================

static CONTACT_IMPORT: Lazy<Arc<ImportExecutor>> = Lazy::new(|| {
    let import_config = crate::shared::config::load_config()
        .map(|c| c.import)
        .unwrap_or_default();
    Arc::new(ImportExecutor::new(Arc::new(SqlEntityStore), import_config))
});

#[derive(Deserialize)]
pub struct UploadQuery {
    pub call_list_id: Uuid,
}

/// POST /api/u101/import/upload?call_list_id=...
pub async fn u101_upload(
    Query(params): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut file_name: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("bad multipart: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("bad multipart: {}", e)))?;
            bytes = Some(data.to_vec());
        }
    }

    let bytes = bytes.ok_or((
        StatusCode::BAD_REQUEST,
        "multipart field 'file' is required".to_string(),
    ))?;

    match CONTACT_IMPORT
        .start_upload(params.call_list_id, file_name.as_deref(), &bytes)
        .await
    {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::error!("Failed to accept upload: {}", e);
            Err(upload_error_status(e))
        }
    }
}

/// PATCH /api/u101/import/:session_id/mapping
pub async fn u101_update_mapping(
    Path(session_id): Path<String>,
    Json(request): Json<UpdateMappingRequest>,
) -> Result<Json<MatchingStats>, (StatusCode, String)> {
    let session_id = parse_session_id(&session_id)?;
    match CONTACT_IMPORT.update_mapping(session_id, request).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            tracing::error!("Failed to update mapping: {}", e);
            Err(import_error_status(e))
        }
    }
}

/// POST /api/u101/import/:session_id/commit
pub async fn u101_commit(
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<CommitAccepted>), (StatusCode, String)> {
    let session_id = parse_session_id(&session_id)?;
    match CONTACT_IMPORT.start_commit(session_id).await {
        Ok(accepted) => Ok((StatusCode::ACCEPTED, Json(accepted))),
        Err(e) => {
            tracing::error!("Failed to start commit: {}", e);
            Err(import_error_status(e))
        }
    }
}

/// GET /api/u101/import/:session_id/progress
///
/// Последний снимок прогресса всегда на месте: поздно подключившийся
/// наблюдатель получает его сразу, а после завершения — итоговый результат.
pub async fn u101_get_progress(
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let session_id = parse_session_id(&session_id)?;
    let session = CONTACT_IMPORT
        .sessions()
        .get(&session_id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;

    let body = match session.step {
        ImportStep::Importing => json!({
            "step": session.step,
            "progress": session.progress,
        }),
        ImportStep::Done => json!({
            "step": session.step,
            "result": session.result,
        }),
        _ => json!({
            "step": session.step,
            "lastError": session.last_error,
        }),
    };
    Ok(Json(body))
}

/// DELETE /api/u101/import/:session_id
///
/// До коммита сессия просто удаляется; в полете запускается кооперативная
/// отмена, исполнитель остановится на границе батча.
pub async fn u101_delete(
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let session_id = parse_session_id(&session_id)?;
    match CONTACT_IMPORT.sessions().request_cancel(&session_id) {
        Ok(CancelOutcome::Discarded) => Ok(Json(json!({"status": "discarded"}))),
        Ok(CancelOutcome::CancelRequested) => Ok(Json(json!({"status": "cancelling"}))),
        Err(e) => Err(session_error_status(e)),
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid, (StatusCode, String)> {
    Uuid::parse_str(raw).map_err(|_| (StatusCode::BAD_REQUEST, "invalid session id".to_string()))
}

fn upload_error_status(e: UploadError) -> (StatusCode, String) {
    let status = match &e {
        UploadError::UnknownCallList => StatusCode::NOT_FOUND,
        UploadError::Parse(ParseError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        UploadError::Parse(_) => StatusCode::BAD_REQUEST,
        UploadError::Session(SessionError::NotFound) => StatusCode::NOT_FOUND,
        UploadError::Session(_) => StatusCode::CONFLICT,
        UploadError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn import_error_status(e: ImportError) -> (StatusCode, String) {
    let status = match &e {
        ImportError::Session(SessionError::NotFound) => StatusCode::NOT_FOUND,
        ImportError::Session(_) => StatusCode::CONFLICT,
        ImportError::Mapping(MappingError::UnknownColumn(_)) => StatusCode::BAD_REQUEST,
        ImportError::Mapping(MappingError::MissingRequiredField) => StatusCode::BAD_REQUEST,
        ImportError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn session_error_status(e: SessionError) -> (StatusCode, String) {
    let status = match &e {
        SessionError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::CONFLICT,
    };
    (status, e.to_string())
}
