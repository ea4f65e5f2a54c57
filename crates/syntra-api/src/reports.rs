use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::warn;
use uuid::Uuid;

use syntra_types::api::{
    Claims, CreateReportRequest, CreateReportResponse, ReportList, UpdateStatusRequest,
    UpdateStatusResponse, UploadPhotoResponse,
};
use syntra_types::events::GatewayEvent;
use syntra_types::models::{Report, ReportPhoto, ReportStats};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::require_agent;
use crate::report_store::NewReport;

/// POST /reports
pub async fn create_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReportRequest>,
) -> ApiResult<impl IntoResponse> {
    let photos = req
        .photos
        .iter()
        .map(|p| B64.decode(p))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ApiError::validation("Foto con codificación inválida"))?;

    let new = NewReport {
        reporter_id: claims.sub,
        role: claims.role,
        address: req.address,
        description: req.description,
        status_label: req.status,
        lat: req.lat,
        lng: req.lng,
    };
    let report = state.reports.create_with_photos(new, photos).await?;

    state.dispatcher.broadcast(GatewayEvent::ReportCreated {
        report: report.clone(),
    });
    match state.device_token(claims.sub).await {
        Ok(token) => {
            state
                .notifier
                .report_created(claims.sub, token.as_deref(), &report)
                .await
        }
        Err(e) => warn!("No notification for report {}: {}", report.id, e),
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateReportResponse {
            id: report.id,
            photo_urls: report.photo_urls,
        }),
    ))
}

/// GET /reports/mine
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ReportList>> {
    let reports = state.reports.list_mine(claims.sub).await?;
    Ok(Json(ReportList { reports }))
}

/// GET /reports/recent
pub async fn list_recent(State(state): State<AppState>) -> ApiResult<Json<ReportList>> {
    let reports = state.reports.list_recent().await?;
    Ok(Json(ReportList { reports }))
}

/// GET /reports/map
pub async fn list_map(State(state): State<AppState>) -> ApiResult<Json<ReportList>> {
    let reports = state.reports.list_active_map().await?;
    Ok(Json(ReportList { reports }))
}

/// GET /reports/stats
pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ReportStats>> {
    require_agent(&claims)?;
    Ok(Json(state.reports.stats().await?))
}

/// GET /reports/{id}
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Report>> {
    Ok(Json(state.reports.get(id).await?))
}

/// PATCH /reports/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<UpdateStatusResponse>> {
    require_agent(&claims)?;
    let report = state.reports.update_status(id, &req.status).await?;

    state.dispatcher.broadcast(GatewayEvent::ReportStatusChanged {
        id,
        status: report.status,
        updated_at: report.updated_at,
    });
    if report.reporter_id != claims.sub {
        match state.device_token(report.reporter_id).await {
            Ok(token) => {
                state
                    .notifier
                    .status_changed(report.reporter_id, token.as_deref(), &report)
                    .await
            }
            Err(e) => warn!("No status notification for report {}: {}", id, e),
        }
    }

    Ok(Json(UpdateStatusResponse {
        id,
        status: report.status,
        status_label: report.status_label,
    }))
}

/// DELETE /reports/{id}
pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    require_agent(&claims)?;
    state.reports.delete(id).await?;
    state.dispatcher.broadcast(GatewayEvent::ReportDeleted { id });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /reports/{id}/photos: raw image bytes in the body.
pub async fn upload_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let report = state.reports.get(id).await?;
    if report.reporter_id != claims.sub && !claims.role.is_agent() {
        return Err(ApiError::forbidden("Solo puedes agregar fotos a tus reportes"));
    }

    let url = state.reports.upload_photo(id, claims.sub, bytes.to_vec()).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadPhotoResponse { report_id: id, url }),
    ))
}

/// GET /reports/{id}/photos
pub async fn list_photos(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReportPhoto>>> {
    Ok(Json(state.reports.photos(id).await?))
}
