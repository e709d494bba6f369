use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use stockroom_core::attachment::{AttachmentOp, Upload};
use stockroom_core::event::Event;
use stockroom_core::record::RecordView;
use tracing::trace;

use crate::app::AppState;
use crate::coordinator::RecordInput;
use crate::errors::{Result, SyncError};

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub messages: Vec<Event>,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadRequest {
    #[serde(default)]
    filename: String,
}

/// Fields of the multipart form used by create and update.
#[derive(Debug, Default)]
struct RecordForm {
    id: Option<String>,
    fields: RecordInput,
    file: Option<Upload>,
    existing_deleted_file_name: Option<String>,
}

impl RecordForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = RecordForm::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().map(base_name).unwrap_or_default();
                    let bytes = field.bytes().await.map_err(malformed)?;
                    // browsers send an empty part when no file was picked
                    if !file_name.is_empty() {
                        form.file = Some(Upload::new(file_name, bytes.to_vec()));
                    }
                }
                "id" => form.id = Some(field.text().await.map_err(malformed)?),
                "price" => form.fields.price = Some(field.text().await.map_err(malformed)?),
                "quantity" => form.fields.quantity = Some(field.text().await.map_err(malformed)?),
                "item" => form.fields.item = Some(field.text().await.map_err(malformed)?),
                "existingDeletedFileName" => {
                    form.existing_deleted_file_name = Some(field.text().await.map_err(malformed)?)
                }
                other => trace!("ignoring multipart field {}", other),
            }
        }
        Ok(form)
    }
}

fn malformed(err: MultipartError) -> SyncError {
    SyncError::Validation(format!("malformed multipart body: {}", err.body_text()))
}

// some clients send the full client-side path as the file name
fn base_name(file_name: &str) -> String {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub async fn root() -> &'static str {
    "Stockroom server is up"
}

pub async fn create_record(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RecordView>)> {
    let form = RecordForm::read(multipart).await?;
    let view = state.coordinator.create(form.fields, form.file).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_records(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RecordView>>> {
    Ok(Json(state.coordinator.list_all().await?))
}

pub async fn update_record(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<RecordView>> {
    let form = RecordForm::read(multipart).await?;
    let id = form.id.unwrap_or_default();
    let op = AttachmentOp::resolve(form.file, form.existing_deleted_file_name);
    let view = state.coordinator.update(&id, form.fields, op).await?;
    Ok(Json(view))
}

pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    let removed = state.coordinator.delete(&id).await?;
    Ok(Json(MessageResponse {
        message: format!("Record {} deleted successfully", removed.id),
    }))
}

/// Accepts `{ "filename": .. }` as JSON or as an urlencoded form.
pub async fn download_attachment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    let body: DownloadRequest = if is_json {
        let Json(body) = Json::<DownloadRequest>::from_request(request, &())
            .await
            .map_err(|e| SyncError::Validation(e.body_text()))?;
        body
    } else {
        let Form(body) = Form::<DownloadRequest>::from_request(request, &())
            .await
            .map_err(|e| SyncError::Validation(e.body_text()))?;
        body
    };

    let (filename, bytes) = state.coordinator.download(&id, &body.filename).await?;
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "'"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn drain_events(State(state): State<Arc<AppState>>) -> Result<Json<EventsResponse>> {
    let messages = state
        .coordinator
        .drain_events(state.event_batch, state.event_wait)
        .await?;
    Ok(Json(EventsResponse { messages }))
}
