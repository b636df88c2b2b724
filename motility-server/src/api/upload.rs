//! Upload endpoint
//!
//! POST /upload takes a multipart form with the video (`video`, or `file`)
//! and the processing mode (`mode`), runs the pipeline and returns the
//! result manifest.

use axum::{
    extract::{multipart::{Field, MultipartRejection}, Multipart, State},
    routing::post,
    Json, Router,
};
use motility_common::ResultManifest;

use crate::{
    error::{ApiError, ApiResult},
    services::{resolve_mode, StoredAsset, UploadIngest},
    AppState, PipelineError,
};

/// Multipart names accepted for the video
const FILE_FIELDS: &[&str] = &["video", "file"];

#[derive(Default)]
struct UploadForm {
    asset: Option<StoredAsset>,
    mode: Option<String>,
}

impl UploadForm {
    async fn discard(self) {
        if let Some(asset) = self.asset {
            asset.discard().await;
        }
    }
}

/// POST /upload
///
/// Blocks until the analysis worker and normalization finish.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ResultManifest>> {
    let mut multipart = multipart?;
    let form = read_form(&state.ingest, &mut multipart).await?;

    let Some(asset) = form.asset else {
        return Err(ApiError::BadRequest("Missing file".to_string()));
    };

    let mode = match resolve_mode(form.mode.as_deref()) {
        Ok(mode) => mode,
        Err(e) => {
            tracing::warn!(asset = %asset.stored_name, error = %e, "Rejecting upload");
            asset.discard().await;
            return Err(e.into());
        }
    };

    let manifest = state.pipeline.run_detached(mode, asset).await?;
    Ok(Json(manifest))
}

async fn read_form(
    ingest: &UploadIngest,
    multipart: &mut Multipart,
) -> Result<UploadForm, PipelineError> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                form.discard().await;
                return Err(PipelineError::Validation(format!(
                    "Malformed multipart body: {}",
                    e
                )));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(name) if FILE_FIELDS.contains(&name) && form.asset.is_none() => {
                // A mode that already arrived is checked before the file streams
                if form.mode.is_some() {
                    resolve_mode(form.mode.as_deref())?;
                }
                match store_field(ingest, field).await {
                    Ok(asset) => form.asset = Some(asset),
                    Err(e) => {
                        form.discard().await;
                        return Err(e);
                    }
                }
            }
            Some("mode") => match field.text().await {
                Ok(text) => form.mode = Some(text),
                Err(e) => {
                    form.discard().await;
                    return Err(PipelineError::Validation(format!("Unreadable mode: {}", e)));
                }
            },
            _ => {}
        }
    }

    Ok(form)
}

/// Stream one file field to disk
async fn store_field(
    ingest: &UploadIngest,
    mut field: Field<'_>,
) -> Result<StoredAsset, PipelineError> {
    let mut pending = ingest.begin(field.file_name()).await?;

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = pending.write_chunk(&chunk).await {
                    pending.abort().await;
                    return Err(e);
                }
            }
            Ok(None) => break,
            Err(e) => {
                pending.abort().await;
                return Err(PipelineError::Validation(format!("Upload interrupted: {}", e)));
            }
        }
    }

    pending.finish().await
}

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}
