use crate::AppState;
use crate::api::error::AppError;
use crate::models::{NewReport, ReportCategory, ReportListing};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::Field},
    http::{StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const MISSING_FIELDS: &str = "Missing user email or file.";

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub id: String,
    pub display_name: String,
    pub storage_key: String,
}

#[derive(Deserialize, IntoParams, Validate)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListReportsQuery {
    /// Identity (e-mail) of the report owner. `email` is accepted as an alias.
    #[serde(alias = "email")]
    #[validate(
        required(message = "User email is required."),
        length(min = 1, max = 254, message = "User email is required.")
    )]
    pub owner_identity: Option<String>,
}

/// Text fields of the upload form, collected while the file part is spooled.
#[derive(Debug, Default, Validate)]
struct UploadForm {
    #[validate(
        required(message = "Missing user email or file."),
        length(min = 1, max = 254, message = "Owner identity must be 1 to 254 characters.")
    )]
    owner_identity: Option<String>,
    category: Option<String>,
    other_category: Option<String>,
    #[validate(length(max = 4000, message = "Notes must be at most 4000 characters."))]
    notes: Option<String>,
}

struct SpooledFile {
    original_name: String,
    staging: NamedTempFile,
    size: u64,
}

fn first_validation_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| errors.to_string())
}

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::Validation(format!("Malformed upload: {}", err_msg))
    }
}

/// Streams a file part into a staging temp file, enforcing the size limit as bytes arrive.
async fn spool_to_staging(field: Field<'_>, max_file_size: usize) -> Result<SpooledFile, AppError> {
    let original_name = field.file_name().unwrap_or_default().to_string();

    let staging = NamedTempFile::new().map_err(|e| AppError::Internal(e.to_string()))?;
    let mut staging_async = tokio::fs::File::from_std(
        staging
            .reopen()
            .map_err(|e| AppError::Internal(e.to_string()))?,
    );

    let mut reader = StreamReader::new(Box::pin(field.map_err(std::io::Error::other)));
    let mut buffer = vec![0u8; 64 * 1024];
    let mut size: u64 = 0;

    loop {
        let n = reader.read(&mut buffer).await.map_err(multipart_error)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        if size > max_file_size as u64 {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the maximum size of {} MB",
                max_file_size / 1024 / 1024
            )));
        }
        staging_async
            .write_all(&buffer[..n])
            .await
            .map_err(|e| AppError::Internal(format!("Staging write error: {}", e)))?;
    }

    staging_async
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("Staging write error: {}", e)))?;

    Ok(SpooledFile {
        original_name,
        staging,
        size,
    })
}

async fn read_upload(
    multipart: &mut Multipart,
    max_file_size: usize,
) -> Result<(UploadForm, Option<SpooledFile>), AppError> {
    let mut form = UploadForm::default();
    let mut file: Option<SpooledFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "reportFile" | "file" => {
                if file.is_some() {
                    return Err(AppError::Validation(
                        "Only one file can be uploaded per report.".to_string(),
                    ));
                }
                file = Some(spool_to_staging(field, max_file_size).await?);
            }
            "ownerIdentity" | "userEmail" => {
                form.owner_identity = Some(field.text().await.map_err(multipart_error)?);
            }
            "category" | "reportType" => {
                form.category = Some(field.text().await.map_err(multipart_error)?);
            }
            "otherCategory" | "otherReportType" => {
                form.other_category = Some(field.text().await.map_err(multipart_error)?);
            }
            "notes" => {
                form.notes = Some(field.text().await.map_err(multipart_error)?);
            }
            other => {
                tracing::debug!("Ignoring unexpected upload field '{}'", other);
            }
        }
    }

    Ok((form, file))
}

#[utoipa::path(
    post,
    path = "/api/upload-report",
    request_body(content = Multipart, description = "Report file (`reportFile`) with `ownerIdentity`, `category`, optional `otherCategory` and `notes`"),
    responses(
        (status = 200, description = "Report stored", body = UploadResponse),
        (status = 400, description = "Missing owner identity or file", body = MessageResponse),
        (status = 413, description = "File too large", body = MessageResponse),
        (status = 500, description = "Storage or persistence failure", body = MessageResponse)
    ),
    tag = "reports"
)]
pub async fn upload_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let result: Result<Json<UploadResponse>, AppError> = async {
        let (form, file) = read_upload(&mut multipart, state.config.max_file_size).await?;

        form.validate()
            .map_err(|e| AppError::Validation(first_validation_message(&e)))?;

        let (Some(owner_identity), Some(file)) = (form.owner_identity, file) else {
            return Err(AppError::Validation(MISSING_FIELDS.to_string()));
        };

        if file.size == 0 {
            return Err(AppError::Validation(MISSING_FIELDS.to_string()));
        }

        let content = tokio::fs::File::open(file.staging.path())
            .await
            .map_err(|e| AppError::Internal(format!("Staging read error: {}", e)))?;

        let uploaded = state
            .report_service
            .upload_report(NewReport {
                owner_identity,
                display_name: file.original_name.clone(),
                category: ReportCategory::from_form(
                    form.category.as_deref(),
                    form.other_category.as_deref(),
                ),
                notes: form.notes,
                size_hint: Some(file.size),
                content: Box::new(content),
            })
            .await?;

        // Staging file is removed here, after the blob store has its own copy
        drop(file);

        Ok(Json(UploadResponse {
            message: "File uploaded and data saved successfully!".to_string(),
            id: uploaded.id,
            display_name: uploaded.display_name,
            storage_key: uploaded.storage_key,
        }))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body so the client sees our response instead of a reset connection
            tracing::warn!("Upload failed: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/get-my-reports",
    params(ListReportsQuery),
    responses(
        (status = 200, description = "Reports of the owner, most recent first", body = Vec<ReportListing>),
        (status = 400, description = "Missing owner identity", body = MessageResponse),
        (status = 500, description = "Catalog failure", body = MessageResponse)
    ),
    tag = "reports"
)]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<Vec<ReportListing>>, AppError> {
    query
        .validate()
        .map_err(|e| AppError::Validation(first_validation_message(&e)))?;

    let owner_identity = query.owner_identity.unwrap_or_default();
    let reports = state.report_service.list_reports(&owner_identity).await?;

    Ok(Json(reports))
}

#[utoipa::path(
    delete,
    path = "/api/delete-report/{id}",
    params(
        ("id" = String, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Report and its file deleted", body = MessageResponse),
        (status = 404, description = "Report not found", body = MessageResponse),
        (status = 500, description = "Storage or catalog failure", body = MessageResponse)
    ),
    tag = "reports"
)]
pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.report_service.delete_report(&id).await?;

    Ok(Json(MessageResponse {
        message: "Report deleted successfully.".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/reports/{id}/download",
    params(
        ("id" = String, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Report file stream"),
        (status = 404, description = "Report or its file not found", body = MessageResponse),
        (status = 500, description = "Storage read failure", body = MessageResponse)
    ),
    tag = "reports"
)]
pub async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let download = state.report_service.open_report(&id).await?;

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(&download.record.display_name, NON_ALPHANUMERIC)
    );

    let body = Body::from_stream(ReaderStream::new(download.blob.reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.blob.size)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_form_validation_messages() {
        let form = UploadForm::default();
        let errors = form.validate().unwrap_err();
        assert_eq!(first_validation_message(&errors), MISSING_FIELDS);

        let form = UploadForm {
            owner_identity: Some("a@x.io".to_string()),
            notes: Some("n".repeat(4001)),
            ..Default::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(
            first_validation_message(&errors),
            "Notes must be at most 4000 characters."
        );

        let form = UploadForm {
            owner_identity: Some("a@x.io".to_string()),
            ..Default::default()
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_multipart_error_mapping() {
        assert!(matches!(
            multipart_error("length limit exceeded"),
            AppError::PayloadTooLarge(_)
        ));
        assert!(matches!(
            multipart_error("incomplete field data"),
            AppError::Validation(_)
        ));
    }
}
