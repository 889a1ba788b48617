use std::collections::HashMap;

use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::StatusCode;

use crate::blobs::PhotoUpload;
use crate::error::{AppError, AppResult};

/// Name of the multipart field carrying an image.
const PHOTO_FIELD: &str = "photo";

/// A multipart body read into text fields plus an optional photo.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    pub photo: Option<PhotoUpload>,
}

fn form_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation("File too large")
    } else {
        tracing::debug!("Malformed form data: {}", e.body_text());
        AppError::validation("Malformed form data")
    }
}

/// Extracts the whole form. A body that is not multipart is a validation error.
impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state).await?;
        Self::read(multipart).await
    }
}

impl MultipartForm {
    /// Drain `multipart`. A photo field with no file selected (empty file
    /// name or no bytes) counts as no photo.
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await.map_err(form_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == PHOTO_FIELD {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(form_error)?;
                if !file_name.is_empty() && !data.is_empty() {
                    form.photo = Some(PhotoUpload {
                        file_name,
                        content_type,
                        data: data.to_vec(),
                    });
                }
            } else {
                let value = field.text().await.map_err(form_error)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Remove and return a text field.
    pub fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    /// A field the caller must send. Absent reads as empty, which the
    /// domain validation rejects with a field-specific message.
    pub fn take_required(&mut self, name: &str) -> String {
        self.take(name).unwrap_or_default()
    }
}
