use std::io::Write;

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use thiserror::Error;

use crate::hooks::HookChain;
use crate::models::StoredFile;
use crate::storage::UploadSink;
use crate::utils::{client_basename, is_temp_name};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("no `{0}` field in request")]
    MissingField(String),
    #[error("io error while storing upload: {0}")]
    Io(#[from] std::io::Error),
}

/// streams matching multipart parts into a sink and runs hooks on each result
pub struct UploadReceiver<'a, S: UploadSink> {
    field: &'a str,
    sink: &'a S,
    hooks: &'a HookChain,
}

impl<'a, S: UploadSink> UploadReceiver<'a, S> {
    pub fn new(field: &'a str, sink: &'a S, hooks: &'a HookChain) -> Self {
        Self { field, sink, hooks }
    }

    /// store every file part named after the configured field.
    ///
    /// parts whose basename is empty are skipped. the first error ends the
    /// request, but files promoted before it stay on disk.
    pub async fn receive(&self, mut multipart: Multipart) -> Result<Vec<StoredFile>, UploadError> {
        let mut stored = Vec::new();
        let mut saw_field = false;

        while let Some(mut field) = multipart.next_field().await? {
            if field.name() != Some(self.field) {
                tracing::trace!("Ignoring multipart field {:?}", field.name());
                continue;
            }
            saw_field = true;

            let submitted = field.file_name().unwrap_or_default().to_string();
            let basename = client_basename(&submitted).to_string();
            if basename.is_empty() {
                tracing::debug!("Skipping part with empty filename {:?}", submitted);
                continue;
            }
            if is_temp_name(&basename) {
                tracing::warn!("Skipping part named like a temp file: {:?}", basename);
                continue;
            }
            tracing::trace!("Sanitized filename: {} -> {}", submitted, basename);

            let mut part = self.sink.create_part()?;
            while let Some(chunk) = field.chunk().await? {
                part.write_all(&chunk)?;
            }
            let file = self.sink.finalize(part, &basename)?;

            tracing::info!("✅ Received: {} ({} bytes)", file.name, file.size);
            // mode is applied after the hooks
            self.hooks.run(&file);
            self.sink.seal(&file)?;
            stored.push(file);
        }

        if !saw_field {
            return Err(UploadError::MissingField(self.field.to_string()));
        }
        Ok(stored)
    }
}
