//! Compression request assembly and validation

use bytes::Bytes;

use crate::error::ApiError;
use crate::ghostscript::Profile;

/// Leading bytes every PDF document starts with
const PDF_MAGIC: &[u8] = b"%PDF-";

/// The `file` part of the multipart form as received off the wire
#[derive(Debug, Default)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Raw form fields collected from the multipart body, before validation
#[derive(Debug, Default)]
pub struct RawForm {
    pub file: Option<UploadedFile>,
    pub profile: Option<String>,
    pub keep_images: Option<String>,
}

/// Immutable, validated value describing one compression request
#[derive(Debug)]
pub struct CompressionRequest {
    pub data: Bytes,
    pub filename: Option<String>,
    pub profile: Profile,
    pub keep_images: bool,
}

impl CompressionRequest {
    /// Validate the collected form fields into a request value.
    ///
    /// Enforces: file field present and non-empty, recognized profile,
    /// PDF media type (extension, declared content type, and magic
    /// header), and size within the configured maximum. The filename is
    /// only ever used to derive the response's suggested download name.
    pub fn from_form(form: RawForm, max_upload_bytes: u64) -> Result<Self, ApiError> {
        let file = form.file.filter(|file| !file.data.is_empty()).ok_or_else(|| {
            ApiError::MissingFile(
                "A PDF file must be provided in the 'file' form field.".to_string(),
            )
        })?;

        let profile = Profile::resolve(form.profile.as_deref()).map_err(|_| {
            ApiError::InvalidProfile("Profile must be one of: low, medium, high.".to_string())
        })?;

        let keep_images = is_truthy_flag(form.keep_images.as_deref());

        if !is_pdf(&file) {
            return Err(ApiError::UnsupportedMediaType(
                "Only PDF documents are supported for compression.".to_string(),
            ));
        }

        if file.data.len() as u64 > max_upload_bytes {
            let limit_mib = max_upload_bytes as f64 / (1024.0 * 1024.0);
            return Err(ApiError::PayloadTooLarge(format!(
                "The uploaded file exceeds the {:.0} MiB limit.",
                limit_mib
            )));
        }

        Ok(Self {
            data: file.data,
            filename: file.filename,
            profile,
            keep_images,
        })
    }
}

/// Lightweight validation that the upload is a PDF document: a `.pdf`
/// filename, a PDF content type when one is declared, and the magic
/// header. The filename is never trusted for anything beyond this check.
fn is_pdf(file: &UploadedFile) -> bool {
    let has_pdf_extension = file
        .filename
        .as_deref()
        .map(|name| name.to_lowercase().ends_with(".pdf"))
        .unwrap_or(false);
    if !has_pdf_extension {
        return false;
    }

    if let Some(content_type) = file.content_type.as_deref() {
        if !content_type.to_lowercase().contains("pdf") {
            return false;
        }
    }

    file.data.starts_with(PDF_MAGIC)
}

/// Interpret checkbox-style form values as booleans
fn is_truthy_flag(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(value) => matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    }
}
