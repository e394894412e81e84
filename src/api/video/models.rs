use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use validator::{Validate, ValidationError};

use crate::db::NewVideo;

pub const PRIVACY_LEVELS: [&str; 3] = ["public", "private", "unlisted"];

/// Longest original file name kept for diagnostics
const MAX_ORIGINAL_NAME: usize = 255;

/// Multipart body of `POST /upload`
///
/// Text fields are optional at the form level so that a missing and an
/// empty value are reported the same way by validation.
#[derive(Debug, MultipartForm)]
pub struct UploadForm {
    pub title: Option<Text<String>>,
    pub description: Option<Text<String>>,
    pub keywords: Option<Text<String>>,
    pub privacy: Option<Text<String>>,
    pub file: TempFile,
}

impl UploadForm {
    pub fn into_parts(self) -> (UploadMetadata, TempFile) {
        let metadata = UploadMetadata {
            title: text(self.title).unwrap_or_default(),
            description: text(self.description),
            keywords: text(self.keywords),
            privacy: text(self.privacy)
                .map(|p| p.to_ascii_lowercase())
                .unwrap_or_default(),
        };
        (metadata, self.file)
    }
}

fn text(field: Option<Text<String>>) -> Option<String> {
    field
        .map(|t| t.into_inner().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// User-supplied video metadata, opaque to the encode pipeline
#[derive(Debug, Clone, Validate)]
pub struct UploadMetadata {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Title is required and must be at most 100 characters"
    ))]
    pub title: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 500, message = "Keywords must be at most 500 characters"))]
    pub keywords: Option<String>,

    #[validate(custom(function = "validate_privacy"))]
    pub privacy: String,
}

impl UploadMetadata {
    pub fn into_new_video(self, original_name: &str) -> NewVideo {
        NewVideo {
            title: self.title,
            description: self.description,
            keywords: self.keywords,
            privacy: self.privacy,
            original_name: original_name.chars().take(MAX_ORIGINAL_NAME).collect(),
        }
    }
}

fn validate_privacy(privacy: &str) -> Result<(), ValidationError> {
    if PRIVACY_LEVELS.contains(&privacy) {
        return Ok(());
    }
    let mut err = ValidationError::new("privacy");
    err.message = Some("Privacy is required and must be one of: public, private, unlisted".into());
    Err(err)
}
