use serde::{Deserialize, Serialize};

pub const TITLE_MAX_CHARS: usize = 100;
pub const NOTE_MAX_CHARS: usize = 200;
pub const UPLOAD_MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const UPLOAD_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewPhoto {
    pub id: i64,
    pub visit_record_id: i64,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPhoto {
    pub owner_id: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoFieldError {
    TitleTooLong { chars: usize },
    NoteTooLong { chars: usize },
    EmptyUrl,
}

impl std::fmt::Display for PhotoFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TitleTooLong { chars } => write!(
                f,
                "title is {chars} characters long (limit {TITLE_MAX_CHARS})"
            ),
            Self::NoteTooLong { chars } => {
                write!(f, "note is {chars} characters long (limit {NOTE_MAX_CHARS})")
            }
            Self::EmptyUrl => write!(f, "image url is empty"),
        }
    }
}

impl std::error::Error for PhotoFieldError {}

fn check_caption(title: Option<&str>, note: Option<&str>) -> Result<(), PhotoFieldError> {
    if let Some(title) = title {
        let chars = title.chars().count();
        if chars > TITLE_MAX_CHARS {
            return Err(PhotoFieldError::TitleTooLong { chars });
        }
    }
    if let Some(note) = note {
        let chars = note.chars().count();
        if chars > NOTE_MAX_CHARS {
            return Err(PhotoFieldError::NoteTooLong { chars });
        }
    }
    Ok(())
}

impl PhotoPatch {
    pub fn validate(&self) -> Result<(), PhotoFieldError> {
        check_caption(self.title.as_deref(), self.note.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.note.is_none()
    }
}

impl NewPhoto {
    pub fn validate(&self) -> Result<(), PhotoFieldError> {
        if self.image_url.trim().is_empty() {
            return Err(PhotoFieldError::EmptyUrl);
        }
        check_caption(self.title.as_deref(), self.note.as_deref())
    }
}

/// Why a file was refused before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    Empty,
    TooLarge { size: u64, max: u64 },
    UnsupportedType(String),
}

impl std::fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "file is empty"),
            Self::TooLarge { size, max } => write!(
                f,
                "file is {:.1} MB, the limit is {:.0} MB",
                *size as f64 / (1024.0 * 1024.0),
                *max as f64 / (1024.0 * 1024.0)
            ),
            Self::UnsupportedType(mime) if mime.is_empty() => {
                write!(f, "file type is unknown; use JPEG, PNG, WebP or GIF")
            }
            Self::UnsupportedType(mime) => {
                write!(f, "{mime} is not supported; use JPEG, PNG, WebP or GIF")
            }
        }
    }
}

impl std::error::Error for UploadRejection {}

pub fn validate_upload(mime: &str, size_bytes: u64) -> Result<(), UploadRejection> {
    let mime = mime.trim().to_ascii_lowercase();
    if !UPLOAD_MIME_TYPES.contains(&mime.as_str()) {
        return Err(UploadRejection::UnsupportedType(mime));
    }
    if size_bytes == 0 {
        return Err(UploadRejection::Empty);
    }
    if size_bytes > UPLOAD_MAX_BYTES {
        return Err(UploadRejection::TooLarge {
            size: size_bytes,
            max: UPLOAD_MAX_BYTES,
        });
    }
    Ok(())
}
