//! Write paths for a visit's notes and photos.
//!
//! Input is validated before anything goes over the wire, and every
//! successful write evicts the visit's cached preview.

use std::fmt;
use std::rc::Rc;

use visitmap_shared::{
    NewPhoto, NotesTooLong, PhotoFieldError, PhotoPatch, PreviewPhoto, UploadRejection,
    validate_notes, validate_upload,
};

use crate::api::ApiError;
use crate::preview_cache::{PreviewCache, PreviewFetcher};

pub(crate) trait DetailBackend {
    async fn save_notes(&self, visit_id: i64, notes: &str) -> Result<(), ApiError>;
    async fn add_photo(&self, visit_id: i64, photo: &NewPhoto) -> Result<PreviewPhoto, ApiError>;
    async fn update_photo(&self, photo_id: i64, patch: &PhotoPatch) -> Result<PreviewPhoto, ApiError>;
    async fn delete_photo(&self, photo_id: i64, image_url: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    Notes(NotesTooLong),
    Field(PhotoFieldError),
    Upload(UploadRejection),
    NothingToUpdate,
    Api(ApiError),
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notes(e) => write!(f, "{e}"),
            Self::Field(e) => write!(f, "{e}"),
            Self::Upload(e) => write!(f, "{e}"),
            Self::NothingToUpdate => f.write_str("nothing to update"),
            Self::Api(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EditorError {}

impl From<ApiError> for EditorError {
    fn from(error: ApiError) -> Self {
        Self::Api(error)
    }
}

/// A file picked for upload, described by what the browser reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub mime: String,
    pub size_bytes: u64,
}

pub struct DetailEditor<B, F> {
    backend: Rc<B>,
    cache: Rc<PreviewCache<F>>,
}

impl<B: DetailBackend, F: PreviewFetcher + 'static> DetailEditor<B, F> {
    pub fn new(backend: Rc<B>, cache: Rc<PreviewCache<F>>) -> Self {
        Self { backend, cache }
    }

    pub async fn save_notes(&self, visit_id: i64, notes: &str) -> Result<(), EditorError> {
        validate_notes(notes).map_err(EditorError::Notes)?;
        self.backend.save_notes(visit_id, notes).await?;
        self.cache.invalidate(visit_id);
        Ok(())
    }

    /// Check a picked file before any upload starts.
    pub fn check_upload(&self, file: &UploadCandidate) -> Result<(), EditorError> {
        validate_upload(&file.mime, file.size_bytes).map_err(EditorError::Upload)
    }

    pub async fn add_photo(
        &self,
        visit_id: i64,
        file: &UploadCandidate,
        photo: NewPhoto,
    ) -> Result<PreviewPhoto, EditorError> {
        self.check_upload(file)?;
        photo.validate().map_err(EditorError::Field)?;
        let stored = self.backend.add_photo(visit_id, &photo).await?;
        self.cache.invalidate(visit_id);
        Ok(stored)
    }

    pub async fn update_photo(
        &self,
        photo: &PreviewPhoto,
        patch: &PhotoPatch,
    ) -> Result<PreviewPhoto, EditorError> {
        if patch.is_empty() {
            return Err(EditorError::NothingToUpdate);
        }
        patch.validate().map_err(EditorError::Field)?;
        let updated = self.backend.update_photo(photo.id, patch).await?;
        self.cache.invalidate(photo.visit_record_id);
        Ok(updated)
    }

    pub async fn delete_photo(&self, photo: &PreviewPhoto) -> Result<(), EditorError> {
        self.backend.delete_photo(photo.id, &photo.image_url).await?;
        self.cache.invalidate(photo.visit_record_id);
        Ok(())
    }
}
