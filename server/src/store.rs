use std::sync::atomic::{AtomicI64, Ordering};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use visitmap_shared::{
    NewPhoto, PhotoPatch, PreviewPhoto, ToggleAction, ToggleResponse, VisitRecord, VisitedEntry,
    resolve_pin_color, validate_notes,
};

/// (owner, region): the uniqueness key for visit records.
type OwnerRegion = (String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    VisitNotFound(i64),
    PhotoNotFound(i64),
    OwnerMismatch,
    PhotoLimit { max: usize },
    UrlMismatch,
    Invalid(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VisitNotFound(id) => write!(f, "visit {id} not found"),
            Self::PhotoNotFound(id) => write!(f, "photo {id} not found"),
            Self::OwnerMismatch => write!(f, "visit belongs to another owner"),
            Self::PhotoLimit { max } => write!(f, "visit already has {max} photos"),
            Self::UrlMismatch => write!(f, "photo url does not match"),
            Self::Invalid(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::VisitNotFound(_) | Self::PhotoNotFound(_) => StatusCode::NOT_FOUND,
            Self::OwnerMismatch => StatusCode::FORBIDDEN,
            Self::PhotoLimit { .. } | Self::UrlMismatch => StatusCode::CONFLICT,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// In-memory visit and photo store.
///
/// Records are keyed by (owner, region) so an upsert can never create a
/// second record for the same pair. Photos reference visits by id and are
/// dropped together with their visit.
#[derive(Debug)]
pub struct VisitStore {
    visits: DashMap<OwnerRegion, VisitRecord>,
    visit_keys: DashMap<i64, OwnerRegion>,
    photos: DashMap<i64, PreviewPhoto>,
    next_visit_id: AtomicI64,
    next_photo_id: AtomicI64,
}

impl Default for VisitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitStore {
    pub fn new() -> Self {
        Self {
            visits: DashMap::new(),
            visit_keys: DashMap::new(),
            photos: DashMap::new(),
            next_visit_id: AtomicI64::new(1),
            next_photo_id: AtomicI64::new(1),
        }
    }

    pub fn visit_count(&self) -> usize {
        self.visits.len()
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    pub fn list_visited(&self, owner: &str) -> Vec<VisitedEntry> {
        let mut entries: Vec<VisitedEntry> = self
            .visits
            .iter()
            .filter(|entry| entry.key().0 == owner)
            .map(|entry| VisitedEntry {
                id: entry.id,
                region_id: entry.region_id.clone(),
                color: entry.color.clone(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    pub fn visit(&self, visit_id: i64) -> Option<VisitRecord> {
        let key = self.visit_keys.get(&visit_id)?.clone();
        self.visits.get(&key).map(|record| record.clone())
    }

    /// Apply a desired visited state for (owner, region). Idempotent.
    pub fn set_visited(
        &self,
        owner: &str,
        region_id: &str,
        visited: bool,
        color: Option<&str>,
    ) -> ToggleResponse {
        let key = (owner.to_owned(), region_id.to_owned());

        if !visited {
            let removed = self.visits.remove(&key).map(|(_, record)| record);
            let id = removed.map(|record| {
                self.visit_keys.remove(&record.id);
                self.photos
                    .retain(|_, photo| photo.visit_record_id != record.id);
                record.id
            });
            return ToggleResponse {
                action: ToggleAction::Removed,
                id,
            };
        }

        let id = match self.visits.entry(key.clone()) {
            Entry::Occupied(existing) => existing.get().id,
            Entry::Vacant(slot) => {
                let id = self.next_visit_id.fetch_add(1, Ordering::Relaxed);
                self.visit_keys.insert(id, key);
                slot.insert(VisitRecord {
                    id,
                    region_id: region_id.to_owned(),
                    owner_id: owner.to_owned(),
                    visited_at: Utc::now(),
                    notes: None,
                    color: Some(resolve_pin_color(region_id, color)),
                });
                id
            }
        };

        ToggleResponse {
            action: ToggleAction::Added,
            id: Some(id),
        }
    }

    pub fn save_notes(&self, visit_id: i64, notes: &str) -> Result<(), StoreError> {
        validate_notes(notes).map_err(|e| StoreError::Invalid(e.to_string()))?;
        let key = self
            .visit_keys
            .get(&visit_id)
            .map(|key| key.clone())
            .ok_or(StoreError::VisitNotFound(visit_id))?;
        let mut record = self
            .visits
            .get_mut(&key)
            .ok_or(StoreError::VisitNotFound(visit_id))?;
        let trimmed = notes.trim();
        record.notes = (!trimmed.is_empty()).then(|| notes.to_owned());
        Ok(())
    }

    pub fn list_photos(&self, visit_id: i64) -> Result<Vec<PreviewPhoto>, StoreError> {
        if !self.visit_keys.contains_key(&visit_id) {
            return Err(StoreError::VisitNotFound(visit_id));
        }
        let mut photos: Vec<PreviewPhoto> = self
            .photos
            .iter()
            .filter(|photo| photo.visit_record_id == visit_id)
            .map(|photo| photo.clone())
            .collect();
        photos.sort_by_key(|photo| (photo.order, photo.id));
        Ok(photos)
    }

    pub fn add_photo(
        &self,
        visit_id: i64,
        photo: NewPhoto,
        max_photos: usize,
    ) -> Result<PreviewPhoto, StoreError> {
        photo
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        let key = self
            .visit_keys
            .get(&visit_id)
            .map(|key| key.clone())
            .ok_or(StoreError::VisitNotFound(visit_id))?;
        // Holding the record guard serializes photo inserts for this visit.
        let record = self
            .visits
            .get_mut(&key)
            .ok_or(StoreError::VisitNotFound(visit_id))?;
        if record.owner_id != photo.owner_id {
            return Err(StoreError::OwnerMismatch);
        }

        let existing: Vec<u32> = self
            .photos
            .iter()
            .filter(|p| p.visit_record_id == visit_id)
            .map(|p| p.order)
            .collect();
        if existing.len() >= max_photos {
            return Err(StoreError::PhotoLimit { max: max_photos });
        }

        let id = self.next_photo_id.fetch_add(1, Ordering::Relaxed);
        let stored = PreviewPhoto {
            id,
            visit_record_id: visit_id,
            image_url: photo.image_url.trim().to_owned(),
            title: non_blank(photo.title),
            note: non_blank(photo.note),
            order: existing.iter().max().map_or(0, |max| max + 1),
        };
        self.photos.insert(id, stored.clone());
        drop(record);
        Ok(stored)
    }

    pub fn update_photo(&self, photo_id: i64, patch: PhotoPatch) -> Result<PreviewPhoto, StoreError> {
        patch
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        let mut photo = self
            .photos
            .get_mut(&photo_id)
            .ok_or(StoreError::PhotoNotFound(photo_id))?;
        // Present-but-blank fields clear the caption.
        if let Some(title) = patch.title {
            photo.title = non_blank(Some(title));
        }
        if let Some(note) = patch.note {
            photo.note = non_blank(Some(note));
        }
        Ok(photo.clone())
    }

    pub fn delete_photo(&self, photo_id: i64, url: &str) -> Result<PreviewPhoto, StoreError> {
        let matches = self
            .photos
            .get(&photo_id)
            .map(|photo| photo.image_url == url.trim())
            .ok_or(StoreError::PhotoNotFound(photo_id))?;
        if !matches {
            return Err(StoreError::UrlMismatch);
        }
        self.photos
            .remove(&photo_id)
            .map(|(_, photo)| photo)
            .ok_or(StoreError::PhotoNotFound(photo_id))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
