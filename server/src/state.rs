use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::max_photos_per_visit;
use crate::store::VisitStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<VisitStore>,
    pub max_photos_per_visit: usize,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    toggle_requests_total: AtomicU64,
    visits_added_total: AtomicU64,
    visits_removed_total: AtomicU64,
    preview_requests_total: AtomicU64,
    photo_writes_total: AtomicU64,
    notes_saves_total: AtomicU64,
    rejected_requests_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub toggle_requests_total: u64,
    pub visits_added_total: u64,
    pub visits_removed_total: u64,
    pub preview_requests_total: u64,
    pub photo_writes_total: u64,
    pub notes_saves_total: u64,
    pub rejected_requests_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            toggle_requests_total: self.toggle_requests_total.load(Ordering::Relaxed),
            visits_added_total: self.visits_added_total.load(Ordering::Relaxed),
            visits_removed_total: self.visits_removed_total.load(Ordering::Relaxed),
            preview_requests_total: self.preview_requests_total.load(Ordering::Relaxed),
            photo_writes_total: self.photo_writes_total.load(Ordering::Relaxed),
            notes_saves_total: self.notes_saves_total.load(Ordering::Relaxed),
            rejected_requests_total: self.rejected_requests_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_toggle_request(&self) {
        self.toggle_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_visit_added(&self) {
        self.visits_added_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_visit_removed(&self) {
        self.visits_removed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preview_request(&self) {
        self.preview_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_photo_write(&self) {
        self.photo_writes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notes_save(&self) {
        self.notes_saves_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_request(&self) {
        self.rejected_requests_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            store: Arc::new(VisitStore::new()),
            max_photos_per_visit: max_photos_per_visit(),
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
