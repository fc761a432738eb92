//! HTTP client for the visit API.
//!
//! Each request owns a `web_sys::AbortController`; dropping the request
//! future (supersede, hover moving on, unmount) aborts the fetch.

use std::fmt;

use gloo_net::http::{Request, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use visitmap_shared::{
    NewPhoto, NotesUpdate, PhotoPatch, PreviewPhoto, ToggleRequest, ToggleResponse, VisitedEntry,
};

use crate::editor::DetailBackend;
use crate::preview_cache::PreviewFetcher;
use crate::visits::VisitBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Network(String),
    Http(u16),
    Decode(String),
    Aborted,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Http(status) => write!(f, "server returned HTTP {status}"),
            Self::Decode(message) => write!(f, "unexpected response: {message}"),
            Self::Aborted => f.write_str("request was cancelled"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<gloo_net::Error> for ApiError {
    fn from(error: gloo_net::Error) -> Self {
        match error {
            gloo_net::Error::JsError(js) if js.name == "AbortError" => Self::Aborted,
            gloo_net::Error::SerdeError(e) => Self::Decode(e.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}

/// Aborts the underlying fetch unless the response was fully read.
struct AbortOnDrop {
    controller: Option<web_sys::AbortController>,
}

impl AbortOnDrop {
    fn new() -> Self {
        Self {
            controller: web_sys::AbortController::new().ok(),
        }
    }

    fn signal(&self) -> Option<web_sys::AbortSignal> {
        self.controller.as_ref().map(web_sys::AbortController::signal)
    }

    fn disarm(mut self) {
        self.controller = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpApi;

impl HttpApi {
    async fn send(builder: RequestBuilder, body: Option<String>) -> Result<Response, ApiError> {
        let guard = AbortOnDrop::new();
        let signal = guard.signal();
        let builder = builder.abort_signal(signal.as_ref());
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(json)?,
            None => builder.build()?,
        };
        let response = request.send().await?;
        guard.disarm();
        if !response.ok() {
            return Err(ApiError::Http(response.status()));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(
        builder: RequestBuilder,
        body: Option<String>,
    ) -> Result<T, ApiError> {
        let response = Self::send(builder, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
        serde_json::to_string(value).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn owner_path(owner: &str) -> String {
    format!("/api/owners/{}/visits", js_sys::encode_uri_component(owner))
}

impl VisitBackend for HttpApi {
    async fn list_visited(&self, owner: &str) -> Result<Vec<VisitedEntry>, ApiError> {
        Self::json(Request::get(&owner_path(owner)), None).await
    }

    async fn toggle_visit(
        &self,
        owner: &str,
        request: &ToggleRequest,
    ) -> Result<ToggleResponse, ApiError> {
        let url = format!("{}/toggle", owner_path(owner));
        Self::json(Request::post(&url), Some(Self::encode(request)?)).await
    }
}

impl PreviewFetcher for HttpApi {
    async fn list_preview(&self, visit_id: i64) -> Result<Vec<PreviewPhoto>, ApiError> {
        Self::json(Request::get(&format!("/api/visits/{visit_id}/photos")), None).await
    }
}

impl DetailBackend for HttpApi {
    async fn save_notes(&self, visit_id: i64, notes: &str) -> Result<(), ApiError> {
        let body = Self::encode(&NotesUpdate {
            notes: notes.to_owned(),
        })?;
        Self::send(Request::put(&format!("/api/visits/{visit_id}/notes")), Some(body)).await?;
        Ok(())
    }

    async fn add_photo(&self, visit_id: i64, photo: &NewPhoto) -> Result<PreviewPhoto, ApiError> {
        let url = format!("/api/visits/{visit_id}/photos");
        Self::json(Request::post(&url), Some(Self::encode(photo)?)).await
    }

    async fn update_photo(&self, photo_id: i64, patch: &PhotoPatch) -> Result<PreviewPhoto, ApiError> {
        let url = format!("/api/photos/{photo_id}");
        Self::json(Request::patch(&url), Some(Self::encode(patch)?)).await
    }

    async fn delete_photo(&self, photo_id: i64, image_url: &str) -> Result<(), ApiError> {
        let builder = Request::delete(&format!("/api/photos/{photo_id}"))
            .query([("url", image_url)]);
        Self::send(builder, None).await?;
        Ok(())
    }
}
