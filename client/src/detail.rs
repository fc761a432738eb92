//! Side panel for editing one visit's notes and photos.

use leptos::html;
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use visitmap_shared::{NOTES_MAX_CHARS, NewPhoto, PhotoPatch, PreviewPhoto};

use crate::api::ApiError;
use crate::editor::{EditorError, UploadCandidate};
use crate::map_view::current_session;
use crate::toast::Toasts;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DetailTarget {
    pub region_id: String,
    pub visit_id: i64,
}

/// Validation problems stay in the panel; server failures become toasts.
fn report(error: EditorError, status: RwSignal<Option<String>>, toasts: Toasts, action: &str) {
    match error {
        EditorError::Api(e) => {
            web_sys::console::warn_1(&format!("{action} failed: {e}").into());
            toasts.push(format!("Could not {action}: {e}"));
        }
        other => status.set(Some(other.to_string())),
    }
}

/// Object URLs handed out for uploads from one open panel.
#[derive(Debug, Default)]
struct UploadUrls {
    urls: Vec<String>,
}

impl UploadUrls {
    fn track(&mut self, url: &str) {
        self.urls.push(url.to_owned());
    }

    /// Forget a URL whose upload failed. Returns false if it was not tracked.
    fn release(&mut self, url: &str) -> bool {
        let before = self.urls.len();
        self.urls.retain(|tracked| tracked != url);
        self.urls.len() != before
    }

    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.urls)
    }
}

fn revoke_object_url(url: &str) {
    if let Err(e) = web_sys::Url::revoke_object_url(url) {
        web_sys::console::warn_1(&format!("Could not revoke {url}: {e:?}").into());
    }
}

fn reload_photos(visit_id: i64, photos: RwSignal<Vec<PreviewPhoto>>, status: RwSignal<Option<String>>) {
    spawn_local(async move {
        let Some(session) = current_session() else {
            return;
        };
        match session.cache().get(visit_id).await {
            Ok(list) => photos.set(list.as_ref().clone()),
            Err(ApiError::Aborted) => {}
            Err(e) => status.set(Some(format!("Photos could not be loaded: {e}"))),
        }
    });
}

#[component]
pub fn DetailPanel(target: RwSignal<Option<DetailTarget>>) -> impl IntoView {
    move || {
        target
            .get()
            .map(|current| view! { <DetailBody current=current target=target /> })
    }
}

#[component]
fn DetailBody(current: DetailTarget, target: RwSignal<Option<DetailTarget>>) -> impl IntoView {
    let toasts: Toasts = expect_context();
    let visit_id = current.visit_id;
    let photos: RwSignal<Vec<PreviewPhoto>> = RwSignal::new(Vec::new());
    let notes: RwSignal<String> = RwSignal::new(String::new());
    let status: RwSignal<Option<String>> = RwSignal::new(None);
    let new_title: RwSignal<String> = RwSignal::new(String::new());
    let file_ref = NodeRef::<html::Input>::new();
    let upload_urls = StoredValue::new(UploadUrls::default());

    reload_photos(visit_id, photos, status);
    on_cleanup(move || {
        let _ = upload_urls.try_update_value(|urls| {
            for url in urls.drain() {
                revoke_object_url(&url);
            }
        });
    });

    let save_notes = move |_| {
        let text = notes.get_untracked();
        status.set(None);
        spawn_local(async move {
            let Some(session) = current_session() else {
                return;
            };
            match session.editor().save_notes(visit_id, &text).await {
                Ok(()) => status.set(Some("Notes saved.".into())),
                Err(e) => report(e, status, toasts, "save notes"),
            }
        });
    };

    let add_photo = move |_| {
        status.set(None);
        let Some(input) = file_ref.get_untracked() else {
            return;
        };
        let Some(file) = input.files().and_then(|files| files.get(0)) else {
            status.set(Some("Choose an image first.".into()));
            return;
        };
        let candidate = UploadCandidate {
            mime: file.type_(),
            size_bytes: file.size() as u64,
        };
        let Some(session) = current_session() else {
            return;
        };
        if let Err(e) = session.editor().check_upload(&candidate) {
            status.set(Some(e.to_string()));
            return;
        }
        let Ok(image_url) = web_sys::Url::create_object_url_with_blob(&file) else {
            status.set(Some("The file could not be read.".into()));
            return;
        };
        upload_urls.update_value(|urls| urls.track(&image_url));
        let title = new_title.get_untracked().trim().to_owned();
        let photo = NewPhoto {
            owner_id: session.owner().to_owned(),
            image_url,
            title: (!title.is_empty()).then_some(title),
            note: None,
        };
        spawn_local(async move {
            let url = photo.image_url.clone();
            match session.editor().add_photo(visit_id, &candidate, photo).await {
                Ok(_) => {
                    input.set_value("");
                    new_title.set(String::new());
                    reload_photos(visit_id, photos, status);
                }
                Err(e) => {
                    if upload_urls.try_update_value(|urls| urls.release(&url)) == Some(true) {
                        revoke_object_url(&url);
                    }
                    report(e, status, toasts, "add the photo");
                }
            }
        });
    };

    view! {
        <aside class="detail-panel">
            <header class="detail-header">
                <h2>{format!("Notes & photos: {}", current.region_id)}</h2>
                <button class="detail-close" on:click=move |_| target.set(None)>
                    "Close"
                </button>
            </header>
            <label class="detail-notes">
                "Notes"
                <textarea
                    maxlength=NOTES_MAX_CHARS.to_string()
                    placeholder="What do you want to remember about this place?"
                    prop:value=move || notes.get()
                    on:input=move |ev| notes.set(event_target_value(&ev))
                ></textarea>
            </label>
            <button on:click=save_notes>"Save notes"</button>
            <ul class="detail-photos">
                <For
                    each=move || photos.get()
                    key=|photo| (photo.id, photo.title.clone(), photo.note.clone())
                    children=move |photo| {
                        view! { <PhotoRow photo=photo photos=photos status=status /> }
                    }
                />
            </ul>
            <div class="detail-upload">
                <input type="file" accept="image/jpeg,image/png,image/webp,image/gif" node_ref=file_ref />
                <input
                    type="text"
                    placeholder="Title (optional)"
                    prop:value=move || new_title.get()
                    on:input=move |ev| new_title.set(event_target_value(&ev))
                />
                <button on:click=add_photo>"Add photo"</button>
            </div>
            {move || status.get().map(|message| view! { <p class="detail-status">{message}</p> })}
        </aside>
    }
}

#[component]
fn PhotoRow(
    photo: PreviewPhoto,
    photos: RwSignal<Vec<PreviewPhoto>>,
    status: RwSignal<Option<String>>,
) -> impl IntoView {
    let toasts: Toasts = expect_context();
    let title = RwSignal::new(photo.title.clone().unwrap_or_default());
    let note = RwSignal::new(photo.note.clone().unwrap_or_default());
    let visit_id = photo.visit_record_id;
    let stored = StoredValue::new(photo.clone());

    let save = move |_| {
        let photo = stored.get_value();
        let patch = PhotoPatch {
            title: Some(title.get_untracked()),
            note: Some(note.get_untracked()),
        };
        status.set(None);
        spawn_local(async move {
            let Some(session) = current_session() else {
                return;
            };
            match session.editor().update_photo(&photo, &patch).await {
                Ok(_) => reload_photos(visit_id, photos, status),
                Err(e) => report(e, status, toasts, "update the photo"),
            }
        });
    };

    let delete = move |_| {
        let photo = stored.get_value();
        status.set(None);
        spawn_local(async move {
            let Some(session) = current_session() else {
                return;
            };
            match session.editor().delete_photo(&photo).await {
                Ok(()) => reload_photos(visit_id, photos, status),
                Err(e) => report(e, status, toasts, "delete the photo"),
            }
        });
    };

    view! {
        <li class="detail-photo">
            <img src=photo.image_url alt="" />
            <input
                type="text"
                placeholder="Title"
                prop:value=move || title.get()
                on:input=move |ev| title.set(event_target_value(&ev))
            />
            <input
                type="text"
                placeholder="Note"
                prop:value=move || note.get()
                on:input=move |ev| note.set(event_target_value(&ev))
            />
            <button on:click=save>"Save"</button>
            <button class="danger" on:click=delete>"Delete"</button>
        </li>
    }
}
