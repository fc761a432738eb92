use gloo_storage::Storage;
use leptos::prelude::*;

use visitmap_shared::{OWNER_ID_MAX_LEN, normalize_owner_id};

use crate::map_view::{MapView, VisitedRegions};
use crate::toast::{ToastStack, Toasts};
use crate::visits::VisitSnapshot;

const OWNER_STORAGE_KEY: &str = "visitmap_owner";
const DEFAULT_OWNER: &str = "guest";

/// Whose visits the map shows.
#[derive(Clone, Copy)]
pub(crate) struct OwnerId(pub RwSignal<String>);

fn visited_label(count: usize) -> String {
    match count {
        1 => "1 region visited".to_owned(),
        n => format!("{n} regions visited"),
    }
}

#[component]
pub fn App() -> impl IntoView {
    let saved = gloo_storage::LocalStorage::get::<String>(OWNER_STORAGE_KEY)
        .ok()
        .and_then(|raw| normalize_owner_id(&raw).ok().map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_OWNER.to_owned());
    let owner: RwSignal<String> = RwSignal::new(saved.clone());
    let draft: RwSignal<String> = RwSignal::new(saved);
    let visited: RwSignal<VisitSnapshot> = RwSignal::new(VisitSnapshot::default());
    let toasts = Toasts::new();

    provide_context(OwnerId(owner));
    provide_context(VisitedRegions(visited));
    provide_context(toasts);

    let switch_owner = move |ev: leptos::ev::SubmitEvent| {
        ev.prevent_default();
        let next = match normalize_owner_id(&draft.get_untracked()) {
            Ok(next) => next.to_owned(),
            Err(reason) => {
                toasts.push(format!("Cannot switch traveller: {reason}"));
                return;
            }
        };
        if next == owner.get_untracked() {
            return;
        }
        if let Err(e) = gloo_storage::LocalStorage::set(OWNER_STORAGE_KEY, &next) {
            web_sys::console::warn_1(&format!("Could not persist owner: {e}").into());
        }
        draft.set(next.clone());
        owner.set(next);
    };

    view! {
        <div class="app-shell">
            <header class="app-header">
                <h1>"Visited regions"</h1>
                <span class="visited-count">
                    {move || visited_label(visited.with(VisitSnapshot::len))}
                </span>
                <form class="owner-form" on:submit=switch_owner>
                    <label>
                        "Traveller "
                        <input
                            type="text"
                            maxlength=OWNER_ID_MAX_LEN.to_string()
                            prop:value=move || draft.get()
                            on:input=move |ev| draft.set(event_target_value(&ev))
                        />
                    </label>
                    <button type="submit">"Switch"</button>
                </form>
            </header>
            <MapView />
            <ToastStack />
        </div>
    }
}
