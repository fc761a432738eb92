use gloo_timers::future::TimeoutFuture;
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

pub const TOAST_DISMISS_MS: u32 = 3_000;
const MAX_TOASTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u32,
    pub message: String,
}

/// Transient error messages. Provided through context by the root component.
#[derive(Clone, Copy)]
pub(crate) struct Toasts {
    items: RwSignal<Vec<Toast>>,
    next_id: RwSignal<u32>,
}

impl Toasts {
    pub fn new() -> Self {
        Self {
            items: RwSignal::new(Vec::new()),
            next_id: RwSignal::new(0),
        }
    }

    pub fn push(&self, message: impl Into<String>) {
        let id = self.next_id.get_untracked().wrapping_add(1);
        self.next_id.set(id);
        let message = message.into();
        self.items.update(|items| {
            if items.len() >= MAX_TOASTS {
                items.remove(0);
            }
            items.push(Toast { id, message });
        });

        let items = self.items;
        spawn_local(async move {
            TimeoutFuture::new(TOAST_DISMISS_MS).await;
            items.try_update(|items| items.retain(|toast| toast.id != id));
        });
    }

    pub fn dismiss(&self, id: u32) {
        self.items.update(|items| items.retain(|toast| toast.id != id));
    }
}

#[component]
pub fn ToastStack() -> impl IntoView {
    let toasts = expect_context::<Toasts>();
    view! {
        <div class="toast-stack" role="status" aria-live="polite">
            <For
                each=move || toasts.items.get()
                key=|toast| toast.id
                children=move |toast| {
                    let id = toast.id;
                    view! {
                        <div class="toast">
                            <span>{toast.message}</span>
                            <button class="toast-close" on:click=move |_| toasts.dismiss(id)>
                                "×"
                            </button>
                        </div>
                    }
                }
            />
        </div>
    }
}
