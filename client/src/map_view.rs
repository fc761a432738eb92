//! The map view and the session that drives it.
//!
//! A `MapSession` is built when the view mounts (and again when the owner
//! changes) and torn down on unmount. It owns every browser handle the map
//! needs: shape listeners, window listeners, the pin observer, timers and
//! in-flight requests. The reactive view only reads signals the session
//! writes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use leptos::html;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlElement;

use visitmap_shared::{PIN_PALETTE, region_number};

use crate::api::{ApiError, HttpApi};
use crate::app::OwnerId;
use crate::detail::{DetailPanel, DetailTarget};
use crate::dom::{
    DomPinHost, LayerObserver, ShapeBinding, ShapeHandlers, WindowBinding, now_ms, viewport_size,
};
use crate::editor::DetailEditor;
use crate::hover::{
    CardContent, HOVER_CLOSE_DELAY_MS, HoverCard, HoverEngine, Point, PreviewRequest, Rect, Size,
    place_card,
};
use crate::map_surface::{LoadState, MAP_ASSET_URL, MapSurface};
use crate::pins::{PIN_THROTTLE_MS, PinLayer, SyncReport, Throttle, ThrottleDecision};
use crate::preview_cache::PreviewCache;
use crate::toast::Toasts;
use crate::visits::{ToggleOutcome, VisitController, VisitSnapshot};

const CARD_SIZE: Size = Size {
    width: 260.0,
    height: 210.0,
};

/// Published visited set, shared with the header counter.
#[derive(Clone, Copy)]
pub(crate) struct VisitedRegions(pub RwSignal<VisitSnapshot>);

#[derive(Clone, Copy)]
struct ViewSignals {
    visited: RwSignal<VisitSnapshot>,
    load: RwSignal<LoadState>,
    card: RwSignal<Option<HoverCard>>,
    toasts: Toasts,
}

pub(crate) struct MapSession {
    owner: String,
    signals: ViewSignals,
    closed: Cell<bool>,
    visits: VisitController<HttpApi>,
    cache: Rc<PreviewCache<HttpApi>>,
    editor: DetailEditor<HttpApi, HttpApi>,
    surface: RefCell<MapSurface>,
    hover: RefCell<HoverEngine>,
    pins: RefCell<PinLayer<DomPinHost>>,
    shapes: RefCell<HashMap<String, ShapeBinding>>,
    throttle: RefCell<Throttle>,
    close_timer: RefCell<Option<Timeout>>,
    reposition_timer: RefCell<Option<Timeout>>,
    window_binding: RefCell<Option<WindowBinding>>,
    observer: RefCell<Option<LayerObserver>>,
}

thread_local! {
    static MAP_SESSION: RefCell<Option<Rc<MapSession>>> = const { RefCell::new(None) };
}

pub(crate) fn current_session() -> Option<Rc<MapSession>> {
    MAP_SESSION.with(|slot| slot.borrow().clone())
}

fn with_session<R>(f: impl FnOnce(&Rc<MapSession>) -> R) -> Option<R> {
    let session = current_session()?;
    Some(f(&session))
}

pub(crate) fn teardown_session() {
    let session = MAP_SESSION.with(|slot| slot.borrow_mut().take());
    if let Some(session) = session {
        session.teardown();
    }
}

fn random_palette_index() -> usize {
    (js_sys::Math::random() * PIN_PALETTE.len() as f64) as usize
}

async fn fetch_map_document() -> Result<String, String> {
    let resp = gloo_net::http::Request::get(MAP_ASSET_URL)
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;
    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }
    let text = resp.text().await.map_err(|e| format!("read error: {e}"))?;
    if !text.contains("<svg") {
        return Err("map asset is not an SVG document".into());
    }
    Ok(text)
}

fn mount_session(
    owner: String,
    container: HtmlElement,
    map_host: HtmlElement,
    layer: HtmlElement,
    signals: ViewSignals,
) {
    teardown_session();

    let api = Rc::new(HttpApi);
    let visited = signals.visited;
    let visits = VisitController::new(api.clone(), random_palette_index, move |snapshot| {
        visited.set(snapshot);
    });
    let cache = Rc::new(PreviewCache::new(api.clone(), now_ms));
    let editor = DetailEditor::new(api, cache.clone());

    let session = Rc::new(MapSession {
        owner,
        signals,
        closed: Cell::new(false),
        visits,
        cache,
        editor,
        surface: RefCell::new(MapSurface::new()),
        hover: RefCell::new(HoverEngine::new()),
        pins: RefCell::new(PinLayer::new(DomPinHost::new(container, layer.clone()))),
        shapes: RefCell::new(HashMap::new()),
        throttle: RefCell::new(Throttle::new(PIN_THROTTLE_MS)),
        close_timer: RefCell::new(None),
        reposition_timer: RefCell::new(None),
        window_binding: RefCell::new(None),
        observer: RefCell::new(None),
    });
    MAP_SESSION.with(|slot| *slot.borrow_mut() = Some(session.clone()));

    signals.visited.set(VisitSnapshot::default());
    signals.card.set(None);
    *session.window_binding.borrow_mut() = WindowBinding::bind(|| {
        with_session(|session| session.request_reposition());
    });
    *session.observer.borrow_mut() = LayerObserver::observe(&layer, || {
        with_session(|session| session.heal_pins());
    });

    spawn_local(async move {
        session.load(map_host).await;
    });
}

impl MapSession {
    pub(crate) fn owner(&self) -> &str {
        &self.owner
    }

    pub(crate) fn cache(&self) -> &PreviewCache<HttpApi> {
        &self.cache
    }

    pub(crate) fn editor(&self) -> &DetailEditor<HttpApi, HttpApi> {
        &self.editor
    }

    async fn load(self: Rc<Self>, map_host: HtmlElement) {
        self.signals.load.set(LoadState::Loading);
        let document = match fetch_map_document().await {
            Ok(document) => document,
            Err(reason) => {
                if self.closed.get() {
                    return;
                }
                web_sys::console::warn_1(&format!("Map asset load failed: {reason}").into());
                let mut surface = self.surface.borrow_mut();
                surface.fail(reason);
                self.signals.load.set(surface.load_state().clone());
                return;
            }
        };
        if self.closed.get() {
            return;
        }

        map_host.set_inner_html(&document);
        let shape_ids = shape_ids(&map_host);
        let bound = self
            .surface
            .borrow_mut()
            .bind(shape_ids.iter().map(String::as_str));

        let handlers = Rc::new(ShapeHandlers {
            on_enter: Box::new(|region_id, cursor| {
                with_session(|session| session.on_region_enter(region_id, cursor));
            }),
            on_leave: Box::new(|region_id| {
                with_session(|session| session.on_region_leave(region_id));
            }),
            on_click: Box::new(|region_id| {
                with_session(|session| session.on_region_click(region_id));
            }),
        });
        {
            let mut shapes = self.shapes.borrow_mut();
            for region_id in bound {
                if let Ok(Some(shape)) = map_host.query_selector(&format!("#{region_id}")) {
                    shapes.insert(region_id, ShapeBinding::bind(shape, handlers.clone()));
                }
            }
        }
        let load_state = self.surface.borrow().load_state().clone();
        if let LoadState::Ready { regions } = &load_state {
            web_sys::console::info_1(&format!("map_regions_bound={regions}").into());
        }
        self.signals.load.set(load_state);
        self.apply_visited(&self.signals.visited.get_untracked());

        match self.visits.load_visited(&self.owner).await {
            Ok(ids) => {
                web_sys::console::info_1(
                    &format!("visited_regions owner={} count={}", self.owner, ids.len()).into(),
                );
            }
            Err(ApiError::Aborted) => {}
            Err(e) => {
                if !self.closed.get() {
                    web_sys::console::warn_1(&format!("Visited list fetch failed: {e}").into());
                    self.signals
                        .toasts
                        .push(format!("Could not load visited regions: {e}"));
                }
            }
        }
    }

    /// Mirror a published visited set into fills, pins and the open card.
    fn apply_visited(self: &Rc<Self>, visited: &VisitSnapshot) {
        if self.closed.get() {
            return;
        }
        let changes = self.surface.borrow_mut().fill_changes(visited);
        {
            let shapes = self.shapes.borrow();
            for (region_id, fill) in changes {
                if let Some(shape) = shapes.get(&region_id) {
                    shape.set_fill(&fill);
                }
            }
        }

        let report = self.pins.borrow_mut().sync(visited);
        if report != SyncReport::default() {
            web_sys::console::info_1(
                &format!(
                    "pin_sync added={} removed={} restyled={} pins={}",
                    report.added,
                    report.removed,
                    report.restyled,
                    self.pins.borrow().len()
                )
                .into(),
            );
        }
        if report.unanchored > 0 && !self.shapes.borrow().is_empty() {
            web_sys::console::warn_1(
                &format!("{} visited regions have no shape on the map", report.unanchored).into(),
            );
        }

        let hovered = self.hover.borrow().card().map(|card| card.region_id.clone());
        if let Some(region_id) = hovered {
            let visit_id = visited.visit_id(&region_id);
            let cached = visit_id.and_then(|id| self.cache.peek(id));
            let fetch = self
                .hover
                .borrow_mut()
                .refresh_visit(&region_id, visit_id, cached);
            if let Some(request) = fetch {
                self.start_preview(request);
            }
            self.publish_card();
        }
    }

    fn publish_card(&self) {
        self.signals.card.set(self.hover.borrow().card().cloned());
    }

    fn set_brightness(&self, region_id: &str, brightness: Option<f64>) {
        if let Some(shape) = self.shapes.borrow().get(region_id) {
            shape.set_brightness(brightness);
        }
    }

    fn reset_highlight(&self, region_id: Option<&str>) {
        let restored = self.surface.borrow_mut().reset_highlight(region_id);
        for region_id in restored {
            self.set_brightness(&region_id, None);
        }
    }

    fn on_region_enter(self: &Rc<Self>, region_id: &str, cursor: Point) {
        if self.closed.get() {
            return;
        }
        let highlight = self.surface.borrow_mut().pointer_enter(region_id);
        if let Some(level) = highlight {
            self.set_brightness(region_id, Some(level.brightness()));
        }

        let visit_id = self.signals.visited.get_untracked().visit_id(region_id);
        let cached = visit_id.and_then(|id| self.cache.peek(id));
        let placement = place_card(cursor, CARD_SIZE, viewport_size());
        let effects = self
            .hover
            .borrow_mut()
            .enter_region(region_id, visit_id, placement, cached);

        if effects.cancel_close_timer {
            self.close_timer.borrow_mut().take();
        }
        if let Some(stale) = effects.abandon_visit {
            self.cache.cancel(stale);
        }
        if let Some(previous) = effects.reset_region {
            self.reset_highlight(Some(&previous));
        }
        if let Some(request) = effects.fetch {
            self.start_preview(request);
        }
        self.publish_card();
    }

    fn on_region_leave(&self, region_id: &str) {
        let highlight = self.surface.borrow_mut().pointer_leave(region_id);
        if let Some(level) = highlight {
            self.set_brightness(region_id, Some(level.brightness()));
        }
        let timer = self.hover.borrow_mut().leave_region(region_id);
        if let Some(timer) = timer {
            self.arm_close_timer(timer);
        }
    }

    fn arm_close_timer(&self, timer: u64) {
        let timeout = Timeout::new(HOVER_CLOSE_DELAY_MS, move || {
            with_session(|session| session.on_close_timer(timer));
        });
        *self.close_timer.borrow_mut() = Some(timeout);
    }

    // Runs inside the timeout callback, so the fired handle stays in its slot.
    fn on_close_timer(&self, timer: u64) {
        let closed = self.hover.borrow_mut().close_timer_fired(timer);
        let Some(closed) = closed else {
            return;
        };
        if let Some(visit_id) = closed.visit_id {
            self.cache.cancel(visit_id);
        }
        self.reset_highlight(None);
        self.publish_card();
    }

    fn on_card_enter(&self) {
        if self.hover.borrow_mut().enter_bridge_or_card() {
            self.close_timer.borrow_mut().take();
        }
    }

    fn on_card_leave(&self) {
        let timer = self.hover.borrow_mut().leave_bridge_or_card();
        if let Some(timer) = timer {
            self.arm_close_timer(timer);
        }
    }

    fn start_preview(self: &Rc<Self>, request: PreviewRequest) {
        let session = Rc::clone(self);
        spawn_local(async move {
            let result = session.cache.get(request.visit_id).await;
            if session.closed.get() {
                return;
            }
            if let Err(e) = &result
                && *e != ApiError::Aborted
            {
                web_sys::console::warn_1(
                    &format!("Preview fetch for visit {} failed: {e}", request.visit_id).into(),
                );
            }
            let applied = session
                .hover
                .borrow_mut()
                .resolve_preview(request.token, result);
            if applied {
                session.publish_card();
            }
        });
    }

    fn retry_preview(self: &Rc<Self>) {
        let request = self.hover.borrow_mut().retry();
        if let Some(request) = request {
            self.start_preview(request);
            self.publish_card();
        }
    }

    fn on_region_click(self: &Rc<Self>, region_id: &str) {
        if self.closed.get() || !self.surface.borrow_mut().accept_click(region_id, now_ms()) {
            return;
        }
        let session = Rc::clone(self);
        let region_id = region_id.to_owned();
        spawn_local(async move {
            match session.visits.toggle(&session.owner, &region_id).await {
                Ok(ToggleOutcome::Added { region_id, id }) => {
                    web_sys::console::info_1(&format!("visit {id} recorded for {region_id}").into());
                }
                Ok(ToggleOutcome::Removed { region_id }) => {
                    web_sys::console::info_1(&format!("visit removed for {region_id}").into());
                }
                Ok(ToggleOutcome::Superseded) => {}
                Err(e) => {
                    if session.closed.get() {
                        return;
                    }
                    web_sys::console::warn_1(&format!("Toggle failed: {e}").into());
                    session.signals.toasts.push(e.to_string());
                }
            }
        });
    }

    fn request_reposition(&self) {
        if self.closed.get() {
            return;
        }
        let decision = self.throttle.borrow_mut().request(now_ms());
        match decision {
            ThrottleDecision::RunNow => {
                self.pins.borrow_mut().update_positions();
            }
            ThrottleDecision::Schedule(delay_ms) => {
                let timeout = Timeout::new(delay_ms, || {
                    with_session(|session| session.reposition_trailing());
                });
                *self.reposition_timer.borrow_mut() = Some(timeout);
            }
            ThrottleDecision::Coalesced => {}
        }
    }

    fn reposition_trailing(&self) {
        self.throttle.borrow_mut().trailing_fired(now_ms());
        self.pins.borrow_mut().update_positions();
    }

    fn heal_pins(&self) {
        if self.closed.get() {
            return;
        }
        let visited = self.signals.visited.get_untracked();
        let restored = self.pins.borrow_mut().heal(&visited);
        if restored > 0 {
            web_sys::console::info_1(&format!("pin_markers_restored={restored}").into());
        }
    }

    fn teardown(&self) {
        self.closed.set(true);
        let in_flight = self.visits.in_flight_count();
        if in_flight > 0 {
            web_sys::console::info_1(&format!("map_teardown aborted_toggles={in_flight}").into());
        }
        self.visits.abort_all();
        self.cache.clear();
        self.close_timer.borrow_mut().take();
        self.reposition_timer.borrow_mut().take();
        self.throttle.borrow_mut().reset();
        if let Some(binding) = self.window_binding.borrow_mut().take() {
            binding.close();
        }
        if let Some(observer) = self.observer.borrow_mut().take() {
            observer.close();
        }
        for (_, shape) in self.shapes.borrow_mut().drain() {
            shape.close();
        }
        self.pins.borrow_mut().clear();
        self.hover.borrow_mut().reset();
        self.surface.borrow_mut().teardown();
    }
}

fn shape_ids(root: &HtmlElement) -> Vec<String> {
    let Ok(nodes) = root.query_selector_all("[id]") else {
        return Vec::new();
    };
    (0..nodes.length())
        .filter_map(|i| nodes.get(i))
        .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
        .map(|element| element.id())
        .collect()
}

fn region_title(region_id: &str) -> String {
    match region_number(region_id) {
        Some(n) => format!("Province {n}"),
        None => region_id.to_owned(),
    }
}

fn rect_style(rect: &Rect) -> String {
    format!(
        "left:{:.0}px;top:{:.0}px;width:{:.0}px;height:{:.0}px;",
        rect.left, rect.top, rect.width, rect.height
    )
}

#[component]
pub fn MapView() -> impl IntoView {
    let OwnerId(owner) = expect_context();
    let VisitedRegions(visited) = expect_context();
    let toasts: Toasts = expect_context();
    let load: RwSignal<LoadState> = RwSignal::new(LoadState::Loading);
    let card: RwSignal<Option<HoverCard>> = RwSignal::new(None);
    let detail: RwSignal<Option<DetailTarget>> = RwSignal::new(None);
    let signals = ViewSignals {
        visited,
        load,
        card,
        toasts,
    };

    let container_ref = NodeRef::<html::Div>::new();
    let map_ref = NodeRef::<html::Div>::new();
    let layer_ref = NodeRef::<html::Div>::new();

    Effect::new(move || {
        let owner = owner.get();
        let (Some(container), Some(map_host), Some(layer)) =
            (container_ref.get(), map_ref.get(), layer_ref.get())
        else {
            return;
        };
        detail.set(None);
        mount_session(
            owner,
            container.into(),
            map_host.into(),
            layer.into(),
            signals,
        );
    });
    on_cleanup(teardown_session);

    Effect::new(move || {
        let snapshot = visited.get();
        with_session(|session| session.apply_visited(&snapshot));
    });

    view! {
        <section class="map-view">
            <div
                class="map-container"
                class:hidden=move || matches!(load.get(), LoadState::Failed(_))
                node_ref=container_ref
            >
                <div class="map-document" node_ref=map_ref></div>
                <div class="pin-layer" node_ref=layer_ref></div>
            </div>
            {move || match load.get() {
                LoadState::Loading => {
                    Some(view! { <div class="map-loading">"Loading map…"</div> }.into_any())
                }
                LoadState::Failed(reason) => {
                    Some(
                        view! {
                            <div class="map-error" role="alert">
                                {format!("The map could not be loaded ({reason}). Reload the page to try again.")}
                            </div>
                        }
                            .into_any(),
                    )
                }
                LoadState::Ready { .. } => None,
            }}
            <PreviewCard card=card detail=detail />
            <DetailPanel target=detail />
        </section>
    }
}

#[component]
fn PreviewCard(
    card: RwSignal<Option<HoverCard>>,
    detail: RwSignal<Option<DetailTarget>>,
) -> impl IntoView {
    move || {
        card.get().map(|card| {
            let HoverCard {
                region_id,
                visit_id,
                placement,
                content,
            } = card;
            let body = match content {
                CardContent::Unvisited => view! {
                    <p class="preview-hint">"Not visited yet. Click the region to mark it."</p>
                }
                .into_any(),
                CardContent::Loading => view! { <p class="preview-hint">"Loading photos…"</p> }.into_any(),
                CardContent::Ready(photos) if photos.is_empty() => {
                    view! { <p class="preview-hint">"No photos yet."</p> }.into_any()
                }
                CardContent::Ready(photos) => {
                    let thumbs = photos
                        .iter()
                        .map(|photo| {
                            view! {
                                <img
                                    class="preview-thumb"
                                    src=photo.image_url.clone()
                                    alt=photo.title.clone().unwrap_or_default()
                                    loading="lazy"
                                />
                            }
                        })
                        .collect_view();
                    view! { <div class="preview-thumbs">{thumbs}</div> }.into_any()
                }
                CardContent::Failed(reason) => view! {
                    <div class="preview-failed">
                        <p>{format!("Photos could not be loaded: {reason}")}</p>
                        <button on:click=move |_| {
                            with_session(|session| session.retry_preview());
                        }>"Retry"</button>
                    </div>
                }
                .into_any(),
            };
            let edit = visit_id.map(|visit_id| {
                let region_id = region_id.clone();
                view! {
                    <button
                        class="preview-edit"
                        on:click=move |_| {
                            detail
                                .set(
                                    Some(DetailTarget {
                                        region_id: region_id.clone(),
                                        visit_id,
                                    }),
                                )
                        }
                    >
                        "Notes & photos"
                    </button>
                }
            });
            view! {
                <div
                    class="preview-bridge"
                    style=rect_style(&placement.bridge)
                    on:pointerenter=move |_| {
                        with_session(|session| session.on_card_enter());
                    }
                    on:pointerleave=move |_| {
                        with_session(|session| session.on_card_leave());
                    }
                ></div>
                <div
                    class="preview-card"
                    style=rect_style(&placement.card)
                    on:pointerenter=move |_| {
                        with_session(|session| session.on_card_enter());
                    }
                    on:pointerleave=move |_| {
                        with_session(|session| session.on_card_leave());
                    }
                >
                    <header class="preview-title">{region_title(&region_id)}</header>
                    {body}
                    {edit}
                </div>
            }
        })
    }
}
