//! Browser bindings for the map: pin elements, per-shape listeners, window
//! listeners and the pin layer observer. Everything here owns its
//! closures and removes them in `close`.

use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Element, HtmlElement, MutationObserver, MutationObserverInit, PointerEvent};

use crate::colors::{pin_css, pin_ring_css};
use crate::hover::{Point, Size};
use crate::pins::PinHost;

pub(crate) const PIN_CLASS: &str = "pin-marker";
pub(crate) const PIN_PENDING_CLASS: &str = "pin-marker pending";

pub(crate) fn viewport_size() -> Size {
    let Some(window) = web_sys::window() else {
        return Size {
            width: 1200.0,
            height: 800.0,
        };
    };
    let width = window
        .inner_width()
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(1200.0);
    let height = window
        .inner_height()
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(800.0);
    Size { width, height }
}

pub(crate) fn now_ms() -> f64 {
    js_sys::Date::now()
}

/// Pins as absolutely positioned elements in a layer over the map.
pub(crate) struct DomPinHost {
    container: HtmlElement,
    layer: HtmlElement,
}

impl DomPinHost {
    pub fn new(container: HtmlElement, layer: HtmlElement) -> Self {
        Self { container, layer }
    }

    fn shape(&self, region_id: &str) -> Option<Element> {
        self.container
            .query_selector(&format!("#{region_id}"))
            .ok()
            .flatten()
    }

    fn paint(marker: &HtmlElement, color: &str, pending: bool) {
        let style = marker.style();
        let _ = style.set_property("background", &pin_css(color, pending));
        let _ = style.set_property("box-shadow", &format!("0 0 0 2px {}", pin_ring_css(color)));
        marker.set_class_name(if pending { PIN_PENDING_CLASS } else { PIN_CLASS });
    }
}

impl PinHost for DomPinHost {
    type Marker = HtmlElement;

    fn anchor(&self, region_id: &str) -> Option<Point> {
        let shape = self.shape(region_id)?;
        let rect = shape.get_bounding_client_rect();
        let frame = self.container.get_bounding_client_rect();
        Some(Point {
            x: rect.left() - frame.left() + rect.width() / 2.0 + self.container.scroll_left() as f64,
            y: rect.top() - frame.top() + rect.height() / 2.0 + self.container.scroll_top() as f64,
        })
    }

    fn create_marker(&self, region_id: &str, color: &str, pending: bool) -> Option<HtmlElement> {
        let document = self.layer.owner_document()?;
        let marker = document
            .create_element("div")
            .ok()?
            .dyn_into::<HtmlElement>()
            .ok()?;
        marker.set_attribute("data-region", region_id).ok()?;
        Self::paint(&marker, color, pending);
        self.layer.append_child(&marker).ok()?;
        Some(marker)
    }

    fn move_marker(&self, marker: &HtmlElement, at: Point) {
        let style = marker.style();
        let _ = style.set_property("left", &format!("{:.1}px", at.x));
        let _ = style.set_property("top", &format!("{:.1}px", at.y));
    }

    fn restyle_marker(&self, marker: &HtmlElement, color: &str, pending: bool) {
        Self::paint(marker, color, pending);
    }

    fn remove_marker(&self, marker: &HtmlElement) {
        marker.remove();
    }

    fn is_attached(&self, marker: &HtmlElement) -> bool {
        let node: &web_sys::Node = marker;
        self.layer.contains(Some(node))
    }
}

/// Callbacks a region shape forwards its pointer input to.
pub(crate) struct ShapeHandlers {
    pub on_enter: Box<dyn Fn(&str, Point)>,
    pub on_leave: Box<dyn Fn(&str)>,
    pub on_click: Box<dyn Fn(&str)>,
}

pub(crate) struct ShapeBinding {
    shape: Element,
    on_enter: Closure<dyn Fn(PointerEvent)>,
    on_leave: Closure<dyn Fn(PointerEvent)>,
    on_click: Closure<dyn Fn(PointerEvent)>,
}

impl ShapeBinding {
    pub fn bind(shape: Element, handlers: Rc<ShapeHandlers>) -> Self {
        let region_id = shape.id();

        let enter_handlers = handlers.clone();
        let enter_region = region_id.clone();
        let on_enter = Closure::<dyn Fn(PointerEvent)>::new(move |e: PointerEvent| {
            let cursor = Point {
                x: e.client_x() as f64,
                y: e.client_y() as f64,
            };
            (enter_handlers.on_enter)(&enter_region, cursor);
        });

        let leave_handlers = handlers.clone();
        let leave_region = region_id.clone();
        let on_leave = Closure::<dyn Fn(PointerEvent)>::new(move |_e: PointerEvent| {
            (leave_handlers.on_leave)(&leave_region);
        });

        let on_click = Closure::<dyn Fn(PointerEvent)>::new(move |_e: PointerEvent| {
            (handlers.on_click)(&region_id);
        });

        let _ = shape.add_event_listener_with_callback("pointerenter", on_enter.as_ref().unchecked_ref());
        let _ = shape.add_event_listener_with_callback("pointerleave", on_leave.as_ref().unchecked_ref());
        let _ = shape.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref());

        Self {
            shape,
            on_enter,
            on_leave,
            on_click,
        }
    }

    pub fn set_fill(&self, fill: &str) {
        let _ = self.shape.set_attribute("fill", fill);
    }

    pub fn set_brightness(&self, brightness: Option<f64>) {
        let Some(shape) = self.shape.dyn_ref::<web_sys::SvgElement>() else {
            return;
        };
        let style = shape.style();
        match brightness {
            Some(level) => {
                let _ = style.set_property("filter", &format!("brightness({level})"));
            }
            None => {
                let _ = style.remove_property("filter");
            }
        }
    }

    pub fn close(self) {
        let _ = self
            .shape
            .remove_event_listener_with_callback("pointerenter", self.on_enter.as_ref().unchecked_ref());
        let _ = self
            .shape
            .remove_event_listener_with_callback("pointerleave", self.on_leave.as_ref().unchecked_ref());
        let _ = self
            .shape
            .remove_event_listener_with_callback("click", self.on_click.as_ref().unchecked_ref());
    }
}

/// Scroll (captured, so nested scrollers count) and resize on the window.
pub(crate) struct WindowBinding {
    window: web_sys::Window,
    handler: Closure<dyn Fn()>,
}

impl WindowBinding {
    pub fn bind(on_change: impl Fn() + 'static) -> Option<Self> {
        let window = web_sys::window()?;
        let handler = Closure::<dyn Fn()>::new(on_change);
        window
            .add_event_listener_with_callback_and_bool("scroll", handler.as_ref().unchecked_ref(), true)
            .ok()?;
        let _ = window.add_event_listener_with_callback("resize", handler.as_ref().unchecked_ref());
        Some(Self { window, handler })
    }

    pub fn close(self) {
        let _ = self.window.remove_event_listener_with_callback_and_bool(
            "scroll",
            self.handler.as_ref().unchecked_ref(),
            true,
        );
        let _ = self
            .window
            .remove_event_listener_with_callback("resize", self.handler.as_ref().unchecked_ref());
    }
}

/// Watches the pin layer's children so externally removed pins can be restored.
pub(crate) struct LayerObserver {
    observer: MutationObserver,
    _callback: Closure<dyn Fn(js_sys::Array, MutationObserver)>,
}

impl LayerObserver {
    pub fn observe(layer: &HtmlElement, on_change: impl Fn() + 'static) -> Option<Self> {
        let callback = Closure::<dyn Fn(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                let removed_any = records.iter().any(|record| {
                    record
                        .dyn_into::<web_sys::MutationRecord>()
                        .is_ok_and(|record| record.removed_nodes().length() > 0)
                });
                if removed_any {
                    on_change();
                }
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).ok()?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        observer.observe_with_options(layer, &init).ok()?;
        Some(Self {
            observer,
            _callback: callback,
        })
    }

    pub fn close(self) {
        self.observer.disconnect();
    }
}
