//! Hover intent: when the preview card opens, stays open, and closes.
//!
//! The engine is a plain state machine. It never starts timers or fetches
//! itself; callers act on what each transition returns and report back
//! with the timer id or request token they were given.

use crate::api::ApiError;
use crate::preview_cache::PreviewData;

pub const HOVER_CLOSE_DELAY_MS: u32 = 400;
pub const CARD_CURSOR_OFFSET: f64 = 16.0;
pub const VIEWPORT_PADDING: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    #[cfg(test)]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSide {
    Right,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardPlacement {
    pub card: Rect,
    /// Hit area between the cursor and the card's near edge.
    pub bridge: Rect,
    pub side: CardSide,
}

/// Place the card beside the cursor, flipping left when it would overflow
/// the right edge, and keep it inside the viewport padding.
pub fn place_card(cursor: Point, card: Size, viewport: Size) -> CardPlacement {
    let right_of_cursor = cursor.x + CARD_CURSOR_OFFSET;
    let (side, left) = if right_of_cursor + card.width + VIEWPORT_PADDING <= viewport.width {
        (CardSide::Right, right_of_cursor)
    } else {
        let left_of_cursor = cursor.x - CARD_CURSOR_OFFSET - card.width;
        (CardSide::Left, left_of_cursor.max(VIEWPORT_PADDING))
    };

    let max_top = (viewport.height - VIEWPORT_PADDING - card.height).max(VIEWPORT_PADDING);
    let top = (cursor.y - card.height / 2.0).clamp(VIEWPORT_PADDING, max_top);
    let card = Rect {
        left,
        top,
        width: card.width,
        height: card.height,
    };

    let (bridge_left, bridge_right) = match side {
        CardSide::Right => (cursor.x, card.left),
        CardSide::Left => (card.right(), cursor.x),
    };
    let bridge_top = cursor.y.min(card.top);
    let bridge_bottom = cursor.y.max(card.bottom());
    let bridge = Rect {
        left: bridge_left.min(bridge_right),
        top: bridge_top,
        width: (bridge_right - bridge_left).max(0.0),
        height: bridge_bottom - bridge_top,
    };

    CardPlacement { card, bridge, side }
}

/// Card lifecycle. The two armed phases are the ones with a close timer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoverPhase {
    #[default]
    Idle,
    /// Pointer left the card's region; closes when the timer fires.
    ArmedOnRegion,
    /// Card is up and the pointer is on its region, the bridge or the card.
    PreviewVisible,
    /// Pointer left the bridge or the card; closes when the timer fires.
    ArmedOnBridgeOrCard,
}

impl HoverPhase {
    fn is_armed(self) -> bool {
        matches!(self, Self::ArmedOnRegion | Self::ArmedOnBridgeOrCard)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardContent {
    /// The region has no confirmed visit, so there is nothing to fetch.
    Unvisited,
    Loading,
    Ready(PreviewData),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoverCard {
    pub region_id: String,
    pub visit_id: Option<i64>,
    pub placement: CardPlacement,
    pub content: CardContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewRequest {
    pub token: u64,
    pub visit_id: i64,
}

/// What the caller must do after a region enter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnterEffects {
    pub cancel_close_timer: bool,
    /// Visit whose outstanding fetch is no longer wanted.
    pub abandon_visit: Option<i64>,
    /// Region whose highlight should be fully reset.
    pub reset_region: Option<String>,
    pub fetch: Option<PreviewRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closed {
    pub visit_id: Option<i64>,
}

#[derive(Debug, Default)]
pub struct HoverEngine {
    phase: HoverPhase,
    card: Option<HoverCard>,
    token: u64,
    next_timer: u64,
    close_timer: Option<u64>,
}

impl HoverEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn phase(&self) -> HoverPhase {
        self.phase
    }

    pub fn card(&self) -> Option<&HoverCard> {
        self.card.as_ref()
    }

    #[cfg(test)]
    pub fn token(&self) -> u64 {
        self.token
    }

    fn arm_close_timer(&mut self) -> u64 {
        self.next_timer += 1;
        self.close_timer = Some(self.next_timer);
        self.next_timer
    }

    /// Pointer entered a region shape.
    ///
    /// Re-entering the region whose card is already up only cancels the
    /// close timer; the card is neither hidden nor refetched.
    pub fn enter_region(
        &mut self,
        region_id: &str,
        visit_id: Option<i64>,
        placement: CardPlacement,
        cached: Option<PreviewData>,
    ) -> EnterEffects {
        let mut effects = EnterEffects {
            cancel_close_timer: self.close_timer.take().is_some(),
            ..EnterEffects::default()
        };

        if let Some(card) = &self.card
            && card.region_id == region_id
            && card.visit_id == visit_id
        {
            self.phase = HoverPhase::PreviewVisible;
            return effects;
        }

        if let Some(previous) = self.card.take() {
            if previous.visit_id != visit_id {
                effects.abandon_visit = previous.visit_id;
            }
            if previous.region_id != region_id {
                effects.reset_region = Some(previous.region_id);
            }
        }

        self.token += 1;
        let content = match (visit_id, cached) {
            (None, _) => CardContent::Unvisited,
            (Some(_), Some(photos)) => CardContent::Ready(photos),
            (Some(visit_id), None) => {
                effects.fetch = Some(PreviewRequest {
                    token: self.token,
                    visit_id,
                });
                CardContent::Loading
            }
        };
        self.card = Some(HoverCard {
            region_id: region_id.to_owned(),
            visit_id,
            placement,
            content,
        });
        self.phase = HoverPhase::PreviewVisible;
        effects
    }

    /// Pointer left the region. Returns the close timer to start.
    pub fn leave_region(&mut self, region_id: &str) -> Option<u64> {
        let owns_card = self.card.as_ref().is_some_and(|card| card.region_id == region_id);
        if self.phase != HoverPhase::PreviewVisible || !owns_card {
            return None;
        }
        self.phase = HoverPhase::ArmedOnRegion;
        Some(self.arm_close_timer())
    }

    /// Pointer reached the bridge or the card. Returns true if a close timer
    /// was cancelled.
    pub fn enter_bridge_or_card(&mut self) -> bool {
        if !self.phase.is_armed() {
            return false;
        }
        self.phase = HoverPhase::PreviewVisible;
        self.close_timer.take().is_some()
    }

    pub fn leave_bridge_or_card(&mut self) -> Option<u64> {
        if self.phase != HoverPhase::PreviewVisible || self.card.is_none() {
            return None;
        }
        self.phase = HoverPhase::ArmedOnBridgeOrCard;
        Some(self.arm_close_timer())
    }

    /// A close timer elapsed. Only the most recently armed timer closes the card.
    pub fn close_timer_fired(&mut self, timer: u64) -> Option<Closed> {
        if self.close_timer != Some(timer) || !self.phase.is_armed() {
            return None;
        }
        self.close_timer = None;
        self.close()
    }

    fn close(&mut self) -> Option<Closed> {
        self.phase = HoverPhase::Idle;
        self.token += 1;
        self.card.take().map(|card| Closed {
            visit_id: card.visit_id,
        })
    }

    /// Apply a preview fetch result. Results for a token that is no longer
    /// current are dropped and `false` is returned.
    pub fn resolve_preview(&mut self, token: u64, result: Result<PreviewData, ApiError>) -> bool {
        if token != self.token {
            return false;
        }
        let Some(card) = self.card.as_mut() else {
            return false;
        };
        card.content = match result {
            Ok(photos) => CardContent::Ready(photos),
            Err(ApiError::Aborted) => return false,
            Err(error) => CardContent::Failed(error.to_string()),
        };
        true
    }

    /// Retry a failed preview load for the card that is up.
    pub fn retry(&mut self) -> Option<PreviewRequest> {
        let card = self.card.as_mut()?;
        let visit_id = card.visit_id?;
        if !matches!(card.content, CardContent::Failed(_)) {
            return None;
        }
        card.content = CardContent::Loading;
        self.token += 1;
        Some(PreviewRequest {
            token: self.token,
            visit_id,
        })
    }

    /// The region under the card gained or lost its visit id.
    pub fn refresh_visit(
        &mut self,
        region_id: &str,
        visit_id: Option<i64>,
        cached: Option<PreviewData>,
    ) -> Option<PreviewRequest> {
        let card = self.card.as_mut()?;
        if card.region_id != region_id || card.visit_id == visit_id {
            return None;
        }
        self.token += 1;
        card.visit_id = visit_id;
        let (content, fetch) = match (visit_id, cached) {
            (None, _) => (CardContent::Unvisited, None),
            (Some(_), Some(photos)) => (CardContent::Ready(photos), None),
            (Some(visit_id), None) => (
                CardContent::Loading,
                Some(PreviewRequest {
                    token: self.token,
                    visit_id,
                }),
            ),
        };
        card.content = content;
        fetch
    }

    /// Drop the card immediately (teardown, region removed from the map).
    pub fn reset(&mut self) -> Option<Closed> {
        self.close_timer = None;
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use visitmap_shared::PreviewPhoto;

    use super::*;

    const VIEWPORT: Size = Size {
        width: 1000.0,
        height: 700.0,
    };
    const CARD: Size = Size {
        width: 240.0,
        height: 180.0,
    };

    fn at(x: f64, y: f64) -> CardPlacement {
        place_card(Point { x, y }, CARD, VIEWPORT)
    }

    fn album(count: usize) -> PreviewData {
        Arc::new(
            (0..count)
                .map(|n| PreviewPhoto {
                    id: n as i64,
                    visit_record_id: 3,
                    image_url: format!("/p/{n}.jpg"),
                    title: None,
                    note: None,
                    order: n as u32 + 1,
                })
                .collect(),
        )
    }

    #[test]
    fn card_opens_to_the_right_with_bridge() {
        let placement = at(100.0, 300.0);
        assert_eq!(placement.side, CardSide::Right);
        assert_eq!(placement.card.left, 116.0);
        assert_eq!(placement.card.top, 210.0);
        assert_eq!(placement.bridge.left, 100.0);
        assert_eq!(placement.bridge.width, 16.0);
        assert!(placement.bridge.contains(Point { x: 108.0, y: 300.0 }));
    }

    #[test]
    fn card_flips_left_near_right_edge() {
        let placement = at(900.0, 300.0);
        assert_eq!(placement.side, CardSide::Left);
        assert_eq!(placement.card.right(), 884.0);
        assert_eq!(placement.bridge.left, 884.0);
        assert_eq!(placement.bridge.right(), 900.0);
    }

    #[test]
    fn card_clamps_vertically() {
        assert_eq!(at(100.0, 5.0).card.top, VIEWPORT_PADDING);
        let bottom = at(100.0, 695.0);
        assert_eq!(bottom.card.bottom(), VIEWPORT.height - VIEWPORT_PADDING);
        // the bridge still reaches down to the cursor
        assert_eq!(bottom.bridge.bottom(), 695.0);
    }

    #[test]
    fn narrow_viewport_keeps_card_on_screen() {
        let placement = place_card(
            Point { x: 120.0, y: 50.0 },
            CARD,
            Size {
                width: 300.0,
                height: 120.0,
            },
        );
        assert_eq!(placement.card.left, VIEWPORT_PADDING);
        assert_eq!(placement.card.top, VIEWPORT_PADDING);
    }

    #[test]
    fn enter_leave_and_timer_close_the_card() {
        let mut engine = HoverEngine::new();
        let effects = engine.enter_region("province-3", Some(3), at(10.0, 10.0), None);
        assert_eq!(
            effects.fetch,
            Some(PreviewRequest {
                token: 1,
                visit_id: 3
            })
        );
        assert_eq!(engine.phase(), HoverPhase::PreviewVisible);

        let timer = engine.leave_region("province-3").unwrap();
        assert_eq!(engine.phase(), HoverPhase::ArmedOnRegion);

        let closed = engine.close_timer_fired(timer).unwrap();
        assert_eq!(closed.visit_id, Some(3));
        assert_eq!(engine.phase(), HoverPhase::Idle);
        assert!(engine.card().is_none());
    }

    #[test]
    fn reentry_within_delay_keeps_the_card_up() {
        let mut engine = HoverEngine::new();
        engine.enter_region("province-3", Some(3), at(10.0, 10.0), Some(album(3)));
        let token = engine.token();
        let timer = engine.leave_region("province-3").unwrap();

        let effects = engine.enter_region("province-3", Some(3), at(12.0, 12.0), None);
        assert!(effects.cancel_close_timer);
        assert_eq!(effects.fetch, None);
        assert_eq!(engine.token(), token);
        assert!(matches!(
            engine.card().map(|card| &card.content),
            Some(CardContent::Ready(photos)) if photos.len() == 3
        ));

        // the stale timer firing later is ignored
        assert_eq!(engine.close_timer_fired(timer), None);
        assert_eq!(engine.phase(), HoverPhase::PreviewVisible);
    }

    #[test]
    fn bridge_and_card_hold_the_preview_open() {
        let mut engine = HoverEngine::new();
        engine.enter_region("province-3", Some(3), at(10.0, 10.0), Some(album(1)));
        let timer = engine.leave_region("province-3").unwrap();

        assert!(engine.enter_bridge_or_card());
        assert_eq!(engine.phase(), HoverPhase::PreviewVisible);
        assert_eq!(engine.close_timer_fired(timer), None);

        let second = engine.leave_bridge_or_card().unwrap();
        assert_eq!(engine.phase(), HoverPhase::ArmedOnBridgeOrCard);
        assert_ne!(second, timer);
        assert!(engine.close_timer_fired(second).is_some());
    }

    #[test]
    fn late_response_for_previous_region_is_discarded() {
        let mut engine = HoverEngine::new();
        let first = engine
            .enter_region("province-1", Some(1), at(10.0, 10.0), None)
            .fetch
            .unwrap();
        engine.leave_region("province-1");

        let effects = engine.enter_region("province-2", Some(2), at(40.0, 10.0), None);
        assert_eq!(effects.abandon_visit, Some(1));
        assert_eq!(effects.reset_region.as_deref(), Some("province-1"));
        let second = effects.fetch.unwrap();

        assert!(!engine.resolve_preview(first.token, Ok(album(5))));
        assert_eq!(
            engine.card().map(|card| &card.content),
            Some(&CardContent::Loading)
        );

        assert!(engine.resolve_preview(second.token, Ok(album(2))));
        let card = engine.card().unwrap();
        assert_eq!(card.region_id, "province-2");
        assert!(matches!(&card.content, CardContent::Ready(photos) if photos.len() == 2));
    }

    #[test]
    fn failed_preview_offers_retry() {
        let mut engine = HoverEngine::new();
        let request = engine
            .enter_region("province-4", Some(4), at(10.0, 10.0), None)
            .fetch
            .unwrap();
        assert!(engine.resolve_preview(request.token, Err(ApiError::Http(500))));
        assert!(matches!(
            engine.card().map(|card| &card.content),
            Some(CardContent::Failed(_))
        ));

        let retry = engine.retry().unwrap();
        assert_eq!(retry.visit_id, 4);
        assert!(retry.token > request.token);
        assert_eq!(engine.retry(), None);
    }

    #[test]
    fn unvisited_region_needs_no_fetch() {
        let mut engine = HoverEngine::new();
        let effects = engine.enter_region("province-9", None, at(10.0, 10.0), None);
        assert_eq!(effects.fetch, None);
        assert_eq!(
            engine.card().map(|card| &card.content),
            Some(&CardContent::Unvisited)
        );
    }

    #[test]
    fn confirming_the_hovered_region_loads_its_preview() {
        let mut engine = HoverEngine::new();
        engine.enter_region("province-5", None, at(10.0, 10.0), None);

        let request = engine.refresh_visit("province-5", Some(55), None).unwrap();
        assert_eq!(request.visit_id, 55);
        assert_eq!(request.token, engine.token());
        assert_eq!(engine.refresh_visit("province-5", Some(55), None), None);
        assert_eq!(engine.refresh_visit("province-6", None, None), None);

        assert_eq!(engine.refresh_visit("province-5", None, None), None);
        assert_eq!(
            engine.card().map(|card| &card.content),
            Some(&CardContent::Unvisited)
        );
    }
}
