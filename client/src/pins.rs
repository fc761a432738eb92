//! Pin markers over the vector map: one per visited region.

use std::collections::BTreeMap;

use crate::hover::Point;
use crate::visits::VisitSnapshot;

pub const PIN_THROTTLE_MS: f64 = 100.0;

/// Surface the markers live on. The browser implementation places DOM
/// elements inside the map container; tests use an in-memory host.
pub trait PinHost {
    type Marker;

    /// Anchor of the region's shape relative to the container, if the shape exists.
    fn anchor(&self, region_id: &str) -> Option<Point>;
    fn create_marker(&self, region_id: &str, color: &str, pending: bool) -> Option<Self::Marker>;
    fn move_marker(&self, marker: &Self::Marker, at: Point);
    fn restyle_marker(&self, marker: &Self::Marker, color: &str, pending: bool);
    fn remove_marker(&self, marker: &Self::Marker);
    /// False once something outside the layer removed the marker.
    fn is_attached(&self, marker: &Self::Marker) -> bool;
}

struct PinMarker<M> {
    handle: M,
    color: String,
    pending: bool,
    position: Point,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub restyled: usize,
    /// Visited regions whose shape is not on the map.
    pub unanchored: usize,
}

pub struct PinLayer<H: PinHost> {
    host: H,
    markers: BTreeMap<String, PinMarker<H::Marker>>,
}

impl<H: PinHost> PinLayer<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            markers: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[cfg(test)]
    pub fn position(&self, region_id: &str) -> Option<Point> {
        self.markers.get(region_id).map(|marker| marker.position)
    }

    /// Make the marker set match the visited snapshot.
    pub fn sync(&mut self, visited: &VisitSnapshot) -> SyncReport {
        let mut report = SyncReport::default();

        let stale: Vec<String> = self
            .markers
            .keys()
            .filter(|region_id| !visited.contains(region_id))
            .cloned()
            .collect();
        for region_id in stale {
            if let Some(marker) = self.markers.remove(&region_id) {
                self.host.remove_marker(&marker.handle);
                report.removed += 1;
            }
        }

        for (region_id, region) in visited.iter() {
            let pending = region.key.is_pending();
            if let Some(marker) = self.markers.get_mut(region_id) {
                if marker.color != region.color || marker.pending != pending {
                    self.host.restyle_marker(&marker.handle, &region.color, pending);
                    marker.color.clone_from(&region.color);
                    marker.pending = pending;
                    report.restyled += 1;
                }
                continue;
            }

            let Some(anchor) = self.host.anchor(region_id) else {
                report.unanchored += 1;
                continue;
            };
            let Some(handle) = self.host.create_marker(region_id, &region.color, pending) else {
                continue;
            };
            self.host.move_marker(&handle, anchor);
            self.markers.insert(
                region_id.clone(),
                PinMarker {
                    handle,
                    color: region.color.clone(),
                    pending,
                    position: anchor,
                },
            );
            report.added += 1;
        }

        report
    }

    /// Move every marker to its shape's current anchor. Returns how many moved.
    pub fn update_positions(&mut self) -> usize {
        let mut moved = 0;
        for (region_id, marker) in &mut self.markers {
            let Some(anchor) = self.host.anchor(region_id) else {
                continue;
            };
            if anchor != marker.position {
                self.host.move_marker(&marker.handle, anchor);
                marker.position = anchor;
                moved += 1;
            }
        }
        moved
    }

    /// Recreate markers removed by something other than this layer.
    /// Returns how many were recreated.
    pub fn heal(&mut self, visited: &VisitSnapshot) -> usize {
        let detached: Vec<String> = self
            .markers
            .iter()
            .filter(|(_, marker)| !self.host.is_attached(&marker.handle))
            .map(|(region_id, _)| region_id.clone())
            .collect();
        if detached.is_empty() {
            return 0;
        }
        for region_id in &detached {
            self.markers.remove(region_id);
        }
        self.sync(visited).added
    }

    pub fn clear(&mut self) {
        for (_, marker) in std::mem::take(&mut self.markers) {
            self.host.remove_marker(&marker.handle);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    RunNow,
    /// Schedule one trailing run after this many milliseconds.
    Schedule(u32),
    /// A trailing run is already scheduled.
    Coalesced,
}

/// Leading + trailing throttle: at most one run per interval, and the last
/// request inside an interval is never lost.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: f64,
    last_run_ms: Option<f64>,
    trailing: bool,
}

impl Throttle {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last_run_ms: None,
            trailing: false,
        }
    }

    pub fn request(&mut self, now_ms: f64) -> ThrottleDecision {
        if self.trailing {
            return ThrottleDecision::Coalesced;
        }
        match self.last_run_ms {
            Some(last) if now_ms - last < self.interval_ms => {
                self.trailing = true;
                ThrottleDecision::Schedule((last + self.interval_ms - now_ms).ceil() as u32)
            }
            _ => {
                self.last_run_ms = Some(now_ms);
                ThrottleDecision::RunNow
            }
        }
    }

    pub fn trailing_fired(&mut self, now_ms: f64) {
        self.trailing = false;
        self.last_run_ms = Some(now_ms);
    }

    pub fn reset(&mut self) {
        self.last_run_ms = None;
        self.trailing = false;
    }
}
