//! Region shapes of the vector map: which ones are live, how they are
//! filled, and how pointer input on them is filtered.

use std::collections::{BTreeSet, HashMap};

use visitmap_shared::{NEUTRAL_FILL, is_region_id};

use crate::visits::VisitSnapshot;

pub const CLICK_GUARD_MS: f64 = 300.0;
pub const MAP_ASSET_URL: &str = "/assets/regions.svg";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Loading,
    Ready {
        regions: usize,
    },
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    /// Pointer is on the shape.
    Hover,
    /// Pointer left but the preview card is still up.
    Lingering,
}

impl Highlight {
    pub fn brightness(self) -> f64 {
        match self {
            Self::Hover => 1.15,
            Self::Lingering => 1.06,
        }
    }
}

#[derive(Debug, Default)]
pub struct MapSurface {
    load: LoadState,
    regions: BTreeSet<String>,
    applied_fills: HashMap<String, String>,
    last_click_ms: HashMap<String, f64>,
    highlights: HashMap<String, Highlight>,
}

impl MapSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.regions.clear();
        self.applied_fills.clear();
        self.load = LoadState::Failed(reason.into());
    }

    /// Register the shapes found in the loaded document. Ids that are not
    /// region ids are ignored; the accepted ids are returned in order.
    pub fn bind<'a>(&mut self, shape_ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        self.regions = shape_ids
            .into_iter()
            .filter(|id| is_region_id(id))
            .map(str::to_owned)
            .collect();
        self.applied_fills.clear();
        self.load = LoadState::Ready {
            regions: self.regions.len(),
        };
        self.regions.iter().cloned().collect()
    }

    pub fn is_bound(&self, region_id: &str) -> bool {
        self.regions.contains(region_id)
    }

    #[cfg(test)]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Fills that differ from what was last applied.
    pub fn fill_changes(&mut self, visited: &VisitSnapshot) -> Vec<(String, String)> {
        let mut changes = Vec::new();
        for region_id in &self.regions {
            let fill = visited
                .get(region_id)
                .map_or(NEUTRAL_FILL, |region| region.color.as_str());
            if self.applied_fills.get(region_id).map(String::as_str) != Some(fill) {
                self.applied_fills.insert(region_id.clone(), fill.to_owned());
                changes.push((region_id.clone(), fill.to_owned()));
            }
        }
        changes
    }

    /// True if a click on this shape should toggle it. Repeats within the
    /// guard window are swallowed.
    pub fn accept_click(&mut self, region_id: &str, now_ms: f64) -> bool {
        if !self.is_bound(region_id) {
            return false;
        }
        match self.last_click_ms.get(region_id) {
            Some(last) if now_ms - last < CLICK_GUARD_MS => false,
            _ => {
                self.last_click_ms.insert(region_id.to_owned(), now_ms);
                true
            }
        }
    }

    pub fn pointer_enter(&mut self, region_id: &str) -> Option<Highlight> {
        if !self.is_bound(region_id) {
            return None;
        }
        self.highlights.insert(region_id.to_owned(), Highlight::Hover);
        Some(Highlight::Hover)
    }

    pub fn pointer_leave(&mut self, region_id: &str) -> Option<Highlight> {
        let highlight = self.highlights.get_mut(region_id)?;
        *highlight = Highlight::Lingering;
        Some(Highlight::Lingering)
    }

    #[cfg(test)]
    pub fn highlight(&self, region_id: &str) -> Option<Highlight> {
        self.highlights.get(region_id).copied()
    }

    /// Clear one region's highlight, or all of them. Returns the regions to restore.
    pub fn reset_highlight(&mut self, region_id: Option<&str>) -> Vec<String> {
        match region_id {
            Some(region_id) => self
                .highlights
                .remove(region_id)
                .map(|_| vec![region_id.to_owned()])
                .unwrap_or_default(),
            None => self.highlights.drain().map(|(region_id, _)| region_id).collect(),
        }
    }

    pub fn teardown(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visits::{VisitKey, VisitedMap, VisitedRegion};

    fn bound() -> MapSurface {
        let mut surface = MapSurface::new();
        surface.bind(["province-1", "province-2", "coastline", "province-x", "label-3"]);
        surface
    }

    #[test]
    fn only_region_shapes_are_bound() {
        let mut surface = MapSurface::new();
        assert_eq!(surface.load_state(), &LoadState::Loading);
        let ids = surface.bind(["province-2", "sea", "province-10", "province-", "province-1"]);
        assert_eq!(ids, vec!["province-1", "province-10", "province-2"]);
        assert_eq!(surface.load_state(), &LoadState::Ready { regions: 3 });
    }

    #[test]
    fn fills_mirror_visited_state_and_only_report_changes() {
        let mut surface = bound();
        let empty = VisitSnapshot::default();
        let initial = surface.fill_changes(&empty);
        assert_eq!(initial.len(), 2);
        assert!(initial.iter().all(|(_, fill)| fill == NEUTRAL_FILL));
        assert!(surface.fill_changes(&empty).is_empty());

        let mut regions = VisitedMap::new();
        regions.insert(
            "province-2".into(),
            VisitedRegion {
                key: VisitKey::Pending(1),
                color: "#2a9d8f".into(),
            },
        );
        let changes = surface.fill_changes(&VisitSnapshot::new(regions));
        assert_eq!(changes, vec![("province-2".to_owned(), "#2a9d8f".to_owned())]);

        let reverted = surface.fill_changes(&empty);
        assert_eq!(reverted, vec![("province-2".to_owned(), NEUTRAL_FILL.to_owned())]);
    }

    #[test]
    fn rapid_repeat_clicks_are_swallowed_per_shape() {
        let mut surface = bound();
        assert!(surface.accept_click("province-1", 1_000.0));
        assert!(!surface.accept_click("province-1", 1_150.0));
        assert!(surface.accept_click("province-2", 1_150.0));
        assert!(surface.accept_click("province-1", 1_300.0));
        assert!(!surface.accept_click("coastline", 5_000.0));
    }

    #[test]
    fn highlight_lingers_until_reset() {
        let mut surface = bound();
        assert_eq!(surface.pointer_enter("province-1"), Some(Highlight::Hover));
        assert_eq!(surface.pointer_leave("province-1"), Some(Highlight::Lingering));
        assert_eq!(surface.pointer_enter("label-3"), None);

        assert_eq!(surface.reset_highlight(None), vec!["province-1".to_owned()]);
        assert_eq!(surface.highlight("province-1"), None);
        assert_eq!(surface.pointer_leave("province-1"), None);
    }

    #[test]
    fn failure_drops_bindings() {
        let mut surface = bound();
        surface.fail("HTTP 404");
        assert_eq!(surface.load_state(), &LoadState::Failed("HTTP 404".into()));
        assert_eq!(surface.region_count(), 0);
        assert!(!surface.accept_click("province-1", 0.0));
    }
}
