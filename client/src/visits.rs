//! Client-side model of which regions the owner has visited.
//!
//! Every toggle is applied optimistically and published before the network
//! call starts. The backend mutation is desired-state and keyed by
//! (owner, region), so a newer toggle for the same region simply aborts the
//! older one and becomes authoritative. A failed mutation restores the
//! region as it stood before the first toggle of that chain, including the
//! pin color.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use visitmap_shared::{
    ToggleAction, ToggleRequest, ToggleResponse, VisitedEntry, palette_color, resolve_pin_color,
};

use crate::api::ApiError;

pub(crate) trait VisitBackend {
    async fn list_visited(&self, owner: &str) -> Result<Vec<VisitedEntry>, ApiError>;
    async fn toggle_visit(
        &self,
        owner: &str,
        request: &ToggleRequest,
    ) -> Result<ToggleResponse, ApiError>;
}

/// Identity of a visit: a placeholder until the server assigns an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitKey {
    Pending(u64),
    Confirmed(i64),
}

impl VisitKey {
    pub fn confirmed(self) -> Option<i64> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::Pending(_) => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl fmt::Display for VisitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(n) => write!(f, "pending-{n}"),
            Self::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitedRegion {
    pub key: VisitKey,
    pub color: String,
}

pub type VisitedMap = BTreeMap<String, VisitedRegion>;

/// Immutable view of the visited set handed to every other component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitSnapshot {
    regions: Arc<VisitedMap>,
}

impl VisitSnapshot {
    pub fn new(regions: VisitedMap) -> Self {
        Self {
            regions: Arc::new(regions),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, region_id: &str) -> Option<&VisitedRegion> {
        self.regions.get(region_id)
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.regions.contains_key(region_id)
    }

    pub fn visit_id(&self, region_id: &str) -> Option<i64> {
        self.get(region_id).and_then(|region| region.key.confirmed())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VisitedRegion)> {
        self.regions.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added { region_id: String, id: i64 },
    Removed { region_id: String },
    /// A newer toggle for the same region (or teardown) took over.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleError {
    pub region_id: String,
    pub attempted: ToggleAction,
    pub cause: ApiError,
}

impl fmt::Display for ToggleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.attempted {
            ToggleAction::Added => "mark",
            ToggleAction::Removed => "unmark",
        };
        write!(f, "Could not {verb} {}: {}", self.region_id, self.cause)
    }
}

impl std::error::Error for ToggleError {}

struct InFlight {
    generation: u64,
    abort: AbortHandle,
    /// Region state before the first toggle of the current chain.
    base: Option<VisitedRegion>,
}

#[derive(Default)]
struct ControllerState {
    regions: VisitedMap,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
    next_placeholder: u64,
}

pub struct VisitController<B> {
    backend: Rc<B>,
    state: RefCell<ControllerState>,
    pick_color: Box<dyn Fn() -> usize>,
    publish: Box<dyn Fn(VisitSnapshot)>,
}

impl<B: VisitBackend> VisitController<B> {
    /// `pick_color` returns any index; it is wrapped into the pin palette.
    pub fn new(
        backend: Rc<B>,
        pick_color: impl Fn() -> usize + 'static,
        publish: impl Fn(VisitSnapshot) + 'static,
    ) -> Self {
        Self {
            backend,
            state: RefCell::new(ControllerState::default()),
            pick_color: Box::new(pick_color),
            publish: Box::new(publish),
        }
    }

    pub fn snapshot(&self) -> VisitSnapshot {
        VisitSnapshot::new(self.state.borrow().regions.clone())
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        (self.publish)(snapshot);
    }

    /// Replace the visited set with the server's view and return region → visit id.
    /// Regions with a toggle in flight keep their optimistic state.
    pub async fn load_visited(&self, owner: &str) -> Result<BTreeMap<String, i64>, ApiError> {
        let entries = self.backend.list_visited(owner).await?;

        let ids = {
            let mut state = self.state.borrow_mut();
            let mut regions: VisitedMap = entries
                .into_iter()
                .filter(|entry| !state.in_flight.contains_key(&entry.region_id))
                .map(|entry| {
                    let color = resolve_pin_color(&entry.region_id, entry.color.as_deref());
                    (
                        entry.region_id,
                        VisitedRegion {
                            key: VisitKey::Confirmed(entry.id),
                            color,
                        },
                    )
                })
                .collect();
            for region_id in state.in_flight.keys() {
                if let Some(optimistic) = state.regions.get(region_id) {
                    regions.insert(region_id.clone(), optimistic.clone());
                }
            }
            state.regions = regions;
            state
                .regions
                .iter()
                .filter_map(|(region_id, region)| {
                    region.key.confirmed().map(|id| (region_id.clone(), id))
                })
                .collect()
        };

        self.publish_snapshot();
        Ok(ids)
    }

    /// Flip a region's visited state.
    ///
    /// The optimistic change is published before this future first yields.
    pub async fn toggle(&self, owner: &str, region_id: &str) -> Result<ToggleOutcome, ToggleError> {
        let (request, placeholder, generation, registration) = {
            let mut state = self.state.borrow_mut();
            let prior = state.regions.get(region_id).cloned();
            let base = match state.in_flight.get(region_id) {
                Some(flight) => flight.base.clone(),
                None => prior.clone(),
            };

            let (request, placeholder) = if prior.is_some() {
                state.regions.remove(region_id);
                (
                    ToggleRequest {
                        region_id: region_id.to_owned(),
                        visited: false,
                        color: None,
                    },
                    None,
                )
            } else {
                let color = palette_color((self.pick_color)()).to_owned();
                state.next_placeholder += 1;
                let key = VisitKey::Pending(state.next_placeholder);
                state.regions.insert(
                    region_id.to_owned(),
                    VisitedRegion {
                        key,
                        color: color.clone(),
                    },
                );
                (
                    ToggleRequest {
                        region_id: region_id.to_owned(),
                        visited: true,
                        color: Some(color),
                    },
                    Some(key),
                )
            };

            state.next_generation += 1;
            let generation = state.next_generation;
            let (abort, registration) = AbortHandle::new_pair();
            let flight = InFlight {
                generation,
                abort,
                base,
            };
            if let Some(previous) = state.in_flight.insert(region_id.to_owned(), flight) {
                previous.abort.abort();
            }
            (request, placeholder, generation, registration)
        };
        self.publish_snapshot();

        let result = Abortable::new(self.backend.toggle_visit(owner, &request), registration).await;

        let base = {
            let mut state = self.state.borrow_mut();
            let is_current = state
                .in_flight
                .get(region_id)
                .is_some_and(|flight| flight.generation == generation);
            if !is_current {
                return Ok(ToggleOutcome::Superseded);
            }
            state.in_flight.remove(region_id).and_then(|flight| flight.base)
        };

        let attempted = if request.visited {
            ToggleAction::Added
        } else {
            ToggleAction::Removed
        };
        let response = match result {
            Err(_aborted) => return Ok(ToggleOutcome::Superseded),
            Ok(Ok(response)) => match (attempted, response.id) {
                (ToggleAction::Added, None) => Err(ApiError::Decode("toggle response has no visit id".into())),
                _ => Ok(response),
            },
            Ok(Err(cause)) => Err(cause),
        };

        match response {
            Ok(response) => {
                let outcome = match (attempted, response.id) {
                    (ToggleAction::Added, Some(id)) => {
                        let mut state = self.state.borrow_mut();
                        if let Some(region) = state.regions.get_mut(region_id)
                            && Some(region.key) == placeholder
                        {
                            region.key = VisitKey::Confirmed(id);
                        }
                        ToggleOutcome::Added {
                            region_id: region_id.to_owned(),
                            id,
                        }
                    }
                    _ => ToggleOutcome::Removed {
                        region_id: region_id.to_owned(),
                    },
                };
                if matches!(outcome, ToggleOutcome::Added { .. }) {
                    self.publish_snapshot();
                }
                Ok(outcome)
            }
            Err(cause) => {
                {
                    let mut state = self.state.borrow_mut();
                    match base {
                        Some(confirmed) => {
                            state.regions.insert(region_id.to_owned(), confirmed);
                        }
                        None => {
                            state.regions.remove(region_id);
                        }
                    }
                }
                self.publish_snapshot();
                Err(ToggleError {
                    region_id: region_id.to_owned(),
                    attempted,
                    cause,
                })
            }
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    /// Abort every outstanding mutation. Aborted toggles resolve as
    /// `Superseded` and write nothing.
    pub fn abort_all(&self) {
        let mut state = self.state.borrow_mut();
        for (_, flight) in state.in_flight.drain() {
            flight.abort.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::{HashSet, VecDeque};

    use futures::channel::oneshot;
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;

    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        rows: RefCell<BTreeMap<String, (i64, Option<String>)>>,
        next_id: Cell<i64>,
        failing: RefCell<HashSet<String>>,
        gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
        calls: Cell<usize>,
    }

    impl FakeBackend {
        fn fail(&self, region: &str) {
            self.failing.borrow_mut().insert(region.to_owned());
        }

        fn gate_next(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.borrow_mut().push_back(rx);
            tx
        }

        fn seed(&self, region: &str, id: i64, color: Option<&str>) {
            self.rows
                .borrow_mut()
                .insert(region.to_owned(), (id, color.map(str::to_owned)));
        }
    }

    impl VisitBackend for FakeBackend {
        async fn list_visited(&self, _owner: &str) -> Result<Vec<VisitedEntry>, ApiError> {
            Ok(self
                .rows
                .borrow()
                .iter()
                .map(|(region, (id, color))| VisitedEntry {
                    id: *id,
                    region_id: region.clone(),
                    color: color.clone(),
                })
                .collect())
        }

        async fn toggle_visit(
            &self,
            _owner: &str,
            request: &ToggleRequest,
        ) -> Result<ToggleResponse, ApiError> {
            self.calls.set(self.calls.get() + 1);
            let gate = self.gates.borrow_mut().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.failing.borrow().contains(&request.region_id) {
                return Err(ApiError::Http(500));
            }
            let mut rows = self.rows.borrow_mut();
            if request.visited {
                let id = match rows.get(&request.region_id) {
                    Some((id, _)) => *id,
                    None => {
                        self.next_id.set(self.next_id.get() + 1);
                        let id = 100 + self.next_id.get();
                        rows.insert(request.region_id.clone(), (id, request.color.clone()));
                        id
                    }
                };
                Ok(ToggleResponse {
                    action: ToggleAction::Added,
                    id: Some(id),
                })
            } else {
                let id = rows.remove(&request.region_id).map(|(id, _)| id);
                Ok(ToggleResponse {
                    action: ToggleAction::Removed,
                    id,
                })
            }
        }
    }

    type Published = Rc<RefCell<Vec<VisitSnapshot>>>;

    fn controller(backend: Rc<FakeBackend>) -> (Rc<VisitController<FakeBackend>>, Published) {
        let published: Published = Rc::default();
        let sink = published.clone();
        let next_color = Cell::new(0usize);
        let controller = VisitController::new(
            backend,
            move || {
                let index = next_color.get();
                next_color.set(index + 1);
                index
            },
            move |snapshot| sink.borrow_mut().push(snapshot),
        );
        (Rc::new(controller), published)
    }

    #[test]
    fn toggle_on_then_off_round_trips() {
        let backend = Rc::new(FakeBackend::default());
        let (controller, published) = controller(backend.clone());

        let added = block_on(controller.toggle("ana", "province-1")).unwrap();
        let ToggleOutcome::Added { id, .. } = added else {
            panic!("expected add, got {added:?}");
        };
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.visit_id("province-1"), Some(id));

        // optimistic publish happened first, with a placeholder
        let first = published.borrow()[0].clone();
        assert!(first.get("province-1").unwrap().key.is_pending());

        let removed = block_on(controller.toggle("ana", "province-1")).unwrap();
        assert_eq!(
            removed,
            ToggleOutcome::Removed {
                region_id: "province-1".into()
            }
        );
        assert!(controller.snapshot().is_empty());
        assert!(backend.rows.borrow().is_empty());
    }

    #[test]
    fn confirmation_keeps_the_chosen_color() {
        let backend = Rc::new(FakeBackend::default());
        let (controller, published) = controller(backend);

        block_on(controller.toggle("ana", "province-5")).unwrap();
        let published = published.borrow();
        let optimistic = published[0].get("province-5").unwrap().color.clone();
        let confirmed = published[1].get("province-5").unwrap().color.clone();
        assert_eq!(optimistic, confirmed);
        assert_eq!(optimistic, palette_color(0));
    }

    #[test]
    fn failed_add_rolls_back_to_empty() {
        let backend = Rc::new(FakeBackend::default());
        backend.fail("province-2");
        let (controller, published) = controller(backend);

        let err = block_on(controller.toggle("ana", "province-2")).unwrap_err();
        assert_eq!(err.region_id, "province-2");
        assert_eq!(err.attempted, ToggleAction::Added);
        assert_eq!(err.cause, ApiError::Http(500));
        assert_eq!(err.to_string(), "Could not mark province-2: server returned HTTP 500");

        let counts: Vec<usize> = published.borrow().iter().map(VisitSnapshot::len).collect();
        assert_eq!(counts, vec![1, 0]);
        assert!(controller.snapshot().is_empty());
    }

    #[test]
    fn failed_remove_restores_exact_entry() {
        let backend = Rc::new(FakeBackend::default());
        backend.seed("province-4", 44, Some("#8e5572"));
        let (controller, _published) = controller(backend.clone());
        block_on(controller.load_visited("ana")).unwrap();
        let before = controller.snapshot();

        backend.fail("province-4");
        let err = block_on(controller.toggle("ana", "province-4")).unwrap_err();
        assert_eq!(err.attempted, ToggleAction::Removed);
        assert_eq!(controller.snapshot(), before);
        assert_eq!(
            controller.snapshot().get("province-4"),
            Some(&VisitedRegion {
                key: VisitKey::Confirmed(44),
                color: "#8e5572".into(),
            })
        );
    }

    #[test]
    fn optimistic_state_is_visible_while_request_is_pending() {
        let backend = Rc::new(FakeBackend::default());
        let release = backend.gate_next();
        let (controller, _published) = controller(backend);
        let mut pool = LocalPool::new();
        let outcome: Rc<RefCell<Option<Result<ToggleOutcome, ToggleError>>>> = Rc::default();

        let task_controller = controller.clone();
        let task_outcome = outcome.clone();
        pool.spawner()
            .spawn_local(async move {
                let result = task_controller.toggle("ana", "province-1").await;
                *task_outcome.borrow_mut() = Some(result);
            })
            .unwrap();
        pool.run_until_stalled();

        assert!(outcome.borrow().is_none());
        let pending = controller.snapshot();
        assert_eq!(pending.len(), 1);
        assert!(pending.get("province-1").unwrap().key.is_pending());
        assert_eq!(pending.visit_id("province-1"), None);

        release.send(()).unwrap();
        pool.run_until_stalled();
        assert!(matches!(
            outcome.borrow().as_ref(),
            Some(Ok(ToggleOutcome::Added { .. }))
        ));
        assert!(controller.snapshot().visit_id("province-1").is_some());
    }

    #[test]
    fn newer_toggle_supersedes_in_flight_one() {
        let backend = Rc::new(FakeBackend::default());
        let _held = backend.gate_next();
        let (controller, _published) = controller(backend.clone());
        let mut pool = LocalPool::new();
        let outcomes: Rc<RefCell<Vec<(usize, Result<ToggleOutcome, ToggleError>)>>> = Rc::default();

        for n in 0..2 {
            let task_controller = controller.clone();
            let task_outcomes = outcomes.clone();
            pool.spawner()
                .spawn_local(async move {
                    let result = task_controller.toggle("ana", "province-7").await;
                    task_outcomes.borrow_mut().push((n, result));
                })
                .unwrap();
            pool.run_until_stalled();
        }

        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.contains(&(0, Ok(ToggleOutcome::Superseded))));
        assert!(outcomes.contains(&(
            1,
            Ok(ToggleOutcome::Removed {
                region_id: "province-7".into()
            })
        )));
        assert!(controller.snapshot().is_empty());
        assert!(backend.rows.borrow().is_empty());
        assert_eq!(backend.calls.get(), 2);
        assert_eq!(controller.in_flight_count(), 0);
    }

    type Outcomes = Rc<RefCell<Vec<Result<ToggleOutcome, ToggleError>>>>;

    fn spawn_toggle(
        pool: &mut LocalPool,
        controller: &Rc<VisitController<FakeBackend>>,
        region: &'static str,
        outcomes: &Outcomes,
    ) {
        let controller = controller.clone();
        let outcomes = outcomes.clone();
        pool.spawner()
            .spawn_local(async move {
                let result = controller.toggle("ana", region).await;
                outcomes.borrow_mut().push(result);
            })
            .unwrap();
        pool.run_until_stalled();
    }

    #[test]
    fn failed_remove_of_unconfirmed_add_leaves_region_unvisited() {
        let backend = Rc::new(FakeBackend::default());
        let _held = backend.gate_next();
        let (controller, published) = controller(backend.clone());
        let mut pool = LocalPool::new();
        let outcomes: Outcomes = Rc::default();

        spawn_toggle(&mut pool, &controller, "province-2", &outcomes);
        assert!(controller.snapshot().get("province-2").unwrap().key.is_pending());

        backend.fail("province-2");
        spawn_toggle(&mut pool, &controller, "province-2", &outcomes);

        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.contains(&Ok(ToggleOutcome::Superseded)));
        assert!(outcomes.iter().any(
            |outcome| matches!(outcome, Err(e) if e.attempted == ToggleAction::Removed)
        ));
        assert!(controller.snapshot().is_empty());
        assert_eq!(controller.in_flight_count(), 0);
        assert!(backend.rows.borrow().is_empty());
        assert_eq!(published.borrow().last().map(VisitSnapshot::len), Some(0));
    }

    #[test]
    fn failed_readd_after_unconfirmed_remove_restores_confirmed_visit() {
        let backend = Rc::new(FakeBackend::default());
        backend.seed("province-6", 66, Some("#8e5572"));
        let (controller, _published) = controller(backend.clone());
        block_on(controller.load_visited("ana")).unwrap();
        let before = controller.snapshot();

        let _held = backend.gate_next();
        let mut pool = LocalPool::new();
        let outcomes: Outcomes = Rc::default();
        spawn_toggle(&mut pool, &controller, "province-6", &outcomes);
        assert!(!controller.snapshot().contains("province-6"));

        backend.fail("province-6");
        spawn_toggle(&mut pool, &controller, "province-6", &outcomes);

        let outcomes = outcomes.borrow();
        assert!(outcomes.contains(&Ok(ToggleOutcome::Superseded)));
        assert!(outcomes.iter().any(
            |outcome| matches!(outcome, Err(e) if e.attempted == ToggleAction::Added)
        ));
        assert_eq!(controller.snapshot(), before);
        assert_eq!(controller.snapshot().visit_id("province-6"), Some(66));
        assert!(backend.rows.borrow().contains_key("province-6"));
    }

    #[test]
    fn abort_all_leaves_no_post_teardown_writes() {
        let backend = Rc::new(FakeBackend::default());
        let _held = backend.gate_next();
        let (controller, published) = controller(backend);
        let mut pool = LocalPool::new();
        let outcome: Rc<RefCell<Option<Result<ToggleOutcome, ToggleError>>>> = Rc::default();

        let task_controller = controller.clone();
        let task_outcome = outcome.clone();
        pool.spawner()
            .spawn_local(async move {
                let result = task_controller.toggle("ana", "province-3").await;
                *task_outcome.borrow_mut() = Some(result);
            })
            .unwrap();
        pool.run_until_stalled();
        let publishes_before = published.borrow().len();

        controller.abort_all();
        pool.run_until_stalled();

        assert_eq!(*outcome.borrow(), Some(Ok(ToggleOutcome::Superseded)));
        assert_eq!(published.borrow().len(), publishes_before);
    }

    #[test]
    fn load_resolves_stored_and_missing_colors() {
        let backend = Rc::new(FakeBackend::default());
        backend.seed("province-1", 1, Some("#f3a712"));
        backend.seed("province-9", 9, None);
        let (controller, published) = controller(backend);

        let ids = block_on(controller.load_visited("ana")).unwrap();
        assert_eq!(ids.get("province-1"), Some(&1));
        assert_eq!(ids.get("province-9"), Some(&9));

        let snapshot = published.borrow().last().cloned().unwrap();
        assert_eq!(snapshot.get("province-1").unwrap().color, "#f3a712");
        assert_eq!(
            snapshot.get("province-9").unwrap().color,
            visitmap_shared::fallback_pin_color("province-9")
        );
    }
}
