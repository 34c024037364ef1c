use super::Entity;
use crate::mqtt::Transport;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Lifecycle registry: runs `init` on every live entity each time the
/// transport connects.
///
/// Holds weak references only. Entities dropped by their owner are pruned on
/// the next pass.
pub struct EntityRegistry {
    /// Entities in attach order
    entities: Mutex<Vec<Weak<dyn Entity>>>,

    /// Attached since the last pass
    pending: Mutex<Vec<Weak<dyn Entity>>>,

    /// Wakes the run loop when something is attached
    attached: Notify,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            attached: Notify::new(),
        }
    }

    /// Register an entity for lifecycle events.
    ///
    /// An entity attached while connected is initialised on the next turn
    /// of [`EntityRegistry::run`].
    pub fn attach(&self, entity: Weak<dyn Entity>) {
        self.pending.lock().unwrap().push(entity);
        self.attached.notify_one();
    }

    /// Number of live entities, pending ones included
    pub fn len(&self) -> usize {
        let entities = self.entities.lock().unwrap();
        let pending = self.pending.lock().unwrap();
        entities
            .iter()
            .chain(pending.iter())
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entities in attach order, pending ones merged in
    fn adopt_pending(&self) -> Vec<Arc<dyn Entity>> {
        let mut entities = self.entities.lock().unwrap();
        entities.append(&mut self.pending.lock().unwrap());
        entities.retain(|weak| weak.strong_count() > 0);
        entities.iter().filter_map(Weak::upgrade).collect()
    }

    /// Initialise every live entity. Called on each transition into `Connected`.
    ///
    /// Returns the number of entities initialised.
    pub fn init_all(&self) -> usize {
        // Locks are released before init so entities may attach others
        let live = self.adopt_pending();

        let mut seen = HashSet::new();
        for entity in &live {
            let id = entity.id();
            if !seen.insert(id.clone()) {
                warn!(entity_id = %id, "Duplicate entity id, topics will collide");
            }
        }

        for entity in &live {
            entity.init();
        }

        info!(count = live.len(), "Entities initialised");
        live.len()
    }

    /// Initialise only the entities attached since the last pass
    pub fn init_pending(&self) -> usize {
        let fresh: Vec<Arc<dyn Entity>> = {
            let mut entities = self.entities.lock().unwrap();
            let mut pending = self.pending.lock().unwrap();
            let fresh: Vec<Arc<dyn Entity>> = pending.iter().filter_map(Weak::upgrade).collect();
            pending.clear();
            entities.retain(|weak| weak.strong_count() > 0);
            entities.extend(fresh.iter().map(Arc::downgrade));
            fresh
        };

        let mut seen = HashSet::new();
        for entity in self.adopt_pending() {
            if fresh.iter().any(|f| Arc::ptr_eq(f, &entity)) {
                continue;
            }
            seen.insert(entity.id());
        }

        for entity in &fresh {
            let id = entity.id();
            if !seen.insert(id.clone()) {
                warn!(entity_id = %id, "Duplicate entity id, topics will collide");
            }
            debug!(entity_id = %id, "Initialising late-attached entity");
            entity.init();
        }

        fresh.len()
    }

    /// Drive entity lifecycle from the transport's connection state.
    ///
    /// Runs until the task is aborted.
    pub async fn run(self: Arc<Self>, transport: Transport) {
        let mut state_rx = transport.watch_state();
        let mut initialised_for = 0;

        state_rx.borrow_and_update();
        if transport.is_connected() {
            initialised_for = transport.connection_count();
            self.init_all();
        }

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        debug!("Connection state channel closed, stopping entity lifecycle");
                        break;
                    }
                    state_rx.borrow_and_update();

                    // Compare connection counts so a coalesced reconnect is still seen
                    let count = transport.connection_count();
                    if transport.is_connected() && count != initialised_for {
                        initialised_for = count;
                        self.init_all();
                    }
                }
                _ = self.attached.notified() => {
                    if transport.is_connected() {
                        self.init_pending();
                    } else {
                        self.adopt_pending();
                    }
                }
            }
        }
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
