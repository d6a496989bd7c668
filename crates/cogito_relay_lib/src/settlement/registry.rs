use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error("transfer {0} is already in flight")]
    AlreadyInFlight(String),
    #[error("in-flight registry is full ({0} transfers)")]
    Full(usize),
}

#[derive(Default)]
struct RegistryState {
    cycle_active: bool,
    ids: HashSet<String>,
}

/// Bounded set of transfer ids with a settlement in progress.
/// Every entry is owned by a guard and released when the guard drops.
pub struct InFlightRegistry {
    capacity: usize,
    state: Mutex<RegistryState>,
}

impl InFlightRegistry {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            state: Mutex::new(RegistryState::default()),
        })
    }

    /// None when another cycle is running or work from outside a cycle is in flight
    pub fn begin_cycle(self: &Arc<Self>) -> Option<CycleGuard> {
        let mut state = self.state.lock();
        if state.cycle_active || !state.ids.is_empty() {
            return None;
        }
        state.cycle_active = true;
        Some(CycleGuard {
            registry: self.clone(),
        })
    }

    pub fn try_acquire(self: &Arc<Self>, transfer_id: &str) -> Result<InFlightGuard, AcquireError> {
        let mut state = self.state.lock();
        if state.ids.contains(transfer_id) {
            return Err(AcquireError::AlreadyInFlight(transfer_id.to_string()));
        }
        if state.ids.len() >= self.capacity {
            return Err(AcquireError::Full(self.capacity));
        }
        state.ids.insert(transfer_id.to_string());
        Ok(InFlightGuard {
            registry: self.clone(),
            transfer_id: transfer_id.to_string(),
        })
    }

    pub fn contains(&self, transfer_id: &str) -> bool {
        self.state.lock().ids.contains(transfer_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cycle_active(&self) -> bool {
        self.state.lock().cycle_active
    }

    pub fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().ids.iter().cloned().collect();
        ids.sort();
        ids
    }
}

/// Marks a running cycle, clears the whole registry on drop (including unwinding)
pub struct CycleGuard {
    registry: Arc<InFlightRegistry>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        if !state.ids.is_empty() {
            log::warn!(
                "Cycle ended with {} transfers still in flight, releasing",
                state.ids.len()
            );
        }
        state.ids.clear();
        state.cycle_active = false;
    }
}

pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    transfer_id: String,
}

impl InFlightGuard {
    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.state.lock().ids.remove(&self.transfer_id);
    }
}
