//! Fleet bookkeeping owned by the supervisor loop.

use std::collections::BTreeMap;

use serde::Serialize;

pub type WorkerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Online,
    Ready,
    Exited,
}

impl WorkerState {
    /// `starting → online → ready`, and any live state to `exited`.
    fn can_become(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Starting, Online) | (Starting, Ready) | (Online, Ready) | (Starting | Online | Ready, Exited)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub pid: Option<u32>,
    pub state: WorkerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FleetPhase {
    /// Waiting for the initial workers to become ready.
    Booting,
    /// Initialized; exits are reforked.
    Running,
    /// Shutdown broadcast; exits are not reforked.
    Stopping,
    /// No worker is live and none will be forked.
    Stopped,
}

/// Read-only view published to handles and the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub phase: FleetPhase,
    pub worker_count: usize,
    pub initialized: bool,
    pub restarts: u64,
    pub workers: Vec<WorkerRecord>,
}

impl FleetSnapshot {
    pub fn ready_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state == WorkerState::Ready)
            .count()
    }
}

#[derive(Debug)]
pub struct FleetState {
    worker_count: usize,
    initialized: bool,
    phase: FleetPhase,
    restarts: u64,
    next_id: WorkerId,
    workers: BTreeMap<WorkerId, WorkerRecord>,
}

impl FleetState {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            initialized: false,
            phase: FleetPhase::Booting,
            restarts: 0,
            next_id: 1,
            workers: BTreeMap::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn phase(&self) -> FleetPhase {
        self.phase
    }

    /// Reserve the id for the next fork.
    pub fn next_id(&mut self) -> WorkerId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, id: WorkerId, pid: Option<u32>) {
        self.workers.insert(
            id,
            WorkerRecord {
                id,
                pid,
                state: WorkerState::Starting,
            },
        );
    }

    /// Apply a transition. Returns false for unknown workers or invalid moves.
    pub fn transition(&mut self, id: WorkerId, next: WorkerState) -> bool {
        match self.workers.get_mut(&id) {
            Some(record) if record.state.can_become(next) => {
                record.state = next;
                true
            }
            _ => false,
        }
    }

    /// Forget an exited worker.
    pub fn remove(&mut self, id: WorkerId) -> Option<WorkerRecord> {
        let mut record = self.workers.remove(&id)?;
        record.state = WorkerState::Exited;
        Some(record)
    }

    pub fn live_count(&self) -> usize {
        self.workers.len()
    }

    pub fn ready_count(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.state == WorkerState::Ready)
            .count()
    }

    /// Flip `initialized` once every initial worker is ready.
    ///
    /// Returns true only on the call that flips it.
    pub fn try_initialize(&mut self) -> bool {
        if self.initialized || self.ready_count() < self.worker_count {
            return false;
        }
        self.initialized = true;
        if self.phase == FleetPhase::Booting {
            self.phase = FleetPhase::Running;
        }
        true
    }

    pub fn begin_stopping(&mut self) {
        if self.phase != FleetPhase::Stopped {
            self.phase = FleetPhase::Stopping;
        }
    }

    pub fn mark_stopped(&mut self) {
        self.phase = FleetPhase::Stopped;
    }

    pub fn record_restart(&mut self) {
        self.restarts += 1;
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            phase: self.phase,
            worker_count: self.worker_count,
            initialized: self.initialized,
            restarts: self.restarts,
            workers: self.workers.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_boot_transitions() {
        let mut fleet = FleetState::new(1);
        let id = fleet.next_id();
        fleet.insert(id, Some(42));

        assert!(fleet.transition(id, WorkerState::Online));
        assert!(!fleet.transition(id, WorkerState::Starting));
        assert!(fleet.transition(id, WorkerState::Ready));
        assert!(!fleet.transition(id, WorkerState::Online));
        assert!(fleet.try_initialize());
        assert_eq!(fleet.phase(), FleetPhase::Running);
    }

    #[test]
    fn test_initialized_flips_once() {
        let mut fleet = FleetState::new(2);
        let a = fleet.next_id();
        let b = fleet.next_id();
        fleet.insert(a, None);
        fleet.insert(b, None);

        fleet.transition(a, WorkerState::Ready);
        assert!(!fleet.try_initialize());
        fleet.transition(b, WorkerState::Ready);
        assert!(fleet.try_initialize());
        assert!(!fleet.try_initialize());
        assert!(fleet.initialized());
    }

    #[test]
    fn test_replacement_is_a_new_record() {
        let mut fleet = FleetState::new(1);
        let first = fleet.next_id();
        fleet.insert(first, Some(1));
        fleet.transition(first, WorkerState::Ready);

        let gone = fleet.remove(first).unwrap();
        assert_eq!(gone.state, WorkerState::Exited);
        assert!(!fleet.transition(first, WorkerState::Ready));

        let second = fleet.next_id();
        assert_ne!(first, second);
        fleet.insert(second, Some(2));
        assert_eq!(fleet.snapshot().workers.len(), 1);
        assert_eq!(fleet.snapshot().workers[0].state, WorkerState::Starting);
    }
}
