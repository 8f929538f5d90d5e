//! At most one payment flow per (user, machine).

use alloy_primitives::Address;
use machina_core::{MachinaError, MachinaResult, MachineIndex};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

type FlightKey = (Address, MachineIndex);

/// Registry of running flows.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<HashSet<FlightKey>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(user, machine)` until the returned guard is dropped.
    pub fn acquire(&self, user: Address, machine: MachineIndex) -> MachinaResult<FlightGuard> {
        let key = (user, machine);
        if !self.active.lock().insert(key) {
            return Err(MachinaError::FlowInProgress { user, machine });
        }
        Ok(FlightGuard {
            active: self.active.clone(),
            key,
        })
    }

    pub fn is_active(&self, user: Address, machine: MachineIndex) -> bool {
        self.active.lock().contains(&(user, machine))
    }
}

/// Releases its claim on drop.
#[derive(Debug)]
pub struct FlightGuard {
    active: Arc<Mutex<HashSet<FlightKey>>>,
    key: FlightKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}
