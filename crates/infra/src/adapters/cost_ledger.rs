use std::sync::RwLock;

use crate::ports::{CostAllocation, CostAllocationPort, PortError};

/// Cost-allocation sink that keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingCostAllocation {
    entries: RwLock<Vec<CostAllocation>>,
}

impl RecordingCostAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CostAllocation> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

impl CostAllocationPort for RecordingCostAllocation {
    fn record_actual_cost(&self, allocation: CostAllocation) -> Result<(), PortError> {
        self.entries
            .write()
            .map_err(|_| PortError::Unavailable("lock poisoned".to_string()))?
            .push(allocation);
        Ok(())
    }
}
