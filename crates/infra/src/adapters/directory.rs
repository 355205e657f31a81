use std::collections::HashMap;
use std::sync::RwLock;

use kardex_core::{ProjectId, UserId, WarehouseId};

use crate::ports::{ApproverDirectory, PortError, WarehouseResolver};

fn poisoned() -> PortError {
    PortError::Unavailable("lock poisoned".to_string())
}

/// Fixed project → default warehouse table.
#[derive(Debug, Default)]
pub struct StaticWarehouseResolver {
    defaults: RwLock<HashMap<ProjectId, WarehouseId>>,
}

impl StaticWarehouseResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, project_id: ProjectId, warehouse_id: WarehouseId) -> Result<(), PortError> {
        self.defaults
            .write()
            .map_err(|_| poisoned())?
            .insert(project_id, warehouse_id);
        Ok(())
    }
}

impl WarehouseResolver for StaticWarehouseResolver {
    fn default_for_project(&self, project_id: ProjectId) -> Result<Option<WarehouseId>, PortError> {
        Ok(self
            .defaults
            .read()
            .map_err(|_| poisoned())?
            .get(&project_id)
            .copied())
    }
}

/// Fixed project → assigned approver (resident engineer) table.
#[derive(Debug, Default)]
pub struct StaticApproverDirectory {
    approvers: RwLock<HashMap<ProjectId, UserId>>,
}

impl StaticApproverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, project_id: ProjectId, approver: UserId) -> Result<(), PortError> {
        self.approvers
            .write()
            .map_err(|_| poisoned())?
            .insert(project_id, approver);
        Ok(())
    }
}

impl ApproverDirectory for StaticApproverDirectory {
    fn assigned_approver(&self, project_id: ProjectId) -> Result<Option<UserId>, PortError> {
        Ok(self
            .approvers
            .read()
            .map_err(|_| poisoned())?
            .get(&project_id)
            .copied())
    }
}
