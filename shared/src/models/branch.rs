//! Branch and product directory models, and the caller's access scope

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// A retail branch. Referenced by transfers, never owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

/// A stocked product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub unit_of_measure: String,
}

/// Request-scoped capability set. Components decide visibility from this,
/// never from the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    pub user_id: Uuid,
    pub branch_id: Uuid,
    pub is_admin: bool,
}

impl AccessContext {
    pub fn new(user_id: Uuid, branch_id: Uuid, is_admin: bool) -> Self {
        Self {
            user_id,
            branch_id,
            is_admin,
        }
    }

    /// True when the caller may act for `branch_id`
    pub fn covers(&self, branch_id: Uuid) -> bool {
        self.is_admin || self.branch_id == branch_id
    }

    pub fn require(&self, branch_id: Uuid, what: &str) -> DomainResult<()> {
        if self.covers(branch_id) {
            Ok(())
        } else {
            Err(DomainError::AccessDenied(format!(
                "branch {} is not allowed to {}",
                self.branch_id, what
            )))
        }
    }

    /// Branch filter for listings; `None` means unrestricted
    pub fn branch_scope(&self) -> Option<Uuid> {
        if self.is_admin {
            None
        } else {
            Some(self.branch_id)
        }
    }
}
