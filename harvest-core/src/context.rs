use harvest_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// Operation families a caller may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageOrders,
    ManagePickups,
    ManageDrivers,
    ViewReports,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::ManageOrders,
        Capability::ManagePickups,
        Capability::ManageDrivers,
        Capability::ViewReports,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ManageOrders => "manage_orders",
            Capability::ManagePickups => "manage_pickups",
            Capability::ManageDrivers => "manage_drivers",
            Capability::ViewReports => "view_reports",
        }
    }

    /// Baseline grants per role. Explicit permissions are added on top.
    pub fn for_role(role: &str) -> &'static [Capability] {
        match role {
            "admin" => &Capability::ALL,
            "dispatcher" => &[Capability::ManagePickups, Capability::ManageDrivers],
            "analyst" => &[Capability::ViewReports],
            _ => &[],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown capability '{}'", s)))
    }
}

/// Authenticated caller, built once at the boundary and passed to every core
/// operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    actor: Option<String>,
    role: String,
    capabilities: HashSet<Capability>,
    anti_forgery: Option<Masked<String>>,
}

impl RequestContext {
    pub fn new(
        actor: impl Into<String>,
        role: impl Into<String>,
        permissions: impl IntoIterator<Item = Capability>,
        anti_forgery: Option<Masked<String>>,
    ) -> Self {
        let role = role.into();
        let mut capabilities: HashSet<Capability> =
            Capability::for_role(&role).iter().copied().collect();
        capabilities.extend(permissions);
        Self {
            actor: Some(actor.into()),
            role,
            capabilities,
            anti_forgery,
        }
    }

    /// Internal actions with no human actor (cascades triggered by the system).
    pub fn system() -> Self {
        Self {
            actor: None,
            role: "system".to_string(),
            capabilities: Capability::ALL.into_iter().collect(),
            anti_forgery: None,
        }
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn require(&self, capability: Capability) -> CoreResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            tracing::warn!(actor = ?self.actor, role = %self.role, %capability, "Capability check failed");
            Err(CoreError::Forbidden(format!(
                "role '{}' lacks {}",
                self.role, capability
            )))
        }
    }

    /// Checks a submitted anti-forgery token against the session's token.
    pub fn verify_anti_forgery(&self, submitted: &str) -> CoreResult<()> {
        match &self.anti_forgery {
            Some(expected) if expected.matches(submitted) => Ok(()),
            _ => Err(CoreError::Forbidden("anti-forgery token mismatch".to_string())),
        }
    }
}
