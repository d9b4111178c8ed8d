//! Role directory - immutable reference data
//!
//! Maps wallet addresses to application identities. The directory is a
//! closed set validated at construction; lookups never fail into
//! half-validated states.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ledger::Address;

/// Application role. Closed enum: unknown roles are rejected when the
/// directory is built, not at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Producer,
    Processor,
    Logistics,
    Retail,
    Auditor,
}

impl Role {
    /// Navigation target for this role's home view.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Producer => "/producer",
            Role::Processor => "/processor",
            Role::Logistics => "/logistics",
            Role::Retail => "/retail",
            Role::Auditor => "/audit",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Producer => "PRODUCER",
            Role::Processor => "PROCESSOR",
            Role::Logistics => "LOGISTICS",
            Role::Retail => "RETAIL",
            Role::Auditor => "AUDITOR",
        };
        f.write_str(label)
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PRODUCER" => Ok(Role::Producer),
            "PROCESSOR" => Ok(Role::Processor),
            "LOGISTICS" => Ok(Role::Logistics),
            "RETAIL" => Ok(Role::Retail),
            "AUDITOR" => Ok(Role::Auditor),
            other => Err(Error::Config(format!("Unknown role: {other}"))),
        }
    }
}

/// Role-specific descriptive fields carried by the directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// One entry of the role directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: u32,
    pub display_name: String,
    pub role: Role,
    pub wallet_address: Address,
    #[serde(default)]
    pub metadata: RoleMetadata,
}

/// Address- and role-keyed directory of known identities.
pub struct RoleDirectory {
    identities: Vec<Identity>,
    by_address: HashMap<Address, usize>,
    by_role: HashMap<Role, usize>,
}

impl RoleDirectory {
    /// Build a directory, rejecting duplicate addresses or roles up front.
    pub fn new(identities: Vec<Identity>) -> Result<Self> {
        let mut by_address = HashMap::new();
        let mut by_role = HashMap::new();
        for (idx, identity) in identities.iter().enumerate() {
            if by_address
                .insert(identity.wallet_address.clone(), idx)
                .is_some()
            {
                return Err(Error::Config(format!(
                    "Duplicate wallet address in directory: {}",
                    identity.wallet_address
                )));
            }
            if by_role.insert(identity.role, idx).is_some() {
                return Err(Error::Config(format!(
                    "Duplicate role in directory: {}",
                    identity.role
                )));
            }
        }
        Ok(Self {
            identities,
            by_address,
            by_role,
        })
    }

    /// Look up by address. Addresses are normalized at parse time, so the
    /// comparison is case-insensitive.
    pub fn by_address(&self, address: &Address) -> Option<&Identity> {
        self.by_address.get(address).map(|&i| &self.identities[i])
    }

    pub fn by_role(&self, role: Role) -> Option<&Identity> {
        self.by_role.get(&role).map(|&i| &self.identities[i])
    }

    /// Display name for an address when it belongs to a known identity.
    pub fn label(&self, address: &Address) -> Option<&str> {
        self.by_address(address).map(|i| i.display_name.as_str())
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }
}
