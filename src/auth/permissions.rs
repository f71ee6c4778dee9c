//! Capability resolution for verified wallets

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Known capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Poll job and agent status
    ReadStatus,
    /// Submit generation jobs
    GenerateContent,
    /// Configure owned agents
    ManageAgent,
    /// Share agents with other wallets
    Collaborate,
    /// Hand an agent to another wallet
    TransferAgent,
}

impl Capability {
    pub const BASE: [Capability; 2] = [Capability::ReadStatus, Capability::GenerateContent];

    pub const EXTENDED: [Capability; 3] = [
        Capability::ManageAgent,
        Capability::Collaborate,
        Capability::TransferAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadStatus => "read_status",
            Capability::GenerateContent => "generate_content",
            Capability::ManageAgent => "manage_agent",
            Capability::Collaborate => "collaborate",
            Capability::TransferAgent => "transfer_agent",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_status" => Ok(Capability::ReadStatus),
            "generate_content" => Ok(Capability::GenerateContent),
            "manage_agent" => Ok(Capability::ManageAgent),
            "collaborate" => Ok(Capability::Collaborate),
            "transfer_agent" => Ok(Capability::TransferAgent),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// The single agent id a wallet owns under the derived ownership model
pub fn owned_resource_id(wallet_address: &str) -> String {
    format!("user-{}", super::normalize_wallet(wallet_address))
}

/// Maps a verified wallet to its capability set
pub trait PermissionResolver: Send + Sync {
    fn resolve_permissions(&self, wallet_address: &str) -> BTreeSet<String>;
}

/// Grants the base capabilities to every wallet, plus the extended set when enabled
#[derive(Debug, Clone)]
pub struct DefaultPermissionResolver {
    grant_extended: bool,
}

impl DefaultPermissionResolver {
    pub fn new(grant_extended: bool) -> Self {
        Self { grant_extended }
    }
}

impl Default for DefaultPermissionResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PermissionResolver for DefaultPermissionResolver {
    fn resolve_permissions(&self, _wallet_address: &str) -> BTreeSet<String> {
        let mut permissions: BTreeSet<String> =
            Capability::BASE.iter().map(|c| c.to_string()).collect();

        // TODO: gate the extended set on subscription tier once billing exposes it
        if self.grant_extended {
            permissions.extend(Capability::EXTENDED.iter().map(|c| c.to_string()));
        }

        permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grants_everything() {
        let perms = DefaultPermissionResolver::default().resolve_permissions("0xabc");
        for cap in Capability::BASE.iter().chain(Capability::EXTENDED.iter()) {
            assert!(perms.contains(cap.as_str()), "missing {cap}");
        }
        assert_eq!(perms.len(), 5);
    }

    #[test]
    fn test_base_only() {
        let perms = DefaultPermissionResolver::new(false).resolve_permissions("0xabc");
        assert!(perms.contains("read_status"));
        assert!(perms.contains("generate_content"));
        assert!(!perms.contains("manage_agent"));
    }

    #[test]
    fn test_owned_resource_id_lowercases() {
        assert_eq!(owned_resource_id("0xDEAD"), "user-0xdead");
    }

    #[test]
    fn test_capability_parse() {
        assert_eq!(
            "manage_agent".parse::<Capability>().unwrap(),
            Capability::ManageAgent
        );
        assert!("admin".parse::<Capability>().is_err());
    }
}
