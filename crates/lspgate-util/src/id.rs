//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in lspgate follow the pattern: `prefix_ulid`
//! For example: `ses_01HQXYZ...` for sessions.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    /// A gateway session (one client, one language server).
    Session,
    /// A connected editor client.
    Client,
    /// An isolated workspace directory.
    Workspace,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Session => "ses",
            IdPrefix::Client => "cli",
            IdPrefix::Workspace => "wks",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ses" => Some(IdPrefix::Session),
            "cli" => Some(IdPrefix::Client),
            "wks" => Some(IdPrefix::Workspace),
            _ => None,
        }
    }
}

/// Identifier generation and parsing utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        let ulid = Ulid::new();
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Extract the prefix from an identifier.
    pub fn prefix_of(id: &str) -> Option<IdPrefix> {
        id.split_once('_').and_then(|(p, _)| IdPrefix::parse(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_roundtrip() {
        for prefix in [IdPrefix::Session, IdPrefix::Client, IdPrefix::Workspace] {
            assert_eq!(IdPrefix::parse(prefix.as_str()), Some(prefix));
        }
        assert_eq!(IdPrefix::parse("unknown"), None);
    }

    #[test]
    fn test_ascending_ids_are_ordered() {
        let a = Identifier::ascending(IdPrefix::Session);
        let b = Identifier::ascending(IdPrefix::Session);
        assert!(a.starts_with("ses_"));
        assert!(b >= a);
    }

    #[test]
    fn test_prefix_of() {
        let id = Identifier::ascending(IdPrefix::Client);
        assert_eq!(Identifier::prefix_of(&id), Some(IdPrefix::Client));
        assert_eq!(Identifier::prefix_of("no-prefix"), None);
    }
}
