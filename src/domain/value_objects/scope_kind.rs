//! Scope kinds - the closed set of component tags an entity may carry

use serde::{Deserialize, Serialize};

/// Tag identifying one scope type.
///
/// The tag's name is the key under which the scope's field-set is stored in
/// the serialized envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Describable,
    Located,
    Container,
    Stackable,
    Carryable,
    Vitals,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 6] = [
        ScopeKind::Describable,
        ScopeKind::Located,
        ScopeKind::Container,
        ScopeKind::Stackable,
        ScopeKind::Carryable,
        ScopeKind::Vitals,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Describable => "describable",
            ScopeKind::Located => "located",
            ScopeKind::Container => "container",
            ScopeKind::Stackable => "stackable",
            ScopeKind::Carryable => "carryable",
            ScopeKind::Vitals => "vitals",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for kind in ScopeKind::ALL {
            assert_eq!(ScopeKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ScopeKind::from_name("props"), None);
    }

    #[test]
    fn test_serde_name_matches_envelope_name() {
        for kind in ScopeKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.name()));
        }
    }
}
