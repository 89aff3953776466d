//! Entity document - the serialized envelope and its codec
//!
//! ```json
//! {
//!   "key": "…", "version": {"i": 3}, "gid": 17,
//!   "props": {"category": "item", "nutrition": {"$add": {"sugar": 3}}},
//!   "stackable": {"kind": "apple", "quantity": 2}
//! }
//! ```
//!
//! Every top-level entry other than the reserved names is a scope field-set
//! keyed by scope name. A missing scope entry means the scope was never
//! materialized. `category` and `creator` travel inside `props`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::entities::{Entity, EntityError, EntityParts, ScopeRegistry};
use crate::domain::value_objects::{EntityKey, Gid, Property, PropertyMap, ScopeKind};

/// Top-level names that are never scope names
pub const RESERVED_FIELDS: [&str; 5] = ["key", "version", "gid", "props", "destroyed"];

pub const CATEGORY_PROP: &str = "category";
pub const CREATOR_PROP: &str = "creator";

/// Version wrapper, leaving room for metadata next to the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionStamp {
    pub i: u64,
}

impl VersionStamp {
    pub fn new(i: u64) -> Self {
        Self { i }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed entity document: {0}")]
    Malformed(String),

    #[error("Unknown scope in entity document: {0}")]
    UnknownScope(String),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Typed view of a serialized entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    pub key: EntityKey,
    pub version: VersionStamp,
    pub gid: Option<Gid>,
    #[serde(default)]
    pub props: PropertyMap,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub destroyed: bool,
    #[serde(flatten)]
    pub scopes: BTreeMap<String, Value>,
}

impl EntityDocument {
    pub fn from_entity(entity: &Entity) -> Self {
        let mut props = entity.props().clone();
        props.insert(CATEGORY_PROP, Property::replace(entity.category()));
        if let Some(creator) = entity.creator() {
            props.insert(CREATOR_PROP, Property::replace(creator.as_str()));
        }

        Self {
            key: entity.key().clone(),
            version: VersionStamp::new(entity.version()),
            gid: entity.gid(),
            props,
            destroyed: entity.is_destroyed(),
            scopes: entity
                .field_sets()
                .map(|(kind, fields)| (kind.name().to_string(), fields.clone()))
                .collect(),
        }
    }

    pub fn into_entity(self, registry: &ScopeRegistry) -> Result<Entity, CodecError> {
        let mut props = self.props;

        let category = match props.remove(CATEGORY_PROP).map(|p| p.value) {
            Some(Value::String(category)) => category,
            _ => {
                return Err(CodecError::Malformed(format!(
                    "{}: props.{} must be a string",
                    self.key, CATEGORY_PROP
                )))
            }
        };

        let creator = match props.remove(CREATOR_PROP).map(|p| p.value) {
            None | Some(Value::Null) => None,
            Some(Value::String(creator)) => Some(EntityKey::from(creator)),
            Some(_) => {
                return Err(CodecError::Malformed(format!(
                    "{}: props.{} must be a string",
                    self.key, CREATOR_PROP
                )))
            }
        };

        let mut fields = BTreeMap::new();
        for (name, value) in self.scopes {
            let kind = ScopeKind::from_name(&name).ok_or(CodecError::UnknownScope(name))?;
            fields.insert(kind, value);
        }

        let entity = Entity::restore(
            registry,
            EntityParts {
                key: self.key,
                gid: self.gid,
                version: self.version.i,
                destroyed: self.destroyed,
                category,
                creator,
                fields,
                props,
            },
        )?;
        Ok(entity)
    }
}

/// Identity and version fields of a document, ignoring its payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentHeader {
    pub key: EntityKey,
    pub version: VersionStamp,
    #[serde(default)]
    pub gid: Option<Gid>,
    #[serde(default)]
    pub destroyed: bool,
}

impl DocumentHeader {
    pub fn parse(document: &Value) -> Result<Self, CodecError> {
        Ok(Self::deserialize(document)?)
    }
}

/// Serialize an entity's current state into its envelope
pub fn encode(entity: &Entity) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(EntityDocument::from_entity(entity))?)
}

/// Rebuild an entity from its envelope
pub fn decode(registry: &ScopeRegistry, document: &Value) -> Result<Entity, CodecError> {
    let document = EntityDocument::deserialize(document)?;
    document.into_entity(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Container, Describable, Located, Stackable, Vitals};
    use serde_json::json;

    fn assert_same_state(a: &Entity, b: &Entity) {
        assert_eq!(a.key(), b.key());
        assert_eq!(a.gid(), b.gid());
        assert_eq!(a.version(), b.version());
        assert_eq!(a.is_destroyed(), b.is_destroyed());
        assert_eq!(a.category(), b.category());
        assert_eq!(a.creator(), b.creator());
        assert_eq!(a.scope_kinds(), b.scope_kinds());
        assert_eq!(a.props(), b.props());
        assert_eq!(
            a.field_sets().collect::<Vec<_>>(),
            b.field_sets().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_round_trip_preserves_scopes_and_props() {
        let registry = ScopeRegistry::default();
        let wizard = Entity::new(&registry, "player").unwrap();
        let mut entity = Entity::new(&registry, "creature")
            .unwrap()
            .with_creator(wizard.key());
        if let Some(mut desc) = entity.make::<Describable>() {
            desc.name = "goblin".to_string();
            desc.aliases = vec!["gob".to_string()];
        }
        if let Some(mut vitals) = entity.make::<Vitals>() {
            vitals.health = 4;
        }
        if let Some(mut located) = entity.make::<Located>() {
            located.location = Some(EntityKey::from("cave"));
        }
        entity.set_prop("nutrition", Property::additive(json!({"sugar": 3})));
        entity.set_prop("color", Property::replace("green"));
        entity.mark_persisted(7, Some(Gid::new(12)));

        let document = encode(&entity).unwrap();
        let decoded = decode(&registry, &document).unwrap();

        assert_same_state(&entity, &decoded);
        assert!(!decoded.is_dirty());
        assert!(decoded.loaded_at() >= entity.loaded_at());
        assert_eq!(decoded.read::<Vitals>().health, 4);
        assert!(!decoded.has::<Container>());
    }

    #[test]
    fn test_envelope_shape() {
        let registry = ScopeRegistry::default();
        let mut entity = Entity::new(&registry, "item").unwrap();
        if let Some(mut stack) = entity.make::<Stackable>() {
            stack.kind = "apple".to_string();
            stack.quantity = 2;
        }

        let document = encode(&entity).unwrap();

        assert_eq!(document["key"], json!(entity.key().as_str()));
        assert_eq!(document["version"], json!({"i": 0}));
        assert_eq!(document["gid"], Value::Null);
        assert_eq!(document["props"]["category"], json!("item"));
        assert_eq!(document["stackable"], json!({"kind": "apple", "quantity": 2}));
        assert!(document.get("describable").is_none());
        assert!(document.get("destroyed").is_none());
    }

    #[test]
    fn test_destroyed_flag_is_encoded() {
        let registry = ScopeRegistry::default();
        let mut entity = Entity::new(&registry, "item").unwrap();
        entity.destroy();
        let document = encode(&entity).unwrap();
        assert_eq!(document["destroyed"], json!(true));
        assert!(DocumentHeader::parse(&document).unwrap().destroyed);
    }

    #[test]
    fn test_decode_rejects_unknown_scope() {
        let document = json!({
            "key": "k1",
            "version": {"i": 1},
            "gid": 1,
            "props": {"category": "item"},
            "spaceship": {"warp": 9}
        });
        let result = decode(&ScopeRegistry::default(), &document);
        assert!(matches!(result, Err(CodecError::UnknownScope(name)) if name == "spaceship"));
    }

    #[test]
    fn test_decode_requires_category() {
        let document = json!({"key": "k1", "version": {"i": 1}, "gid": 1, "props": {}});
        let result = decode(&ScopeRegistry::default(), &document);
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_scope_outside_category() {
        let document = json!({
            "key": "k1",
            "version": {"i": 1},
            "gid": 1,
            "props": {"category": "room"},
            "vitals": {"health": 3}
        });
        let result = decode(&ScopeRegistry::default(), &document);
        assert!(matches!(result, Err(CodecError::Entity(_))));
    }
}
