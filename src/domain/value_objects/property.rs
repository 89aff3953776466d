//! Properties - named values carrying their own merge semantics
//!
//! Properties are deliberately untyped beyond their merge strategy, so new
//! property names need no schema change. On the wire a `Replace` property is
//! its plain JSON value; an `Additive` property is wrapped as
//! `{"$add": <value>}`. A `Replace` value that itself looks like one of the
//! wrappers is escaped as `{"$value": <value>}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// How a property combines with an existing property of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Last writer wins; an absent incoming value keeps the old one
    #[default]
    Replace,
    /// Numbers are summed, objects are summed field by field
    Additive,
}

/// A named value with an associated merge strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PropertyRepr", into = "PropertyRepr")]
pub struct Property {
    pub value: Value,
    pub merge: MergeStrategy,
}

impl Property {
    pub fn replace(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            merge: MergeStrategy::Replace,
        }
    }

    pub fn additive(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            merge: MergeStrategy::Additive,
        }
    }

    /// Combine an existing property with an incoming one, using the incoming
    /// property's strategy.
    pub fn merged(old: &Property, incoming: &Property) -> Property {
        if incoming.value.is_null() {
            return old.clone();
        }
        let value = match incoming.merge {
            MergeStrategy::Replace => incoming.value.clone(),
            MergeStrategy::Additive => add_values(&old.value, &incoming.value),
        };
        Property {
            value,
            merge: incoming.merge,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdditiveRepr {
    #[serde(rename = "$add")]
    add: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EscapedRepr {
    #[serde(rename = "$value")]
    value: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PropertyRepr {
    Additive(AdditiveRepr),
    Escaped(EscapedRepr),
    Plain(Value),
}

const WRAPPER_KEYS: [&str; 2] = ["$add", "$value"];

/// True when `value` would decode as a wrapper rather than as itself
fn needs_escape(value: &Value) -> bool {
    match value {
        Value::Object(map) if map.len() == 1 => {
            map.keys().all(|k| WRAPPER_KEYS.contains(&k.as_str()))
        }
        _ => false,
    }
}

impl From<PropertyRepr> for Property {
    fn from(repr: PropertyRepr) -> Self {
        match repr {
            PropertyRepr::Additive(AdditiveRepr { add }) => Property::additive(add),
            PropertyRepr::Escaped(EscapedRepr { value }) | PropertyRepr::Plain(value) => {
                Property::replace(value)
            }
        }
    }
}

impl From<Property> for PropertyRepr {
    fn from(property: Property) -> Self {
        match property.merge {
            MergeStrategy::Replace if needs_escape(&property.value) => {
                PropertyRepr::Escaped(EscapedRepr {
                    value: property.value,
                })
            }
            MergeStrategy::Replace => PropertyRepr::Plain(property.value),
            MergeStrategy::Additive => PropertyRepr::Additive(AdditiveRepr {
                add: property.value,
            }),
        }
    }
}

fn add_values(old: &Value, incoming: &Value) -> Value {
    match (old, incoming) {
        (Value::Number(a), Value::Number(b)) => add_numbers(a, b),
        (Value::Object(a), Value::Object(b)) => {
            let mut out = a.clone();
            for (name, value) in b {
                let summed = match a.get(name) {
                    Some(existing) => add_values(existing, value),
                    None => value.clone(),
                };
                out.insert(name.clone(), summed);
            }
            Value::Object(out)
        }
        (_, incoming) => incoming.clone(),
    }
}

fn add_numbers(a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Value::from(sum);
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null)
}

/// A set of named properties
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, Property>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(|p| &p.value)
    }

    pub fn insert(&mut self, name: impl Into<String>, property: Property) -> Option<Property> {
        self.0.insert(name.into(), property)
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.0.iter()
    }

    /// Fold `incoming` into this map, property by property
    pub fn merge(&mut self, incoming: &PropertyMap) {
        for (name, property) in &incoming.0 {
            let merged = match self.0.get(name) {
                Some(existing) => Property::merged(existing, property),
                None => property.clone(),
            };
            self.0.insert(name.clone(), merged);
        }
    }

    /// Non-mutating form of [`PropertyMap::merge`]
    pub fn merged(&self, incoming: &PropertyMap) -> PropertyMap {
        let mut out = self.clone();
        out.merge(incoming);
        out
    }
}

impl FromIterator<(String, Property)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, Property)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
