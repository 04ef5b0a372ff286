//! # Core Types
//!
//! Serde helpers shared across the credential data model.

use serde::{Deserialize, Serialize};

/// `Kind` allows serde to serialize/deserialize a string or an object.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Kind<T> {
    /// Simple string value
    String(String),

    /// Complex object value
    Object(T),
}

impl<T: Default> Default for Kind<T> {
    fn default() -> Self {
        Self::String(String::new())
    }
}

/// `OneMany` allows serde to serialize/deserialize a single object or a set
/// of objects.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneMany<T> {
    /// Single object
    One(T),

    /// Set of objects
    Many(Vec<T>),
}

impl<T: Default> Default for OneMany<T> {
    fn default() -> Self {
        Self::One(T::default())
    }
}

impl<T: Clone + PartialEq> OneMany<T> {
    /// Adds an object. A single object is converted to a set.
    pub fn add(&mut self, item: T) {
        match self {
            Self::One(one) => {
                *self = Self::Many(vec![one.clone(), item]);
            }
            Self::Many(many) => {
                many.push(item);
            }
        }
    }

    /// Returns `true` if the given object is present.
    pub fn contains(&self, item: &T) -> bool {
        match self {
            Self::One(one) => one == item,
            Self::Many(many) => many.contains(item),
        }
    }

    /// Returns the number of objects.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(many) => many.len(),
        }
    }

    /// Returns `true` if the container is an empty `Many`.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Many(many) => many.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_many_serde() {
        let one = OneMany::One("VerifiableCredential".to_string());
        assert_eq!(serde_json::to_string(&one).expect("should serialize"), r#""VerifiableCredential""#);

        let mut many = one;
        many.add("StatusList2021Credential".into());
        assert_eq!(
            serde_json::to_string(&many).expect("should serialize"),
            r#"["VerifiableCredential","StatusList2021Credential"]"#
        );

        let de: OneMany<String> =
            serde_json::from_str(r#"["a","b"]"#).expect("should deserialize");
        assert_eq!(de.len(), 2);
        assert!(de.contains(&"b".to_string()));
    }
}
