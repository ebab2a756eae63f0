//! Pointers from workitems to external domain objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A domain object a workitem can refer to.
///
/// Matching is by type name and identifier only; the crate never loads
/// the object itself.
pub trait Entity {
    /// Type name stored in the `entity_type` field.
    fn entity_type(&self) -> String;

    /// Scalar identifier stored in the `entity_id` field.
    fn identifier(&self) -> Value;

    /// This entity as a bare reference.
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity_type(), self.identifier())
    }
}

/// `{ entity_type, entity_id }` pointer carried in workitem fields.
///
/// # Examples
///
/// ```
/// use hivework::workitem::{Entity, EntityRef};
///
/// let rocket = EntityRef::new("Rocket", 42);
/// assert_eq!(rocket.entity_type(), "Rocket");
/// assert_eq!(rocket.identifier(), serde_json::json!(42));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Type name of the referenced object.
    pub entity_type: String,
    /// Identifier of the referenced object.
    pub entity_id: Value,
}

impl EntityRef {
    /// Creates a reference from a type name and identifier.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<Value>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl Entity for EntityRef {
    fn entity_type(&self) -> String {
        self.entity_type.clone()
    }

    fn identifier(&self) -> Value {
        self.entity_id.clone()
    }

    fn entity_ref(&self) -> EntityRef {
        self.clone()
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.entity_id {
            Value::String(id) => write!(f, "{}({id})", self.entity_type),
            other => write!(f, "{}({other})", self.entity_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Rocket {
        serial: u32,
    }

    impl Entity for Rocket {
        fn entity_type(&self) -> String {
            "Rocket".to_string()
        }

        fn identifier(&self) -> Value {
            json!(self.serial)
        }
    }

    #[test]
    fn domain_objects_produce_refs() {
        let rocket = Rocket { serial: 7 };
        assert_eq!(rocket.entity_ref(), EntityRef::new("Rocket", 7));
    }

    #[test]
    fn display_is_type_and_id() {
        assert_eq!(EntityRef::new("Rocket", "r-1").to_string(), "Rocket(r-1)");
        assert_eq!(EntityRef::new("Rocket", 3).to_string(), "Rocket(3)");
    }
}
