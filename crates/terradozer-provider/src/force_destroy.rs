//! Force-destroy state patch
//!
//! Some resource types refuse deletion while they still hold content or have
//! dependents (a non-empty S3 bucket, an IAM role with attached policies).
//! Their safety switches are flipped on locally before the delete request.

use crate::schema::{AttributeType, SchemaBlock};
use crate::value::Value;

/// Attribute names that gate deletion of non-empty or referenced objects
pub const FORCE_DESTROY_ATTRIBUTES: &[&str] = &["force_destroy", "force_detach_policies"];

/// Set every boolean force-destroy attribute of `state` to `true`.
///
/// An attribute qualifies when its value is a bool, or when it is null and the
/// resource schema declares it as `bool`. Everything else is returned as is,
/// including non-object payloads.
pub fn enable_force_destroy_attributes(state: Value, schema: Option<&SchemaBlock>) -> Value {
    let Value::Map(mut attributes) = state else {
        return state;
    };

    for name in FORCE_DESTROY_ATTRIBUTES {
        let Some(value) = attributes.get_mut(*name) else {
            continue;
        };
        let declared_bool =
            schema.and_then(|s| s.attribute_type(name)) == Some(&AttributeType::Bool);

        match value {
            Value::Bool(_) => *value = Value::Bool(true),
            Value::Null if declared_bool => *value = Value::Bool(true),
            _ => {}
        }
    }

    Value::Map(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// force_destroy is switched on
    #[test]
    fn test_sets_force_destroy_to_true() {
        let state = Value::object([
            ("id", Value::from("my-bucket")),
            ("force_destroy", Value::from(false)),
            ("acl", Value::from("private")),
        ]);

        let patched = enable_force_destroy_attributes(state, None);

        assert_eq!(
            patched,
            Value::object([
                ("id", Value::from("my-bucket")),
                ("force_destroy", Value::from(true)),
                ("acl", Value::from("private")),
            ])
        );
    }

    /// force_detach_policies is switched on
    #[test]
    fn test_sets_force_detach_policies() {
        let state = Value::object([
            ("id", Value::from("role")),
            ("force_detach_policies", Value::from(false)),
        ]);
        let patched = enable_force_destroy_attributes(state, None);
        assert_eq!(patched.get("force_detach_policies"), Some(&Value::Bool(true)));
    }

    /// States without force flags pass through
    #[test]
    fn test_state_without_flags_is_unchanged() {
        let state = Value::object([
            ("id", Value::from("i-123")),
            ("tags", Value::object([("Name", "web")])),
            ("destroy", Value::from(false)),
        ]);
        assert_eq!(enable_force_destroy_attributes(state.clone(), None), state);
    }

    /// A flag that is not a bool is not touched
    #[test]
    fn test_non_bool_flag_is_left_alone() {
        let state = Value::object([
            ("id", Value::from("x")),
            ("force_destroy", Value::from("yes")),
        ]);
        assert_eq!(enable_force_destroy_attributes(state.clone(), None), state);
    }

    /// A null flag is set when the schema says it is a bool
    #[test]
    fn test_null_flag_uses_schema_type() {
        let state = Value::object([("id", Value::from("b")), ("force_destroy", Value::Null)]);

        // without a schema the type of a null is unknown
        assert_eq!(enable_force_destroy_attributes(state.clone(), None), state);

        let schema = SchemaBlock::new()
            .with_attribute("id", AttributeType::String)
            .with_attribute("force_destroy", AttributeType::Bool);
        let patched = enable_force_destroy_attributes(state, Some(&schema));
        assert_eq!(patched.get("force_destroy"), Some(&Value::Bool(true)));
    }

    /// A null state stays null
    #[test]
    fn test_null_state_passes_through() {
        assert_eq!(enable_force_destroy_attributes(Value::Null, None), Value::Null);
    }
}
