//! Schema validation boundary: `validate(schema, payload)` either passes or
//! fails the whole payload. A structural validator for the control-plane
//! schemas is provided; hosts may plug in a full JSON-schema validator.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid {schema}: {reason}")]
pub struct ValidationError {
    pub schema: String,
    pub reason: String,
}

impl ValidationError {
    fn new(schema: &str, reason: impl Into<String>) -> Self {
        ValidationError {
            schema: schema.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for crate::errors::ConnectorError {
    fn from(err: ValidationError) -> Self {
        crate::errors::ConnectorError::Validation {
            schema: err.schema,
            reason: err.reason,
        }
    }
}

pub trait Validator: Send + Sync {
    fn validate(&self, schema: &str, payload: &Value) -> Result<(), ValidationError>;
}

/// Structural checks for the schemas the connector consumes.
#[derive(Clone, Debug, Default)]
pub struct StructuralValidator;

impl Validator for StructuralValidator {
    fn validate(&self, schema: &str, payload: &Value) -> Result<(), ValidationError> {
        match schema {
            "RoutingUpdate" => validate_routing_update(payload),
            other => Err(ValidationError::new(other, "unknown schema")),
        }
    }
}

fn validate_routing_update(payload: &Value) -> Result<(), ValidationError> {
    const SCHEMA: &str = "RoutingUpdate";
    let object = payload
        .as_object()
        .ok_or_else(|| ValidationError::new(SCHEMA, "payload must be an object"))?;

    let new_routes = object
        .get("new_routes")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::new(SCHEMA, "new_routes must be an array"))?;
    for entry in new_routes {
        let route = entry
            .as_object()
            .ok_or_else(|| ValidationError::new(SCHEMA, "route entries must be objects"))?;
        for field in &["source_ledger", "source_account"] {
            if !route.get(*field).map(Value::is_string).unwrap_or(false) {
                return Err(ValidationError::new(
                    SCHEMA,
                    format!("route entry missing {}", field),
                ));
            }
        }
        if !route
            .get("min_message_window")
            .map(Value::is_number)
            .unwrap_or(false)
        {
            return Err(ValidationError::new(
                SCHEMA,
                "route entry missing min_message_window",
            ));
        }
    }

    if !object
        .get("unreachable_through_me")
        .map(Value::is_array)
        .unwrap_or(false)
    {
        return Err(ValidationError::new(
            SCHEMA,
            "unreachable_through_me must be an array",
        ));
    }
    if !object
        .get("hold_down_time")
        .map(Value::is_number)
        .unwrap_or(false)
    {
        return Err(ValidationError::new(SCHEMA, "hold_down_time must be a number"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_update() {
        let payload = json!({
            "new_routes": [{
                "source_ledger": "eur-ledger",
                "source_account": "eur-ledger",
                "target_prefix": "eur-ledger",
                "min_message_window": 1,
                "paths": [[]]
            }],
            "unreachable_through_me": [],
            "hold_down_time": 45000,
            "request_full_table": false
        });
        assert!(StructuralValidator.validate("RoutingUpdate", &payload).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let payload = json!({ "new_routes": [] });
        let err = StructuralValidator
            .validate("RoutingUpdate", &payload)
            .unwrap_err();
        assert!(err.reason.contains("unreachable_through_me"));
    }

    #[test]
    fn rejects_unknown_schema() {
        assert!(StructuralValidator
            .validate("SomethingElse", &serde_json::Value::Null)
            .is_err());
    }
}
