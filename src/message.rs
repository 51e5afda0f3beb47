//! Message envelopes and the `broadcast_routes` control payload.
//!
//! Envelopes carry either a base64 binary ILP packet (`ilp`) or a custom
//! control message (`custom`), never both.

use crate::address::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub ledger: String,
    pub from: Address,
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ilp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub custom: Option<CustomMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub ledger: String,
    pub from: Address,
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ilp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub custom: Option<CustomMessage>,
}

impl ResponseMessage {
    /// An empty acknowledgement addressed back to the request's sender.
    pub fn reply_to(request: &RequestMessage) -> Self {
        ResponseMessage {
            ledger: request.ledger.clone(),
            from: request.to.clone(),
            to: request.from.clone(),
            ilp: None,
            custom: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomMessage {
    pub method: String,
    pub data: Value,
}

/// Wire shape of a `broadcast_routes` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingUpdate {
    #[serde(default)]
    pub new_routes: Vec<NewRoute>,
    #[serde(default)]
    pub unreachable_through_me: Vec<String>,
    /// Milliseconds the receiver should suppress withdrawn routes.
    pub hold_down_time: u64,
    #[serde(default)]
    pub request_full_table: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRoute {
    pub source_ledger: String,
    pub source_account: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub destination_ledger: Option<String>,
    /// Seconds, as advertised on the wire.
    pub min_message_window: f64,
    #[serde(default)]
    pub paths: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub points: Option<Vec<(u64, u64)>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips_through_json() {
        let request = RequestMessage {
            ledger: "eur-ledger".to_string(),
            from: Address::new("eur-ledger.martin").unwrap(),
            to: Address::new("eur-ledger.connector").unwrap(),
            ilp: Some("AAAA".to_string()),
            custom: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "ledger": "eur-ledger",
                "from": "eur-ledger.martin",
                "to": "eur-ledger.connector",
                "ilp": "AAAA"
            })
        );
        let parsed: RequestMessage = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn routing_update_parses_wire_field_names() {
        let update: RoutingUpdate = serde_json::from_value(json!({
            "new_routes": [{
                "source_ledger": "eur-ledger",
                "source_account": "eur-ledger",
                "destination_ledger": "eur-ledger",
                "min_message_window": 1,
                "paths": [[]],
                "points": [[0, 0], [1000, 500]]
            }],
            "unreachable_through_me": ["old-prefix"],
            "hold_down_time": 45000,
            "request_full_table": true
        }))
        .unwrap();
        assert_eq!(update.new_routes.len(), 1);
        assert_eq!(update.new_routes[0].points.as_ref().unwrap().len(), 2);
        assert!(update.request_full_table);
        assert_eq!(update.unreachable_through_me, vec!["old-prefix"]);
    }
}
