use crate::address::Address;
use serde::Deserialize;
use std::time::Duration;

/// Connector configuration. Only the connector's own address is required;
/// the timing knobs default to the values the routing protocol expects.
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectorConfig {
    /// The connector's own ILP address, used to stamp outgoing
    /// advertisements and error hop chains.
    pub address: Address,
    /// Interval between route broadcasts to peers, in milliseconds.
    #[serde(default = "default_route_broadcast_interval")]
    pub route_broadcast_interval: u64,
    /// Interval between hold-down purge sweeps, in milliseconds.
    #[serde(default = "default_route_cleanup_interval")]
    pub route_cleanup_interval: u64,
    /// Hold-down time advertised with withdrawals, in milliseconds.
    #[serde(default = "default_hold_down_time")]
    pub hold_down_time: u64,
    /// Time budget reserved for the local hop, in milliseconds.
    #[serde(default = "default_min_message_window")]
    pub min_message_window: u64,
    /// Fraction of the exchange rate kept as the connector's margin.
    #[serde(default)]
    pub spread: f64,
}

fn default_route_broadcast_interval() -> u64 {
    30_000
}

fn default_route_cleanup_interval() -> u64 {
    1_000
}

fn default_hold_down_time() -> u64 {
    45_000
}

fn default_min_message_window() -> u64 {
    1_000
}

impl ConnectorConfig {
    pub fn new(address: Address) -> Self {
        ConnectorConfig {
            address,
            route_broadcast_interval: default_route_broadcast_interval(),
            route_cleanup_interval: default_route_cleanup_interval(),
            hold_down_time: default_hold_down_time(),
            min_message_window: default_min_message_window(),
            spread: 0.0,
        }
    }

    pub fn min_message_window_duration(&self) -> Duration {
        Duration::from_millis(self.min_message_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: ConnectorConfig =
            serde_json::from_str(r#"{"address": "example.connector"}"#).unwrap();
        assert_eq!(config.route_broadcast_interval, 30_000);
        assert_eq!(config.route_cleanup_interval, 1_000);
        assert_eq!(config.hold_down_time, 45_000);
        assert_eq!(config.min_message_window, 1_000);
        assert_eq!(config.spread, 0.0);
    }
}
