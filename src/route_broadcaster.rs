//! Distance-vector route gossip: ingesting `broadcast_routes` updates from
//! peers and periodically advertising our best routes to them.

use crate::account::Accounts;
use crate::address::Address;
use crate::config::ConnectorConfig;
use crate::curve::LiquidityCurve;
use crate::errors::ConnectorError;
use crate::message::{CustomMessage, NewRoute, RequestMessage, RoutingUpdate};
use crate::routing_table::{path_distance, Route, RouteUpdate, RoutingTable};
use crate::validate::Validator;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

pub const BROADCAST_ROUTES_METHOD: &str = "broadcast_routes";

#[derive(Clone)]
pub struct RouteBroadcaster {
    config: ConnectorConfig,
    accounts: Accounts,
    validator: Arc<dyn Validator>,
    routing_table: Arc<RwLock<RoutingTable>>,
    /// Prefixes included in the last periodic broadcast. A prefix that has
    /// since dropped out of the best-route table is withdrawn from peers in
    /// the next broadcast.
    advertised: Arc<Mutex<HashSet<String>>>,
}

impl RouteBroadcaster {
    pub fn new(
        config: ConnectorConfig,
        accounts: Accounts,
        validator: Arc<dyn Validator>,
        routing_table: Arc<RwLock<RoutingTable>>,
    ) -> Self {
        RouteBroadcaster {
            config,
            accounts,
            validator,
            routing_table,
            advertised: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Register a directly configured account route. Local routes are
    /// advertised to every peer and never withdrawn by gossip.
    pub fn add_local_route(&self, route: Route) {
        self.routing_table.write().add_local_route(route);
    }

    /// Ingest one peer's `broadcast_routes` payload. A validation failure
    /// (including a malformed curve) drops the update in its entirety and
    /// surfaces to the caller; nothing is partially applied.
    pub async fn receive_routes(
        &self,
        payload: &Value,
        sender: Address,
    ) -> Result<(), ConnectorError> {
        self.validator.validate("RoutingUpdate", payload)?;
        let update: RoutingUpdate = serde_json::from_value(payload.clone())?;
        debug!("received routes. sender={}", sender);

        let mut new_routes = Vec::new();
        for entry in update.new_routes {
            // A route advertised on behalf of a ledger the sender does not
            // itself own is not trustworthy.
            if entry.source_ledger != entry.source_account {
                debug!(
                    "ignoring spoofed route. sourceLedger={} sourceAccount={}",
                    entry.source_ledger, entry.source_account
                );
                continue;
            }
            let prefix = match entry.target_prefix.or(entry.destination_ledger) {
                Some(prefix) => prefix,
                None => {
                    warn!("ignoring route entry without a prefix. sender={}", sender);
                    continue;
                }
            };
            let curve = match entry.points {
                Some(points) => {
                    Some(
                        LiquidityCurve::new(points).map_err(|err| ConnectorError::Validation {
                            schema: "RoutingUpdate".to_string(),
                            reason: err.to_string(),
                        })?,
                    )
                }
                None => None,
            };
            new_routes.push(Route {
                peer: sender.clone(),
                prefix,
                distance: path_distance(&entry.paths),
                path: entry.paths.first().cloned().unwrap_or_default(),
                curve,
                min_message_window: Duration::from_millis(
                    (entry.min_message_window * 1000.0) as u64,
                ),
                local: false,
            });
        }

        let normalized = RouteUpdate {
            new_routes,
            unreachable_through_me: update.unreachable_through_me,
            hold_down_time: Duration::from_millis(update.hold_down_time),
        };
        self.routing_table
            .write()
            .apply_update(&sender, normalized, Instant::now());

        if update.request_full_table {
            // out of band from the periodic timer
            let snapshot = self.routing_table.read().snapshot_best_routes();
            self.send_route_update_to(&sender, &snapshot, &[]).await;
        }
        Ok(())
    }

    /// Periodic distribution loop: send each peer the best-route table
    /// (minus split-horizon exclusions) plus withdrawals for prefixes that
    /// dropped out since the previous broadcast.
    pub async fn start_broadcast_interval(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.route_broadcast_interval));
        loop {
            interval.tick().await;
            self.broadcast_routes().await;
        }
    }

    /// Hold-down purging runs on its own schedule so table cleanup is
    /// never blocked behind in-flight broadcasts.
    pub async fn start_hold_down_purge_interval(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.route_cleanup_interval));
        loop {
            interval.tick().await;
            self.purge_hold_downs();
        }
    }

    pub fn purge_hold_downs(&self) {
        self.routing_table
            .write()
            .purge_expired_hold_downs(Instant::now());
    }

    pub async fn broadcast_routes(&self) {
        let snapshot = self.routing_table.read().snapshot_best_routes();
        let current: HashSet<String> = snapshot.iter().map(|route| route.prefix.clone()).collect();
        let withdrawn = {
            let mut advertised = self.advertised.lock();
            let mut withdrawn: Vec<String> = advertised.difference(&current).cloned().collect();
            withdrawn.sort_unstable();
            *advertised = current;
            withdrawn
        };
        for peer in self.accounts.addresses() {
            self.send_route_update_to(&peer, &snapshot, &withdrawn).await;
        }
    }

    async fn send_route_update_to(&self, peer: &Address, routes: &[Route], withdrawn: &[String]) {
        let new_routes: Vec<NewRoute> = routes
            .iter()
            // split horizon: never re-advertise a route back to the peer it
            // was learned from; local routes always go out
            .filter(|route| route.local || route.peer != *peer)
            .map(|route| self.outbound_route(route.clone()))
            .collect();
        let update = RoutingUpdate {
            new_routes,
            unreachable_through_me: withdrawn.to_vec(),
            hold_down_time: self.config.hold_down_time,
            request_full_table: false,
        };
        let data = match serde_json::to_value(&update) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to serialize route update: {}", err);
                return;
            }
        };
        let message = RequestMessage {
            ledger: peer.to_string(),
            from: self.config.address.clone(),
            to: peer.clone(),
            ilp: None,
            custom: Some(CustomMessage {
                method: BROADCAST_ROUTES_METHOD.to_string(),
                data,
            }),
        };
        let plugin = match self.accounts.get(peer) {
            Some(plugin) => plugin,
            None => {
                warn!("no plugin for peer. peer={}", peer);
                return;
            }
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(err) => {
                error!("failed to serialize broadcast message: {}", err);
                return;
            }
        };
        if let Err(err) = plugin.send_data(Bytes::from(payload)).await {
            warn!("failed to broadcast routes. peer={} error={}", peer, err);
        }
    }

    fn outbound_route(&self, route: Route) -> NewRoute {
        let mut path = Vec::with_capacity(route.path.len() + 1);
        path.push(self.config.address.to_string());
        path.extend(route.path);
        let window = route.min_message_window + self.config.min_message_window_duration();
        NewRoute {
            source_ledger: self.config.address.to_string(),
            source_account: self.config.address.to_string(),
            target_prefix: Some(route.prefix),
            destination_ledger: None,
            min_message_window: window.as_millis() as f64 / 1000.0,
            paths: vec![path],
            points: route.curve.map(|curve| curve.points().to_vec()),
        }
    }
}
