//! Per-prefix, per-peer route records with hold-down tombstones and a
//! best-route cache.
//!
//! This is the one piece of mutable shared state in the connector. All
//! mutation goes through the transactional operations here; callers wrap
//! the table in `Arc<RwLock<_>>` and never hold the guard across an await.

use crate::address::Address;
use crate::curve::LiquidityCurve;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A route learned from a peer (or configured locally): `peer` can deliver
/// payments to `prefix` at the cost described by `curve`, `distance` hops
/// away, with `min_message_window` reserved for message propagation.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub peer: Address,
    pub prefix: String,
    pub distance: u32,
    /// Hop list as advertised by the peer; re-advertised with ourselves
    /// prepended.
    pub path: Vec<String>,
    pub curve: Option<LiquidityCurve>,
    pub min_message_window: Duration,
    /// Directly configured account route: exempt from split horizon and
    /// never held down.
    pub local: bool,
}

/// Hop-count policy: the distance of an advertised route is the length of
/// its first path, with a minimum of one hop.
pub fn path_distance(paths: &[Vec<String>]) -> u32 {
    std::cmp::max(paths.first().map(Vec::len).unwrap_or(0), 1) as u32
}

/// A normalized route update from one peer, ready to apply.
#[derive(Clone, Debug)]
pub struct RouteUpdate {
    pub new_routes: Vec<Route>,
    pub unreachable_through_me: Vec<String>,
    pub hold_down_time: Duration,
}

#[derive(Debug)]
struct RouteEntry {
    route: Route,
    /// `Some` marks a withdrawn route kept as a suppressed tombstone until
    /// the hold-down deadline.
    hold_down_until: Option<Instant>,
}

/// prefix -> peer -> route, plus a best-route cache. The best route for a
/// prefix is the non-withdrawn entry with minimal distance; peer identity
/// is only a deterministic tie-break.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: HashMap<String, HashMap<Address, RouteEntry>>,
    best: HashMap<String, Address>,
}

impl RoutingTable {
    pub fn new() -> Self {
        RoutingTable::default()
    }

    pub fn add_local_route(&mut self, route: Route) {
        debug_assert!(route.local);
        let prefix = route.prefix.clone();
        self.routes.entry(prefix.clone()).or_default().insert(
            route.peer.clone(),
            RouteEntry {
                route,
                hold_down_until: None,
            },
        );
        self.rebuild_best(&prefix);
    }

    /// Apply one peer's route update: new routes overwrite that peer's
    /// prior entries (clearing any tombstone), withdrawn prefixes become
    /// tombstones until `now + hold_down_time`.
    pub fn apply_update(&mut self, peer: &Address, update: RouteUpdate, now: Instant) {
        let mut changed_prefixes = Vec::new();

        for route in update.new_routes {
            let prefix = route.prefix.clone();
            self.routes.entry(prefix.clone()).or_default().insert(
                peer.clone(),
                RouteEntry {
                    route,
                    hold_down_until: None,
                },
            );
            changed_prefixes.push(prefix);
        }

        for prefix in update.unreachable_through_me {
            if let Some(peers) = self.routes.get_mut(&prefix) {
                if let Some(entry) = peers.get_mut(peer) {
                    if !entry.route.local {
                        entry.hold_down_until = Some(now + update.hold_down_time);
                        changed_prefixes.push(prefix);
                    }
                }
            }
        }

        for prefix in changed_prefixes {
            self.rebuild_best(&prefix);
        }
    }

    /// Drop tombstones whose hold-down deadline has passed. Prefixes left
    /// without entries disappear from the table entirely.
    pub fn purge_expired_hold_downs(&mut self, now: Instant) {
        let mut changed_prefixes = Vec::new();
        for (prefix, peers) in self.routes.iter_mut() {
            let before = peers.len();
            peers.retain(|_, entry| match entry.hold_down_until {
                Some(deadline) => deadline > now,
                None => true,
            });
            if peers.len() != before {
                changed_prefixes.push(prefix.clone());
            }
        }
        self.routes.retain(|_, peers| !peers.is_empty());
        for prefix in changed_prefixes {
            self.rebuild_best(&prefix);
        }
    }

    pub fn best_route(&self, prefix: &str) -> Option<&Route> {
        let peer = self.best.get(prefix)?;
        Some(&self.routes.get(prefix)?.get(peer)?.route)
    }

    /// Consistent snapshot of the best route per prefix.
    pub fn snapshot_best_routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self
            .best
            .keys()
            .filter_map(|prefix| self.best_route(prefix).cloned())
            .collect();
        routes.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        routes
    }

    /// Longest matching prefix for a destination address, among best routes.
    pub fn resolve(&self, destination: &Address) -> Option<&Route> {
        let prefix = self
            .best
            .keys()
            .filter(|prefix| destination.has_prefix(prefix))
            .max_by_key(|prefix| prefix.len())?;
        self.best_route(prefix)
    }

    fn rebuild_best(&mut self, prefix: &str) {
        let selected = self.routes.get(prefix).and_then(|peers| {
            peers
                .values()
                .filter(|entry| entry.hold_down_until.is_none())
                .min_by(|a, b| {
                    a.route
                        .distance
                        .cmp(&b.route.distance)
                        .then_with(|| a.route.peer.cmp(&b.route.peer))
                })
                .map(|entry| entry.route.peer.clone())
        });
        match selected {
            Some(peer) => {
                self.best.insert(prefix.to_string(), peer);
            }
            None => {
                self.best.remove(prefix);
            }
        }
    }
}
