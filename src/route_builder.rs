//! Quoting: composes the local spread curve with the resolved route's
//! liquidity curve to answer quote-by-source, quote-by-destination, and
//! full-curve liquidity requests.

use crate::address::Address;
use crate::config::ConnectorConfig;
use crate::curve::LiquidityCurve;
use crate::errors::ProtocolError;
use crate::routing_table::{Route, RoutingTable};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// An amount quote along a resolved route. `min_message_window` is the
/// path's total message-propagation budget as advertised by the peer; the
/// payment switch subtracts it from the inbound expiry when forwarding.
#[derive(Clone, Debug, PartialEq)]
pub struct AmountQuote {
    pub amount: u64,
    pub min_message_window: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LiquidityQuote {
    pub curve: LiquidityCurve,
    pub applies_to_prefix: String,
    pub min_message_window: Duration,
}

#[derive(Clone)]
pub struct RouteBuilder {
    config: ConnectorConfig,
    routing_table: Arc<RwLock<RoutingTable>>,
}

impl RouteBuilder {
    pub fn new(config: ConnectorConfig, routing_table: Arc<RwLock<RoutingTable>>) -> Self {
        RouteBuilder {
            config,
            routing_table,
        }
    }

    /// Longest-prefix match against the best-route table. The returned
    /// route is a clone taken under a single read lock, so one quote never
    /// mixes two route generations.
    pub fn resolve(&self, destination: &Address) -> Result<Route, ProtocolError> {
        self.routing_table
            .read()
            .resolve(destination)
            .cloned()
            .ok_or_else(|| ProtocolError::no_route(destination))
    }

    pub fn quote_liquidity(
        &self,
        source_account: &Address,
        destination: &Address,
    ) -> Result<LiquidityQuote, ProtocolError> {
        let route = self.resolve(destination)?;
        let curve = self.forwarding_curve(&route)?;
        trace!(
            "liquidity quote. source={} prefix={} window={}ms",
            source_account,
            route.prefix,
            route.min_message_window.as_millis()
        );
        Ok(LiquidityQuote {
            curve,
            applies_to_prefix: route.prefix,
            min_message_window: route.min_message_window,
        })
    }

    pub fn quote_by_source(
        &self,
        source_account: &Address,
        destination: &Address,
        source_amount: u64,
    ) -> Result<AmountQuote, ProtocolError> {
        let route = self.resolve(destination)?;
        self.quote_on_route(source_account, &route, source_amount)
    }

    pub fn quote_by_destination(
        &self,
        source_account: &Address,
        destination: &Address,
        destination_amount: u64,
    ) -> Result<AmountQuote, ProtocolError> {
        let route = self.resolve(destination)?;
        let curve = self.forwarding_curve(&route)?;
        let source_amount = curve.amount_reverse(destination_amount).ok_or_else(|| {
            ProtocolError::insufficient_liquidity(format!(
                "destination amount exceeds route liquidity. destinationAmount={}",
                destination_amount
            ))
        })?;
        trace!(
            "quote by destination. source={} destinationAmount={} sourceAmount={}",
            source_account,
            destination_amount,
            source_amount
        );
        Ok(AmountQuote {
            amount: source_amount,
            min_message_window: route.min_message_window,
        })
    }

    /// Forward quote on an already-resolved route. Used by the payment
    /// switch so route resolution and amount computation share one route
    /// snapshot.
    pub(crate) fn quote_on_route(
        &self,
        source_account: &Address,
        route: &Route,
        source_amount: u64,
    ) -> Result<AmountQuote, ProtocolError> {
        let curve = self.forwarding_curve(route)?;
        let destination_amount = curve.amount_at(source_amount);
        trace!(
            "quote by source. source={} sourceAmount={} destinationAmount={}",
            source_account,
            source_amount,
            destination_amount
        );
        Ok(AmountQuote {
            amount: destination_amount,
            min_message_window: route.min_message_window,
        })
    }

    /// The local hop's window, added on top of the quoted path window when
    /// sizing hold durations for the source.
    pub fn local_hop_window(&self) -> Duration {
        self.config.min_message_window_duration()
    }

    /// Local inbound spread applied first, then the route's forwarding
    /// curve.
    fn forwarding_curve(&self, route: &Route) -> Result<LiquidityCurve, ProtocolError> {
        let route_curve = route.curve.as_ref().ok_or_else(|| {
            ProtocolError::insufficient_liquidity(format!(
                "no liquidity curve for route. prefix={}",
                route.prefix
            ))
        })?;
        Ok(self.spread_curve().combine(route_curve))
    }

    fn spread_curve(&self) -> LiquidityCurve {
        let max = u64::max_value();
        let output = if self.config.spread > 0.0 {
            (max as f64 * (1.0 - self.config.spread)) as u64
        } else {
            max
        };
        LiquidityCurve::new(vec![(0, 0), (max, output)])
            .expect("spread curve points are always increasing")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing_table::RouteUpdate;
    use std::time::Instant;

    fn address(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn builder_with_route(spread: f64, curve: Option<LiquidityCurve>) -> RouteBuilder {
        let mut table = RoutingTable::new();
        table.apply_update(
            &address("eur-ledger"),
            RouteUpdate {
                new_routes: vec![Route {
                    peer: address("eur-ledger"),
                    prefix: "eur-ledger".to_string(),
                    distance: 1,
                    path: Vec::new(),
                    curve,
                    min_message_window: Duration::from_millis(1_000),
                    local: false,
                }],
                unreachable_through_me: Vec::new(),
                hold_down_time: Duration::from_millis(45_000),
            },
            Instant::now(),
        );
        let mut config = ConnectorConfig::new(address("example.connector"));
        config.spread = spread;
        RouteBuilder::new(config, Arc::new(RwLock::new(table)))
    }

    fn rate_curve() -> LiquidityCurve {
        LiquidityCurve::new(vec![(0, 0), (100_000, 94_215)]).unwrap()
    }

    #[test]
    fn fails_without_matching_prefix() {
        let builder = builder_with_route(0.0, Some(rate_curve()));
        let err = builder
            .quote_by_source(&address("usd-ledger.mark"), &address("jpy-ledger.taro"), 100)
            .unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::F02_UNREACHABLE);
    }

    #[test]
    fn quotes_by_source_through_route_curve() {
        let builder = builder_with_route(0.0, Some(rate_curve()));
        let quote = builder
            .quote_by_source(
                &address("usd-ledger.mark"),
                &address("eur-ledger.bob"),
                10_700,
            )
            .unwrap();
        assert_eq!(quote.amount, 10_081);
        assert_eq!(quote.min_message_window, Duration::from_millis(1_000));
    }

    #[test]
    fn quotes_by_destination_inverts_the_curve() {
        let builder = builder_with_route(0.0, Some(rate_curve()));
        let quote = builder
            .quote_by_destination(
                &address("usd-ledger.mark"),
                &address("eur-ledger.bob"),
                10_081,
            )
            .unwrap();
        let forward = builder
            .quote_by_source(
                &address("usd-ledger.mark"),
                &address("eur-ledger.bob"),
                quote.amount,
            )
            .unwrap();
        assert!(forward.amount >= 10_081);
    }

    #[test]
    fn destination_beyond_liquidity_is_rejected() {
        let builder = builder_with_route(0.0, Some(rate_curve()));
        let err = builder
            .quote_by_destination(
                &address("usd-ledger.mark"),
                &address("eur-ledger.bob"),
                94_216,
            )
            .unwrap_err();
        assert_eq!(
            err.code,
            crate::errors::ErrorCode::T04_INSUFFICIENT_LIQUIDITY
        );
    }

    #[test]
    fn route_without_curve_cannot_be_quoted() {
        let builder = builder_with_route(0.0, None);
        let err = builder
            .quote_by_source(&address("usd-ledger.mark"), &address("eur-ledger.bob"), 100)
            .unwrap_err();
        assert_eq!(
            err.code,
            crate::errors::ErrorCode::T04_INSUFFICIENT_LIQUIDITY
        );
    }

    #[test]
    fn spread_reduces_destination_amount() {
        let no_spread = builder_with_route(0.0, Some(rate_curve()));
        let with_spread = builder_with_route(0.01, Some(rate_curve()));
        let base = no_spread
            .quote_by_source(
                &address("usd-ledger.mark"),
                &address("eur-ledger.bob"),
                10_700,
            )
            .unwrap();
        let reduced = with_spread
            .quote_by_source(
                &address("usd-ledger.mark"),
                &address("eur-ledger.bob"),
                10_700,
            )
            .unwrap();
        assert!(reduced.amount < base.amount);
    }

    #[test]
    fn liquidity_quote_exposes_curve_and_prefix() {
        let builder = builder_with_route(0.0, Some(rate_curve()));
        let quote = builder
            .quote_liquidity(&address("usd-ledger.mark"), &address("eur-ledger.bob"))
            .unwrap();
        assert_eq!(quote.applies_to_prefix, "eur-ledger");
        assert_eq!(quote.curve.amount_at(10_700), 10_081);
    }
}
