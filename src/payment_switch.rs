//! Prepare forwarding: quote the outgoing amount, shorten the expiry by the
//! route's message window, relay to the next hop, and settle on fulfill.

use crate::account::Accounts;
use crate::address::Address;
use crate::backend::{Backend, PaymentNotification};
use crate::config::ConnectorConfig;
use crate::errors::ProtocolError;
use crate::packet::{Fulfill, Packet, Prepare, Reject};
use crate::route_builder::RouteBuilder;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Outcome of forwarding a single Prepare. A `Reject` is a normal protocol
/// outcome, not a host fault.
pub type IlpResult = Result<Fulfill, Reject>;

#[derive(Clone)]
pub struct PaymentSwitch {
    config: ConnectorConfig,
    accounts: Accounts,
    route_builder: RouteBuilder,
    backend: Arc<dyn Backend>,
}

impl PaymentSwitch {
    pub fn new(
        config: ConnectorConfig,
        accounts: Accounts,
        route_builder: RouteBuilder,
        backend: Arc<dyn Backend>,
    ) -> Self {
        PaymentSwitch {
            config,
            accounts,
            route_builder,
            backend,
        }
    }

    /// Forward one Prepare along its best route. Locally raised rejects
    /// carry an empty hop chain; a reject relayed from downstream gets our
    /// own address appended.
    pub async fn handle_prepare(&self, source_account: Address, prepare: Prepare) -> IlpResult {
        match self.forward(&source_account, &prepare).await {
            Ok(fulfill) => Ok(fulfill),
            Err(Outcome::Local(err)) => {
                debug!("rejecting prepare. source={} error={}", source_account, err);
                Err(Reject::from(err))
            }
            Err(Outcome::Relayed(mut reject)) => {
                reject.forwarded_by.push(self.config.address.clone());
                Err(reject)
            }
        }
    }

    async fn forward(
        &self,
        source_account: &Address,
        prepare: &Prepare,
    ) -> Result<Fulfill, Outcome> {
        let now = SystemTime::now();
        if prepare.expires_at <= now {
            return Err(ProtocolError::expired("payment is already expired").into());
        }

        let route = self.route_builder.resolve(&prepare.destination)?;
        let quote = self
            .route_builder
            .quote_on_route(source_account, &route, prepare.amount)?;

        // Shorten the expiry by the route's window so the next hop has to
        // answer before our own obligation comes due.
        let outgoing_expiry = prepare.expires_at - quote.min_message_window;
        let budget = outgoing_expiry
            .duration_since(now)
            .map_err(|_| ProtocolError::insufficient_timeout("transfer expiry is too close"))?;
        if budget == Duration::from_millis(0) {
            return Err(ProtocolError::insufficient_timeout("transfer expiry is too close").into());
        }

        let plugin = self.accounts.get(&route.peer).ok_or_else(|| {
            ProtocolError::peer_unreachable(format!("no connection to peer. peer={}", route.peer))
        })?;

        let payment = PaymentContext {
            source_account: source_account.clone(),
            source_amount: prepare.amount,
            destination_account: prepare.destination.clone(),
            destination_amount: quote.amount,
            condition: prepare.execution_condition,
            expires_at: outgoing_expiry,
            data: prepare.data.clone(),
        };
        debug!(
            "forwarding prepare. destination={} sourceAmount={} destinationAmount={} peer={}",
            payment.destination_account, payment.source_amount, payment.destination_amount,
            route.peer
        );

        let response = tokio::time::timeout(
            budget,
            plugin.send_data(Packet::Prepare(payment.outgoing_prepare()).encode()),
        )
        .await
        .map_err(|_| ProtocolError::expired("next hop did not respond before expiry"))?
        .map_err(|err| {
            ProtocolError::peer_unreachable(format!("failed to send to peer: {}", err))
        })?;

        match Packet::decode(&response) {
            Ok(Packet::Fulfill(fulfill)) => {
                if payment.expires_at <= SystemTime::now() {
                    // Too late to pass upstream, so the fulfillment does not
                    // obligate us to settle.
                    return Err(
                        ProtocolError::expired("fulfillment arrived after expiry").into(),
                    );
                }
                self.settle(&payment, &route.peer, &plugin).await;
                Ok(fulfill)
            }
            Ok(Packet::Reject(reject)) => Err(Outcome::Relayed(reject)),
            Ok(_) => Err(ProtocolError::invalid_body("Packet has unexpected type").into()),
            Err(err) => {
                Err(ProtocolError::invalid_body(format!("undecodable response: {}", err)).into())
            }
        }
    }

    /// Settlement and backend notification are best effort once a valid
    /// fulfillment is in hand; failures are logged and the fulfill still
    /// propagates upstream.
    async fn settle(
        &self,
        payment: &PaymentContext,
        peer: &Address,
        plugin: &Arc<dyn crate::account::AccountPlugin>,
    ) {
        if let Err(err) = plugin.send_money(payment.destination_amount).await {
            warn!("failed to settle with peer. peer={} error={}", peer, err);
        }
        if let Err(err) = self.backend.submit_payment(payment.notification()).await {
            warn!("failed to notify backend of payment: {}", err);
        }
    }
}

/// State for one forward-then-await-response cycle. Lives only on the
/// stack of the handling task; nothing about an in-flight payment is
/// persisted.
struct PaymentContext {
    source_account: Address,
    source_amount: u64,
    destination_account: Address,
    destination_amount: u64,
    condition: [u8; 32],
    expires_at: SystemTime,
    data: Bytes,
}

impl PaymentContext {
    /// The outbound Prepare: quoted amount and shortened expiry, with the
    /// condition and end-to-end data passed through byte for byte.
    fn outgoing_prepare(&self) -> Prepare {
        Prepare {
            amount: self.destination_amount,
            destination: self.destination_account.clone(),
            execution_condition: self.condition,
            expires_at: self.expires_at,
            data: self.data.clone(),
        }
    }

    fn notification(&self) -> PaymentNotification {
        PaymentNotification {
            source_account: self.source_account.clone(),
            source_amount: self.source_amount.to_string(),
            destination_account: self.destination_account.clone(),
            destination_amount: self.destination_amount.to_string(),
        }
    }
}

enum Outcome {
    Local(ProtocolError),
    Relayed(Reject),
}

impl From<ProtocolError> for Outcome {
    fn from(err: ProtocolError) -> Self {
        Outcome::Local(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::LiquidityCurve;
    use crate::errors::ErrorCode;
    use crate::routing_table::{Route, RouteUpdate, RoutingTable};
    use crate::test_helpers::{test_config, TestBackend, TestPlugin};
    use parking_lot::RwLock;
    use std::time::Instant;

    fn address(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn switch_with_peer() -> (PaymentSwitch, Arc<TestPlugin>, Arc<TestBackend>) {
        let mut table = RoutingTable::new();
        table.apply_update(
            &address("eur-ledger"),
            RouteUpdate {
                new_routes: vec![Route {
                    peer: address("eur-ledger"),
                    prefix: "eur-ledger".to_string(),
                    distance: 1,
                    path: Vec::new(),
                    curve: Some(LiquidityCurve::new(vec![(0, 0), (100_000, 94_215)]).unwrap()),
                    min_message_window: Duration::from_millis(1_000),
                    local: false,
                }],
                unreachable_through_me: Vec::new(),
                hold_down_time: Duration::from_millis(45_000),
            },
            Instant::now(),
        );
        let routing_table = Arc::new(RwLock::new(table));
        let accounts = Accounts::new();
        let plugin = TestPlugin::new("eur-ledger");
        accounts.add(plugin.clone());
        let backend = Arc::new(TestBackend::default());
        let switch = PaymentSwitch::new(
            test_config(),
            accounts,
            RouteBuilder::new(test_config(), routing_table),
            backend.clone(),
        );
        (switch, plugin, backend)
    }

    fn prepare(amount: u64, expires_in: Duration) -> Prepare {
        Prepare {
            amount,
            destination: address("eur-ledger.bob"),
            execution_condition: [7; 32],
            expires_at: SystemTime::now() + expires_in,
            data: Bytes::from(&b"ipr"[..]),
        }
    }

    fn fulfill_bytes() -> Bytes {
        Packet::Fulfill(Fulfill {
            fulfillment: [9; 32],
            data: Bytes::new(),
        })
        .encode()
    }

    #[tokio::test]
    async fn forwards_quoted_amount_with_shortened_expiry() {
        let (switch, plugin, backend) = switch_with_peer();
        plugin.queue_response(fulfill_bytes());

        let incoming = prepare(10_700, Duration::from_secs(5));
        let fulfill = switch
            .handle_prepare(address("usd-ledger.mark"), incoming.clone())
            .await
            .unwrap();
        assert_eq!(fulfill.fulfillment, [9; 32]);

        let sent = plugin.sent_packets();
        let forwarded = match &sent[0] {
            Packet::Prepare(prepare) => prepare.clone(),
            other => panic!("expected prepare, got {:?}", other),
        };
        assert_eq!(forwarded.amount, 10_081);
        assert_eq!(forwarded.destination, incoming.destination);
        assert_eq!(forwarded.execution_condition, incoming.execution_condition);
        // the 1s route window is carved out of the inbound expiry
        assert_eq!(
            forwarded.expires_at,
            incoming.expires_at - Duration::from_secs(1)
        );

        assert_eq!(plugin.settled(), vec![10_081]);
        let payments = backend.payments();
        assert_eq!(payments[0].source_amount, "10700");
        assert_eq!(payments[0].destination_amount, "10081");
        assert_eq!(payments[0].source_account, address("usd-ledger.mark"));
        assert_eq!(payments[0].destination_account, address("eur-ledger.bob"));
    }

    #[tokio::test]
    async fn rejects_expired_prepare_without_forwarding() {
        let (switch, plugin, _) = switch_with_peer();
        let mut incoming = prepare(10_700, Duration::from_secs(5));
        incoming.expires_at = SystemTime::now() - Duration::from_secs(1);
        let reject = switch
            .handle_prepare(address("usd-ledger.mark"), incoming)
            .await
            .unwrap_err();
        assert_eq!(reject.code, ErrorCode::R00_TRANSFER_TIMED_OUT);
        assert!(reject.forwarded_by.is_empty());
        assert!(plugin.sent_packets().is_empty());
    }

    #[tokio::test]
    async fn rejects_when_expiry_leaves_no_room_for_the_route_window() {
        let (switch, plugin, _) = switch_with_peer();
        let incoming = prepare(10_700, Duration::from_millis(500));
        let reject = switch
            .handle_prepare(address("usd-ledger.mark"), incoming)
            .await
            .unwrap_err();
        assert_eq!(reject.code, ErrorCode::R02_INSUFFICIENT_TIMEOUT);
        assert!(plugin.sent_packets().is_empty());
    }

    #[tokio::test]
    async fn rejects_unroutable_destination() {
        let (switch, _, _) = switch_with_peer();
        let mut incoming = prepare(100, Duration::from_secs(5));
        incoming.destination = address("jpy-ledger.taro");
        let reject = switch
            .handle_prepare(address("usd-ledger.mark"), incoming)
            .await
            .unwrap_err();
        assert_eq!(reject.code, ErrorCode::F02_UNREACHABLE);
        assert!(reject.forwarded_by.is_empty());
    }

    #[tokio::test]
    async fn appends_own_address_to_relayed_rejects() {
        let (switch, plugin, backend) = switch_with_peer();
        plugin.queue_response(
            Packet::Reject(Reject {
                code: ErrorCode::F05_WRONG_CONDITION,
                message: "condition mismatch".to_string(),
                forwarded_by: vec![address("eur-ledger")],
                data: Bytes::new(),
            })
            .encode(),
        );

        let reject = switch
            .handle_prepare(
                address("usd-ledger.mark"),
                prepare(10_700, Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert_eq!(reject.code, ErrorCode::F05_WRONG_CONDITION);
        assert_eq!(
            reject.forwarded_by,
            vec![address("eur-ledger"), address("example.connector")]
        );
        assert!(plugin.settled().is_empty());
        assert!(backend.payments().is_empty());
    }

    #[tokio::test]
    async fn times_out_when_next_hop_stalls() {
        let (switch, plugin, _) = switch_with_peer();
        plugin.set_response_delay(Duration::from_millis(500));
        plugin.queue_response(fulfill_bytes());

        // 150ms of forwarding budget after the 1s window is carved out
        let incoming = prepare(10_700, Duration::from_millis(1_150));
        let reject = switch
            .handle_prepare(address("usd-ledger.mark"), incoming)
            .await
            .unwrap_err();
        assert_eq!(reject.code, ErrorCode::R00_TRANSFER_TIMED_OUT);
        assert!(plugin.settled().is_empty());
    }

    #[tokio::test]
    async fn maps_send_failures_to_peer_unreachable() {
        let (switch, plugin, _) = switch_with_peer();
        plugin.queue_error("connection dropped");
        let reject = switch
            .handle_prepare(
                address("usd-ledger.mark"),
                prepare(10_700, Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert_eq!(reject.code, ErrorCode::T01_PEER_UNREACHABLE);
    }

    #[tokio::test]
    async fn rejects_unexpected_response_packets() {
        let (switch, plugin, _) = switch_with_peer();
        plugin.queue_response(
            Packet::BySourceResponse(crate::packet::QuoteBySourceResponse {
                destination_amount: 1,
                source_hold_duration: 1,
            })
            .encode(),
        );
        let reject = switch
            .handle_prepare(
                address("usd-ledger.mark"),
                prepare(10_700, Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert_eq!(reject.code, ErrorCode::F01_INVALID_PACKET);
    }
}
