//! Inbound message dispatch.
//!
//! Every request a plugin receives lands here: binary ILP packets (quoting
//! and Prepare) arrive base64-encoded in the `ilp` field, control messages
//! in the `custom` field. Protocol failures become Reject packets in the
//! response; host faults propagate as errors to the plugin.

use crate::address::Address;
use crate::errors::{ConnectorError, ProtocolError};
use crate::message::{RequestMessage, ResponseMessage};
use crate::packet::{
    Packet, Prepare, QuoteByDestinationResponse, QuoteBySourceResponse, QuoteLiquidityResponse,
    Reject,
};
use crate::payment_switch::PaymentSwitch;
use crate::route_broadcaster::{RouteBroadcaster, BROADCAST_ROUTES_METHOD};
use crate::route_builder::RouteBuilder;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// How long a liquidity quote remains usable by the source.
const QUOTE_EXPIRY: Duration = Duration::from_secs(45);

pub struct MessageRouter {
    route_builder: RouteBuilder,
    payment_switch: PaymentSwitch,
    broadcaster: RouteBroadcaster,
}

impl MessageRouter {
    pub fn new(
        route_builder: RouteBuilder,
        payment_switch: PaymentSwitch,
        broadcaster: RouteBroadcaster,
    ) -> Self {
        MessageRouter {
            route_builder,
            payment_switch,
            broadcaster,
        }
    }

    /// Adapt this router into the callback shape plugins expect.
    pub fn request_handler(self: &Arc<Self>) -> crate::account::RequestHandler {
        let router = self.clone();
        Arc::new(move |request| {
            let router = router.clone();
            Box::pin(async move { router.handle_request(request).await })
        })
    }

    pub async fn handle_request(
        &self,
        request: RequestMessage,
    ) -> Result<Option<ResponseMessage>, ConnectorError> {
        if let Some(ilp) = &request.ilp {
            let packet = self.handle_packet(&request, ilp).await?;
            return Ok(Some(ResponseMessage {
                ledger: request.ledger.clone(),
                from: request.to.clone(),
                to: request.from.clone(),
                ilp: Some(base64::encode(&packet.encode())),
                custom: None,
            }));
        }
        if let Some(custom) = &request.custom {
            if custom.method == BROADCAST_ROUTES_METHOD {
                self.broadcaster
                    .receive_routes(&custom.data, request.from.clone())
                    .await?;
                return Ok(Some(ResponseMessage::reply_to(&request)));
            }
            warn!("ignoring unknown request method: {}", custom.method);
            return Ok(None);
        }
        Err(ConnectorError::MalformedEnvelope)
    }

    async fn handle_packet(
        &self,
        request: &RequestMessage,
        ilp: &str,
    ) -> Result<Packet, ConnectorError> {
        let raw = base64::decode(ilp)
            .map_err(|err| ConnectorError::InvalidPacket(err.to_string()))?;
        let packet =
            Packet::decode(&raw).map_err(|err| ConnectorError::InvalidPacket(err.to_string()))?;
        debug!(
            "handling packet. type={:?} from={}",
            packet.packet_type(),
            request.from
        );

        let outcome = match packet {
            Packet::LiquidityRequest(quote_request) => self
                .route_builder
                .quote_liquidity(&request.from, &quote_request.destination_account)
                .map(|quote| {
                    Packet::LiquidityResponse(QuoteLiquidityResponse {
                        source_hold_duration: self.source_hold_duration(
                            quote_request.destination_hold_duration,
                            quote.min_message_window,
                        ),
                        curve: quote.curve,
                        applies_to_prefix: quote.applies_to_prefix,
                        expires_at: SystemTime::now() + QUOTE_EXPIRY,
                    })
                }),
            Packet::BySourceRequest(quote_request) => self
                .route_builder
                .quote_by_source(
                    &request.from,
                    &quote_request.destination_account,
                    quote_request.source_amount,
                )
                .map(|quote| {
                    Packet::BySourceResponse(QuoteBySourceResponse {
                        destination_amount: quote.amount,
                        source_hold_duration: self.source_hold_duration(
                            quote_request.destination_hold_duration,
                            quote.min_message_window,
                        ),
                    })
                }),
            Packet::ByDestinationRequest(quote_request) => self
                .route_builder
                .quote_by_destination(
                    &request.from,
                    &quote_request.destination_account,
                    quote_request.destination_amount,
                )
                .map(|quote| {
                    Packet::ByDestinationResponse(QuoteByDestinationResponse {
                        source_amount: quote.amount,
                        source_hold_duration: self.source_hold_duration(
                            quote_request.destination_hold_duration,
                            quote.min_message_window,
                        ),
                    })
                }),
            Packet::Prepare(prepare) => return Ok(self.handle_prepare(request, prepare).await),
            // response-type packets have no business arriving as requests
            Packet::LiquidityResponse(_)
            | Packet::BySourceResponse(_)
            | Packet::ByDestinationResponse(_)
            | Packet::Fulfill(_)
            | Packet::Reject(_) => Err(ProtocolError::invalid_body("Packet has unexpected type")),
        };

        Ok(outcome.unwrap_or_else(|err| self.reject_for(request, err)))
    }

    async fn handle_prepare(&self, request: &RequestMessage, prepare: Prepare) -> Packet {
        match self
            .payment_switch
            .handle_prepare(request.from.clone(), prepare)
            .await
        {
            Ok(fulfill) => Packet::Fulfill(fulfill),
            // the switch already manages the hop chain
            Err(reject) => Packet::Reject(reject),
        }
    }

    /// Hold duration the source must grant: the receiver's own hold plus
    /// the quoted path window plus our local hop. The requested hold is
    /// peer-controlled input, so the sum saturates rather than wrapping.
    fn source_hold_duration(&self, destination_hold_duration: u32, window: Duration) -> u32 {
        let total = window + self.route_builder.local_hop_window();
        destination_hold_duration.saturating_add(total.as_millis() as u32)
    }

    /// A locally raised protocol failure goes out as a Reject stamped with
    /// our account on the ledger the request arrived on.
    fn reject_for(&self, request: &RequestMessage, err: ProtocolError) -> Packet {
        debug!("rejecting request. from={} error={}", request.from, err);
        let mut reject = Reject::from(err);
        reject.forwarded_by.push(our_hop(request));
        Packet::Reject(reject)
    }
}

fn our_hop(request: &RequestMessage) -> Address {
    request.to.clone()
}
