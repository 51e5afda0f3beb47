//! Core of an Interledger connector: it listens for messages on directly
//! connected ledgers, answers quote requests from the liquidity curves its
//! peers advertise, forwards conditional Prepare payments along the best
//! known route, and gossips its routing table to peers.
//!
//! The moving parts:
//!
//! - [`MessageRouter`] is the single inbound dispatch point for both binary
//!   ILP packets and JSON control messages.
//! - [`RoutingTable`] holds per-peer routes with hold-down tombstones and a
//!   deterministic best-route index.
//! - [`RouteBroadcaster`] ingests peers' `broadcast_routes` updates and
//!   periodically advertises our own best routes, split-horizon filtered.
//! - [`RouteBuilder`] answers quotes by composing the local spread curve
//!   with the resolved route's liquidity curve.
//! - [`PaymentSwitch`] forwards Prepares with a shortened expiry and
//!   settles on fulfillment.
//!
//! Ledger connectivity lives behind the [`AccountPlugin`] trait; rate and
//! balance tracking behind [`Backend`].

mod account;
mod address;
mod backend;
mod config;
mod curve;
mod errors;
mod message;
mod message_router;
mod oer;
mod packet;
mod payment_switch;
mod route_broadcaster;
mod route_builder;
mod routing_table;
mod validate;

#[cfg(test)]
mod test_helpers;

pub use account::{AccountPlugin, Accounts, PluginError, RequestHandler};
pub use address::{Address, AddressError};
pub use backend::{Backend, BackendError, PaymentNotification};
pub use config::ConnectorConfig;
pub use curve::{CurveError, LiquidityCurve};
pub use errors::{ConnectorError, ErrorClass, ErrorCode, ProtocolError};
pub use message::{CustomMessage, NewRoute, RequestMessage, ResponseMessage, RoutingUpdate};
pub use message_router::MessageRouter;
pub use packet::{
    Fulfill, Packet, PacketType, ParseError, Prepare, QuoteByDestinationRequest,
    QuoteByDestinationResponse, QuoteBySourceRequest, QuoteBySourceResponse,
    QuoteLiquidityRequest, QuoteLiquidityResponse, Reject,
};
pub use payment_switch::{IlpResult, PaymentSwitch};
pub use route_broadcaster::{RouteBroadcaster, BROADCAST_ROUTES_METHOD};
pub use route_builder::{AmountQuote, LiquidityQuote, RouteBuilder};
pub use routing_table::{path_distance, Route, RouteUpdate, RoutingTable};
pub use validate::{StructuralValidator, ValidationError, Validator};
