//! The account/plugin boundary.
//!
//! Each directly connected ledger is represented by a plugin implementing
//! [`AccountPlugin`]. Transport setup, authentication, and the underlying
//! ledger protocol live behind this trait.

use crate::address::Address;
use crate::errors::ConnectorError;
use crate::message::{RequestMessage, ResponseMessage};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("plugin error: {0}")]
pub struct PluginError(pub String);

/// Inbound request handler a plugin invokes for every request message it
/// receives from its ledger.
pub type RequestHandler = Arc<
    dyn Fn(RequestMessage) -> BoxFuture<'static, Result<Option<ResponseMessage>, ConnectorError>>
        + Send
        + Sync,
>;

#[async_trait]
pub trait AccountPlugin: Send + Sync {
    /// The ledger prefix this plugin is connected to.
    fn address(&self) -> &Address;

    /// Packet-level round trip: send the bytes to the peer on this ledger
    /// and await its response bytes.
    async fn send_data(&self, data: Bytes) -> Result<Bytes, PluginError>;

    /// Settle the given amount with the peer.
    async fn send_money(&self, amount: u64) -> Result<(), PluginError>;

    /// Register the handler to be invoked for inbound request messages.
    fn register_request_handler(&self, handler: RequestHandler);
}

/// Registry of connected account plugins, keyed by ledger address.
#[derive(Clone, Default)]
pub struct Accounts {
    plugins: Arc<RwLock<HashMap<Address, Arc<dyn AccountPlugin>>>>,
}

impl Accounts {
    pub fn new() -> Self {
        Accounts::default()
    }

    pub fn add(&self, plugin: Arc<dyn AccountPlugin>) {
        let address = plugin.address().clone();
        self.plugins.write().insert(address, plugin);
    }

    pub fn get(&self, address: &Address) -> Option<Arc<dyn AccountPlugin>> {
        self.plugins.read().get(address).cloned()
    }

    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.plugins.read().keys().cloned().collect();
        addresses.sort();
        addresses
    }
}
