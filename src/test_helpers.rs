//! Shared fixtures: an in-memory plugin that records everything sent
//! through it and a backend that records payment notifications.

use crate::account::{AccountPlugin, PluginError, RequestHandler};
use crate::address::Address;
use crate::backend::{Backend, BackendError, PaymentNotification};
use crate::config::ConnectorConfig;
use crate::message::RequestMessage;
use crate::packet::Packet;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub fn test_config() -> ConnectorConfig {
    ConnectorConfig::new(Address::new("example.connector").unwrap())
}

pub struct TestPlugin {
    address: Address,
    sent: Mutex<Vec<Bytes>>,
    money: Mutex<Vec<u64>>,
    responses: Mutex<VecDeque<Result<Bytes, PluginError>>>,
    delay: Mutex<Option<Duration>>,
}

impl TestPlugin {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(TestPlugin {
            address: Address::new(address).unwrap(),
            sent: Mutex::new(Vec::new()),
            money: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
        })
    }

    pub fn queue_response(&self, response: Bytes) {
        self.responses.lock().push_back(Ok(response));
    }

    pub fn queue_error(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(PluginError(message.to_string())));
    }

    pub fn set_response_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Everything sent through this plugin, parsed as JSON envelopes.
    pub fn sent_messages(&self) -> Vec<RequestMessage> {
        self.sent
            .lock()
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }

    /// Everything sent through this plugin, decoded as binary packets.
    pub fn sent_packets(&self) -> Vec<Packet> {
        self.sent
            .lock()
            .iter()
            .map(|bytes| Packet::decode(bytes).unwrap())
            .collect()
    }

    pub fn settled(&self) -> Vec<u64> {
        self.money.lock().clone()
    }
}

#[async_trait]
impl AccountPlugin for TestPlugin {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn send_data(&self, data: Bytes) -> Result<Bytes, PluginError> {
        self.sent.lock().push(data);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::delay_for(delay).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Bytes::new()))
    }

    async fn send_money(&self, amount: u64) -> Result<(), PluginError> {
        self.money.lock().push(amount);
        Ok(())
    }

    fn register_request_handler(&self, _handler: RequestHandler) {}
}

#[derive(Default)]
pub struct TestBackend {
    payments: Mutex<Vec<PaymentNotification>>,
}

impl TestBackend {
    pub fn payments(&self) -> Vec<PaymentNotification> {
        self.payments.lock().clone()
    }
}

#[async_trait]
impl Backend for TestBackend {
    async fn submit_payment(&self, payment: PaymentNotification) -> Result<(), BackendError> {
        self.payments.lock().push(payment);
        Ok(())
    }
}
