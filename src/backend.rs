//! Rate/notification collaborator: told about every settled payment so it
//! can track rates and balances. The data source behind it is out of scope.

use crate::address::Address;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("backend error: {0}")]
pub struct BackendError(pub String);

/// Amounts are reported as decimal strings, matching the ledger-facing
/// representation.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentNotification {
    pub source_account: Address,
    pub source_amount: String,
    pub destination_account: Address,
    pub destination_amount: String,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn submit_payment(&self, payment: PaymentNotification) -> Result<(), BackendError>;
}
