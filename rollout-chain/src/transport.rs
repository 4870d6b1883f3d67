//! The capability boundary: submit a transaction, wait for its receipt.

use rollout_core::{Address, H256};

use crate::error::TransportError;
use crate::receipt::Receipt;

/// A transaction or read-only call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    /// `None` creates a contract from `data`.
    pub to: Option<Address>,
    pub data: Vec<u8>,
    pub gas: Option<u64>,
}

/// Connection to one chain.
///
/// Signing happens on the other side: transactions are sent from accounts the
/// endpoint manages.
pub trait Transport: Send + Sync {
    /// Label used in errors and logs.
    fn endpoint(&self) -> &str;

    fn chain_id(&self) -> Result<u64, TransportError>;

    /// Accounts the endpoint can sign for, in signer-index order.
    fn accounts(&self) -> Result<Vec<Address>, TransportError>;

    fn send_transaction(&self, tx: &TxRequest) -> Result<H256, TransportError>;

    /// `None` while the transaction is pending.
    fn receipt(&self, hash: &H256) -> Result<Option<Receipt>, TransportError>;

    fn call(&self, tx: &TxRequest) -> Result<Vec<u8>, TransportError>;
}
