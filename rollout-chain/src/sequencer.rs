//! Transaction sequencer.
//!
//! Submits one transaction at a time and waits for its receipt before
//! returning. Mutating operations take `&mut self`, so a run can never have two
//! transactions in flight. Read-only queries take `&self`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rollout_core::{
    abi, Address, CompiledArtifact, ConfirmationConfig, Interface, RetryPolicy, Token, H256,
};

use crate::error::{ChainError, TransportError};
use crate::receipt::Receipt;
use crate::transport::{Transport, TxRequest};

/// Per-transaction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Overrides the sequencer's default gas limit.
    pub gas_limit: Option<u64>,
}

/// A deployed contract together with its creation receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub receipt: Receipt,
}

/// Where a method call goes: a labelled address and the interface it speaks.
#[derive(Debug, Clone, Copy)]
pub struct CallTarget<'a> {
    /// Artifact name, used in errors and logs.
    pub label: &'a str,
    pub address: Address,
    pub interface: &'a Interface,
}

pub struct Sequencer {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    confirmation: ConfirmationConfig,
    gas_limit: Option<u64>,
    transactions: usize,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("endpoint", &self.transport.endpoint())
            .field("transactions", &self.transactions)
            .finish()
    }
}

impl Sequencer {
    pub fn new(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        confirmation: ConfirmationConfig,
    ) -> Self {
        Self {
            transport,
            retry,
            confirmation,
            gas_limit: None,
            transactions: 0,
        }
    }

    /// Gas limit applied when a transaction does not set its own.
    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Transactions submitted through this sequencer.
    pub fn transactions(&self) -> usize {
        self.transactions
    }

    /// Signers the endpoint manages.
    pub fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        self.with_retry("", "eth_accounts", || self.transport.accounts())
    }

    /// Create `artifact` with constructor `args` and wait for the receipt.
    pub fn deploy(
        &mut self,
        artifact: &CompiledArtifact,
        args: &[Token],
        from: Address,
        options: TxOptions,
    ) -> Result<Deployment, ChainError> {
        let context = format!("{} constructor", artifact.contract_name);
        let mut data = artifact.bytecode.clone();
        data.extend(abi::encode(&artifact.abi.constructor(), args, &context)?);

        let tx = TxRequest {
            from,
            to: None,
            data,
            gas: options.gas_limit.or(self.gas_limit),
        };
        let receipt = self.submit(&tx, &artifact.contract_name, "constructor")?;
        let address = receipt.contract_address.ok_or_else(|| ChainError::Rpc {
            endpoint: self.endpoint().to_owned(),
            message: format!(
                "creation receipt {} has no contract address",
                receipt.transaction_hash
            ),
        })?;
        tracing::info!(
            contract = %artifact.contract_name,
            address = %address,
            tx = %receipt.transaction_hash,
            "deployed"
        );
        Ok(Deployment { address, receipt })
    }

    /// Call a state-changing method and wait for the receipt.
    ///
    /// `method` is a bare name or a full signature.
    pub fn call(
        &mut self,
        target: CallTarget<'_>,
        method: &str,
        args: &[Token],
        from: Address,
        options: TxOptions,
    ) -> Result<Receipt, ChainError> {
        let resolved = target.interface.method(target.label, method)?;
        let tx = TxRequest {
            from,
            to: Some(target.address),
            data: resolved.encode_call(args)?,
            gas: options.gas_limit.or(self.gas_limit),
        };
        let receipt = self.submit(&tx, target.label, &resolved.signature)?;
        tracing::info!(
            target = target.label,
            method = %resolved.signature,
            tx = %receipt.transaction_hash,
            "executed"
        );
        Ok(receipt)
    }

    /// Read-only call; never produces a transaction.
    pub fn query(
        &self,
        target: CallTarget<'_>,
        method: &str,
        args: &[Token],
    ) -> Result<Vec<u8>, ChainError> {
        let resolved = target.interface.method(target.label, method)?;
        let tx = TxRequest {
            from: Address::ZERO,
            to: Some(target.address),
            data: resolved.encode_call(args)?,
            gas: None,
        };
        self.with_retry(target.label, &resolved.signature, || self.transport.call(&tx))
    }

    fn submit(
        &mut self,
        tx: &TxRequest,
        target: &str,
        method: &str,
    ) -> Result<Receipt, ChainError> {
        let hash = self.with_retry(target, method, || self.transport.send_transaction(tx))?;
        self.transactions += 1;
        tracing::debug!(target, method, tx = %hash, "submitted");

        let receipt = self.await_receipt(&hash, target, method)?;
        if !receipt.status {
            return Err(ChainError::ExecutionReverted {
                target: target.to_owned(),
                method: method.to_owned(),
                reason: receipt
                    .revert_reason
                    .clone()
                    .unwrap_or_else(|| "transaction failed".to_owned()),
            });
        }
        Ok(receipt)
    }

    fn await_receipt(
        &self,
        hash: &H256,
        target: &str,
        method: &str,
    ) -> Result<Receipt, ChainError> {
        let started = Instant::now();
        let timeout = Duration::from_millis(self.confirmation.timeout_ms);
        let interval = Duration::from_millis(self.confirmation.poll_interval_ms);
        loop {
            let polled = self.with_retry(target, method, || self.transport.receipt(hash))?;
            if let Some(receipt) = polled {
                return Ok(receipt);
            }
            if started.elapsed() >= timeout {
                return Err(ChainError::ConfirmationTimeout { tx: *hash });
            }
            std::thread::sleep(interval);
        }
    }

    /// Run `op`, retrying only unavailability with bounded backoff.
    ///
    /// A submission is only ever retried when it never reached the node.
    fn with_retry<T>(
        &self,
        target: &str,
        method: &str,
        mut op: impl FnMut() -> Result<T, TransportError>,
    ) -> Result<T, ChainError> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(TransportError::Unavailable(message)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(ChainError::TransportUnavailable {
                            endpoint: self.endpoint().to_owned(),
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        endpoint = self.endpoint(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transport unavailable, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(TransportError::Rejected { message }) => {
                    return Err(ChainError::ExecutionReverted {
                        target: target.to_owned(),
                        method: method.to_owned(),
                        reason: message,
                    });
                }
                Err(TransportError::Indeterminate(message)) => {
                    tracing::error!(
                        endpoint = self.endpoint(),
                        target,
                        method,
                        error = %message,
                        "submission outcome unknown, not resending"
                    );
                    return Err(ChainError::SubmissionUnknown {
                        endpoint: self.endpoint().to_owned(),
                        target: target.to_owned(),
                        method: method.to_owned(),
                        message,
                    });
                }
                Err(TransportError::Rpc(message)) => {
                    return Err(ChainError::Rpc {
                        endpoint: self.endpoint().to_owned(),
                        message,
                    });
                }
            }
        }
    }
}
