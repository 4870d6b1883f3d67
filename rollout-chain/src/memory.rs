//! In-process development chain.
//!
//! Mines every transaction immediately and deterministically: contract
//! addresses derive from the sender and its nonce, so two fresh chains fed the
//! same transactions agree on every address. Contract code is stored but never
//! executed; behaviour is attached per method selector with
//! [`MemoryChain::on_call`] and [`MemoryChain::revert_on`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use rollout_core::{abi, Address, H256};

use crate::error::TransportError;
use crate::receipt::{Log, Receipt};
use crate::transport::{Transport, TxRequest};

/// Behaviour bound to a method selector. Returns the call's output bytes, or a
/// revert reason.
pub type Handler = Arc<dyn Fn(&mut CallFrame) -> Result<Vec<u8>, String> + Send + Sync>;

/// Execution state visible to a [`Handler`].
#[derive(Debug)]
pub struct CallFrame {
    pub from: Address,
    pub to: Address,
    pub input: Vec<u8>,
    logs: Vec<Log>,
    created: Vec<Address>,
    nonce: u64,
}

impl CallFrame {
    /// ABI word `index` of the call arguments (after the selector).
    pub fn arg_word(&self, index: usize) -> Option<&[u8]> {
        self.input.get(4 + 32 * index..4 + 32 * (index + 1))
    }

    pub fn arg_address(&self, index: usize) -> Option<Address> {
        self.arg_word(index).and_then(abi::word_to_address)
    }

    /// Record a log emitted by the called contract.
    pub fn emit(&mut self, topics: Vec<H256>, data: Vec<u8>) {
        self.logs.push(Log {
            address: self.to,
            topics,
            data,
        });
    }

    /// Create a child contract of the called contract and return its address.
    pub fn create(&mut self) -> Address {
        let address = derive_address(&self.to, self.nonce);
        self.nonce += 1;
        self.created.push(address);
        address
    }
}

#[derive(Default)]
struct State {
    nonces: HashMap<Address, u64>,
    code: BTreeMap<Address, Vec<u8>>,
    receipts: HashMap<H256, Receipt>,
    pending: Vec<H256>,
    handlers: HashMap<[u8; 4], Handler>,
    reverts: HashMap<[u8; 4], String>,
    outages: u32,
    automine: bool,
    transactions: u64,
}

pub struct MemoryChain {
    chain_id: u64,
    accounts: Vec<Address>,
    state: Mutex<State>,
}

impl std::fmt::Debug for MemoryChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChain")
            .field("chain_id", &self.chain_id)
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

impl MemoryChain {
    /// A chain with `accounts` funded development signers.
    pub fn new(chain_id: u64, accounts: usize) -> Self {
        let accounts = (0..accounts as u64)
            .map(|i| {
                let digest = sha256(&[b"rollout-dev-account".as_slice(), &i.to_be_bytes()[..]]);
                tail_address(&digest)
            })
            .collect();
        Self {
            chain_id,
            accounts,
            state: Mutex::new(State {
                automine: true,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic inside a handler poisons the lock; the state itself is
        // still consistent because every mutation happens after the handler.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach behaviour to calls of `selector`.
    pub fn on_call<F>(&self, selector: [u8; 4], handler: F)
    where
        F: Fn(&mut CallFrame) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        self.state().handlers.insert(selector, Arc::new(handler));
    }

    /// Make every call of `selector` revert with `reason`.
    pub fn revert_on(&self, selector: [u8; 4], reason: impl Into<String>) {
        self.state().reverts.insert(selector, reason.into());
    }

    /// The next `n` transport calls fail as unavailable.
    pub fn fail_next(&self, n: u32) {
        self.state().outages = n;
    }

    /// With automine off, transactions stay pending and never get receipts.
    pub fn set_automine(&self, on: bool) {
        let mut state = self.state();
        state.automine = on;
        if on {
            state.pending.clear();
        }
    }

    /// Transactions accepted so far, including reverted ones.
    pub fn transaction_count(&self) -> u64 {
        self.state().transactions
    }

    pub fn code_at(&self, address: &Address) -> Option<Vec<u8>> {
        self.state().code.get(address).cloned()
    }

    fn check_outage(state: &mut State) -> Result<(), TransportError> {
        if state.outages > 0 {
            state.outages -= 1;
            return Err(TransportError::Unavailable("memory chain outage".to_owned()));
        }
        Ok(())
    }
}

impl Transport for MemoryChain {
    fn endpoint(&self) -> &str {
        "memory"
    }

    fn chain_id(&self) -> Result<u64, TransportError> {
        Self::check_outage(&mut self.state())?;
        Ok(self.chain_id)
    }

    fn accounts(&self) -> Result<Vec<Address>, TransportError> {
        Self::check_outage(&mut self.state())?;
        Ok(self.accounts.clone())
    }

    fn send_transaction(&self, tx: &TxRequest) -> Result<H256, TransportError> {
        let mut state = self.state();
        Self::check_outage(&mut state)?;
        if !self.accounts.contains(&tx.from) {
            return Err(TransportError::Rpc(format!("unknown account {}", tx.from)));
        }

        let nonce = state.nonces.get(&tx.from).copied().unwrap_or(0);
        state.nonces.insert(tx.from, nonce + 1);
        state.transactions += 1;
        let hash = H256(sha256(&[
            tx.from.0.as_slice(),
            &nonce.to_be_bytes()[..],
            tx.data.as_slice(),
        ]));

        let mut receipt = Receipt {
            transaction_hash: hash,
            status: true,
            contract_address: None,
            logs: Vec::new(),
            revert_reason: None,
        };
        match tx.to {
            None => {
                let address = derive_address(&tx.from, nonce);
                state.code.insert(address, tx.data.clone());
                receipt.contract_address = Some(address);
            }
            Some(to) => {
                let selector = selector_of(&tx.data);
                if let Some(reason) = selector.and_then(|s| state.reverts.get(&s)).cloned() {
                    receipt.status = false;
                    receipt.revert_reason = Some(reason);
                } else if let Some(handler) =
                    selector.and_then(|s| state.handlers.get(&s)).cloned()
                {
                    let mut frame = CallFrame {
                        from: tx.from,
                        to,
                        input: tx.data.clone(),
                        logs: Vec::new(),
                        created: Vec::new(),
                        nonce: state.nonces.get(&to).copied().unwrap_or(0),
                    };
                    // Handlers run under the state lock and must not call
                    // back into the chain.
                    match handler(&mut frame) {
                        Ok(_) => {
                            state.nonces.insert(to, frame.nonce);
                            for child in frame.created {
                                state.code.entry(child).or_default();
                            }
                            receipt.logs = frame.logs;
                        }
                        Err(reason) => {
                            receipt.status = false;
                            receipt.revert_reason = Some(reason);
                        }
                    }
                }
            }
        }

        if state.automine {
            state.receipts.insert(hash, receipt);
        } else {
            state.pending.push(hash);
        }
        Ok(hash)
    }

    fn receipt(&self, hash: &H256) -> Result<Option<Receipt>, TransportError> {
        let mut state = self.state();
        Self::check_outage(&mut state)?;
        Ok(state.receipts.get(hash).cloned())
    }

    fn call(&self, tx: &TxRequest) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state();
        Self::check_outage(&mut state)?;
        let Some(to) = tx.to else {
            return Ok(Vec::new());
        };
        let selector = selector_of(&tx.data);
        if let Some(reason) = selector.and_then(|s| state.reverts.get(&s)) {
            return Err(TransportError::Rejected {
                message: reason.clone(),
            });
        }
        let Some(handler) = selector.and_then(|s| state.handlers.get(&s)).cloned() else {
            return Ok(Vec::new());
        };
        let mut frame = CallFrame {
            from: tx.from,
            to,
            input: tx.data.clone(),
            logs: Vec::new(),
            created: Vec::new(),
            nonce: state.nonces.get(&to).copied().unwrap_or(0),
        };
        handler(&mut frame).map_err(|message| TransportError::Rejected { message })
    }
}

fn selector_of(data: &[u8]) -> Option<[u8; 4]> {
    data.get(..4).and_then(|s| s.try_into().ok())
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&h.finalize());
    out
}

fn tail_address(digest: &[u8; 32]) -> Address {
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

fn derive_address(creator: &Address, nonce: u64) -> Address {
    tail_address(&sha256(&[creator.0.as_slice(), &nonce.to_be_bytes()[..]]))
}
