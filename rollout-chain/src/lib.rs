//! # rollout-chain
//!
//! Everything that talks to a chain: the [`Transport`] boundary, the JSON-RPC
//! and in-process implementations, and the [`Sequencer`] that submits one
//! transaction at a time and decodes receipts.

pub mod error;
pub mod memory;
pub mod receipt;
pub mod rpc;
pub mod sequencer;
pub mod transport;

use std::sync::Arc;

use rollout_core::{EnvironmentConfig, TransportConfig};

pub use error::{ChainError, TransportError};
pub use memory::{CallFrame, MemoryChain};
pub use receipt::{Log, Receipt};
pub use rpc::JsonRpcTransport;
pub use sequencer::{CallTarget, Deployment, Sequencer, TxOptions};
pub use transport::{Transport, TxRequest};

/// Open the transport an environment is configured with and check that it
/// serves the expected chain.
pub fn connect(environment: &EnvironmentConfig) -> Result<Arc<dyn Transport>, ChainError> {
    let transport: Arc<dyn Transport> = match &environment.transport {
        TransportConfig::Memory { accounts } => {
            Arc::new(MemoryChain::new(environment.chain_id, *accounts))
        }
        TransportConfig::Rpc { .. } => {
            Arc::new(JsonRpcTransport::new(environment.transport.endpoint()))
        }
    };

    let endpoint = transport.endpoint().to_owned();
    let actual = transport.chain_id().map_err(|e| match e {
        TransportError::Unavailable(message) => ChainError::TransportUnavailable {
            endpoint: endpoint.clone(),
            attempts: 1,
            message,
        },
        other => ChainError::Rpc {
            endpoint: endpoint.clone(),
            message: other.to_string(),
        },
    })?;
    if actual != environment.chain_id {
        return Err(ChainError::ChainIdMismatch {
            expected: environment.chain_id,
            actual,
        });
    }
    tracing::debug!(endpoint = %endpoint, chain_id = actual, "connected");
    Ok(transport)
}
