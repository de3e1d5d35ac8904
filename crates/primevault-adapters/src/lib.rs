//! Concrete collaborators for `primevault-core`: the LI.FI aggregation API, EVM JSON-RPC
//! reads and a route executor that drives the user's wallet.

#![deny(unsafe_code)]

pub mod error;
pub mod executor;
pub mod lifi;
pub mod rpc;

pub use error::AdapterError;
pub use executor::SignerRouteExecutor;
pub use lifi::LiFiClient;
pub use rpc::JsonRpcChainReader;
