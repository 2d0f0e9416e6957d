//! Ballot dashboard backend.
//!
//! Keeps a live, field-isolated view of a single on-chain election: connects
//! through a wallet provider, polls the voting contract, forwards admin and
//! voter actions as transactions, and serves the result over HTTP.

pub mod abi;
pub mod api;
pub mod config;
pub mod contract;
pub mod errors;
pub mod rpc;
pub mod sync;
pub mod types;
pub mod views;
pub mod wallet;

#[cfg(test)]
mod testing;
