//! Scripts for deploying and bootstrapping the registry, lending wrapper, and
//! escrow contracts from a plan file.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod abi;
pub mod artifacts;
pub mod bindings;
pub mod cli;
mod commands;
pub mod constants;
pub mod errors;
pub mod invoker;
pub mod ledger;
pub mod sequencer;
pub mod session;
pub mod transactions;
pub mod types;
pub mod utils;

#[cfg(test)]
mod mock;
