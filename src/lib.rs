//! Local multi-shard test network orchestration.
//!
//! A network is described by a [`config::ConfigRoot`] and turned into a
//! folder tree by [`materialize::configure_network`]: one folder per
//! validator and observer, plus the seednode and the proxy, all sharing the
//! same genesis derived in [`genesis`]. [`orchestrator::Orchestrator`] then
//! runs every process of that tree until a deadline or an interrupt.
//!
//! Executables are located (and optionally downloaded and built) through
//! [`software::SoftwareResolver`]; wallets and node keys are pre-generated
//! and read through [`keys::KeyMaterial`].

pub mod address;
pub mod config;
pub mod errors;
pub mod genesis;
pub mod keys;
pub mod materialize;
pub mod orchestrator;
pub mod software;
pub mod status;
pub mod topology;

pub use config::ConfigRoot;
pub use errors::{LocalnetError, LocalnetResult};
