#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

mod address;
mod audit;
mod commitment;
mod config;
mod crypto;
mod election;
mod error;
mod keystore;
mod ledger;
mod mem_ledger;
mod phase;
mod registration;
mod registry;
mod serde_hex;
mod tally;
mod transaction;
mod util;
mod vote;
mod voter;

pub use address::*;
pub use audit::*;
pub use commitment::*;
pub use config::*;
pub use crypto::*;
pub use election::*;
pub use error::*;
pub use keystore::*;
pub use ledger::*;
pub use mem_ledger::*;
pub use phase::*;
pub use registration::*;
pub use registry::*;
pub use serde_hex::*;
pub use tally::*;
pub use transaction::*;
pub use util::*;
pub use vote::*;
pub use voter::*;
