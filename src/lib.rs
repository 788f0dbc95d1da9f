#[macro_use]
extern crate serde;

mod ballot;
mod config;
mod election;
mod eligibility;
mod elgamal;
mod error;
mod group;
mod serde_hex;
mod voter;
mod zkp;

pub use ballot::*;
pub use config::*;
pub use election::*;
pub use eligibility::*;
pub use elgamal::*;
pub use error::*;
pub use group::*;
pub use serde_hex::*;
pub use voter::*;
pub use zkp::*;
