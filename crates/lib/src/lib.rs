//! Relay core library: the channel handler contract, canonical message model,
//! URN normalization, segmentation, status tracking, the handler registry and
//! the HTTP gateway used by the CLI.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod msg;
pub mod registry;
pub mod segment;
pub mod status;
pub mod urn;

pub use error::{Error, Result};
