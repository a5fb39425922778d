//! Gateway: HTTP surface over the dispatcher.
//!
//! Providers call `/c/{channel_type}/{uuid}/{action}`; operators and tests use
//! `POST /send` and the `GET /` health check.

mod protocol;
mod server;

pub use protocol::{ResponseData, SendRequest, WebhookResponse};
pub use server::{router, run_gateway, GatewayState};
