//! Handlers and outbound clients for sdbot.
//!
//! - [`request::InteractionHandler`] verifies and answers interaction
//!   webhooks, dispatching image jobs through a [`dispatch::JobDispatcher`].
//! - [`response::ArtifactDelivery`] fetches finished artifacts from a
//!   [`store::ContentStore`] and posts them through a [`chat::ChatPlatform`].
//!
//! The three seams are traits so the HTTP server can swap in real clients
//! ([`dispatch::HttpDispatcher`], [`store::HttpStore`] or
//! [`store::DirStore`], [`discord::DiscordClient`]) and tests can use the
//! fakes in `testing`.

pub mod chat;
pub mod commands;
pub mod discord;
pub mod dispatch;
pub mod error;
pub mod request;
pub mod response;
pub mod signature;
pub mod sigv4;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::RelayError;
pub use request::InteractionHandler;
pub use response::{ArtifactDelivery, BatchReport, DeliveryOutcome};
