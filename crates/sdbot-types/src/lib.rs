//! Shared wire types for sdbot.
//!
//! Nothing in this crate performs I/O. The request handler decodes
//! [`interaction::Interaction`] values and builds a [`job::JobDescription`];
//! the response handler decodes [`notification::StoreEvent`] batches and
//! recovers origin identifiers through [`key::OutputKey`].

pub mod command;
pub mod interaction;
pub mod job;
pub mod key;
pub mod notification;

pub use interaction::{Interaction, InteractionResponse};
pub use job::{JobDescription, JobError, Model};
pub use key::{KeyError, OutputKey};
pub use notification::{StoreEvent, StoreNotification};
