//! Core abstractions for the agent bridge transport.
//!
//! This crate provides the fundamental building blocks:
//! - `protocol` - Typed message map for both directions
//! - `Message` - Envelope carried through dispatch
//! - `Dispatcher` - In-process pub/sub core
//! - `Transport` trait

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod protocol;
pub mod traits;

pub use dispatcher::{Dispatcher, ErrorObserver};
pub use error::DispatchError;
pub use message::Message;
pub use protocol::{InboundMessage, InboundType, OutboundMessage, OutboundType};
pub use traits::Transport;
