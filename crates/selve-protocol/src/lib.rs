//! Selve Gateway Protocol
//!
//! This crate provides types and utilities for talking to a Selve USB-RF
//! gateway. The gateway speaks an XML-RPC dialect over a serial line; every
//! frame is a self-delimited XML envelope.
//!
//! # Protocol Overview
//!
//! - **Calls** (host → gateway): `<methodCall>` with a `selve.GW.*` method
//!   name and an optional `<array>` of `<int>`, `<string>` and `<base64>`
//!   parameters
//! - **Responses** (gateway → host): `<methodResponse>` whose array starts
//!   with the method name, followed by the return values
//! - **Faults** (gateway → host): `<methodResponse><fault>` with a message
//!   and a numeric code
//! - **Events** (gateway → host): `<methodCall>` in the `selve.GW.event.*`
//!   namespace
//!
//! Responses carry no correlation id; they are matched to requests by method
//! name and arrival order.
//!
//! # Example
//!
//! ```rust,ignore
//! use selve_protocol::{FrameCodec, Frame, MethodCall, GroupRecord};
//!
//! let bytes = FrameCodec::encode(&MethodCall::group_read(3))?;
//!
//! let mut codec = FrameCodec::new();
//! for frame in codec.feed(&received) {
//!     if let Frame::Response(response) = frame? {
//!         let group: GroupRecord = response.decode()?;
//!     }
//! }
//! ```

mod commands;
mod constants;
mod error;
mod events;
mod frame;
mod responses;
mod types;
pub mod xml;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use events::*;
pub use frame::*;
pub use responses::*;
pub use types::*;
