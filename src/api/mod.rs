//! # Service Protocol
//!
//! Wire-level description of the plate-solving API, with no I/O of its own:
//!
//! - [`operation`]: builds outbound requests for each [`Operation`]
//! - [`responses`]: typed response payloads and the two-phase [`decode`]

pub mod operation;
pub mod responses;

pub use operation::{build, ApiRequest, Method, Operation, Params, RequestBody};
pub use responses::decode;
