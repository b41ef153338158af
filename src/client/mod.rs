//! # Client Components
//!
//! The client is split the same way a request flows through it:
//!
//! ## Transport ([`transport`])
//! Sends a built request and returns the raw body. Blocking, with a timeout.
//!
//! ## Session Manager ([`session`])
//! Owns the session token, logs in on demand and renews an expired session
//! exactly once per call.
//!
//! ## Submission Tracker ([`tracker`])
//! Remembers which keys map to which submissions and which have finished.
//!
//! ## Client Core ([`client`])
//! [`NovaClient`] ties the above together and aggregates multi-call
//! [`Review`]s.

pub mod client;
pub mod review;
pub mod session;
pub mod tracker;
pub mod transport;

// Re-export for convenience
pub use client::NovaClient;
pub use review::{Review, ReviewDetail};
pub use session::{is_session_expired, Session};
pub use tracker::{SubmissionState, SubmissionTracker};
pub use transport::{HttpTransport, Transport};
