//! # Telescope
//!
//! Client for the astrometry.net plate-solving service: log in with an API
//! key, upload images, poll submissions and collect their calibration, tags
//! and annotated objects as one [`client::Review`].
//!
//! - [`api`]: request building and response decoding
//! - [`client`]: session, submission tracking and result aggregation
//! - [`fits`]: FITS decoding, header extraction and conversion
//! - [`common`]: errors, configuration and logging

pub mod api;
pub mod client;
pub mod common;
pub mod fits;

pub use client::{NovaClient, Review, ReviewDetail, SubmissionState};
pub use common::{ClientError, Result};
