//! # Client Core
//!
//! [`NovaClient`] is the single entry point for talking to the plate-solving
//! service. It exclusively owns:
//!
//! - the [`Session`] (API key and current token)
//! - the [`SubmissionTracker`] (key → submission id, pending/finished)
//! - the [`Transport`] used to reach the service
//!
//! ## Request Workflow
//!
//! 1. **Session**: make sure a token exists, logging in if needed
//! 2. **Build**: turn the operation and its parameters into a request
//! 3. **Send**: one blocking exchange, bounded by the transport timeout
//! 4. **Decode**: service errors first, then the typed payload
//! 5. **Track / aggregate**: update the tracker, fetch job details as needed
//!
//! ## Concurrency
//!
//! All operations are blocking and take `&mut self`, so one client instance
//! serves one caller at a time. To share a client across threads wrap it in a
//! `Mutex`. Polling is driven by the caller through [`NovaClient::refresh_all`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use telescope::client::{NovaClient, ReviewDetail};
//! use telescope::common::config::ClientConfig;
//!
//! let config = ClientConfig::from_file("telescope.toml")?;
//! let mut client = NovaClient::connect(&config.service)?;
//!
//! client.upload("m31.fits")?;
//! loop {
//!     let done = client.refresh_all(ReviewDetail::Results)?;
//!     if client.pending().is_empty() { break; }
//!     std::thread::sleep(config.polling.interval());
//! }
//! let review = client.review_submission("m31.fits", ReviewDetail::Annotated)?;
//! ```

use log::{debug, info};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;

use crate::api::responses::{
    AnnotationList, Calibration, JobResults, JobStatus, KnownObjects, SubmissionStatus, Tags,
    UploadResponse,
};
use crate::api::{self, Operation, Params};
use crate::client::review::{Review, ReviewDetail};
use crate::client::session::Session;
use crate::client::tracker::{SubmissionState, SubmissionTracker};
use crate::client::transport::{HttpTransport, Transport};
use crate::common::config::ServiceConfig;
use crate::common::{ClientError, Result};
use crate::fits::ImageDecoder;

/// Client for the plate-solving API.
///
/// Generic over the [`Transport`] so tests can script the service's answers.
pub struct NovaClient<T: Transport = HttpTransport> {
    transport: T,
    session: Session,
    tracker: SubmissionTracker,
}

impl NovaClient<HttpTransport> {
    /// Creates an HTTP client for the configured service and logs in.
    ///
    /// # Errors
    ///
    /// * [`ClientError::Validation`] - no API key configured
    /// * [`ClientError::Auth`] - the service refused the key
    /// * transport and timeout errors from the login call
    pub fn connect(config: &ServiceConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ClientError::Validation("an API key is required".into()));
        }
        let transport = HttpTransport::new(&config.base_url, config.timeout())?;
        info!("Connecting to {}", transport.base_url());

        let mut client = Self::with_transport(config.api_key.clone(), transport);
        client.authenticate()?;
        Ok(client)
    }
}

impl<T: Transport> NovaClient<T> {
    /// Creates a client over `transport`. No call is made until first use.
    pub fn with_transport(api_key: String, transport: T) -> Self {
        Self {
            transport,
            session: Session::new(api_key),
            tracker: SubmissionTracker::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn tracker(&self) -> &SubmissionTracker {
        &self.tracker
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session.token()
    }

    // ========== SESSION ==========

    /// Log in (again) and return the fresh session token.
    pub fn authenticate(&mut self) -> Result<String> {
        self.session.authenticate(&self.transport)
    }

    /// Current session token, logging in first if there is none.
    pub fn ensure_session(&mut self) -> Result<String> {
        self.session.ensure_session(&self.transport)
    }

    // ========== SUBMISSIONS ==========

    /// Upload an image file and track it under its path.
    pub fn upload(&mut self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let key = path.to_string_lossy().into_owned();
        self.upload_as(&key, path)
    }

    /// Upload an image file and track it under `key`.
    ///
    /// The key is checked before anything is sent, so a duplicate key never
    /// causes a second submission on the service.
    pub fn upload_as(&mut self, key: &str, path: &Path) -> Result<u64> {
        self.ensure_untracked(key)?;

        let response: UploadResponse = self.session.call(&self.transport, |session| {
            api::build(Operation::Upload, Params::Upload { session, file: path })
        })?;

        info!(
            "📤 Uploaded {} as submission {}",
            path.display(),
            response.subid
        );
        self.tracker.track(key, response.subid)?;
        Ok(response.subid)
    }

    /// Decode the image with `decoder` before uploading it, so files the
    /// service could never solve are rejected locally.
    pub fn upload_checked(&mut self, path: impl AsRef<Path>, decoder: &dyn ImageDecoder) -> Result<u64> {
        let path = path.as_ref();
        let image = decoder.decode_file(path)?;
        debug!(
            "{} decoded as {}x{} image",
            path.display(),
            image.width,
            image.height
        );
        self.upload(path)
    }

    /// Ask the service to fetch an image from `url`, tracked under `key`.
    pub fn upload_url(&mut self, key: &str, url: &str) -> Result<u64> {
        self.ensure_untracked(key)?;

        let response: UploadResponse = self.session.call(&self.transport, |session| {
            api::build(Operation::UrlUpload, Params::UrlUpload { session, url })
        })?;

        info!("📤 Submitted {} as submission {}", url, response.subid);
        self.tracker.track(key, response.subid)?;
        Ok(response.subid)
    }

    /// Track a submission made elsewhere (another run, the web UI).
    pub fn track(&mut self, key: &str, submission_id: u64) -> Result<()> {
        self.tracker.track(key, submission_id)
    }

    pub fn status(&self, key: &str) -> SubmissionState {
        self.tracker.status(key)
    }

    pub fn pending(&self) -> BTreeSet<String> {
        self.tracker.pending()
    }

    pub fn finished(&self) -> BTreeSet<String> {
        self.tracker.finished()
    }

    fn ensure_untracked(&self, key: &str) -> Result<()> {
        match self.tracker.status(key) {
            SubmissionState::Unknown => Ok(()),
            _ => Err(ClientError::Validation(format!("'{}' is already tracked", key))),
        }
    }

    // ========== ENDPOINTS ==========

    fn fetch<R: DeserializeOwned>(&mut self, operation: Operation, id: u64) -> Result<R> {
        self.session
            .call(&self.transport, |_| api::build(operation, Params::Id(id)))
    }

    pub fn submission_status(&mut self, submission_id: u64) -> Result<SubmissionStatus> {
        self.fetch(Operation::SubmissionStatus, submission_id)
    }

    pub fn job_status(&mut self, job_id: u64) -> Result<JobStatus> {
        self.fetch(Operation::JobStatus, job_id)
    }

    pub fn calibration(&mut self, job_id: u64) -> Result<Calibration> {
        self.fetch(Operation::Calibration, job_id)
    }

    pub fn tags(&mut self, job_id: u64) -> Result<Tags> {
        self.fetch(Operation::Tags, job_id)
    }

    pub fn known_objects(&mut self, job_id: u64) -> Result<KnownObjects> {
        self.fetch(Operation::KnownObjects, job_id)
    }

    pub fn annotations(&mut self, job_id: u64) -> Result<AnnotationList> {
        self.fetch(Operation::Annotations, job_id)
    }

    pub fn job_results(&mut self, job_id: u64) -> Result<JobResults> {
        self.fetch(Operation::JobResults, job_id)
    }

    // ========== AGGREGATION ==========

    /// Assemble the review of the submission tracked under `key`.
    ///
    /// A submission without job calibrations yields an unfinished review.
    /// Otherwise the key is marked finished and the first job is fetched at
    /// the requested `detail`. A job reporting `"failure"` gives a finished
    /// but irrelevant review without calibration.
    ///
    /// # Errors
    ///
    /// * [`ClientError::NotFound`] - `key` is not tracked
    /// * service, session, transport and decode errors from any of the calls
    pub fn review_submission(&mut self, key: &str, detail: ReviewDetail) -> Result<Review> {
        let submission_id = self.tracker.submission_id(key)?;
        let status = self.submission_status(submission_id)?;

        if !status.has_calibration() {
            debug!("Submission {} ({}) still pending", submission_id, key);
            return Ok(Review::pending(key, submission_id));
        }

        self.tracker.mark_finished(key)?;

        let job_id = status.primary_job().ok_or_else(|| {
            ClientError::Decode(format!(
                "submission {} reports calibrations but lists no job",
                submission_id
            ))
        })?;

        match detail {
            ReviewDetail::CalibrationOnly => {
                let job = self.job_status(job_id)?;
                if job.is_failure() {
                    return Ok(Review::unsolved(key, submission_id, job_id, job.status));
                }
                let calibration = self.calibration(job_id)?;
                Ok(Review {
                    key: key.to_string(),
                    submission_id,
                    finished: true,
                    relevant: true,
                    job_id: Some(job_id),
                    job_status: Some(job.status),
                    calibration: Some(calibration),
                    ..Default::default()
                })
            }
            ReviewDetail::Results | ReviewDetail::Annotated => {
                let results = self.job_results(job_id)?;
                if results.is_failure() {
                    return Ok(Review::unsolved(key, submission_id, job_id, results.status));
                }

                let annotations = if detail == ReviewDetail::Annotated {
                    self.annotations(job_id)?.annotations
                } else {
                    Vec::new()
                };

                Ok(Review {
                    key: key.to_string(),
                    submission_id,
                    finished: true,
                    relevant: true,
                    job_id: Some(job_id),
                    job_status: Some(results.status),
                    calibration: Some(results.calibration),
                    tags: results.tags,
                    machine_tags: results.machine_tags,
                    objects_in_field: results.objects_in_field,
                    annotations,
                    original_filename: Some(results.original_filename)
                        .filter(|name| !name.is_empty()),
                })
            }
        }
    }

    /// Review every pending key and return those that finished during this call.
    ///
    /// Stops at the first failing key and returns its error; keys reviewed
    /// before it keep their new state.
    pub fn refresh_all(&mut self, detail: ReviewDetail) -> Result<Vec<String>> {
        let mut transitioned = Vec::new();

        for key in self.tracker.pending() {
            let review = self.review_submission(&key, detail)?;
            if review.finished {
                transitioned.push(key);
            }
        }

        if !transitioned.is_empty() {
            info!("{} submission(s) finished this round", transitioned.len());
        }
        Ok(transitioned)
    }
}
