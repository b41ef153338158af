//! # Reviews
//!
//! A [`Review`] is the caller-facing summary of one submission. Two signals
//! are kept apart:
//!
//! - `finished`: the submission has at least one job calibration
//! - `relevant`: the job did not report `"failure"`
//!
//! A job can finish and still fail to solve, so a finished review may be
//! irrelevant. Unsolved reviews carry no calibration, tags or annotations.

use serde::{Deserialize, Serialize};

use crate::api::responses::{Annotation, Calibration};

/// How much of a finished job to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewDetail {
    /// `/jobs/{id}` then `/jobs/{id}/calibration` only.
    CalibrationOnly,
    /// `/jobs/{id}/info`: status, calibration, tags and objects in field.
    #[default]
    Results,
    /// `Results` plus `/jobs/{id}/annotations`.
    Annotated,
}

/// Aggregated view of a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Tracking key the caller used
    pub key: String,
    pub submission_id: u64,
    pub finished: bool,
    pub relevant: bool,
    /// Job the results were taken from, once finished
    pub job_id: Option<u64>,
    /// Raw job status string (`"success"`, `"failure"`, ...)
    pub job_status: Option<String>,
    pub calibration: Option<Calibration>,
    pub tags: Vec<String>,
    pub machine_tags: Vec<String>,
    pub objects_in_field: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub original_filename: Option<String>,
}

impl Review {
    /// Review of a submission the service is still working on.
    pub fn pending(key: &str, submission_id: u64) -> Self {
        Self {
            key: key.to_string(),
            submission_id,
            finished: false,
            relevant: true,
            ..Default::default()
        }
    }

    /// Finished review for a job that could not be solved.
    pub fn unsolved(key: &str, submission_id: u64, job_id: u64, job_status: String) -> Self {
        Self {
            key: key.to_string(),
            submission_id,
            finished: true,
            relevant: false,
            job_id: Some(job_id),
            job_status: Some(job_status),
            ..Default::default()
        }
    }

    /// Calibrated and not reported as a failure.
    pub fn is_solved(&self) -> bool {
        self.finished && self.relevant && self.calibration.is_some()
    }
}
