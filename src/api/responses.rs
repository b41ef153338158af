//! # Response Decoder
//!
//! The service answers every request with HTTP 200, whatever the logical
//! outcome. A failure is only visible in the body as
//! `{"status": "error", "errormessage": "..."}`, so [`decode`] works in two
//! phases over the same bytes:
//!
//! 1. decode into [`ErrorEnvelope`]; a body that is not JSON at all is a
//!    [`ClientError::Decode`]
//! 2. `status == "error"` becomes [`ClientError::Service`] carrying the message
//!    verbatim, before the payload shape is ever looked at
//! 3. otherwise decode again into the operation-specific payload
//!
//! Payload decoding is lenient: unknown fields are ignored, and absent or
//! `null` fields take their zero value.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::common::{ClientError, Result};

/// Status string the service uses for logical failures.
pub const STATUS_ERROR: &str = "error";

/// Job status reported when the image could not be solved.
pub const JOB_FAILURE: &str = "failure";

/// Generic shape every response body matches.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorEnvelope {
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub errormessage: String,
}

/// Decode a raw response body into `T`, failing on service-reported errors first.
pub fn decode<T>(raw: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    let envelope: ErrorEnvelope = serde_json::from_slice(raw)?;
    if envelope.status == STATUS_ERROR {
        return Err(ClientError::Service {
            message: envelope.errormessage,
        });
    }
    Ok(serde_json::from_slice(raw)?)
}

/// Treat an explicit `null` like a missing field.
fn null_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lists like `"jobs": [null, 555]` appear while the service is still queueing.
fn skip_nulls<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items.unwrap_or_default().into_iter().flatten().collect())
}

/// Answer to `/login`; `session` is the token for subsequent calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub message: String,
    #[serde(deserialize_with = "null_default")]
    pub session: String,
}

/// Answer to `/upload` and `/url_upload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadResponse {
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub subid: u64,
    #[serde(deserialize_with = "null_default")]
    pub hash: String,
}

/// Progress of one submission.
///
/// `job_calibrations` holds `[job_id, calibration_id]` pairs; it stays empty
/// until at least one job has produced a calibration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionStatus {
    #[serde(deserialize_with = "null_default")]
    pub processing_started: String,
    #[serde(deserialize_with = "null_default")]
    pub processing_finished: String,
    #[serde(deserialize_with = "skip_nulls")]
    pub job_calibrations: Vec<Vec<u64>>,
    #[serde(deserialize_with = "skip_nulls")]
    pub jobs: Vec<u64>,
    #[serde(deserialize_with = "null_default")]
    pub user: u64,
    #[serde(deserialize_with = "skip_nulls")]
    pub user_images: Vec<u64>,
}

impl SubmissionStatus {
    /// At least one job produced a non-empty calibration record.
    pub fn has_calibration(&self) -> bool {
        self.job_calibrations.iter().any(|pair| !pair.is_empty())
    }

    /// The job to review: first listed job, or failing that the job half of
    /// the first calibration pair.
    pub fn primary_job(&self) -> Option<u64> {
        self.jobs.first().copied().or_else(|| {
            self.job_calibrations
                .iter()
                .find_map(|pair| pair.first().copied())
        })
    }
}

/// Answer to `/jobs/{id}`: `"solving"`, `"success"` or `"failure"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStatus {
    #[serde(deserialize_with = "null_default")]
    pub status: String,
}

impl JobStatus {
    pub fn is_failure(&self) -> bool {
        self.status == JOB_FAILURE
    }
}

/// Astrometric solution of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    #[serde(deserialize_with = "null_default")]
    pub parity: f64,
    /// Degrees east of north
    #[serde(deserialize_with = "null_default")]
    pub orientation: f64,
    /// Arcseconds per pixel
    #[serde(rename = "pixscale", deserialize_with = "null_default")]
    pub pixel_scale: f64,
    /// Field radius in degrees
    #[serde(deserialize_with = "null_default")]
    pub radius: f64,
    /// Right ascension of the field centre, degrees
    #[serde(deserialize_with = "null_default")]
    pub ra: f64,
    /// Declination of the field centre, degrees
    #[serde(deserialize_with = "null_default")]
    pub dec: f64,
}

/// Answer to `/jobs/{id}/machine_tags`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tags {
    #[serde(deserialize_with = "skip_nulls")]
    pub tags: Vec<String>,
}

/// Answer to `/jobs/{id}/objects_in_field`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnownObjects {
    #[serde(deserialize_with = "skip_nulls")]
    pub objects_in_field: Vec<String>,
}

/// A recognised object and where it sits in the image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotation {
    #[serde(rename = "type", deserialize_with = "null_default")]
    pub kind: String,
    #[serde(deserialize_with = "skip_nulls")]
    pub names: Vec<String>,
    #[serde(rename = "pixelx", deserialize_with = "null_default")]
    pub pixel_x: f64,
    #[serde(rename = "pixely", deserialize_with = "null_default")]
    pub pixel_y: f64,
    #[serde(deserialize_with = "null_default")]
    pub radius: f64,
}

/// Answer to `/jobs/{id}/annotations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationList {
    #[serde(deserialize_with = "skip_nulls")]
    pub annotations: Vec<Annotation>,
}

/// Answer to `/jobs/{id}/info`: everything except object coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobResults {
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "skip_nulls")]
    pub machine_tags: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub calibration: Calibration,
    #[serde(deserialize_with = "skip_nulls")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub original_filename: String,
    #[serde(deserialize_with = "skip_nulls")]
    pub objects_in_field: Vec<String>,
}

impl JobResults {
    pub fn is_failure(&self) -> bool {
        self.status == JOB_FAILURE
    }
}
