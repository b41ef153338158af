//! # Submission Tracker
//!
//! Maps caller-chosen keys (usually the uploaded file path) to the
//! service-assigned submission id and records whether each submission is
//! still pending or has finished. A key is always in exactly one of
//! untracked, pending or finished, and finished is terminal.

use std::collections::{BTreeSet, HashMap};

use log::info;

use crate::common::{ClientError, Result};

/// Lifecycle of a tracked key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Pending,
    Finished,
    Unknown,
}

#[derive(Debug, Clone)]
struct TrackedSubmission {
    id: u64,
    finished: bool,
}

/// In-memory registry of submissions made by one client.
#[derive(Debug, Default)]
pub struct SubmissionTracker {
    submissions: HashMap<String, TrackedSubmission>,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `key` as pending under `submission_id`.
    ///
    /// Tracking the same key twice is rejected so a finished submission can
    /// never be reset to pending.
    pub fn track(&mut self, key: &str, submission_id: u64) -> Result<()> {
        if key.is_empty() {
            return Err(ClientError::Validation("tracking key must not be empty".into()));
        }
        if let Some(existing) = self.submissions.get(key) {
            return Err(ClientError::Validation(format!(
                "'{}' is already tracked as submission {}",
                key, existing.id
            )));
        }

        self.submissions.insert(
            key.to_string(),
            TrackedSubmission {
                id: submission_id,
                finished: false,
            },
        );
        Ok(())
    }

    pub fn status(&self, key: &str) -> SubmissionState {
        match self.submissions.get(key) {
            Some(s) if s.finished => SubmissionState::Finished,
            Some(_) => SubmissionState::Pending,
            None => SubmissionState::Unknown,
        }
    }

    /// Submission id for `key`, pending or finished.
    pub fn submission_id(&self, key: &str) -> Result<u64> {
        self.submissions
            .get(key)
            .map(|s| s.id)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))
    }

    /// Move `key` to finished. Calling it again is a no-op.
    pub fn mark_finished(&mut self, key: &str) -> Result<()> {
        let submission = self
            .submissions
            .get_mut(key)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;

        if !submission.finished {
            submission.finished = true;
            info!("✅ Submission {} ({}) finished", submission.id, key);
        }
        Ok(())
    }

    pub fn pending(&self) -> BTreeSet<String> {
        self.keys_where(false)
    }

    pub fn finished(&self) -> BTreeSet<String> {
        self.keys_where(true)
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    fn keys_where(&self, finished: bool) -> BTreeSet<String> {
        self.submissions
            .iter()
            .filter(|(_, s)| s.finished == finished)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_finished() {
        let mut tracker = SubmissionTracker::new();
        tracker.track("image.fits", 42).unwrap();
        assert_eq!(tracker.status("image.fits"), SubmissionState::Pending);

        tracker.mark_finished("image.fits").unwrap();
        assert_eq!(tracker.status("image.fits"), SubmissionState::Finished);
        assert_eq!(tracker.submission_id("image.fits").unwrap(), 42);

        assert_eq!(tracker.status("unknown.fits"), SubmissionState::Unknown);
        assert!(matches!(
            tracker.submission_id("unknown.fits"),
            Err(ClientError::NotFound(_))
        ));
    }

    #[test]
    fn test_mark_finished_is_idempotent_and_one_way() {
        let mut tracker = SubmissionTracker::new();
        tracker.track("a.fits", 1).unwrap();
        tracker.mark_finished("a.fits").unwrap();
        tracker.mark_finished("a.fits").unwrap();
        assert_eq!(tracker.status("a.fits"), SubmissionState::Finished);

        // re-tracking would reset the key to pending
        assert!(matches!(
            tracker.track("a.fits", 2),
            Err(ClientError::Validation(_))
        ));
        assert_eq!(tracker.status("a.fits"), SubmissionState::Finished);
        assert_eq!(tracker.submission_id("a.fits").unwrap(), 1);
    }

    #[test]
    fn test_each_key_in_exactly_one_set() {
        let mut tracker = SubmissionTracker::new();
        tracker.track("a.fits", 1).unwrap();
        tracker.track("b.fits", 2).unwrap();
        tracker.track("c.fits", 3).unwrap();
        tracker.mark_finished("b.fits").unwrap();

        let pending = tracker.pending();
        let finished = tracker.finished();
        assert_eq!(pending.iter().map(String::as_str).collect::<Vec<_>>(), vec!["a.fits", "c.fits"]);
        assert_eq!(finished.iter().map(String::as_str).collect::<Vec<_>>(), vec!["b.fits"]);
        assert!(pending.is_disjoint(&finished));
        assert_eq!(pending.len() + finished.len(), tracker.len());
    }

    #[test]
    fn test_mark_finished_unknown_key() {
        let mut tracker = SubmissionTracker::new();
        assert!(matches!(
            tracker.mark_finished("nope.fits"),
            Err(ClientError::NotFound(_))
        ));
        assert!(tracker.is_empty());
    }
}
