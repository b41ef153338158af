//! # Session Manager
//!
//! Owns the short-lived session token obtained by exchanging the long-lived
//! API key at `/login`, and routes every call through [`Session::call`].
//!
//! ## State machine
//!
//! ```text
//! Unauthenticated --login ok--> Authenticated(token)
//! Authenticated(token) --"no session with key"--> Unauthenticated
//!     --login ok--> Authenticated(new token) --> original call retried once
//! ```
//!
//! The service has no status code for an expired session; the only signal is
//! the text of the error message, matched by [`is_session_expired`]. A second
//! expiry right after a successful re-login is surfaced as
//! [`ClientError::Auth`] instead of retried again.

use log::{debug, info, warn};

use crate::api::{self, responses::LoginResponse, ApiRequest, Operation, Params};
use crate::client::transport::Transport;
use crate::common::{ClientError, Result};

/// Phrase the service puts in the error message of calls made with an
/// expired or unknown session key.
const SESSION_EXPIRED_PHRASE: &str = "no session with key";

/// Re-authentications allowed within one call.
const MAX_SESSION_RETRIES: u32 = 1;

/// True when a service error message reports an expired session.
pub fn is_session_expired(message: &str) -> bool {
    message.contains(SESSION_EXPIRED_PHRASE)
}

/// Session token plus the credential used to renew it.
pub struct Session {
    api_key: String,
    token: Option<String>,
}

impl Session {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            token: None,
        }
    }

    /// Current token, if a login has succeeded and not been invalidated since.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Forget the current token; the next call logs in again.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    /// Log in with the API key and store the returned token.
    ///
    /// # Errors
    ///
    /// * [`ClientError::Auth`] - the service refused the key or returned no session
    /// * transport, timeout and decode errors are propagated unchanged
    pub fn authenticate<T: Transport>(&mut self, transport: &T) -> Result<String> {
        self.token = None;

        let request = api::build(
            Operation::Login,
            Params::Login {
                api_key: &self.api_key,
            },
        )?;
        let raw = transport.send(&request)?;

        let response: LoginResponse = match api::decode(&raw) {
            Ok(response) => response,
            Err(ClientError::Service { message }) => return Err(ClientError::Auth(message)),
            Err(e) => return Err(e),
        };

        if response.session.is_empty() {
            return Err(ClientError::Auth(format!(
                "login answered '{}' without a session key",
                response.status
            )));
        }

        info!("🔑 Session established");
        self.token = Some(response.session.clone());
        Ok(response.session)
    }

    /// Return the current token, logging in first if there is none.
    pub fn ensure_session<T: Transport>(&mut self, transport: &T) -> Result<String> {
        match &self.token {
            Some(token) => Ok(token.clone()),
            None => self.authenticate(transport),
        }
    }

    /// Run one API call with a valid session.
    ///
    /// `make_request` receives the token and builds the request; it is invoked
    /// again with the new token if the first attempt reports an expired
    /// session. At most [`MAX_SESSION_RETRIES`] re-logins happen per call.
    pub fn call<T, R, F>(&mut self, transport: &T, make_request: F) -> Result<R>
    where
        T: Transport,
        R: serde::de::DeserializeOwned,
        F: Fn(&str) -> Result<ApiRequest>,
    {
        let mut retries = 0;

        loop {
            let token = self.ensure_session(transport)?;
            let request = make_request(&token)?;
            debug!("{} {} {}", request.operation, request.method, request.path);

            let outcome = transport
                .send(&request)
                .and_then(|raw| api::decode::<R>(&raw));

            match outcome {
                Err(ClientError::Service { message }) if is_session_expired(&message) => {
                    self.invalidate();

                    if retries >= MAX_SESSION_RETRIES {
                        return Err(ClientError::Auth(format!(
                            "session rejected again after re-authentication: {}",
                            message
                        )));
                    }
                    retries += 1;

                    warn!(
                        "🔄 Session expired during {}, re-authenticating (retry {}/{})",
                        request.operation, retries, MAX_SESSION_RETRIES
                    );
                    self.authenticate(transport)?;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned bodies in order and counts requests per path.
    struct Replay {
        bodies: RefCell<VecDeque<&'static str>>,
        paths: RefCell<Vec<String>>,
    }

    impl Replay {
        fn new(bodies: &[&'static str]) -> Self {
            Self {
                bodies: RefCell::new(bodies.iter().copied().collect()),
                paths: RefCell::new(Vec::new()),
            }
        }

        fn count(&self, path: &str) -> usize {
            self.paths.borrow().iter().filter(|p| *p == path).count()
        }
    }

    impl Transport for Replay {
        fn send(&self, request: &ApiRequest) -> Result<Vec<u8>> {
            self.paths.borrow_mut().push(request.path.clone());
            let body = self
                .bodies
                .borrow_mut()
                .pop_front()
                .expect("no canned response left");
            Ok(body.as_bytes().to_vec())
        }
    }

    const LOGIN_OK: &str = r#"{"status": "success", "message": "authenticated user: a@b.c", "session": "tok1"}"#;
    const LOGIN_OK_2: &str = r#"{"status": "success", "session": "tok2"}"#;
    const EXPIRED: &str = r#"{"status": "error", "errormessage": "no session with key \"tok1\""}"#;
    const JOB_OK: &str = r#"{"status": "success"}"#;

    fn job_status(_token: &str) -> Result<ApiRequest> {
        api::build(Operation::JobStatus, Params::Id(555))
    }

    #[test]
    fn test_expiry_phrase_detection() {
        assert!(is_session_expired("no session with key 'abc'"));
        assert!(!is_session_expired("bad apikey"));
    }

    #[test]
    fn test_first_call_logs_in() {
        let transport = Replay::new(&[LOGIN_OK, JOB_OK]);
        let mut session = Session::new("key".into());

        let status: api::responses::JobStatus = session.call(&transport, job_status).unwrap();

        assert_eq!(status.status, "success");
        assert_eq!(session.token(), Some("tok1"));
        assert_eq!(transport.count("/login"), 1);
    }

    #[test]
    fn test_expired_session_is_renewed_once() {
        let transport = Replay::new(&[LOGIN_OK, EXPIRED, LOGIN_OK_2, JOB_OK]);
        let mut session = Session::new("key".into());

        let status: api::responses::JobStatus = session.call(&transport, job_status).unwrap();

        assert_eq!(status.status, "success");
        assert_eq!(session.token(), Some("tok2"));
        assert_eq!(transport.count("/login"), 2);
        assert_eq!(transport.count("/jobs/555"), 2);
    }

    #[test]
    fn test_second_expiry_is_auth_error() {
        let transport = Replay::new(&[LOGIN_OK, EXPIRED, LOGIN_OK_2, EXPIRED]);
        let mut session = Session::new("key".into());

        let err = session
            .call::<_, api::responses::JobStatus, _>(&transport, job_status)
            .unwrap_err();

        assert!(matches!(err, ClientError::Auth(_)));
        assert_eq!(transport.count("/login"), 2);
        assert_eq!(transport.count("/jobs/555"), 2);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_rejected_api_key_is_auth_error() {
        let transport = Replay::new(&[r#"{"status": "error", "errormessage": "bad apikey"}"#]);
        let mut session = Session::new("wrong".into());

        match session.authenticate(&transport).unwrap_err() {
            ClientError::Auth(message) => assert_eq!(message, "bad apikey"),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_other_service_errors_are_not_retried() {
        let transport = Replay::new(&[
            LOGIN_OK,
            r#"{"status": "error", "errormessage": "no job with id 555"}"#,
        ]);
        let mut session = Session::new("key".into());

        let err = session
            .call::<_, api::responses::JobStatus, _>(&transport, job_status)
            .unwrap_err();

        assert!(matches!(err, ClientError::Service { .. }));
        assert_eq!(transport.count("/login"), 1);
        assert!(session.is_authenticated());
    }
}
