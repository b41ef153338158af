//! # Request Builder
//!
//! Every call the service understands is one variant of the closed
//! [`Operation`] enum. [`build`] turns an operation plus its [`Params`] into a
//! transport-independent [`ApiRequest`]: method, path relative to the API root,
//! and body encoding.
//!
//! | Operation        | Method | Path                          | Body      |
//! |------------------|--------|-------------------------------|-----------|
//! | Login            | POST   | `/login`                      | form      |
//! | Upload           | POST   | `/upload`                     | multipart |
//! | UrlUpload        | POST   | `/url_upload`                 | form      |
//! | SubmissionStatus | GET    | `/submissions/{id}`           | none      |
//! | JobStatus        | GET    | `/jobs/{id}`                  | none      |
//! | Calibration      | GET    | `/jobs/{id}/calibration`      | none      |
//! | Tags             | GET    | `/jobs/{id}/machine_tags`     | none      |
//! | KnownObjects     | GET    | `/jobs/{id}/objects_in_field` | none      |
//! | Annotations      | GET    | `/jobs/{id}/annotations`      | none      |
//! | JobResults       | GET    | `/jobs/{id}/info`             | none      |
//!
//! Uploads never grant the service any rights over the image: commercial use,
//! modification and public visibility are always sent as `"n"`.

use serde_json::json;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::common::{ClientError, Result};

/// Name of the form field carrying the JSON arguments of a POST.
pub const REQUEST_JSON_FIELD: &str = "request-json";

/// Name of the multipart field carrying the image bytes.
pub const FILE_FIELD: &str = "file";

/// Consent flag value sent for every permission the service asks about.
const DENIED: &str = "n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Upload,
    UrlUpload,
    SubmissionStatus,
    JobStatus,
    Calibration,
    Tags,
    KnownObjects,
    Annotations,
    JobResults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Operation {
    pub fn method(self) -> Method {
        match self {
            Operation::Login | Operation::Upload | Operation::UrlUpload => Method::Post,
            _ => Method::Get,
        }
    }

    /// Path template relative to the API root. `{id}` is replaced by the
    /// submission or job id.
    pub fn path_template(self) -> &'static str {
        match self {
            Operation::Login => "/login",
            Operation::Upload => "/upload",
            Operation::UrlUpload => "/url_upload",
            Operation::SubmissionStatus => "/submissions/{id}",
            Operation::JobStatus => "/jobs/{id}",
            Operation::Calibration => "/jobs/{id}/calibration",
            Operation::Tags => "/jobs/{id}/machine_tags",
            Operation::KnownObjects => "/jobs/{id}/objects_in_field",
            Operation::Annotations => "/jobs/{id}/annotations",
            Operation::JobResults => "/jobs/{id}/info",
        }
    }

    /// Whether the request carries the session token.
    pub fn requires_session(self) -> bool {
        matches!(self, Operation::Upload | Operation::UrlUpload)
    }

    fn is_templated(self) -> bool {
        self.path_template().contains("{id}")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Caller-supplied arguments for an operation.
#[derive(Debug, Clone, Copy)]
pub enum Params<'a> {
    Login { api_key: &'a str },
    Upload { session: &'a str, file: &'a Path },
    UrlUpload { session: &'a str, url: &'a str },
    /// Numeric submission or job id.
    Id(u64),
    /// Submission or job id as received from elsewhere (CLI, logs).
    IdStr(&'a str),
}

/// File streamed as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// `multipart/form-data`: text fields followed by one file part.
    Multipart {
        fields: Vec<(String, String)>,
        file: FilePart,
    },
}

/// A fully-formed request, independent of the HTTP library that sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub operation: Operation,
    pub method: Method,
    /// Path relative to the API root, ids already substituted.
    pub path: String,
    pub body: RequestBody,
}

impl ApiRequest {
    /// Value of a text field in a form or multipart body.
    pub fn field(&self, name: &str) -> Option<&str> {
        let fields = match &self.body {
            RequestBody::Form(fields) | RequestBody::Multipart { fields, .. } => fields,
            RequestBody::Empty => return None,
        };
        fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Build the request for `operation` from `params`.
///
/// # Errors
///
/// * [`ClientError::Validation`] - parameters do not fit the operation, or an
///   id / key / url is empty or malformed
/// * [`ClientError::Io`] - the upload source cannot be opened or is not a
///   regular file
pub fn build(operation: Operation, params: Params<'_>) -> Result<ApiRequest> {
    let method = operation.method();

    let (path, body) = match (operation, params) {
        (Operation::Login, Params::Login { api_key }) => {
            non_empty("api key", api_key)?;
            let args = json!({ "apikey": api_key });
            (operation.path_template().to_string(), form_body(args))
        }
        (Operation::Upload, Params::Upload { session, file }) => {
            non_empty("session key", session)?;
            let file = file_part(file)?;
            let body = RequestBody::Multipart {
                fields: vec![(REQUEST_JSON_FIELD.to_string(), consent_args(session, None))],
                file,
            };
            (operation.path_template().to_string(), body)
        }
        (Operation::UrlUpload, Params::UrlUpload { session, url }) => {
            non_empty("session key", session)?;
            non_empty("url", url)?;
            let args = consent_args(session, Some(url));
            (
                operation.path_template().to_string(),
                RequestBody::Form(vec![(REQUEST_JSON_FIELD.to_string(), args)]),
            )
        }
        (op, Params::Id(id)) if op.is_templated() => (substitute(op, &id.to_string()), RequestBody::Empty),
        (op, Params::IdStr(id)) if op.is_templated() => {
            let id = id.trim();
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
                return Err(ClientError::Validation(format!(
                    "{} expects a numeric id, got '{}'",
                    op, id
                )));
            }
            (substitute(op, id), RequestBody::Empty)
        }
        (op, params) => {
            return Err(ClientError::Validation(format!(
                "{} cannot be built from {:?}",
                op, params
            )))
        }
    };

    Ok(ApiRequest {
        operation,
        method,
        path,
        body,
    })
}

fn substitute(operation: Operation, id: &str) -> String {
    operation.path_template().replace("{id}", id)
}

fn non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn form_body(args: serde_json::Value) -> RequestBody {
    RequestBody::Form(vec![(REQUEST_JSON_FIELD.to_string(), args.to_string())])
}

fn consent_args(session: &str, url: Option<&str>) -> String {
    let mut args = json!({
        "session": session,
        "allow_commercial_use": DENIED,
        "allow_modifications": DENIED,
        "publicly_visible": DENIED,
    });
    if let Some(url) = url {
        args["url"] = json!(url);
    }
    args.to_string()
}

/// Opens the file once so a missing or unreadable source surfaces here as an
/// I/O error rather than halfway through the transfer.
fn file_part(path: &Path) -> Result<FilePart> {
    let file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(ClientError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        )));
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ClientError::Validation(format!("{} has no usable file name", path.display()))
        })?
        .to_string();

    Ok(FilePart {
        field: FILE_FIELD.to_string(),
        path: path.to_path_buf(),
        file_name,
    })
}
