//! # Protocol Adapter
//!
//! Turns typed operation inputs into API requests and API responses back
//! into typed reports or classified errors.
//!
//! ## Request Side
//!
//! - [`endpoint`] prefixes a path with `/v{API_VERSION}/libpod`
//! - [`ToParams`] converts options records into [`QueryParams`]
//! - [`AuthHeaderBuilder`] produces the `X-Registry-Auth` value
//!
//! ## Response Side
//!
//! | Status | Error kind                                  |
//! |--------|---------------------------------------------|
//! | 2xx    | decoded into the report type                |
//! | 404    | `NotFound`                                  |
//! | 409    | `Conflict`                                  |
//! | 501    | `Unsupported`                               |
//! | other  | `Internal` (`Error::Remote`)                |
//!
//! Error bodies are `{"cause", "message", "response"}`; an undecodable
//! body falls back to the raw text.

mod auth;
mod params;

pub use auth::{AuthHeaderBuilder, Credentials, RegistryAuth};
pub use params::{QueryParams, ToParams};

use crate::constants::api_prefix;
use crate::engine::Operation;
use crate::error::{Error, Result};
use crate::transport::ApiResponse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Returns the full API path for an endpoint.
pub fn endpoint(path: &str) -> String {
    format!("{}{path}", api_prefix())
}

/// Error body returned by the engine API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorModel {
    /// Root cause.
    pub cause: String,
    /// Full message.
    pub message: String,
    /// Echoed HTTP status.
    pub response: u16,
}

impl ErrorModel {
    /// Decodes an error body, falling back to the raw text.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|_| Self {
            cause: String::new(),
            message: String::from_utf8_lossy(body).trim().to_string(),
            response: status,
        })
    }
}

/// The entity a call targets; used to build not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject<'a> {
    /// Entity kind (`container`, `network`, `image`, `artifact`, `system`).
    pub kind: &'a str,
    /// Entity name or ID.
    pub name: &'a str,
}

impl<'a> Subject<'a> {
    /// A container.
    pub fn container(name: &'a str) -> Self {
        Self {
            kind: "container",
            name,
        }
    }

    /// A network.
    pub fn network(name: &'a str) -> Self {
        Self {
            kind: "network",
            name,
        }
    }

    /// An image.
    pub fn image(name: &'a str) -> Self {
        Self { kind: "image", name }
    }

    /// An artifact.
    pub fn artifact(name: &'a str) -> Self {
        Self {
            kind: "artifact",
            name,
        }
    }

    /// The engine itself.
    pub fn system() -> Self {
        Self {
            kind: "system",
            name: "",
        }
    }
}

/// Classifies a failed response to `op`.
pub fn status_error(response: &ApiResponse, op: Operation, subject: Subject<'_>) -> Error {
    let model = ErrorModel::from_body(response.status, &response.body);
    match response.status {
        404 if subject.kind == "container" => Error::ContainerNotFound(subject.name.to_string()),
        404 => Error::NotFound {
            kind: subject.kind.to_string(),
            name: subject.name.to_string(),
            message: model.message,
        },
        409 => Error::Conflict(model.message),
        501 => Error::unsupported(op.name()),
        status => Error::Remote {
            status,
            message: model.message,
        },
    }
}

/// Succeeds for 2xx, otherwise returns the classified error.
pub fn check(response: &ApiResponse, op: Operation, subject: Subject<'_>) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(status_error(response, op, subject))
    }
}

/// Checks the status and decodes a JSON report.
pub fn process<T: DeserializeOwned>(
    response: &ApiResponse,
    op: Operation,
    subject: Subject<'_>,
) -> Result<T> {
    check(response, op, subject)?;
    Ok(serde_json::from_slice(&response.body)?)
}
