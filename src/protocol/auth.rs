//! Registry credential header.
//!
//! Pulls forward credentials in the `X-Registry-Auth` header as base64url
//! JSON. Username and password win over an auth file; with neither, no
//! header is sent.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::Serialize;
use std::path::Path;

/// Credential sources for one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    /// Auth file in `{"auths": {...}}` form.
    pub authfile: Option<&'a Path>,
    /// Registry username.
    pub username: Option<&'a str>,
    /// Registry password.
    pub password: Option<&'a str>,
}

/// Turns credentials into a registry auth header value.
pub trait AuthHeaderBuilder: Send + Sync {
    /// Returns the header value, or `None` when no credentials are given.
    fn header_value(&self, credentials: &Credentials<'_>) -> Result<Option<String>>;
}

/// Default builder producing base64url-encoded JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryAuth;

#[derive(Serialize)]
struct BasicAuth<'a> {
    username: &'a str,
    password: &'a str,
}

impl AuthHeaderBuilder for RegistryAuth {
    fn header_value(&self, credentials: &Credentials<'_>) -> Result<Option<String>> {
        if credentials.username.is_some() || credentials.password.is_some() {
            let json = serde_json::to_vec(&BasicAuth {
                username: credentials.username.unwrap_or_default(),
                password: credentials.password.unwrap_or_default(),
            })?;
            return Ok(Some(URL_SAFE.encode(json)));
        }

        let Some(path) = credentials.authfile else {
            return Ok(None);
        };
        let contents = std::fs::read(path)
            .map_err(|e| Error::Auth(format!("failed to read {}: {e}", path.display())))?;
        let doc: serde_json::Value = serde_json::from_slice(&contents)
            .map_err(|e| Error::Auth(format!("failed to parse {}: {e}", path.display())))?;
        let auths = match doc.get("auths") {
            Some(auths @ serde_json::Value::Object(_)) => auths.clone(),
            None => serde_json::Value::Object(Default::default()),
            Some(_) => {
                return Err(Error::Auth(format!(
                    "{}: \"auths\" must be an object",
                    path.display()
                )));
            }
        };
        Ok(Some(URL_SAFE.encode(serde_json::to_vec(&auths)?)))
    }
}
