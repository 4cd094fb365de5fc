//! Caller identification and credentials attached to outgoing calls

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use tonic::metadata::AsciiMetadataValue;
use tracing::warn;

/// gRPC metadata key carrying the calling function/module
pub const CALLER_METADATA_KEY: &str = "caller";

/// HTTP header carrying the calling function/module
pub const CALLER_HEADER: &str = "x-caller";

pub const AUTHORIZATION_KEY: &str = "authorization";

/// Static credentials sent as `authorization: Basic ...` on every attempt
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Attach caller identification and optional credentials to a gRPC request.
///
/// Purely informational: a caller string that is not valid metadata is
/// skipped with a warning instead of failing the call.
pub fn attach_grpc<T>(request: &mut tonic::Request<T>, caller: &str, auth: Option<&BasicAuth>) {
    match caller.parse::<AsciiMetadataValue>() {
        Ok(value) => {
            request.metadata_mut().insert(CALLER_METADATA_KEY, value);
        }
        Err(e) => {
            warn!(caller, "Failed to parse caller as metadata: {}", e);
        }
    }

    if let Some(auth) = auth {
        match auth.header_value().parse::<AsciiMetadataValue>() {
            Ok(value) => {
                request.metadata_mut().insert(AUTHORIZATION_KEY, value);
            }
            Err(e) => {
                warn!(username = auth.username(), "Failed to encode credentials: {}", e);
            }
        }
    }
}
