//! # Vault Route Handling
//!
//! Purpose: Turn an encrypt/decrypt JSON request into an HTTP status and a
//! JSON body, storing ciphertext in VeroKV.
//!
//! ## Status Mapping
//!
//! | situation                                   | status |
//! |---------------------------------------------|--------|
//! | body is not JSON, or `operation` missing    | 400    |
//! | decrypt-only body without `secret`          | 400    |
//! | unknown operation / missing message, secret | 400    |
//! | lookup timed out or failed                  | 404    |
//! | stored value empty or the not-found reply   | 404    |
//! | store write or decryption failed            | 500    |

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use vkv_client::KVClient;

use crate::cipher::{decrypt_message, encrypt_message, generate_secret, hash_secret};
use crate::error::VaultResult;
use crate::timeout::{get_with_timeout, DEFAULT_LOOKUP_TIMEOUT};

/// Incoming request body.
#[derive(Debug, Default, Deserialize)]
pub struct VaultRequest {
    pub operation: Option<String>,
    pub message: Option<String>,
    pub secret: Option<String>,
}

/// Body of the decrypt-only route: just the secret, no operation.
#[derive(Debug, Default, Deserialize)]
pub struct DecryptRequest {
    pub secret: Option<String>,
}

/// Status code plus JSON body, ready for any HTTP layer to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    pub body: Value,
}

impl RouteResponse {
    fn ok(body: Value) -> Self {
        RouteResponse { status: 200, body }
    }

    fn error(status: u16, message: &str) -> Self {
        RouteResponse {
            status,
            body: json!({ "error": message }),
        }
    }
}

/// Stores encrypted messages under hashed secrets.
pub struct SecretVault {
    client: KVClient,
    lookup_timeout: Duration,
    not_found: Option<String>,
}

impl SecretVault {
    pub fn new(client: KVClient) -> Self {
        SecretVault {
            client,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            not_found: None,
        }
    }

    /// Overrides the 5 second lookup deadline.
    pub fn with_lookup_timeout(mut self, limit: Duration) -> Self {
        self.lookup_timeout = limit;
        self
    }

    /// Reply text the store uses for a missing key; treated like an empty value.
    pub fn with_not_found_reply(mut self, reply: impl Into<String>) -> Self {
        self.not_found = Some(reply.into());
        self
    }

    /// Handles one raw request body.
    pub async fn handle(&self, body: &[u8]) -> RouteResponse {
        let request: VaultRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "invalid request body");
                return RouteResponse::error(400, "Invalid request body");
            }
        };
        self.handle_request(request).await
    }

    /// Handles an already-parsed request.
    pub async fn handle_request(&self, request: VaultRequest) -> RouteResponse {
        let operation = match non_empty(&request.operation) {
            Some(operation) => operation,
            None => return RouteResponse::error(400, "Operation type is required"),
        };

        match (operation, non_empty(&request.message), non_empty(&request.secret)) {
            ("encrypt", Some(message), _) => self.encrypt_route(message).await,
            ("decrypt", _, Some(secret)) => self.decrypt_route(secret).await,
            _ => RouteResponse::error(400, "Invalid operation or missing parameters"),
        }
    }

    /// Handles a raw `{ "secret": ... }` body for the decrypt-only route.
    pub async fn handle_decrypt(&self, body: &[u8]) -> RouteResponse {
        let request: DecryptRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "invalid decrypt body");
                return RouteResponse::error(400, "Invalid request body");
            }
        };
        match non_empty(&request.secret) {
            Some(secret) => self.decrypt_route(secret).await,
            None => RouteResponse::error(400, "Secret is required"),
        }
    }

    /// Encrypts and stores `message`, returning the freshly generated secret.
    pub async fn encrypt(&self, message: &str) -> VaultResult<String> {
        let secret = generate_secret();
        let encrypted = encrypt_message(&secret, message)?;
        self.client
            .set(hash_secret(&secret).as_bytes(), encrypted.as_bytes())
            .await?;
        Ok(secret)
    }

    async fn encrypt_route(&self, message: &str) -> RouteResponse {
        match self.encrypt(message).await {
            Ok(secret) => RouteResponse::ok(json!({ "secret": secret })),
            Err(err) => {
                error!(error = %err, "encrypt route failed");
                RouteResponse::error(500, "Internal Server Error")
            }
        }
    }

    async fn decrypt_route(&self, secret: &str) -> RouteResponse {
        let key = hash_secret(secret);
        let encrypted = match get_with_timeout(&self.client, &key, self.lookup_timeout).await {
            Ok(encrypted) => encrypted,
            Err(err) => {
                error!(error = %err, "secret lookup failed");
                return RouteResponse::error(404, "No Secret found");
            }
        };

        if encrypted.is_empty() || self.not_found.as_deref() == Some(encrypted.as_str()) {
            return RouteResponse::error(404, "Encrypted message is missing");
        }

        match decrypt_message(secret, &encrypted) {
            Ok(message) => RouteResponse::ok(json!({ "message": message })),
            Err(err) => {
                error!(error = %err, "decrypt route failed");
                RouteResponse::error(500, "Internal Server Error")
            }
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}
