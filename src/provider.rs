//! # Providers
//!
//! Traits implemented by the service's external collaborators: the key
//! store, the schema service, and the DID resolver. Implementations live
//! outside this crate; errors cross the boundary as [`anyhow::Error`] and
//! are wrapped with context by the service.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type for provider operations.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// A signing key as held by the external key store.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Key {
    /// Key store identifier, typically the fully-qualified verification
    /// method id (`<did>#<key id>`).
    pub id: String,

    /// DID of the key's controller. Must match the credential issuer for
    /// the key to be usable for signing.
    pub controller: String,

    /// A revoked key can no longer be used to sign credentials.
    pub revoked: bool,

    /// Raw Ed25519 secret key bytes.
    pub secret_key: Vec<u8>,
}

/// The `KeyStore` trait specifies how signing keys are retrieved.
pub trait KeyStore: Send + Sync {
    /// Fetches a key by its key store id. Errors if the key is unknown.
    fn key(&self, key_id: &str) -> impl Future<Output = Result<Key>> + Send;
}

/// A schema resolved by the external schema service.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ResolvedSchema {
    /// Schema identifier (a URI).
    pub id: String,

    /// The JSON Schema document.
    pub schema: Value,

    /// The schema type string recorded on issued credentials, for
    /// example `JsonSchema2023`.
    pub schema_type: String,
}

/// The `SchemaResolver` trait specifies how credential schemas are
/// resolved and how credential data is validated against them. The
/// JSON Schema dialect and validation mechanics are the implementer's
/// concern.
pub trait SchemaResolver: Send + Sync {
    /// Resolves a schema by id. Errors if the schema is unknown.
    fn resolve(&self, schema_id: &str) -> impl Future<Output = Result<ResolvedSchema>> + Send;

    /// Validates a credential document against a resolved schema.
    fn validate(
        &self, schema: &ResolvedSchema, credential: &Value,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The `DidResolver` trait specifies how verification keys are resolved
/// for credential verification.
pub trait DidResolver: Send + Sync {
    /// Resolves the Ed25519 verifying key bytes for a fully-qualified
    /// verification method.
    fn resolve_key(
        &self, verification_method: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Everything the credential service needs from its environment.
pub trait Provider: KeyStore + SchemaResolver + DidResolver + Clone + Send + Sync {}
