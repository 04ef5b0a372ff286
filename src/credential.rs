//! # Credential Service
//!
//! Issuance, verification, listing, status management, and deletion of
//! W3C Verifiable Credentials.
//!
//! Issuance validates the request, resolves and applies a JSON Schema,
//! allocates a status list entry when revocability or suspendability is
//! requested, signs the credential as a JWT with a key from the key
//! store, and persists the result. Everything that touches shared
//! status-list state runs inside [`Store::execute`] so concurrent
//! requests for the same ⟨issuer, schema, purpose⟩ triple serialize by
//! retry.
//!
//! [`Store::execute`]: crate::store::Store::execute

pub mod batch;
mod status;
pub mod storage;

pub use self::status::{UpdateCredentialStatusRequest, UpdateCredentialStatusResponse};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::core::Kind;
use self::storage::{CredentialStorage, StoredCredential};
use crate::error::Error;
use crate::keyaccess::{self, KeyAccess};
use crate::provider::Provider;
use crate::store::{Store, Tx, WatchKey};
use crate::w3c_vc::model::{
    CredentialSchema, CredentialSubject, StatusPurpose, VerifiableCredential, BASE_CONTEXT,
    BASE_TYPE,
};
use crate::{provider, Result};

/// The credential service.
#[derive(Clone)]
pub struct CredentialService<P: Provider> {
    config: Config,
    provider: P,
    storage: CredentialStorage,
}

/// A credential and its metadata, as returned by service operations.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    /// Local credential id.
    pub id: String,

    /// The verification method the credential was signed with.
    pub fully_qualified_verification_method_id: String,

    /// The credential document.
    pub credential: VerifiableCredential,

    /// The signed credential.
    pub credential_jwt: String,

    /// Whether the credential is currently revoked.
    pub revoked: bool,

    /// Whether the credential is currently suspended.
    pub suspended: bool,
}

impl From<StoredCredential> for Container {
    fn from(stored: StoredCredential) -> Self {
        Self {
            id: stored.local_credential_id,
            fully_qualified_verification_method_id: stored
                .fully_qualified_verification_method_id,
            credential: stored.credential,
            credential_jwt: stored.credential_jwt,
            revoked: stored.revoked,
            suspended: stored.suspended,
        }
    }
}

/// Request to issue a credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateCredentialRequest {
    /// Issuer DID.
    pub issuer: String,

    /// Fully-qualified id of the verification method to sign with
    /// (`<did>#<key id>`).
    pub fully_qualified_verification_method_id: String,

    /// Subject DID.
    pub subject: String,

    /// Claims about the subject.
    pub data: Map<String, Value>,

    /// Schema the credential data must comply with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,

    /// Expiry as an RFC3339 date-time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,

    /// Additional JSON-LD context URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Supporting evidence. Elements must be objects carrying both `id`
    /// and `type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<Value>>,

    /// Issue with a revocation status entry. Mutually exclusive with
    /// `suspendable`.
    pub revocable: bool,

    /// Issue with a suspension status entry. Mutually exclusive with
    /// `revocable`.
    pub suspendable: bool,
}

impl CreateCredentialRequest {
    fn has_status(&self) -> bool {
        self.revocable || self.suspendable
    }

    fn is_status_valid(&self) -> bool {
        !(self.revocable && self.suspendable)
    }

    pub(crate) fn status_purpose(&self) -> StatusPurpose {
        if self.suspendable { StatusPurpose::Suspension } else { StatusPurpose::Revocation }
    }

    fn validate(&self) -> Result<()> {
        if !self.is_status_valid() {
            return Err(Error::InvalidRequest("credential may have at most one status".into()));
        }
        if let Some(evidence) = &self.evidence {
            validate_evidence(evidence)?;
        }
        Ok(())
    }

    fn watch_keys(&self) -> Vec<WatchKey> {
        if !self.has_status() || !self.is_status_valid() {
            return Vec::new();
        }
        let purpose = self.status_purpose();
        let schema = self.schema_id.clone().unwrap_or_default();
        vec![
            CredentialStorage::status_list_credential_watch_key(&self.issuer, &schema, purpose),
            CredentialStorage::index_pool_watch_key(&self.issuer, &schema, purpose),
            CredentialStorage::current_index_watch_key(&self.issuer, &schema, purpose),
        ]
    }
}

fn validate_evidence(evidence: &[Value]) -> Result<()> {
    for element in evidence {
        let Some(object) = element.as_object() else {
            return Err(Error::Evidence(
                "invalid evidence format: element is not an object".into(),
            ));
        };
        if !object.contains_key("id") || !object.contains_key("type") {
            return Err(Error::Evidence(
                "invalid evidence format: missing required 'id' or 'type'".into(),
            ));
        }
    }
    Ok(())
}

/// Response to [`CredentialService::create_credential`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateCredentialResponse {
    /// The issued credential.
    pub credential: Container,
}

/// Response to [`CredentialService::get_credential`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetCredentialResponse {
    /// The stored credential.
    pub credential: Container,
}

/// Filters for [`CredentialService::list_credentials`]. An unset filter
/// matches everything; an empty `schema` string selects credentials
/// issued without a schema.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListCredentialsRequest {
    /// Match this issuer DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Match this schema id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Match this subject DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl ListCredentialsRequest {
    fn matches(&self, credential: &StoredCredential) -> bool {
        self.issuer.as_ref().map_or(true, |issuer| credential.issuer == *issuer)
            && self.schema.as_ref().map_or(true, |schema| credential.schema == *schema)
            && self.subject.as_ref().map_or(true, |subject| credential.subject == *subject)
    }
}

/// Response to [`CredentialService::list_credentials`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListCredentialsResponse {
    /// Matching credentials.
    pub credentials: Vec<Container>,
}

/// Response to [`CredentialService::get_credential_status`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetCredentialStatusResponse {
    /// Whether the credential is currently revoked.
    pub revoked: bool,

    /// Whether the credential is currently suspended.
    pub suspended: bool,
}

/// Response to [`CredentialService::get_credential_status_list`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetCredentialStatusListResponse {
    /// The status list credential. Status lists cannot themselves be
    /// revoked or suspended.
    pub credential: Container,
}

/// Request to verify a credential: either its JWT or, for
/// data-integrity credentials, the document itself.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyCredentialRequest {
    /// The credential document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<VerifiableCredential>,

    /// The credential in compact JWT form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_jwt: Option<String>,
}

/// Response to [`CredentialService::verify_credential`]. A failed
/// verification is a response, not an error.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyCredentialResponse {
    /// Whether the credential verified.
    pub verified: bool,

    /// Why verification failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<P: Provider> CredentialService<P> {
    /// Creates a credential service over the given store and providers.
    pub fn new(config: Config, store: Store, provider: P) -> Self {
        Self { config, provider, storage: CredentialStorage::new(store) }
    }

    /// Issues a credential: validates the request, builds and signs the
    /// credential, and persists it, allocating a status list entry when
    /// one was requested.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_credential(
        &self, request: CreateCredentialRequest,
    ) -> Result<CreateCredentialResponse> {
        request.validate()?;
        let watch_keys = request.watch_keys();
        self.storage
            .store()
            .execute(&watch_keys, |tx| self.create_credential_tx(tx, &request))
            .await
    }

    pub(crate) async fn create_credential_tx(
        &self, tx: Tx, request: &CreateCredentialRequest,
    ) -> Result<CreateCredentialResponse> {
        tracing::debug!("creating credential for issuer <{}>", request.issuer);

        if !request.is_status_valid() {
            return Err(Error::InvalidRequest("credential may have at most one status".into()));
        }

        let credential_id = Uuid::new_v4().to_string();
        let credential_uri = self.config.credential_uri(&credential_id);

        // a subject id in the data must agree with the requested subject
        if let Some(id) = request.data.get("id") {
            if *id != Value::String(request.subject.clone()) {
                return Err(Error::InvalidRequest(format!(
                    "cannot set subject<{}>, data already contains a different ID value: {id}",
                    request.subject
                )));
            }
        }
        let mut claims = request.data.clone();
        claims.remove("id");

        let mut builder = VerifiableCredential::builder()
            .id(credential_uri.clone())
            .issuer(request.issuer.clone())
            .subject(CredentialSubject { id: Some(request.subject.clone()), claims });

        if let Some(context) = &request.context {
            builder = builder.add_context(Kind::String(context.clone()));
        }

        // resolve the schema now so the built credential can be validated
        // against it below
        let mut known_schema = None;
        if let Some(schema_id) = &request.schema_id {
            let resolved = self.provider.resolve(schema_id).await.map_err(|e| {
                Error::NotFound(format!("failed to create credential; could not get schema: {e}"))
            })?;
            builder = builder.schema(CredentialSchema {
                id: schema_id.clone(),
                type_: resolved.schema_type.clone(),
            });
            known_schema = Some(resolved);
        }

        if let Some(expiry) = &request.expiry {
            let expiration = DateTime::parse_from_rfc3339(expiry).map_err(|e| {
                Error::InvalidRequest(format!("could not parse expiry date <{expiry}>: {e}"))
            })?;
            builder = builder.expiration_date(expiration.with_timezone(&Utc));
        }

        if request.has_status() {
            let entry = self.allocate_status_entry_tx(&tx, request, &credential_uri).await?;
            builder = builder.status(entry);
        }

        if let Some(evidence) = &request.evidence {
            builder = builder.evidence(evidence.clone());
        }

        let credential = builder
            .build()
            .map_err(|e| Error::Server(format!("could not build credential: {e}")))?;

        if let Some(schema) = &known_schema {
            let document = serde_json::to_value(&credential)
                .map_err(|e| Error::Server(format!("encoding credential: {e}")))?;
            self.provider.validate(schema, &document).await.map_err(|e| {
                Error::SchemaMismatch(format!(
                    "credential data does not comply with the provided schema: {}: {e}",
                    schema.id
                ))
            })?;
        }

        let credential_jwt = self
            .sign_credential_jwt(&request.fully_qualified_verification_method_id, &credential)
            .await?;

        let stored = StoredCredential {
            local_credential_id: credential_id,
            issuer: request.issuer.clone(),
            subject: request.subject.clone(),
            schema: request.schema_id.clone().unwrap_or_default(),
            fully_qualified_verification_method_id: request
                .fully_qualified_verification_method_id
                .clone(),
            credential,
            credential_jwt,
            revoked: false,
            suspended: false,
        };
        self.storage.store_credential_tx(&tx, &stored)?;

        Ok(CreateCredentialResponse { credential: stored.into() })
    }

    /// Signs a credential as a JWT with a key fetched from the key
    /// store. The key must be controlled by the credential's issuer and
    /// must not be revoked.
    pub(crate) async fn sign_credential_jwt(
        &self, verification_method: &str, vc: &VerifiableCredential,
    ) -> Result<String> {
        let key = self.provider.key(verification_method).await.map_err(|e| {
            Error::Key(format!("getting key for signing credential<{verification_method}>: {e}"))
        })?;
        if key.controller != vc.issuer_id() {
            return Err(Error::Key(format!(
                "key controller<{}> does not match credential issuer<{}> for key<{verification_method}>",
                key.controller,
                vc.issuer_id()
            )));
        }
        if key.revoked {
            return Err(Error::Key(format!("cannot use revoked key<{}>", key.id)));
        }

        let access = KeyAccess::new(verification_method, &key.secret_key)
            .map_err(|e| Error::Key(format!("creating key access for key<{}>: {e}", key.id)))?;
        access
            .sign_verifiable_credential(vc)
            .map_err(|e| Error::Server(format!("could not sign credential with key<{}>: {e}", key.id)))
    }

    /// Reads a credential by local id.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_credential(&self, id: &str) -> Result<GetCredentialResponse> {
        let got = self.storage.get_credential(id)?;
        if !got.is_valid() {
            return Err(Error::Server(format!("credential returned is not valid: {id}")));
        }
        Ok(GetCredentialResponse { credential: got.into() })
    }

    /// Lists credentials matching the request's filters.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_credentials(
        &self, request: ListCredentialsRequest,
    ) -> Result<ListCredentialsResponse> {
        let credentials = self
            .storage
            .list_credentials()?
            .into_iter()
            .filter(|credential| request.matches(credential))
            .map(Container::from)
            .collect();
        Ok(ListCredentialsResponse { credentials })
    }

    /// Reads a credential's status flags.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_credential_status(&self, id: &str) -> Result<GetCredentialStatusResponse> {
        let got = self.storage.get_credential(id)?;
        if !got.is_valid() {
            return Err(Error::Server(format!("credential returned is not valid: {id}")));
        }
        Ok(GetCredentialStatusResponse { revoked: got.revoked, suspended: got.suspended })
    }

    /// Reads a status list credential by its local id.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_credential_status_list(
        &self, id: &str,
    ) -> Result<GetCredentialStatusListResponse> {
        let Some(status_list) = self.storage.find_status_list_credential(id)? else {
            return Err(Error::NotFound(format!("credential not found with id: {id}")));
        };
        Ok(GetCredentialStatusListResponse {
            credential: Container {
                id: status_list.id,
                fully_qualified_verification_method_id: status_list
                    .fully_qualified_verification_method_id,
                credential: status_list.credential,
                credential_jwt: status_list.credential_jwt,
                revoked: false,
                suspended: false,
            },
        })
    }

    /// Deletes a credential. Deleting an unknown id is not an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_credential(&self, id: &str) -> Result<()> {
        self.storage.delete_credential(id)
    }

    /// Verifies a credential: signature (for JWTs), non-expiry, data
    /// model conformance, and schema compliance when a schema is
    /// referenced. A failed verification is reported in the response,
    /// not as an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn verify_credential(
        &self, request: VerifyCredentialRequest,
    ) -> Result<VerifyCredentialResponse> {
        let outcome = match (&request.credential_jwt, &request.credential) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidRequest(
                    "only one of credential or credential JWT can be provided".into(),
                ));
            }
            (None, None) => {
                return Err(Error::InvalidRequest(
                    "either a credential or a credential JWT must be provided".into(),
                ));
            }
            (Some(jwt), None) => self.verify_jwt_credential(jwt).await,
            (None, Some(credential)) => self.verify_credential_document(credential).await,
        };

        match outcome {
            Ok(()) => Ok(VerifyCredentialResponse { verified: true, reason: None }),
            Err(e) => {
                Ok(VerifyCredentialResponse { verified: false, reason: Some(e.to_string()) })
            }
        }
    }

    async fn verify_jwt_credential(&self, token: &str) -> provider::Result<()> {
        let (header, _) = keyaccess::decode(token)?;
        let verifying_key = self
            .provider
            .resolve_key(&header.kid)
            .await
            .map_err(|e| anyhow::anyhow!("resolving verification method <{}>: {e}", header.kid))?;
        let claims = keyaccess::verify(token, &verifying_key)?;
        self.verify_credential_document(&claims.vc).await
    }

    async fn verify_credential_document(
        &self, vc: &VerifiableCredential,
    ) -> provider::Result<()> {
        if let Some(expiration) = vc.expiration_date {
            if expiration < Utc::now() {
                anyhow::bail!("credential has expired");
            }
        }

        // data model conformance
        if !vc.context.iter().any(|c| matches!(c, Kind::String(s) if s == BASE_CONTEXT)) {
            anyhow::bail!("credential is missing the base @context");
        }
        if !vc.type_.contains(&BASE_TYPE.to_string()) {
            anyhow::bail!("credential is missing the VerifiableCredential type");
        }
        if vc.issuer_id().is_empty() {
            anyhow::bail!("credential has no issuer");
        }

        if let Some(schema) = &vc.credential_schema {
            let resolved = self.provider.resolve(&schema.id).await?;
            let document = serde_json::to_value(vc)?;
            self.provider.validate(&resolved, &document).await?;
        }

        Ok(())
    }
}
