//! # Credential Storage
//!
//! Persistence for credentials and the per-triple status list records.
//! Credentials are keyed by their local id and carry issuer, schema, and
//! subject as value-indexed fields. Status list bookkeeping uses three
//! namespaces, each keyed by a stable hash of the
//! ⟨issuer, schema, purpose⟩ triple: the signed status list credential,
//! the pool of allocated indices, and the current-index cursor.

use std::collections::HashSet;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::store::{Store, Tx, WatchKey};
use crate::w3c_vc::model::{StatusPurpose, VerifiableCredential};
use crate::Result;

const CREDENTIAL_NAMESPACE: &str = "credential";
const STATUS_LIST_CREDENTIAL_NAMESPACE: &str = "status-list-credential";
const STATUS_LIST_INDEX_POOL_NAMESPACE: &str = "status-list-index-pool";
const STATUS_LIST_CURRENT_INDEX_NAMESPACE: &str = "status-list-current-index";

/// A credential as persisted, together with its index fields and status
/// flags.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredCredential {
    /// Local credential id (a UUID).
    pub local_credential_id: String,

    /// Issuer DID, indexed by value.
    pub issuer: String,

    /// Subject DID, indexed by value.
    pub subject: String,

    /// Schema id, indexed by value. Empty when the credential was issued
    /// without a schema.
    pub schema: String,

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

impl StoredCredential {
    /// A stored record is valid when it carries both the credential
    /// document and its JWT.
    pub fn is_valid(&self) -> bool {
        !self.local_credential_id.is_empty() && !self.credential_jwt.is_empty()
    }

    /// Whether the credential carries a `credentialStatus` entry.
    pub fn has_credential_status(&self) -> bool {
        self.credential.credential_status.is_some()
    }

    /// The purpose of the credential's status entry, if any.
    pub fn status_purpose(&self) -> Option<StatusPurpose> {
        self.credential.credential_status.as_ref().map(|status| status.status_purpose)
    }

    /// The stored flag corresponding to a status purpose.
    pub fn flag(&self, purpose: StatusPurpose) -> bool {
        match purpose {
            StatusPurpose::Revocation => self.revoked,
            StatusPurpose::Suspension => self.suspended,
        }
    }
}

/// A status list credential as persisted for its triple.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredStatusListCredential {
    /// Local status list credential id (a UUID).
    pub id: String,

    /// Issuer DID of the triple.
    pub issuer: String,

    /// Schema id of the triple. Empty allowed.
    pub schema: String,

    /// Status purpose of the triple.
    pub purpose: StatusPurpose,

    /// The verification method the status list credential was signed
    /// with.
    pub fully_qualified_verification_method_id: String,

    /// The status list credential document.
    pub credential: VerifiableCredential,

    /// The signed status list credential.
    pub credential_jwt: String,
}

/// Storage operations for the credential service.
#[derive(Clone)]
pub struct CredentialStorage {
    store: Store,
}

impl CredentialStorage {
    /// Creates credential storage over a store handle.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The underlying store, for running transactions.
    pub fn store(&self) -> &Store {
        &self.store
    }

    // The three components are joined with fixed labels so distinct
    // triples can never collide byte-wise, then hashed into a stable key.
    fn triple_hash(issuer: &str, schema: &str, purpose: StatusPurpose) -> String {
        let tag = format!("is/{issuer}/sc/{schema}/sp/{purpose}");
        Base64UrlUnpadded::encode_string(&Sha256::digest(tag.as_bytes()))
    }

    /// Watch key of the triple's status list credential.
    pub fn status_list_credential_watch_key(
        issuer: &str, schema: &str, purpose: StatusPurpose,
    ) -> WatchKey {
        WatchKey::new(STATUS_LIST_CREDENTIAL_NAMESPACE, Self::triple_hash(issuer, schema, purpose))
    }

    /// Watch key of the triple's index pool.
    pub fn index_pool_watch_key(issuer: &str, schema: &str, purpose: StatusPurpose) -> WatchKey {
        WatchKey::new(STATUS_LIST_INDEX_POOL_NAMESPACE, Self::triple_hash(issuer, schema, purpose))
    }

    /// Watch key of the triple's current-index cursor.
    pub fn current_index_watch_key(issuer: &str, schema: &str, purpose: StatusPurpose) -> WatchKey {
        WatchKey::new(
            STATUS_LIST_CURRENT_INDEX_NAMESPACE,
            Self::triple_hash(issuer, schema, purpose),
        )
    }

    /// Persists a credential within a transaction.
    pub fn store_credential_tx(&self, tx: &Tx, credential: &StoredCredential) -> Result<()> {
        tx.put_json(CREDENTIAL_NAMESPACE, &credential.local_credential_id, credential)
    }

    /// Reads a credential by local id.
    pub fn get_credential(&self, id: &str) -> Result<StoredCredential> {
        self.store
            .get_json(CREDENTIAL_NAMESPACE, id)?
            .ok_or_else(|| Error::NotFound(format!("credential not found with id: {id}")))
    }

    /// Reads a credential by local id within a transaction.
    pub fn get_credential_tx(&self, tx: &Tx, id: &str) -> Result<StoredCredential> {
        tx.get_json(CREDENTIAL_NAMESPACE, id)?
            .ok_or_else(|| Error::NotFound(format!("credential not found with id: {id}")))
    }

    /// Deletes a credential. Deleting an unknown id is not an error.
    pub fn delete_credential(&self, id: &str) -> Result<()> {
        self.store.delete(CREDENTIAL_NAMESPACE, id)
    }

    /// All stored credentials.
    pub fn list_credentials(&self) -> Result<Vec<StoredCredential>> {
        Ok(self
            .store
            .list_json::<StoredCredential>(CREDENTIAL_NAMESPACE)?
            .into_iter()
            .map(|(_, credential)| credential)
            .collect())
    }

    /// All credentials sharing an issuer and schema, read within a
    /// transaction.
    pub fn credentials_by_issuer_and_schema_tx(
        &self, tx: &Tx, issuer: &str, schema: &str,
    ) -> Result<Vec<StoredCredential>> {
        Ok(tx
            .list_json::<StoredCredential>(CREDENTIAL_NAMESPACE)?
            .into_iter()
            .map(|(_, credential)| credential)
            .filter(|credential| credential.issuer == issuer && credential.schema == schema)
            .collect())
    }

    /// Reads the triple's status list credential, if one exists.
    pub fn get_status_list_credential(
        &self, issuer: &str, schema: &str, purpose: StatusPurpose,
    ) -> Result<Option<StoredStatusListCredential>> {
        self.store.get_json(
            STATUS_LIST_CREDENTIAL_NAMESPACE,
            &Self::triple_hash(issuer, schema, purpose),
        )
    }

    /// Reads the triple's status list credential within a transaction.
    pub fn get_status_list_credential_tx(
        &self, tx: &Tx, issuer: &str, schema: &str, purpose: StatusPurpose,
    ) -> Result<Option<StoredStatusListCredential>> {
        tx.get_json(STATUS_LIST_CREDENTIAL_NAMESPACE, &Self::triple_hash(issuer, schema, purpose))
    }

    /// Persists the triple's status list credential within a transaction.
    pub fn store_status_list_credential_tx(
        &self, tx: &Tx, status_list: &StoredStatusListCredential,
    ) -> Result<()> {
        tx.put_json(
            STATUS_LIST_CREDENTIAL_NAMESPACE,
            &Self::triple_hash(&status_list.issuer, &status_list.schema, status_list.purpose),
            status_list,
        )
    }

    /// Finds a status list credential by its local id.
    pub fn find_status_list_credential(
        &self, id: &str,
    ) -> Result<Option<StoredStatusListCredential>> {
        Ok(self
            .store
            .list_json::<StoredStatusListCredential>(STATUS_LIST_CREDENTIAL_NAMESPACE)?
            .into_iter()
            .map(|(_, status_list)| status_list)
            .find(|status_list| status_list.id == id))
    }

    /// Reads the triple's allocated index pool within a transaction.
    /// A missing pool is empty.
    pub fn get_index_pool_tx(
        &self, tx: &Tx, issuer: &str, schema: &str, purpose: StatusPurpose,
    ) -> Result<HashSet<usize>> {
        Ok(tx
            .get_json(STATUS_LIST_INDEX_POOL_NAMESPACE, &Self::triple_hash(issuer, schema, purpose))?
            .unwrap_or_default())
    }

    /// Persists the triple's allocated index pool within a transaction.
    pub fn store_index_pool_tx(
        &self, tx: &Tx, issuer: &str, schema: &str, purpose: StatusPurpose,
        pool: &HashSet<usize>,
    ) -> Result<()> {
        tx.put_json(STATUS_LIST_INDEX_POOL_NAMESPACE, &Self::triple_hash(issuer, schema, purpose), pool)
    }

    /// Advances the triple's current-index cursor within a transaction.
    pub fn store_current_index_tx(
        &self, tx: &Tx, issuer: &str, schema: &str, purpose: StatusPurpose, index: usize,
    ) -> Result<()> {
        tx.put_json(
            STATUS_LIST_CURRENT_INDEX_NAMESPACE,
            &Self::triple_hash(issuer, schema, purpose),
            &index,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triple_hash_is_stable_and_distinct() {
        let a = CredentialStorage::triple_hash("did:key:A", "schema-1", StatusPurpose::Revocation);
        let b = CredentialStorage::triple_hash("did:key:A", "schema-1", StatusPurpose::Revocation);
        assert_eq!(a, b);

        // any differing component yields a different key
        assert_ne!(
            a,
            CredentialStorage::triple_hash("did:key:B", "schema-1", StatusPurpose::Revocation)
        );
        assert_ne!(
            a,
            CredentialStorage::triple_hash("did:key:A", "", StatusPurpose::Revocation)
        );
        assert_ne!(
            a,
            CredentialStorage::triple_hash("did:key:A", "schema-1", StatusPurpose::Suspension)
        );
    }
}
