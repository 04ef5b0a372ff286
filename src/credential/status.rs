//! # Status-List Engine
//!
//! Allocation of status list entries at issuance time and regeneration
//! of status list credentials on status updates.
//!
//! Each ⟨issuer, schema, purpose⟩ triple owns exactly one status list
//! credential. Issuance draws a fresh, unique index for the triple;
//! updates rebuild the triple's bitstring from every stored credential
//! sharing the ⟨issuer, schema⟩ pair and re-sign the list. Both paths
//! run inside [`Store::execute`] with the triple's keys watched, so
//! concurrent writers serialize by retry and the aggregate bitstring
//! never goes stale.
//!
//! [`Store::execute`]: crate::store::Store::execute

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::credential::storage::{CredentialStorage, StoredStatusListCredential};
use crate::credential::{CreateCredentialRequest, CredentialService};
use crate::error::Error;
use crate::provider::Provider;
use crate::statuslist;
use crate::store::{Tx, WatchKey};
use crate::w3c_vc::model::{CredentialStatus, StatusPurpose};
use crate::Result;

/// Request to update a credential's status flags. At most one flag may
/// be asserted, and it must match the purpose the credential was issued
/// with.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateCredentialStatusRequest {
    /// Local credential id.
    pub id: String,

    /// Desired revoked state.
    pub revoked: bool,

    /// Desired suspended state.
    pub suspended: bool,
}

/// Response to [`CredentialService::update_credential_status`]: the
/// credential's status after the update.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateCredentialStatusResponse {
    /// Local credential id.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Whether the credential is now revoked.
    pub revoked: bool,

    /// Whether the credential is now suspended.
    pub suspended: bool,
}

impl<P: Provider> CredentialService<P> {
    /// Allocates a status list entry for a credential being issued.
    ///
    /// Creates and signs the triple's status list credential if this is
    /// the triple's first member, then draws a random unused index from
    /// the triple's pool and advances the cursor hint. Runs within the
    /// issuance transaction; the caller watches all three triple keys.
    pub(crate) async fn allocate_status_entry_tx(
        &self, tx: &Tx, request: &CreateCredentialRequest, credential_uri: &str,
    ) -> Result<CredentialStatus> {
        let purpose = request.status_purpose();
        let issuer = &request.issuer;
        let schema = request.schema_id.clone().unwrap_or_default();

        let existing =
            self.storage.get_status_list_credential_tx(tx, issuer, &schema, purpose)?;
        let status_list_uri = match existing {
            Some(status_list) => status_list.credential.id.clone().unwrap_or_default(),
            None => {
                let status_list_id = Uuid::new_v4().to_string();
                let status_uri = self.config.status_credential_uri(&status_list_id);

                // the first member starts from an all-zero list
                let status_vc = statuslist::generate_status_list_credential(
                    &status_uri,
                    issuer,
                    purpose,
                    &[],
                )?;
                let status_jwt = self
                    .sign_credential_jwt(
                        &request.fully_qualified_verification_method_id,
                        &status_vc,
                    )
                    .await?;

                self.storage.store_status_list_credential_tx(
                    tx,
                    &StoredStatusListCredential {
                        id: status_list_id,
                        issuer: issuer.clone(),
                        schema: schema.clone(),
                        purpose,
                        fully_qualified_verification_method_id: request
                            .fully_qualified_verification_method_id
                            .clone(),
                        credential: status_vc,
                        credential_jwt: status_jwt,
                    },
                )?;
                status_uri
            }
        };

        // random draw keeps indices uncorrelated with issuance order; the
        // pool is authoritative on collisions
        let mut pool = self.storage.get_index_pool_tx(tx, issuer, &schema, purpose)?;
        let index = {
            let mut rng = rand::thread_rng();
            loop {
                let candidate = rng.gen_range(0..statuslist::MAX_ENTRIES);
                if !pool.contains(&candidate) {
                    break candidate;
                }
            }
        };
        pool.insert(index);
        self.storage.store_index_pool_tx(tx, issuer, &schema, purpose, &pool)?;
        self.storage.store_current_index_tx(tx, issuer, &schema, purpose, index)?;

        Ok(CredentialStatus {
            id: format!("{credential_uri}/status"),
            type_: statuslist::STATUS_LIST_2021_ENTRY.into(),
            status_purpose: purpose,
            status_list_index: index.to_string(),
            status_list_credential: status_list_uri,
        })
    }

    /// Updates a credential's status flags and regenerates its triple's
    /// status list credential.
    #[instrument(level = "debug", skip(self))]
    pub async fn update_credential_status(
        &self, request: UpdateCredentialStatusRequest,
    ) -> Result<UpdateCredentialStatusResponse> {
        let watch_key = self.status_list_credential_watch_key_for(&request.id)?;
        self.storage
            .store()
            .execute(&[watch_key], |tx| self.update_credential_status_tx(tx, &request))
            .await
    }

    /// Derives the watch key guarding a credential's status list. Fails
    /// when the credential has no status entry or its status list
    /// credential is missing.
    pub(crate) fn status_list_credential_watch_key_for(&self, id: &str) -> Result<WatchKey> {
        let got = self.storage.get_credential(id)?;

        let Some(purpose) = got.status_purpose() else {
            return Err(Error::NoStatusField(format!(
                "credential {:?} has no credentialStatus field",
                got.local_credential_id
            )));
        };

        if self.storage.get_status_list_credential(&got.issuer, &got.schema, purpose)?.is_none() {
            return Err(Error::Server(
                "status list credential should exist in order to update".into(),
            ));
        }

        Ok(CredentialStorage::status_list_credential_watch_key(&got.issuer, &got.schema, purpose))
    }

    pub(crate) async fn update_credential_status_tx(
        &self, tx: Tx, request: &UpdateCredentialStatusRequest,
    ) -> Result<UpdateCredentialStatusResponse> {
        tracing::debug!(
            "updating credential status: {} to revoked: {}, suspended: {}",
            request.id,
            request.revoked,
            request.suspended
        );

        if request.suspended && request.revoked {
            return Err(Error::InvalidRequest(
                "cannot update both suspended and revoked status".into(),
            ));
        }

        let got = self.storage.get_credential_tx(&tx, &request.id)?;
        if !got.is_valid() {
            return Err(Error::Server(format!("credential returned is not valid: {}", request.id)));
        }

        // same status as requested, nothing to do
        if got.revoked == request.revoked && got.suspended == request.suspended {
            tracing::warn!("request and credential have same status, no action is needed");
            return Ok(UpdateCredentialStatusResponse {
                id: got.local_credential_id,
                revoked: got.revoked,
                suspended: got.suspended,
            });
        }

        let Some(purpose) = got.status_purpose() else {
            return Err(Error::NoStatusField(format!(
                "credential {:?} has no credentialStatus field",
                request.id
            )));
        };

        let requested_purpose = if request.revoked {
            Some(StatusPurpose::Revocation)
        } else if request.suspended {
            Some(StatusPurpose::Suspension)
        } else {
            // clearing flags always targets the credential's own purpose
            None
        };
        if let Some(requested) = requested_purpose {
            if requested != purpose {
                return Err(Error::StatusPurpose(format!(
                    "credential {:?} has a different status purpose<{purpose}> value than the status credential<{requested}>",
                    request.id
                )));
            }
        }

        // persist the updated flags
        let mut updated = got.clone();
        updated.revoked = request.revoked;
        updated.suspended = request.suspended;
        self.storage.store_credential_tx(&tx, &updated)?;

        let Some(entry) = &got.credential.credential_status else {
            return Err(Error::NoStatusField(format!(
                "credential {:?} has no credentialStatus field",
                request.id
            )));
        };
        let status_list_uri = entry.status_list_credential.clone();
        if status_list_uri.is_empty() {
            return Err(Error::Server("problem with getting status list credential id".into()));
        }
        let status_list_id = statuslist::parse_id_from_uri(&status_list_uri)?;

        // rebuild the set of flagged members from every stored credential
        // in the ⟨issuer, schema⟩ pair; the target's own flag comes from
        // the request, not from its not-yet-updated stored record
        let peers =
            self.storage.credentials_by_issuer_and_schema_tx(&tx, &got.issuer, &got.schema)?;
        let mut flagged = Vec::new();
        for peer in peers {
            if peer.local_credential_id == got.local_credential_id {
                continue;
            }
            if !peer.has_credential_status() {
                continue;
            }
            if peer.flag(purpose) {
                flagged.push(peer.credential);
            }
        }
        if request.revoked || request.suspended {
            flagged.push(got.credential.clone());
        }

        let mut status_vc = statuslist::generate_status_list_credential(
            &status_list_uri,
            &got.issuer,
            purpose,
            &flagged,
        )?;
        status_vc.credential_schema = got.credential.credential_schema.clone();

        let status_jwt = self
            .sign_credential_jwt(&got.fully_qualified_verification_method_id, &status_vc)
            .await?;

        self.storage.store_status_list_credential_tx(
            &tx,
            &StoredStatusListCredential {
                id: status_list_id,
                issuer: got.issuer.clone(),
                schema: got.schema.clone(),
                purpose,
                fully_qualified_verification_method_id: got
                    .fully_qualified_verification_method_id
                    .clone(),
                credential: status_vc,
                credential_jwt: status_jwt,
            },
        )?;

        Ok(UpdateCredentialStatusResponse {
            id: updated.local_credential_id.clone(),
            revoked: updated.revoked,
            suspended: updated.suspended,
        })
    }
}
