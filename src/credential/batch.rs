//! # Batch Operations
//!
//! Batch issuance and batch status updates. Each batch unions the watch
//! keys of its items and runs every item's transaction body inside a
//! single [`Store::execute`], so a batch commits all-or-nothing: one
//! failing item aborts the whole batch, and per-item outputs come back
//! in request order.
//!
//! [`Store::execute`]: crate::store::Store::execute

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::credential::status::{
    UpdateCredentialStatusRequest, UpdateCredentialStatusResponse,
};
use crate::credential::{Container, CreateCredentialRequest, CredentialService};
use crate::provider::Provider;
use crate::store::Tx;
use crate::Result;

/// Request to issue several credentials atomically.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchCreateCredentialsRequest {
    /// The issuance requests, processed in order.
    pub requests: Vec<CreateCredentialRequest>,
}

/// Response to [`CredentialService::batch_create_credentials`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchCreateCredentialsResponse {
    /// The issued credentials, in request order.
    pub credentials: Vec<Container>,
}

/// Request to update several credentials' statuses atomically.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchUpdateCredentialStatusRequest {
    /// The status update requests, processed in order.
    pub requests: Vec<UpdateCredentialStatusRequest>,
}

/// Response to [`CredentialService::batch_update_credential_status`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchUpdateCredentialStatusResponse {
    /// The resulting statuses, in request order.
    pub credential_statuses: Vec<UpdateCredentialStatusResponse>,
}

impl<P: Provider> CredentialService<P> {
    /// Issues a batch of credentials in a single transaction. A single
    /// failure aborts the whole batch.
    #[instrument(level = "debug", skip(self))]
    pub async fn batch_create_credentials(
        &self, request: BatchCreateCredentialsRequest,
    ) -> Result<BatchCreateCredentialsResponse> {
        let mut watch_keys = Vec::with_capacity(request.requests.len() * 3);
        for item in &request.requests {
            item.validate()?;
            watch_keys.extend(item.watch_keys());
        }

        self.storage
            .store()
            .execute(&watch_keys, |tx| self.batch_create_tx(tx, &request))
            .await
    }

    async fn batch_create_tx(
        &self, tx: Tx, batch: &BatchCreateCredentialsRequest,
    ) -> Result<BatchCreateCredentialsResponse> {
        let mut credentials = Vec::with_capacity(batch.requests.len());
        for item in &batch.requests {
            let response = self.create_credential_tx(tx.clone(), item).await?;
            credentials.push(response.credential);
        }
        Ok(BatchCreateCredentialsResponse { credentials })
    }

    /// Updates a batch of credential statuses in a single transaction. A
    /// single failure aborts the whole batch.
    #[instrument(level = "debug", skip(self))]
    pub async fn batch_update_credential_status(
        &self, request: BatchUpdateCredentialStatusRequest,
    ) -> Result<BatchUpdateCredentialStatusResponse> {
        let mut watch_keys = Vec::with_capacity(request.requests.len());
        for item in &request.requests {
            watch_keys.push(self.status_list_credential_watch_key_for(&item.id)?);
        }

        self.storage
            .store()
            .execute(&watch_keys, |tx| self.batch_update_tx(tx, &request))
            .await
    }

    async fn batch_update_tx(
        &self, tx: Tx, batch: &BatchUpdateCredentialStatusRequest,
    ) -> Result<BatchUpdateCredentialStatusResponse> {
        let mut credential_statuses = Vec::with_capacity(batch.requests.len());
        for item in &batch.requests {
            let mut response = self.update_credential_status_tx(tx.clone(), item).await?;
            response.id = item.id.clone();
            credential_statuses.push(response);
        }
        Ok(BatchUpdateCredentialStatusResponse { credential_statuses })
    }
}
