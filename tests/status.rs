//! Status list lifecycle tests: entry allocation, sharing per triple,
//! revocation and suspension, batches, and concurrent access.

mod utils;

use serde_json::{json, Map, Value};
use ssi_credential::credential::batch::{
    BatchCreateCredentialsRequest, BatchUpdateCredentialStatusRequest,
};
use ssi_credential::credential::{
    Container, CreateCredentialRequest, CredentialService, ListCredentialsRequest,
    UpdateCredentialStatusRequest,
};
use ssi_credential::statuslist::{parse_id_from_uri, validate_credential_in_status_list};
use ssi_credential::w3c_vc::model::{CredentialStatus, StatusPurpose, VerifiableCredential};
use ssi_credential::Error;
use utils::{ProviderImpl, ISSUER_DID, ISSUER_VERIFICATION_METHOD, NAME_SCHEMA_ID};

fn claims() -> Map<String, Value> {
    json!({"firstName": "Ada", "lastName": "Lovelace"}).as_object().cloned().unwrap_or_default()
}

fn revocable_request() -> CreateCredentialRequest {
    CreateCredentialRequest {
        issuer: ISSUER_DID.into(),
        fully_qualified_verification_method_id: ISSUER_VERIFICATION_METHOD.into(),
        subject: "did:test:345".into(),
        data: claims(),
        revocable: true,
        ..Default::default()
    }
}

fn suspendable_request() -> CreateCredentialRequest {
    CreateCredentialRequest { revocable: false, suspendable: true, ..revocable_request() }
}

fn status_entry(container: &Container) -> &CredentialStatus {
    container.credential.credential_status.as_ref().expect("should have status entry")
}

async fn status_list_credential(
    service: &CredentialService<ProviderImpl>, container: &Container,
) -> VerifiableCredential {
    let uri = &status_entry(container).status_list_credential;
    let id = parse_id_from_uri(uri).expect("should parse status list id");
    service
        .get_credential_status_list(&id)
        .await
        .expect("should get status list")
        .credential
        .credential
}

fn encoded_list(status_credential: &VerifiableCredential) -> String {
    status_credential
        .credential_subject
        .claims
        .get("encodedList")
        .and_then(Value::as_str)
        .expect("should have encodedList")
        .to_string()
}

#[tokio::test]
async fn status_entry_shape() {
    let (service, _) = utils::service();
    let created = service.create_credential(revocable_request()).await.expect("should create");

    let entry = status_entry(&created.credential);
    assert_eq!(entry.type_, "StatusList2021Entry");
    assert_eq!(entry.status_purpose, StatusPurpose::Revocation);
    assert_eq!(entry.id, format!("{}/status", created.credential.credential.id.clone().unwrap_or_default()));
    assert!(entry.status_list_credential.contains("/v1/credentials/status/"));
    entry.status_list_index.parse::<usize>().expect("index should be a decimal string");
}

#[tokio::test]
async fn status_list_is_shared_per_triple() {
    let (service, _) = utils::service();

    let first = service.create_credential(revocable_request()).await.expect("should create");
    let second = service.create_credential(revocable_request()).await.expect("should create");

    // same ⟨issuer, schema, purpose⟩, same status list
    assert_eq!(
        status_entry(&first.credential).status_list_credential,
        status_entry(&second.credential).status_list_credential
    );
    // distinct indices within the triple
    assert_ne!(
        status_entry(&first.credential).status_list_index,
        status_entry(&second.credential).status_list_index
    );

    // a different schema is a different triple
    let mut with_schema = revocable_request();
    with_schema.schema_id = Some(NAME_SCHEMA_ID.into());
    let third = service.create_credential(with_schema).await.expect("should create");
    assert_ne!(
        status_entry(&first.credential).status_list_credential,
        status_entry(&third.credential).status_list_credential
    );

    // a different purpose is a different triple too
    let fourth = service.create_credential(suspendable_request()).await.expect("should create");
    assert_ne!(
        status_entry(&first.credential).status_list_credential,
        status_entry(&fourth.credential).status_list_credential
    );
}

#[tokio::test]
async fn revoke_flips_bit() {
    let (service, _) = utils::service();
    let created = service.create_credential(revocable_request()).await.expect("should create");

    let before = status_list_credential(&service, &created.credential).await;
    assert!(!validate_credential_in_status_list(&created.credential.credential, &before)
        .expect("should check"));

    let updated = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: created.credential.id.clone(),
            revoked: true,
            suspended: false,
        })
        .await
        .expect("should update");
    assert!(updated.revoked);
    assert!(!updated.suspended);

    let status = service
        .get_credential_status(&created.credential.id)
        .await
        .expect("should get status");
    assert!(status.revoked);

    let after = status_list_credential(&service, &created.credential).await;
    assert!(validate_credential_in_status_list(&created.credential.credential, &after)
        .expect("should check"));
    assert_ne!(encoded_list(&before), encoded_list(&after));
}

#[tokio::test]
async fn suspend_then_unsuspend() {
    let (service, _) = utils::service();
    let created = service.create_credential(suspendable_request()).await.expect("should create");
    let id = created.credential.id.clone();

    let suspended = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: id.clone(),
            revoked: false,
            suspended: true,
        })
        .await
        .expect("should suspend");
    assert!(suspended.suspended);

    let listed = status_list_credential(&service, &created.credential).await;
    assert!(validate_credential_in_status_list(&created.credential.credential, &listed)
        .expect("should check"));

    let unsuspended = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: id.clone(),
            revoked: false,
            suspended: false,
        })
        .await
        .expect("should unsuspend");
    assert!(!unsuspended.revoked);
    assert!(!unsuspended.suspended);

    let listed = status_list_credential(&service, &created.credential).await;
    assert!(!validate_credential_in_status_list(&created.credential.credential, &listed)
        .expect("should check"));

    let status = service.get_credential_status(&id).await.expect("should get status");
    assert!(!status.revoked);
    assert!(!status.suspended);
}

#[tokio::test]
async fn unsuspending_one_credential_keeps_other_bits() {
    let (service, _) = utils::service();
    let first = service.create_credential(suspendable_request()).await.expect("should create");
    let second = service.create_credential(suspendable_request()).await.expect("should create");

    for container in [&first.credential, &second.credential] {
        service
            .update_credential_status(UpdateCredentialStatusRequest {
                id: container.id.clone(),
                revoked: false,
                suspended: true,
            })
            .await
            .expect("should suspend");
    }

    service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: first.credential.id.clone(),
            revoked: false,
            suspended: false,
        })
        .await
        .expect("should unsuspend");

    let listed = status_list_credential(&service, &first.credential).await;
    assert!(!validate_credential_in_status_list(&first.credential.credential, &listed)
        .expect("should check"));
    assert!(validate_credential_in_status_list(&second.credential.credential, &listed)
        .expect("should check"));
}

#[tokio::test]
async fn noop_update_leaves_list_untouched() {
    let (service, _) = utils::service();
    let created = service.create_credential(revocable_request()).await.expect("should create");

    let before = status_list_credential(&service, &created.credential).await;
    let response = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: created.credential.id.clone(),
            revoked: false,
            suspended: false,
        })
        .await
        .expect("same status should be a no-op");
    assert!(!response.revoked);
    assert!(!response.suspended);

    let after = status_list_credential(&service, &created.credential).await;
    assert_eq!(encoded_list(&before), encoded_list(&after));
}

#[tokio::test]
async fn rejection_matrix() {
    let (service, _) = utils::service();
    let revocable = service.create_credential(revocable_request()).await.expect("should create");

    // both flags at once
    let err = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: revocable.credential.id.clone(),
            revoked: true,
            suspended: true,
        })
        .await
        .expect_err("should reject");
    assert!(err.to_string().contains("cannot update both suspended and revoked status"));

    // wrong purpose
    let err = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: revocable.credential.id.clone(),
            revoked: false,
            suspended: true,
        })
        .await
        .expect_err("should reject");
    assert!(matches!(err, Error::StatusPurpose(_)));
    assert!(err.to_string().contains(
        "different status purpose<revocation> value than the status credential<suspension>"
    ));

    // no status entry at all
    let plain = service
        .create_credential(CreateCredentialRequest {
            revocable: false,
            ..revocable_request()
        })
        .await
        .expect("should create");
    let err = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: plain.credential.id.clone(),
            revoked: true,
            suspended: false,
        })
        .await
        .expect_err("should reject");
    assert!(matches!(err, Error::NoStatusField(_)));
    assert!(err.to_string().contains("has no credentialStatus field"));

    // unknown credential
    let err = service
        .update_credential_status(UpdateCredentialStatusRequest {
            id: "5df707e2-69a2-4a35-b1fd-3d41623c9a7d".into(),
            revoked: true,
            suspended: false,
        })
        .await
        .expect_err("should reject");
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_issuance_allocates_distinct_indices() {
    const WRITERS: usize = 8;

    let (service, _) = utils::service();

    let mut handles = Vec::with_capacity(WRITERS);
    for _ in 0..WRITERS {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.create_credential(revocable_request()).await
        }));
    }

    let mut indices = std::collections::HashSet::new();
    let mut status_list_uris = std::collections::HashSet::new();
    for handle in handles {
        let created = handle.await.expect("task should finish").expect("should create");
        let entry = status_entry(&created.credential);
        indices.insert(entry.status_list_index.clone());
        status_list_uris.insert(entry.status_list_credential.clone());
    }

    // no index is lost or duplicated, and the triple shares one list
    assert_eq!(indices.len(), WRITERS);
    assert_eq!(status_list_uris.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_updates_preserve_the_union_of_bits() {
    const MEMBERS: usize = 4;

    let (service, _) = utils::service();

    let mut members = Vec::with_capacity(MEMBERS);
    for _ in 0..MEMBERS {
        members.push(
            service
                .create_credential(revocable_request())
                .await
                .expect("should create")
                .credential,
        );
    }

    let mut handles = Vec::with_capacity(MEMBERS);
    for member in &members {
        let service = service.clone();
        let id = member.id.clone();
        handles.push(tokio::spawn(async move {
            service
                .update_credential_status(UpdateCredentialStatusRequest {
                    id,
                    revoked: true,
                    suspended: false,
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("task should finish").expect("should update");
    }

    // no lost update: every member's bit survives in the final list
    let listed = status_list_credential(&service, &members[0]).await;
    for member in &members {
        assert!(validate_credential_in_status_list(&member.credential, &listed)
            .expect("should check"));
    }
}

#[tokio::test]
async fn batch_create_is_atomic() {
    let (service, provider) = utils::service();

    // all-or-nothing on failure
    provider.add_key("did:key:A#revoked-key", ISSUER_DID, true);
    let mut bad = revocable_request();
    bad.fully_qualified_verification_method_id = "did:key:A#revoked-key".into();
    let err = service
        .batch_create_credentials(BatchCreateCredentialsRequest {
            requests: vec![revocable_request(), bad],
        })
        .await
        .expect_err("should reject the whole batch");
    assert!(matches!(err, Error::Key(_)));
    let all = service
        .list_credentials(ListCredentialsRequest::default())
        .await
        .expect("should list");
    assert!(all.credentials.is_empty());

    // a good batch lands in request order, sharing the triple's list
    let response = service
        .batch_create_credentials(BatchCreateCredentialsRequest {
            requests: vec![revocable_request(), revocable_request()],
        })
        .await
        .expect("should create batch");
    assert_eq!(response.credentials.len(), 2);
    assert_eq!(
        status_entry(&response.credentials[0]).status_list_credential,
        status_entry(&response.credentials[1]).status_list_credential
    );
    assert_ne!(
        status_entry(&response.credentials[0]).status_list_index,
        status_entry(&response.credentials[1]).status_list_index
    );
}

#[tokio::test]
async fn batch_update_applies_all_statuses() {
    let (service, _) = utils::service();

    let first = service.create_credential(revocable_request()).await.expect("should create");
    let second = service.create_credential(revocable_request()).await.expect("should create");

    let response = service
        .batch_update_credential_status(BatchUpdateCredentialStatusRequest {
            requests: vec![
                UpdateCredentialStatusRequest {
                    id: first.credential.id.clone(),
                    revoked: true,
                    suspended: false,
                },
                UpdateCredentialStatusRequest {
                    id: second.credential.id.clone(),
                    revoked: true,
                    suspended: false,
                },
            ],
        })
        .await
        .expect("should update batch");

    assert_eq!(response.credential_statuses.len(), 2);
    assert_eq!(response.credential_statuses[0].id, first.credential.id);
    assert_eq!(response.credential_statuses[1].id, second.credential.id);
    assert!(response.credential_statuses.iter().all(|status| status.revoked));

    let listed = status_list_credential(&service, &first.credential).await;
    for container in [&first.credential, &second.credential] {
        assert!(validate_credential_in_status_list(&container.credential, &listed)
            .expect("should check"));
    }
}

#[tokio::test]
async fn status_list_credential_is_signed_and_typed() {
    let (service, _) = utils::service();
    let created = service.create_credential(revocable_request()).await.expect("should create");

    let uri = &status_entry(&created.credential).status_list_credential;
    let id = parse_id_from_uri(uri).expect("should parse status list id");
    let response = service.get_credential_status_list(&id).await.expect("should get");

    assert!(!response.credential.credential_jwt.is_empty());
    assert!(!response.credential.revoked);
    assert!(!response.credential.suspended);

    let vc = &response.credential.credential;
    assert_eq!(vc.id.as_deref(), Some(uri.as_str()));
    let subject = &vc.credential_subject;
    assert_eq!(subject.claims.get("type"), Some(&json!("StatusList2021")));
    assert_eq!(subject.claims.get("statusPurpose"), Some(&json!("revocation")));
    assert!(subject.claims.contains_key("encodedList"));
}
