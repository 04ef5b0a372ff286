//! # W3C Verifiable Credentials Data Model
//!
//! An implementation of W3C [Verifiable Credentials Data Model v1.1].
//!
//! [Verifiable Credentials Data Model v1.1]: https://www.w3.org/TR/vc-data-model

use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};

/// The JSON-LD context every credential carries as its first context
/// entry.
pub const BASE_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// The type every credential carries.
pub const BASE_TYPE: &str = "VerifiableCredential";

/// `VerifiableCredential` represents a naive implementation of the W3C
/// Verifiable Credential data model v1.1.
/// See <https://www.w3.org/TR/vc-data-model>.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifiableCredential {
    #[allow(rustdoc::bare_urls)]
    /// The @context property is used to map property URIs into short-form
    /// aliases. It is an ordered set where the first item is "`https://www.w3.org/2018/credentials/v1`".
    /// Subsequent items may be URLs or objects.
    #[serde(rename = "@context")]
    pub context: Vec<Kind<Value>>,

    /// The credential's URI. It is RECOMMENDED that if dereferenced, the
    /// URI results in a document containing machine-readable information
    /// about the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The type property is used to determine whether or not a provided
    /// verifiable credential is appropriate for the intended use-case. It
    /// is an unordered set of terms or URIs.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// A URI or object with an id property. It is RECOMMENDED that the
    /// URI/object id, dereferences to machine-readable information about
    /// the issuer that can be used to verify credential information.
    pub issuer: Kind<Issuer>,

    /// An XMLSCHEMA11-2 (RFC3339) date-time the credential becomes valid.
    /// e.g. 2010-01-01T19:23:24Z.
    pub issuance_date: DateTime<Utc>,

    /// An XMLSCHEMA11-2 (RFC3339) date-time the credential ceases to be
    /// valid. e.g. 2010-06-30T19:23:24Z.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,

    /// An object containing claims about the credential subject.
    pub credential_subject: CredentialSubject,

    /// Used to determine the status of the credential, such as whether it
    /// is suspended or revoked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatus>,

    /// The credentialSchema defines the structure and datatypes of the
    /// credential. It can be used to check credential data conformance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_schema: Option<CredentialSchema>,

    /// Evidence can be included by an issuer to provide the verifier with
    /// additional supporting information in a credential. Elements are
    /// free-form objects carrying at least `id` and `type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<Value>>,
}

impl VerifiableCredential {
    /// Returns a new [`VcBuilder`], which can be used to build a
    /// [`VerifiableCredential`].
    #[must_use]
    pub fn builder() -> VcBuilder {
        VcBuilder::new()
    }

    /// The issuer's id, regardless of whether the issuer is expressed as
    /// a string or an object.
    pub fn issuer_id(&self) -> &str {
        match &self.issuer {
            Kind::String(id) => id,
            Kind::Object(issuer) => &issuer.id,
        }
    }
}

/// Issuer identifies the issuer of the credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Issuer {
    /// The issuer URI. If dereferenced, it should result in a
    /// machine-readable document that can be used to verify the
    /// credential.
    pub id: String,

    /// Issuer-specific fields that may be used to express additional
    /// information about the issuer.
    #[serde(flatten)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<HashMap<String, Value>>,
}

/// `CredentialSubject` holds claims about the subject referenced by the
/// credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialSubject {
    /// A URI that uniquely identifies the subject of the claims. If set,
    /// it MUST be the identifier used by others to identify the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Claims about the subject.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// `CredentialStatus` is a Status List 2021 entry: a pointer into the
/// bitstring of a shared status list credential.
///
/// [Status List 2021](https://www.w3.org/TR/2023/WD-vc-status-list-20230427)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialStatus {
    /// Entry identifier, by convention `<credential URI>/status`.
    pub id: String,

    /// The entry type, `StatusList2021Entry`.
    #[serde(rename = "type")]
    pub type_: String,

    /// The purpose of the status declaration.
    pub status_purpose: StatusPurpose,

    /// The position of the status flag in the bitstring, as a decimal
    /// string per the Status List 2021 wire format.
    pub status_list_index: String,

    /// A URL to the status list credential holding the bitstring.
    pub status_list_credential: String,
}

/// `StatusPurpose` defines the purpose of the issuer's credential status
/// information.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatusPurpose {
    /// Used to permanently cancel the validity of a verifiable
    /// credential.
    #[default]
    Revocation,

    /// Used to temporarily suspend the validity of a verifiable
    /// credential.
    Suspension,
}

impl Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revocation => write!(f, "revocation"),
            Self::Suspension => write!(f, "suspension"),
        }
    }
}

/// `CredentialSchema` defines the structure of the credential and the
/// datatypes of each property contained.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialSchema {
    /// A URI identifying the schema file.
    pub id: String,

    /// The schema language used, e.g. "`JsonSchema2023`".
    #[serde(rename = "type")]
    pub type_: String,
}

/// [`VcBuilder`] is used to build a [`VerifiableCredential`].
#[derive(Clone, Debug, Default)]
pub struct VcBuilder {
    vc: VerifiableCredential,
}

impl VcBuilder {
    /// Returns a new [`VcBuilder`].
    pub fn new() -> Self {
        let mut builder: Self = Self::default();

        // sensible defaults
        builder.vc.context.push(Kind::String(BASE_CONTEXT.into()));
        builder.vc.type_ = OneMany::One(BASE_TYPE.into());
        builder.vc.issuance_date = Utc::now();

        builder
    }

    /// Appends to the `@context` property.
    #[must_use]
    pub fn add_context(mut self, context: Kind<Value>) -> Self {
        self.vc.context.push(context);
        self
    }

    /// Sets the `id` property.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.vc.id = Some(id.into());
        self
    }

    /// Appends to the `type` property.
    #[must_use]
    pub fn add_type(mut self, type_: impl Into<String>) -> Self {
        self.vc.type_.add(type_.into());
        self
    }

    /// Sets the `issuer` property.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.vc.issuer = Kind::String(issuer.into());
        self
    }

    /// Sets the `credential_subject` property.
    #[must_use]
    pub fn subject(mut self, subject: CredentialSubject) -> Self {
        self.vc.credential_subject = subject;
        self
    }

    /// Sets the `issuance_date` property.
    #[must_use]
    pub fn issuance_date(mut self, issuance_date: DateTime<Utc>) -> Self {
        self.vc.issuance_date = issuance_date;
        self
    }

    /// Sets the `expiration_date` property.
    #[must_use]
    pub fn expiration_date(mut self, expiration_date: DateTime<Utc>) -> Self {
        self.vc.expiration_date = Some(expiration_date);
        self
    }

    /// Sets the `credential_schema` property.
    #[must_use]
    pub fn schema(mut self, schema: CredentialSchema) -> Self {
        self.vc.credential_schema = Some(schema);
        self
    }

    /// Sets the `credential_status` property.
    #[must_use]
    pub fn status(mut self, status: CredentialStatus) -> Self {
        self.vc.credential_status = Some(status);
        self
    }

    /// Sets the `evidence` property.
    #[must_use]
    pub fn evidence(mut self, evidence: Vec<Value>) -> Self {
        self.vc.evidence = Some(evidence);
        self
    }

    /// Turns this builder into a [`VerifiableCredential`].
    ///
    /// # Errors
    ///
    /// Fails if any of the credential's mandatory fields are not set.
    pub fn build(self) -> anyhow::Result<VerifiableCredential> {
        if self.vc.context.is_empty() {
            bail!("no context set");
        }
        if self.vc.type_.is_empty() {
            bail!("no type set");
        }

        if let Kind::String(id) = &self.vc.issuer {
            if id.is_empty() {
                bail!("no issuer.id set");
            }
        }

        let subject = &self.vc.credential_subject;
        if subject.id.is_none() && subject.claims.is_empty() {
            bail!("no credential_subject set");
        }

        Ok(self.vc)
    }
}

impl TryFrom<VcBuilder> for VerifiableCredential {
    type Error = anyhow::Error;

    fn try_from(builder: VcBuilder) -> anyhow::Result<Self, Self::Error> {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn builder() {
        let vc = sample_vc();
        let vc_json = serde_json::to_value(&vc).expect("should serialize to json");

        assert_eq!(
            *vc_json.get("@context").expect("@context should be set"),
            json!(["https://www.w3.org/2018/credentials/v1"])
        );
        assert_eq!(
            *vc_json.get("id").expect("id should be set"),
            json!("https://example.com/credentials/3732")
        );
        assert_eq!(
            *vc_json.get("type").expect("type should be set"),
            json!("VerifiableCredential")
        );
        assert_eq!(
            *vc_json.get("credentialSubject").expect("credentialSubject should be set"),
            json!({"employeeId":"1234567890","id":"did:example:ebfeb1f712ebc6f1c276e12ec21"})
        );
        assert_eq!(
            *vc_json.get("issuer").expect("issuer should be set"),
            json!("https://example.com/issuers/14")
        );
        assert_eq!(
            *vc_json.get("issuanceDate").expect("issuanceDate should be set"),
            json!(vc.issuance_date)
        );

        // deserialize
        let vc_de: VerifiableCredential =
            serde_json::from_value(vc_json).expect("should deserialize");
        assert_eq!(vc_de, vc);
    }

    #[test]
    fn status_entry_serde() {
        let status = CredentialStatus {
            id: "https://example.com/credentials/3732/status".into(),
            type_: "StatusList2021Entry".into(),
            status_purpose: StatusPurpose::Suspension,
            status_list_index: "94567".into(),
            status_list_credential: "https://example.com/credentials/status/1".into(),
        };

        let json = serde_json::to_value(&status).expect("should serialize to json");
        assert_eq!(*json.get("type").expect("type should be set"), json!("StatusList2021Entry"));
        assert_eq!(
            *json.get("statusPurpose").expect("statusPurpose should be set"),
            json!("suspension")
        );
        assert_eq!(
            *json.get("statusListIndex").expect("statusListIndex should be set"),
            json!("94567")
        );
    }

    #[test]
    fn build_rejects_missing_subject() {
        let result = VcBuilder::new().id("https://example.com/credentials/1").issuer("did:key:z6Mk").build();
        assert!(result.is_err());
    }

    fn sample_vc() -> VerifiableCredential {
        VerifiableCredential::builder()
            .id("https://example.com/credentials/3732")
            .issuer("https://example.com/issuers/14")
            .subject(CredentialSubject {
                id: Some("did:example:ebfeb1f712ebc6f1c276e12ec21".into()),
                claims: json!({"employeeId": "1234567890"})
                    .as_object()
                    .map_or_else(Map::default, Clone::clone),
            })
            .issuance_date(Utc.with_ymd_and_hms(2023, 11, 20, 23, 21, 55).unwrap())
            .build()
            .expect("should build")
    }
}
