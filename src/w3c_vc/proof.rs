//! # JOSE Proofs
//!
//! JSON Object Signing and Encryption ([JOSE]) proofs are a form of
//! enveloping proofs of credentials based on JWT [RFC7519] and JWS
//! [RFC7515]. In this form the credential is the `vc` claim of a signed
//! JWT whose registered claims mirror the credential's own fields.
//!
//! [JOSE]: https://datatracker.ietf.org/wg/jose/about
//! [RFC7519]: https://www.rfc-editor.org/rfc/rfc7519
//! [RFC7515]: https://www.rfc-editor.org/rfc/rfc7515

use serde::{Deserialize, Serialize};

use crate::w3c_vc::model::VerifiableCredential;

/// Claims used for verifiable credential issuance in `jwt_vc_json`
/// format.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VcClaims {
    /// The `credentialSubject.id` property of the credential. That is,
    /// the holder the credential is intended for.
    pub sub: String,

    /// MUST be the credential's `issuanceDate`, encoded as a UNIX
    /// timestamp ([RFC7519](https://www.rfc-editor.org/rfc/rfc7519) `NumericDate`).
    pub nbf: i64,

    /// MUST be the `issuer` property of the credential.
    pub iss: String,

    /// MUST be the credential's `issuanceDate`, encoded as a UNIX
    /// timestamp ([RFC7519](https://www.rfc-editor.org/rfc/rfc7519) `NumericDate`).
    pub iat: i64,

    /// MUST be the `id` property of the credential.
    pub jti: String,

    /// MUST be the credential's `expirationDate`, encoded as a UNIX
    /// timestamp ([RFC7519](https://www.rfc-editor.org/rfc/rfc7519) `NumericDate`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// The verifiable credential.
    pub vc: VerifiableCredential,
}

impl From<VerifiableCredential> for VcClaims {
    fn from(vc: VerifiableCredential) -> Self {
        Self {
            sub: vc.credential_subject.id.clone().unwrap_or_default(),
            nbf: vc.issuance_date.timestamp(),
            iss: vc.issuer_id().to_string(),
            iat: vc.issuance_date.timestamp(),
            jti: vc.id.clone().unwrap_or_default(),
            exp: vc.expiration_date.map(|exp| exp.timestamp()),
            vc,
        }
    }
}
