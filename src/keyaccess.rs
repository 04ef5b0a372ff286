//! # Key Access
//!
//! Signing and verification of credential JWTs with Ed25519 keys
//! retrieved from the key store. The compact JWS layout is the usual
//! `base64url(header).base64url(claims).base64url(signature)` with an
//! `EdDSA` header carrying the verification method as `kid`.

use anyhow::{anyhow, bail, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::w3c_vc::model::VerifiableCredential;
use crate::w3c_vc::proof::VcClaims;

/// JOSE header of a credential JWT.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Header {
    /// Signature algorithm. Always `EdDSA`.
    pub alg: String,

    /// Token type. Always `JWT`.
    pub typ: String,

    /// The fully-qualified verification method id of the signing key.
    pub kid: String,
}

/// Signs credentials as JWTs with a single Ed25519 key.
pub struct KeyAccess {
    verification_method: String,
    signing_key: SigningKey,
}

impl KeyAccess {
    /// Creates a signer from raw Ed25519 secret key bytes.
    ///
    /// # Errors
    ///
    /// Fails if the secret is not exactly 32 bytes.
    pub fn new(verification_method: impl Into<String>, secret_key: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] =
            secret_key.try_into().map_err(|_| anyhow!("invalid Ed25519 secret key length"))?;
        Ok(Self {
            verification_method: verification_method.into(),
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    /// Signs a credential, returning it in compact `jwt_vc_json` form.
    ///
    /// # Errors
    ///
    /// Fails if the header or claims cannot be serialized.
    pub fn sign_verifiable_credential(&self, vc: &VerifiableCredential) -> Result<String> {
        let header = Header {
            alg: "EdDSA".into(),
            typ: "JWT".into(),
            kid: self.verification_method.clone(),
        };
        let claims = VcClaims::from(vc.clone());

        let header_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header)?);
        let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&claims)?);
        let message = format!("{header_b64}.{claims_b64}");

        let signature: Signature = self.signing_key.sign(message.as_bytes());
        Ok(format!("{message}.{}", Base64UrlUnpadded::encode_string(&signature.to_bytes())))
    }
}

/// Decodes a compact credential JWT without verifying its signature.
///
/// # Errors
///
/// Fails if the token is not a three-part compact JWS or a segment does
/// not decode.
pub fn decode(token: &str) -> Result<(Header, VcClaims)> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        bail!("token is not a compact JWS");
    }

    let header_bytes = Base64UrlUnpadded::decode_vec(segments[0])
        .map_err(|e| anyhow!("decoding JWS header: {e}"))?;
    let header: Header = serde_json::from_slice(&header_bytes)?;

    let claims_bytes = Base64UrlUnpadded::decode_vec(segments[1])
        .map_err(|e| anyhow!("decoding JWS claims: {e}"))?;
    let claims: VcClaims = serde_json::from_slice(&claims_bytes)?;

    Ok((header, claims))
}

/// Verifies a compact credential JWT against an Ed25519 verifying key,
/// returning its claims.
///
/// # Errors
///
/// Fails if the token is malformed or the signature does not verify.
pub fn verify(token: &str, verifying_key: &[u8]) -> Result<VcClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        bail!("token is not a compact JWS");
    }

    let key_bytes: [u8; 32] =
        verifying_key.try_into().map_err(|_| anyhow!("invalid Ed25519 verifying key length"))?;
    let key = VerifyingKey::from_bytes(&key_bytes)?;

    let signature_bytes = Base64UrlUnpadded::decode_vec(segments[2])
        .map_err(|e| anyhow!("decoding JWS signature: {e}"))?;
    let signature_bytes: [u8; 64] =
        signature_bytes.as_slice().try_into().map_err(|_| anyhow!("invalid signature length"))?;
    let signature = Signature::from_bytes(&signature_bytes);

    let message = format!("{}.{}", segments[0], segments[1]);
    key.verify(message.as_bytes(), &signature).map_err(|e| anyhow!("signature mismatch: {e}"))?;

    let (_, claims) = decode(token)?;
    Ok(claims)
}
