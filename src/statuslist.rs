//! # Status List 2021
//!
//! Types and helpers for building and checking bitstring-backed status
//! list credentials per [Status List 2021].
//!
//! Conceptually a status list is a sequence of bits, one per issued
//! credential. A set bit means the credential at that index is revoked or
//! suspended, depending on the list's purpose. Because large numbers of
//! credentials remain unrevoked in the average case, the bitstring is
//! highly compressible: the default list of 131,072 entries gzips down to
//! a few hundred bytes when only a handful of bits are set.
//!
//! [Status List 2021]: https://www.w3.org/TR/2023/WD-vc-status-list-20230427

use std::io::{Read, Write};

use anyhow::anyhow;
use base64ct::{Base64UrlUnpadded, Encoding};
use bitvec::bitvec;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::{Map, Value};

use crate::core::Kind;
use crate::error::Error;
use crate::w3c_vc::model::{
    CredentialSubject, StatusPurpose, VcBuilder, VerifiableCredential,
};
use crate::Result;

/// JSON-LD context of Status List 2021 credentials.
pub const STATUS_LIST_2021_CONTEXT: &str = "https://w3id.org/vc/status-list/2021/v1";

/// Credential type of a status list credential.
pub const STATUS_LIST_2021_CREDENTIAL: &str = "StatusList2021Credential";

/// Subject type of a status list credential.
pub const STATUS_LIST_2021: &str = "StatusList2021";

/// Type of a per-credential status entry.
pub const STATUS_LIST_2021_ENTRY: &str = "StatusList2021Entry";

// The Status List 2021 minimum list length, which doubles as the index
// range: new indices are drawn uniformly from [0, MAX_ENTRIES).
/// Number of entries in a status list.
pub const MAX_ENTRIES: usize = 131_072;

/// Generates a compressed, encoded bitstring with the given indices set.
///
/// The uncompressed bitstring is rendered with index 0 as the left-most
/// bit, GZIP-compressed, and base64url encoded without padding.
///
/// # Errors
///
/// Returns an error if an index is out of range of the bitstring size, or
/// on a compression problem.
pub fn bitstring(set_indices: &[usize]) -> anyhow::Result<String> {
    let mut bits = bitvec![0; MAX_ENTRIES];
    for &index in set_indices {
        if index >= bits.len() {
            return Err(anyhow!("status index {index} out of range"));
        }
        bits.set(index, true);
    }

    let uncompressed = bits.iter().map(|bit| if *bit { '1' } else { '0' }).collect::<String>();

    let mut gz_encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz_encoder.write_all(uncompressed.as_bytes())?;
    let compressed = gz_encoder.finish()?;

    Ok(Base64UrlUnpadded::encode_string(&compressed))
}

/// Expands an encoded list back into bit values.
///
/// # Errors
///
/// Returns an error if the encoding or compression envelope is invalid.
pub fn decode_bitstring(encoded: &str) -> anyhow::Result<Vec<bool>> {
    let compressed =
        Base64UrlUnpadded::decode_vec(encoded).map_err(|e| anyhow!("decoding status list: {e}"))?;

    let mut gz_decoder = GzDecoder::new(compressed.as_slice());
    let mut uncompressed = String::new();
    gz_decoder.read_to_string(&mut uncompressed)?;

    Ok(uncompressed.chars().map(|c| c == '1').collect())
}

/// Generates a Status List 2021 credential for the given purpose with a
/// bit set for every member credential's status list index.
///
/// Member credentials whose status entry carries a different purpose are
/// ignored. The credential is unsigned; callers sign it before
/// publication.
///
/// # Errors
///
/// Returns an error if a member carries an unparseable index, or on
/// credential building problems.
pub fn generate_status_list_credential(
    status_uri: &str, issuer: &str, purpose: StatusPurpose, members: &[VerifiableCredential],
) -> Result<VerifiableCredential> {
    let mut indices = Vec::with_capacity(members.len());
    for member in members {
        let Some(status) = &member.credential_status else {
            continue;
        };
        if status.status_purpose != purpose {
            continue;
        }
        let index = status.status_list_index.parse::<usize>().map_err(|e| {
            Error::Server(format!(
                "parsing status list index <{}>: {e}",
                status.status_list_index
            ))
        })?;
        indices.push(index);
    }

    let encoded_list =
        bitstring(&indices).map_err(|e| Error::Server(format!("generating status list: {e}")))?;

    let mut claims = Map::new();
    claims.insert("type".into(), Value::String(STATUS_LIST_2021.into()));
    claims.insert("statusPurpose".into(), Value::String(purpose.to_string()));
    claims.insert("encodedList".into(), Value::String(encoded_list));

    VcBuilder::new()
        .add_context(Kind::String(STATUS_LIST_2021_CONTEXT.into()))
        .id(status_uri)
        .add_type(STATUS_LIST_2021_CREDENTIAL)
        .issuer(issuer)
        .subject(CredentialSubject { id: Some(format!("{status_uri}#list")), claims })
        .build()
        .map_err(|e| Error::Server(format!("could not build status list credential: {e}")))
}

/// Returns `true` if the credential's bit is set in the given status list
/// credential.
///
/// # Errors
///
/// Returns an error if the credential has no status entry, or the status
/// list credential does not carry a decodable `encodedList`.
pub fn validate_credential_in_status_list(
    credential: &VerifiableCredential, status_credential: &VerifiableCredential,
) -> Result<bool> {
    let Some(status) = &credential.credential_status else {
        return Err(Error::NoStatusField("credential has no credentialStatus field".into()));
    };
    let index = status.status_list_index.parse::<usize>().map_err(|e| {
        Error::Server(format!("parsing status list index <{}>: {e}", status.status_list_index))
    })?;

    let Some(Value::String(encoded_list)) =
        status_credential.credential_subject.claims.get("encodedList")
    else {
        return Err(Error::Server("status list credential has no encodedList".into()));
    };

    let bits = decode_bitstring(encoded_list)
        .map_err(|e| Error::Server(format!("decoding status list: {e}")))?;

    Ok(bits.get(index).copied().unwrap_or(false))
}

/// Extracts a credential id from a URI as its trailing UUID in standard
/// form.
///
/// # Errors
///
/// Returns an error if the URI is too short to carry a UUID.
pub fn parse_id_from_uri(uri: &str) -> Result<String> {
    const UUID_STANDARD_FORM_LEN: usize = 36;
    let Some(id) = uri.len().checked_sub(UUID_STANDARD_FORM_LEN).and_then(|at| uri.get(at..))
    else {
        return Err(Error::Server(format!("cannot infer status list credential id from {uri:?}")));
    };
    Ok(id.to_string())
}
