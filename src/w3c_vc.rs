//! # W3C Verifiable Credentials
//!
//! An implementation of the W3C [Verifiable Credentials Data Model v1.1],
//! limited to the shapes this service issues: JSON credentials secured as
//! enveloping JWT proofs, with optional JSON Schema references and
//! Status List 2021 status entries.
//!
//! [Verifiable Credentials Data Model v1.1]: https://www.w3.org/TR/vc-data-model

pub mod model;
pub mod proof;
