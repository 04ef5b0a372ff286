//! Shared test fixtures: an in-memory provider with a fixed Ed25519
//! keystore and a minimal schema service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use anyhow::{anyhow, bail};
use ed25519_dalek::SigningKey;
use serde_json::{json, Value};
use ssi_credential::config::Config;
use ssi_credential::credential::CredentialService;
use ssi_credential::provider::{
    DidResolver, Key, KeyStore, Provider, ResolvedSchema, Result, SchemaResolver,
};
use ssi_credential::store::memory::MemoryStore;
use ssi_credential::store::Store;

pub const ISSUER_DID: &str = "did:key:A";
pub const ISSUER_VERIFICATION_METHOD: &str = "did:key:A#key-1";
pub const NAME_SCHEMA_ID: &str = "https://schemas.example.com/name-v1";

const ISSUER_SECRET: [u8; 32] = *b"0123456789abcdef0123456789abcdef";

#[derive(Clone, Default)]
pub struct ProviderImpl {
    keys: Arc<Mutex<HashMap<String, Key>>>,
    schemas: Arc<Mutex<HashMap<String, Value>>>,
}

impl ProviderImpl {
    pub fn new() -> Self {
        let provider = Self::default();
        provider.add_key(ISSUER_VERIFICATION_METHOD, ISSUER_DID, false);
        provider.add_schema(
            NAME_SCHEMA_ID,
            json!({
                "$id": NAME_SCHEMA_ID,
                "type": "object",
                "properties": {
                    "credentialSubject": {
                        "type": "object",
                        "required": ["firstName", "lastName"],
                    }
                }
            }),
        );
        provider
    }

    pub fn add_key(&self, verification_method: &str, controller: &str, revoked: bool) {
        self.keys.lock().expect("should lock").insert(
            verification_method.to_string(),
            Key {
                id: verification_method.to_string(),
                controller: controller.to_string(),
                revoked,
                secret_key: ISSUER_SECRET.to_vec(),
            },
        );
    }

    pub fn add_schema(&self, id: &str, schema: Value) {
        self.schemas.lock().expect("should lock").insert(id.to_string(), schema);
    }
}

impl KeyStore for ProviderImpl {
    async fn key(&self, key_id: &str) -> Result<Key> {
        self.keys
            .lock()
            .expect("should lock")
            .get(key_id)
            .cloned()
            .ok_or_else(|| anyhow!("key not found: {key_id}"))
    }
}

impl SchemaResolver for ProviderImpl {
    async fn resolve(&self, schema_id: &str) -> Result<ResolvedSchema> {
        let Some(schema) = self.schemas.lock().expect("should lock").get(schema_id).cloned()
        else {
            bail!("schema not found with id: {schema_id}");
        };
        Ok(ResolvedSchema {
            id: schema_id.to_string(),
            schema,
            schema_type: "JsonSchema2023".to_string(),
        })
    }

    // just enough JSON Schema for tests: required credentialSubject
    // properties
    async fn validate(&self, schema: &ResolvedSchema, credential: &Value) -> Result<()> {
        let required = schema
            .schema
            .pointer("/properties/credentialSubject/required")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let subject = credential
            .get("credentialSubject")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("credential has no credentialSubject"))?;

        for property in required {
            let Some(name) = property.as_str() else {
                continue;
            };
            if !subject.contains_key(name) {
                bail!("missing required property: {name}");
            }
        }
        Ok(())
    }
}

impl DidResolver for ProviderImpl {
    async fn resolve_key(&self, verification_method: &str) -> Result<Vec<u8>> {
        let Some(key) =
            self.keys.lock().expect("should lock").get(verification_method).cloned()
        else {
            bail!("unknown verification method: {verification_method}");
        };
        let secret: [u8; 32] =
            key.secret_key.as_slice().try_into().map_err(|_| anyhow!("invalid secret key"))?;
        Ok(SigningKey::from_bytes(&secret).verifying_key().to_bytes().to_vec())
    }
}

impl Provider for ProviderImpl {}

// initialise tracing once for all tests
static INIT: Once = Once::new();

fn init_tracer() {
    INIT.call_once(|| {
        let subscriber =
            tracing_subscriber::FmtSubscriber::builder().with_max_level(tracing::Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}

pub fn service() -> (CredentialService<ProviderImpl>, ProviderImpl) {
    init_tracer();

    let provider = ProviderImpl::new();
    let store = Store::new(Arc::new(MemoryStore::new()));
    let service =
        CredentialService::new(Config::new("https://ssi.example.com"), store, provider.clone());
    (service, provider)
}
