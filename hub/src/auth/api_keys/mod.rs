//! API key generation and verification (spec §3 "API key", §4.8, §8).
//!
//! Keys are opaque random secrets of the form `sonde_<32 random hex chars>`.
//! Only `crypto::hash_api_key`'s SHA-256 digest is ever persisted; the raw
//! secret is returned to the caller exactly once, at creation time.

use chrono::Utc;
use rand::RngCore;

use crate::auth::Role;
use crate::crypto::hash_api_key;
use crate::domain::api_key::{ApiKeyPolicy, ApiKeyRecord};
use crate::error::{Error, Result};
use crate::ids::ApiKeyId;
use crate::persistence::PersistencePort;

const KEY_PREFIX: &str = "sonde";

/// A freshly minted key: the raw secret (shown once) and the record that
/// was persisted (carrying only the hash).
pub struct GeneratedApiKey {
    pub raw_key: String,
    pub record: ApiKeyRecord,
}

/// Generates a new random API key secret, in the `sonde_<hex>` shape.
fn generate_raw_key() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{KEY_PREFIX}_{hex}")
}

/// Creates a new API key record and persists it, returning the raw secret
/// alongside the stored record. The raw secret is never retrievable again.
pub async fn create(
    store: &dyn PersistencePort,
    display_name: String,
    role: Role,
    policy: ApiKeyPolicy,
    created_by: String,
    expires_at: Option<chrono::DateTime<Utc>>,
) -> Result<GeneratedApiKey> {
    let raw_key = generate_raw_key();
    let record = ApiKeyRecord {
        id: ApiKeyId::new(),
        display_name,
        key_hash: hash_api_key(&raw_key),
        role,
        policy,
        expires_at,
        revoked_at: None,
        created_by,
        last_used_at: None,
        created_at: Utc::now(),
    };
    store.put_api_key(record.clone()).await?;
    Ok(GeneratedApiKey { raw_key, record })
}

/// Resolves a raw API key presented by a caller to its stored record,
/// rejecting unknown, revoked, or expired keys (§8: deterministic,
/// O(1)-lookup authentication).
pub async fn authenticate(store: &dyn PersistencePort, raw_key: &str) -> Result<ApiKeyRecord> {
    let hash = hash_api_key(raw_key);
    let record = store
        .get_api_key_by_hash(&hash)
        .await?
        .ok_or_else(|| Error::Auth("unknown API key".to_string()))?;

    if !record.is_valid() {
        return Err(Error::Auth("API key is revoked or expired".to_string()));
    }

    store.touch_api_key_last_used(&record.id).await?;
    Ok(record)
}

/// Revokes an existing key by id.
pub async fn revoke(store: &dyn PersistencePort, id: &ApiKeyId) -> Result<()> {
    let mut record = store
        .list_api_keys()
        .await?
        .into_iter()
        .find(|k| &k.id == id)
        .ok_or_else(|| Error::NotFound(format!("API key '{id}'")))?;
    record.revoked_at = Some(Utc::now());
    store.put_api_key(record).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;

    #[tokio::test]
    async fn create_then_authenticate_roundtrip() {
        let store = MemoryPersistence::new();
        let created = create(
            &store,
            "ci-key".into(),
            Role::Member,
            ApiKeyPolicy::default(),
            "owner".into(),
            None,
        )
        .await
        .unwrap();

        let authenticated = authenticate(&store, &created.raw_key).await.unwrap();
        assert_eq!(authenticated.id, created.record.id);
    }

    #[tokio::test]
    async fn unknown_key_rejected() {
        let store = MemoryPersistence::new();
        let err = authenticate(&store, "sonde_does-not-exist").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn revoked_key_rejected_after_revoke() {
        let store = MemoryPersistence::new();
        let created = create(
            &store,
            "ci-key".into(),
            Role::Member,
            ApiKeyPolicy::default(),
            "owner".into(),
            None,
        )
        .await
        .unwrap();

        revoke(&store, &created.record.id).await.unwrap();
        let err = authenticate(&store, &created.raw_key).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
