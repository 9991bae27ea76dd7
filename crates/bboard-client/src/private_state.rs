//! session-local private state and its keyed store
//!
//! each contract session owns one private-state record (a 32-byte secret
//! key plus cached auxiliary data), keyed by a session identifier and
//! persisted outside the process lifetime. the secret never leaves the
//! local store; only its commitment appears on-chain.

use crate::error::{ClientError, Result};

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// domain separator for the poster commitment
const POSTER_COMMITMENT_DOMAIN: &[u8] = b"bboard.poster-commitment.v1";

/// local-only secret material for one contract session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateState {
    /// session secret key
    pub secret_key: [u8; 32],
    /// locally cached authorization witness, if any
    pub witness: Option<Vec<u8>>,
}

impl PrivateState {
    /// generate fresh private state from the injected random source
    pub fn generate(rng: &mut dyn RngCore) -> Self {
        let mut secret_key = [0u8; 32];
        rng.fill_bytes(&mut secret_key);
        Self {
            secret_key,
            witness: None,
        }
    }

    /// public commitment to the secret key, as stored in the poster cell
    pub fn commitment(&self) -> [u8; 32] {
        *blake3::keyed_hash(&self.secret_key, POSTER_COMMITMENT_DOMAIN).as_bytes()
    }
}

/// keyed store holding one private-state record per session
///
/// a missing key is `Ok(None)`, never an error; `StoreUnavailable` is
/// reserved for an unreachable backing store. writes are last-writer-wins
/// and durable before `put` returns.
#[async_trait]
pub trait PrivateStateProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PrivateState>>;
    async fn put(&self, key: &str, state: &PrivateState) -> Result<()>;
}

/// return the stored private state for `key`, generating and persisting a
/// fresh record when absent
///
/// idempotent with respect to key material: a second call for the same
/// key reuses the existing secret.
pub async fn ensure_private_state(
    store: &dyn PrivateStateProvider,
    key: &str,
    rng: &mut dyn RngCore,
) -> Result<PrivateState> {
    if let Some(existing) = store.get(key).await? {
        tracing::debug!("reusing private state for session key '{key}'");
        return Ok(existing);
    }

    let fresh = PrivateState::generate(rng);
    store.put(key, &fresh).await?;
    tracing::info!("generated private state for session key '{key}'");
    Ok(fresh)
}

/// file-backed store: one JSON file per session key under a directory
pub struct FilePrivateStateStore {
    dir: PathBuf,
}

impl FilePrivateStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ClientError::StoreUnavailable(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    fn record_path(&self, key: &str) -> Result<PathBuf> {
        // keys become file names; anything path-like is refused
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(ClientError::StoreUnavailable(format!(
                "invalid session key '{key}'"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl PrivateStateProvider for FilePrivateStateStore {
    async fn get(&self, key: &str) -> Result<Option<PrivateState>> {
        let path = self.record_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                ClientError::StoreUnavailable(format!("corrupt record {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::StoreUnavailable(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn put(&self, key: &str, state: &PrivateState) -> Result<()> {
        let path = self.record_path(key)?;
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| ClientError::StoreUnavailable(format!("serialize failed: {e}")))?;

        // write-then-rename so a crash never leaves a torn record
        let tmp = path.with_extension("json.tmp");
        let io_err = |e: std::io::Error| {
            ClientError::StoreUnavailable(format!("cannot write {}: {e}", path.display()))
        };

        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(&json).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        tracing::debug!("persisted private state for session key '{key}'");
        Ok(())
    }
}

/// in-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryPrivateStateStore {
    records: RwLock<HashMap<String, PrivateState>>,
    unavailable: AtomicBool,
}

impl MemoryPrivateStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// toggle the backing store on/off to exercise `StoreUnavailable` paths
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClientError::StoreUnavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PrivateStateProvider for MemoryPrivateStateStore {
    async fn get(&self, key: &str) -> Result<Option<PrivateState>> {
        self.check_available()?;
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, state: &PrivateState) -> Result<()> {
        self.check_available()?;
        self.records.write().await.insert(key.into(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_commitment_deterministic() {
        let mut rng = StdRng::seed_from_u64(1);
        let state = PrivateState::generate(&mut rng);
        assert_eq!(state.commitment(), state.commitment());
        assert_ne!(state.commitment(), [0u8; 32]);
    }

    #[test]
    fn test_distinct_secrets_distinct_commitments() {
        let mut rng = StdRng::seed_from_u64(2);
        let a = PrivateState::generate(&mut rng);
        let b = PrivateState::generate(&mut rng);
        assert_ne!(a.secret_key, b.secret_key);
        assert_ne!(a.commitment(), b.commitment());
    }

    #[tokio::test]
    async fn test_memory_missing_key_is_none() {
        let store = MemoryPrivateStateStore::new();
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_put_get_roundtrip() {
        let store = MemoryPrivateStateStore::new();
        let mut rng = StdRng::seed_from_u64(3);
        let state = PrivateState::generate(&mut rng);

        store.put("alice", &state).await.unwrap();
        assert_eq!(store.get("alice").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_memory_unavailable_store_errors() {
        let store = MemoryPrivateStateStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get("alice").await,
            Err(ClientError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_generates_once() {
        let store = MemoryPrivateStateStore::new();
        let mut rng = StdRng::seed_from_u64(4);

        let first = ensure_private_state(&store, "operator", &mut rng)
            .await
            .unwrap();
        let second = ensure_private_state(&store, "operator", &mut rng)
            .await
            .unwrap();
        assert_eq!(first.secret_key, second.secret_key);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let state = PrivateState::generate(&mut rng);

        {
            let store = FilePrivateStateStore::new(dir.path()).unwrap();
            store.put("operator", &state).await.unwrap();
        }

        let reopened = FilePrivateStateStore::new(dir.path()).unwrap();
        assert_eq!(reopened.get("operator").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePrivateStateStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.get("../escape").await,
            Err(ClientError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_file_store_unreachable_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();
        // a file where the store directory should be
        assert!(matches!(
            FilePrivateStateStore::new(&blocker),
            Err(ClientError::StoreUnavailable(_))
        ));
    }
}
