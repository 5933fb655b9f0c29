//! Feature gate.
//!
//! Settings are read from the store once per request and passed down by
//! reference. Anything short of a readable record (missing key, store outage,
//! malformed JSON) yields [`SecuritySettings::default`], which disables every
//! countermeasure.
use crate::{
    config::SecuritySettings,
    ports::kv_store::{KvStore, StoreResult},
};

/// Store key holding the camelCase JSON settings record
pub const SETTINGS_KEY: &str = "security:settings";

/// Load the current settings, failing safe to "everything off".
pub async fn load_settings(store: &dyn KvStore) -> SecuritySettings {
    let raw = match store.get(SETTINGS_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return SecuritySettings::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Settings unavailable, countermeasures disabled");
            return SecuritySettings::default();
        }
    };

    match serde_json::from_str::<SecuritySettings>(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "Settings record unparsable, countermeasures disabled");
            SecuritySettings::default()
        }
    }
}

/// Write `seed` unless a record already exists. Returns whether it was written.
pub async fn seed_settings(store: &dyn KvStore, seed: &SecuritySettings) -> StoreResult<bool> {
    if store.exists(SETTINGS_KEY).await? {
        return Ok(false);
    }
    let json = serde_json::to_string(seed)?;
    store.set(SETTINGS_KEY, &json, None).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::MemoryStore, core::testing::UnavailableStore};

    #[tokio::test]
    async fn test_missing_record_disables_everything() {
        let store = MemoryStore::new();
        assert_eq!(load_settings(&store).await, SecuritySettings::default());
    }

    #[tokio::test]
    async fn test_store_outage_disables_everything() {
        assert_eq!(
            load_settings(&UnavailableStore).await,
            SecuritySettings::default()
        );
    }

    #[tokio::test]
    async fn test_garbage_record_disables_everything() {
        let store = MemoryStore::new();
        store.set(SETTINGS_KEY, "{not json", None).await.unwrap();
        assert_eq!(load_settings(&store).await, SecuritySettings::default());
    }

    #[tokio::test]
    async fn test_camel_case_record_is_read() {
        let store = MemoryStore::new();
        store
            .set(
                SETTINGS_KEY,
                r#"{"sqlBackfireEnabled":true,"logPoisoningEnabled":true}"#,
                None,
            )
            .await
            .unwrap();
        let settings = load_settings(&store).await;
        assert!(settings.sql_backfire_enabled);
        assert!(settings.log_poisoning_enabled);
        assert!(!settings.canary_documents_enabled);
    }

    #[tokio::test]
    async fn test_seed_does_not_overwrite() {
        let store = MemoryStore::new();
        assert!(
            seed_settings(&store, &SecuritySettings::all_enabled())
                .await
                .unwrap()
        );
        assert!(
            !seed_settings(&store, &SecuritySettings::default())
                .await
                .unwrap()
        );
        assert_eq!(load_settings(&store).await, SecuritySettings::all_enabled());

        let raw = store.get(SETTINGS_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"canaryPhoneHomeOnOpen\":true"));
    }
}
