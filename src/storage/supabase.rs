//! Supabase (PostgREST) implementation of the store traits.
//!
//! Peaks live in `user_peaks` keyed by `(user_id, platform)`; history rows
//! are appended to `historical_data`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::StoreConfig;
use crate::domain::{HistoryRecord, PeakRecord};
use crate::error::{Error, Result};
use crate::storage::repository::{HistoryStore, PeakStore, TargetDirectory};

const PEAKS_TABLE: &str = "user_peaks";
const HISTORY_TABLE: &str = "historical_data";

/// Remote store client speaking the PostgREST API.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
    platform: String,
}

#[derive(Debug, Deserialize)]
struct TargetRow {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct PeakRow {
    max_peak: Option<u64>,
}

impl SupabaseStore {
    pub fn new(client: Client, config: &StoreConfig) -> Result<Self> {
        let base = Url::parse(&config.supabase_url)
            .map_err(|e| Error::config(format!("invalid SUPABASE_URL: {e}")))?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            api_key: config.supabase_key.clone(),
            platform: config.platform.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(resp: reqwest::Response, op: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(Error::store(format!("{op} failed with {status}: {body}")))
    }
}

#[async_trait]
impl TargetDirectory for SupabaseStore {
    async fn list_targets(&self) -> Result<Vec<String>> {
        let resp = self
            .request(self.client.get(self.table_url(PEAKS_TABLE)))
            .query(&[
                ("select", "user_id".to_string()),
                ("platform", format!("eq.{}", self.platform)),
                ("hidden", "is.false".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<TargetRow> = Self::check(resp, "target list query").await?.json().await?;
        Ok(rows.into_iter().map(|row| row.user_id).collect())
    }
}

#[async_trait]
impl PeakStore for SupabaseStore {
    async fn get_peak(&self, user_id: &str) -> Result<Option<u64>> {
        let resp = self
            .request(self.client.get(self.table_url(PEAKS_TABLE)))
            .query(&[
                ("select", "max_peak".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("platform", format!("eq.{}", self.platform)),
            ])
            .send()
            .await?;

        let rows: Vec<PeakRow> = Self::check(resp, "peak query").await?.json().await?;
        Ok(rows.first().map(|row| row.max_peak.unwrap_or(0)))
    }

    async fn upsert_peak(&self, record: &PeakRecord) -> Result<()> {
        let resp = self
            .request(self.client.post(self.table_url(PEAKS_TABLE)))
            .query(&[("on_conflict", "user_id,platform")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[record])
            .send()
            .await?;

        Self::check(resp, "peak upsert").await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SupabaseStore {
    async fn insert_history(&self, records: &[HistoryRecord]) -> Result<()> {
        let resp = self
            .request(self.client.post(self.table_url(HISTORY_TABLE)))
            .header("Prefer", "return=minimal")
            .json(records)
            .send()
            .await?;

        Self::check(resp, "history insert").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_store() -> SupabaseStore {
        let config = StoreConfig {
            supabase_url: "https://example.supabase.co/".to_string(),
            supabase_key: "key".to_string(),
            platform: "youtube".to_string(),
            cache_ttl: Duration::from_secs(30),
        };
        SupabaseStore::new(Client::new(), &config).unwrap()
    }

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store = test_store();
        assert_eq!(
            store.table_url(PEAKS_TABLE),
            "https://example.supabase.co/rest/v1/user_peaks"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = StoreConfig {
            supabase_url: "not a url".to_string(),
            supabase_key: "key".to_string(),
            platform: "youtube".to_string(),
            cache_ttl: Duration::from_secs(30),
        };
        assert!(SupabaseStore::new(Client::new(), &config).is_err());
    }

    #[test]
    fn test_peak_row_deserialization() {
        let rows: Vec<PeakRow> = serde_json::from_str(r#"[{"max_peak": 1234}]"#).unwrap();
        assert_eq!(rows[0].max_peak, Some(1234));

        let rows: Vec<PeakRow> = serde_json::from_str(r#"[{"max_peak": null}]"#).unwrap();
        assert_eq!(rows[0].max_peak, None);
    }

    #[test]
    fn test_target_row_deserialization() {
        let rows: Vec<TargetRow> =
            serde_json::from_str(r#"[{"user_id": "abc"}, {"user_id": "def"}]"#).unwrap();
        let ids: Vec<_> = rows.into_iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec!["abc", "def"]);
    }
}
