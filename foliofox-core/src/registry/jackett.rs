//! Jackett adapter: Jackett re-serves one backing indexer per
//! `/api/v2.0/indexers/{id}/results/torznab/api` endpoint, Torznab XML,
//! API key as a query parameter.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Url;

use foliofox_model::error::DomainError;
use foliofox_model::ids::IndexerId;
use foliofox_model::search::{SearchFilters, SearchResult};

use super::http::{get_bytes, get_stream};
use super::newznab_xml::parse_search_response;
use super::{ByteStream, IndexerAdapter};

pub struct JackettAdapter {
    client: reqwest::Client,
    indexer_id: IndexerId,
    indexer_name: String,
    indexer_priority: i32,
    base_url: Url,
    api_key: Option<String>,
    /// Jackett's own tracker slug, e.g. `"libgen"`.
    jackett_indexer_slug: String,
}

impl JackettAdapter {
    pub fn new(
        client: reqwest::Client,
        indexer_id: IndexerId,
        indexer_name: String,
        indexer_priority: i32,
        base_url: &str,
        api_key: Option<String>,
        jackett_indexer_slug: String,
    ) -> Result<Self, DomainError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DomainError::Validation(format!("invalid indexer base_url: {e}")))?;
        Ok(Self {
            client,
            indexer_id,
            indexer_name,
            indexer_priority,
            base_url,
            api_key,
            jackett_indexer_slug,
        })
    }

    fn torznab_url(&self, extra: &[(&str, &str)]) -> Url {
        let path = format!(
            "/api/v2.0/indexers/{}/results/torznab/api",
            self.jackett_indexer_slug
        );
        let mut url = self.base_url.join(&path).unwrap_or_else(|_| self.base_url.clone());
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(key) = &self.api_key {
                pairs.append_pair("apikey", key);
            }
            for (name, value) in extra {
                pairs.append_pair(name, value);
            }
        }
        url
    }
}

#[async_trait]
impl IndexerAdapter for JackettAdapter {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        deadline: Instant,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let mut extra = vec![("t", "search"), ("q", query)];
        let filter_pairs: Vec<(String, String)> =
            filters.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (k, v) in &filter_pairs {
            extra.push((k.as_str(), v.as_str()));
        }
        let body = get_bytes(&self.client, self.torznab_url(&extra), deadline).await?;
        parse_search_response(&body, self.indexer_id, &self.indexer_name, self.indexer_priority, filters)
    }

    async fn fetch(&self, download_url: &str, deadline: Instant) -> Result<ByteStream, DomainError> {
        let url = Url::parse(download_url)
            .map_err(|e| DomainError::Validation(format!("invalid download url: {e}")))?;
        get_stream(&self.client, url, deadline).await
    }

    async fn probe(&self, deadline: Instant) -> Result<(), DomainError> {
        get_bytes(&self.client, self.torznab_url(&[("t", "caps")]), deadline)
            .await
            .map(|_| ())
    }
}
