//! Prowlarr adapter: Prowlarr aggregates indexers behind its own API
//! and re-serves results in Torznab-compatible XML, so this adapter
//! reuses the shared parser with a Prowlarr-shaped URL and the
//! `X-Api-Key` header instead of a query parameter.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Url;

use foliofox_model::error::DomainError;
use foliofox_model::ids::IndexerId;
use foliofox_model::search::{SearchFilters, SearchResult};

use super::http::{get_stream, send_bytes};
use super::newznab_xml::parse_search_response;
use super::{ByteStream, IndexerAdapter};

pub struct ProwlarrAdapter {
    client: reqwest::Client,
    indexer_id: IndexerId,
    indexer_name: String,
    indexer_priority: i32,
    base_url: Url,
    api_key: Option<String>,
    /// The indexer ID as known to Prowlarr itself, distinct from our
    /// own `IndexerId` — Prowlarr routes `/api/v1/indexer/{id}/newznab`
    /// per-backing-indexer.
    prowlarr_indexer_id: String,
}

impl ProwlarrAdapter {
    pub fn new(
        client: reqwest::Client,
        indexer_id: IndexerId,
        indexer_name: String,
        indexer_priority: i32,
        base_url: &str,
        api_key: Option<String>,
        prowlarr_indexer_id: String,
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
            prowlarr_indexer_id,
        })
    }

    fn newznab_url(&self, extra: &[(&str, &str)]) -> Url {
        let path = format!("/api/v1/indexer/{}/newznab/api", self.prowlarr_indexer_id);
        let mut url = self.base_url.join(&path).unwrap_or_else(|_| self.base_url.clone());
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in extra {
                pairs.append_pair(name, value);
            }
        }
        url
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(key) => request.header("X-Api-Key", key),
            None => request,
        }
    }
}

#[async_trait]
impl IndexerAdapter for ProwlarrAdapter {
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
        let request = self.request(self.newznab_url(&extra));

        let body = send_bytes(request, deadline).await?;
        parse_search_response(&body, self.indexer_id, &self.indexer_name, self.indexer_priority, filters)
    }

    async fn fetch(&self, download_url: &str, deadline: Instant) -> Result<ByteStream, DomainError> {
        let url = Url::parse(download_url)
            .map_err(|e| DomainError::Validation(format!("invalid download url: {e}")))?;
        get_stream(&self.client, url, deadline).await
    }

    async fn probe(&self, deadline: Instant) -> Result<(), DomainError> {
        let request = self.request(self.newznab_url(&[("t", "caps")]));
        send_bytes(request, deadline).await.map(|_| ())
    }
}
