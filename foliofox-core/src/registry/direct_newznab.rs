//! Direct-Newznab adapter: talks straight to a Newznab-compatible
//! indexer's `api` endpoint, no Prowlarr/Jackett layer in between.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Url;

use foliofox_model::error::DomainError;
use foliofox_model::ids::IndexerId;
use foliofox_model::search::{SearchFilters, SearchResult};

use super::http::{get_bytes, get_stream};
use super::newznab_xml::parse_search_response;
use super::{ByteStream, IndexerAdapter};

pub struct DirectNewznabAdapter {
    client: reqwest::Client,
    indexer_id: IndexerId,
    indexer_name: String,
    indexer_priority: i32,
    base_url: Url,
    api_key: Option<String>,
}

impl DirectNewznabAdapter {
    pub fn new(
        client: reqwest::Client,
        indexer_id: IndexerId,
        indexer_name: String,
        indexer_priority: i32,
        base_url: &str,
        api_key: Option<String>,
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
        })
    }

    fn search_url(&self, query: &str, filters: &SearchFilters) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("t", "search").append_pair("q", query);
            if let Some(key) = &self.api_key {
                pairs.append_pair("apikey", key);
            }
            for (name, value) in filters {
                pairs.append_pair(name, value);
            }
        }
        url
    }

    fn capabilities_url(&self) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("t", "caps");
            if let Some(key) = &self.api_key {
                pairs.append_pair("apikey", key);
            }
        }
        url
    }
}

#[async_trait]
impl IndexerAdapter for DirectNewznabAdapter {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        deadline: Instant,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let body = get_bytes(&self.client, self.search_url(query, filters), deadline).await?;
        parse_search_response(&body, self.indexer_id, &self.indexer_name, self.indexer_priority, filters)
    }

    async fn fetch(&self, download_url: &str, deadline: Instant) -> Result<ByteStream, DomainError> {
        let mut url = Url::parse(download_url)
            .map_err(|e| DomainError::Validation(format!("invalid download url: {e}")))?;
        if let Some(key) = &self.api_key {
            if !url.query_pairs().any(|(k, _)| k == "apikey") {
                url.query_pairs_mut().append_pair("apikey", key);
            }
        }
        get_stream(&self.client, url, deadline).await
    }

    async fn probe(&self, deadline: Instant) -> Result<(), DomainError> {
        get_bytes(&self.client, self.capabilities_url(), deadline)
            .await
            .map(|_| ())
    }
}
