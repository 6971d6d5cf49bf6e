//! Newznab/Torznab RSS parsing, shared by all three adapters: Prowlarr
//! and Jackett both proxy indexers in Torznab-compatible shape, so one
//! parser serves all three.
//!
//! Parsed with `quick-xml`'s serde integration rather than hand-rolled
//! scanning.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use foliofox_model::error::DomainError;
use foliofox_model::ids::IndexerId;
use foliofox_model::search::{SearchFilters, SearchResult};

use super::scoring::{compute_quality_score, ScoringInput};

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize, Default)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(rename = "enclosure", default)]
    enclosure: Option<RssEnclosure>,
    #[serde(rename = "attr", default)]
    attrs: Vec<TorznabAttr>,
}

#[derive(Debug, Deserialize)]
struct RssEnclosure {
    #[serde(rename = "@url", default)]
    url: Option<String>,
    #[serde(rename = "@length", default)]
    length: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TorznabAttr {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: String,
}

impl RssItem {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }
}

const KNOWN_FORMATS: &[&str] = &["epub", "mobi", "azw3", "pdf", "cbz", "cbr", "txt"];

fn guess_format(title: &str, attr: Option<&str>) -> String {
    if let Some(format) = attr {
        return format.to_ascii_lowercase();
    }
    let lower = title.to_ascii_lowercase();
    for candidate in KNOWN_FORMATS {
        if lower.ends_with(&format!(".{candidate}")) || lower.contains(&format!("[{candidate}]")) {
            return candidate.to_string();
        }
    }
    "unknown".to_string()
}

fn parse_pub_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Parses one search-response body into normalized [`SearchResult`]s,
/// scoring each with the documented 40/20/20/20 weights.
pub fn parse_search_response(
    body: &Bytes,
    indexer_id: IndexerId,
    indexer_name: &str,
    indexer_priority: i32,
    filters: &SearchFilters,
) -> Result<Vec<SearchResult>, DomainError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| DomainError::IndexerMalformedResponse(e.to_string()))?;
    let doc: RssDocument = quick_xml::de::from_str(text)
        .map_err(|e| DomainError::IndexerMalformedResponse(e.to_string()))?;

    let requested_format = filters.get("format").map(|s| s.as_str());

    let mut results = Vec::with_capacity(doc.channel.items.len());
    for item in &doc.channel.items {
        let download_url = item
            .enclosure
            .as_ref()
            .and_then(|e| e.url.clone())
            .or_else(|| item.link.clone());
        let Some(download_url) = download_url else {
            continue;
        };

        let format = guess_format(&item.title, item.attr("format"));
        let file_size_bytes = item
            .enclosure
            .as_ref()
            .and_then(|e| e.length)
            .or_else(|| item.attr("size").and_then(|v| v.parse().ok()));
        let seeders = item.attr("seeders").and_then(|v| v.parse().ok());
        let author = item.attr("author").map(str::to_string);
        let language = item.attr("language").map(str::to_string);
        let cover_url = item.attr("coverurl").map(str::to_string);
        let publication_year = item.attr("year").and_then(|v| v.parse().ok());
        let tags = item
            .attr("category")
            .map(|c| vec![c.to_string()])
            .unwrap_or_default();

        let quality_score = compute_quality_score(&ScoringInput {
            format: &format,
            requested_format,
            file_size_bytes,
            seeders,
            indexer_priority,
            author: author.as_deref(),
            description: item.description.as_deref(),
            cover_url: cover_url.as_deref(),
            language: language.as_deref(),
        });

        results.push(
            SearchResult {
                indexer_id,
                indexer_name: indexer_name.to_string(),
                indexer_priority,
                title: item.title.clone(),
                author,
                format,
                file_size_bytes,
                quality_score,
                download_url,
                language,
                publication_year,
                found_at: parse_pub_date(item.pub_date.as_deref()),
                tags,
                description: item.description.clone(),
                cover_url,
            }
            .clamp_quality_score(),
        );
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <item>
      <title>Dune.epub</title>
      <link>https://example.com/details/1</link>
      <description>A desert planet.</description>
      <pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
      <enclosure url="https://example.com/dl/1.epub" length="2048000" />
      <attr name="author" value="Frank Herbert" />
      <attr name="seeders" value="150" />
      <attr name="language" value="en" />
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_a_single_item() {
        let body = Bytes::from_static(SAMPLE.as_bytes());
        let results = parse_search_response(
            &body,
            IndexerId::from_name("test"),
            "test-indexer",
            5,
            &SearchFilters::new(),
        )
        .unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.title, "Dune.epub");
        assert_eq!(result.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(result.file_size_bytes, Some(2_048_000));
        assert_eq!(result.format, "epub");
        assert!(result.quality_score > 0);
    }

    #[test]
    fn rejects_malformed_body() {
        let body = Bytes::from_static(b"not xml");
        let result = parse_search_response(
            &body,
            IndexerId::from_name("test"),
            "test-indexer",
            0,
            &SearchFilters::new(),
        );
        assert!(matches!(result, Err(DomainError::IndexerMalformedResponse(_))));
    }
}
