//! Deadline-aware HTTP helpers shared by the three indexer adapters,
//! wrapping one `reqwest::Client` per upstream and honoring the
//! caller's deadline instead of a fixed client-wide timeout.

use std::time::Instant;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use foliofox_model::error::DomainError;

use super::ByteStream;

fn remaining(deadline: Instant) -> Result<std::time::Duration, DomainError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(DomainError::IndexerUnreachable("deadline already elapsed".to_string()));
    }
    Ok(deadline - now)
}

/// GETs `url`, injecting `api_key` as a query parameter when present,
/// and returns the whole body as bytes. Used for search/capabilities
/// calls, which are small XML documents.
pub async fn get_bytes(
    client: &reqwest::Client,
    url: reqwest::Url,
    deadline: Instant,
) -> Result<Bytes, DomainError> {
    send_bytes(client.get(url), deadline).await
}

/// Sends an arbitrary, already-configured request (e.g. one carrying an
/// `X-Api-Key` header rather than a query parameter) and returns the
/// body as bytes, honoring `deadline`.
pub async fn send_bytes(
    request: reqwest::RequestBuilder,
    deadline: Instant,
) -> Result<Bytes, DomainError> {
    let budget = remaining(deadline)?;
    let response = tokio::time::timeout(budget, request.send())
        .await
        .map_err(|_| DomainError::IndexerUnreachable("request timed out".to_string()))?
        .map_err(classify_reqwest_error)?;

    let response = check_status(response)?;

    let budget = remaining(deadline)?;
    tokio::time::timeout(budget, response.bytes())
        .await
        .map_err(|_| DomainError::IndexerUnreachable("body read timed out".to_string()))?
        .map_err(classify_reqwest_error)
}

/// GETs `url` and returns a lazily-consumed byte stream for downloads,
/// streamed into a `.part` file by the scheduler's worker task.
pub async fn get_stream(
    client: &reqwest::Client,
    url: reqwest::Url,
    deadline: Instant,
) -> Result<ByteStream, DomainError> {
    let budget = remaining(deadline)?;
    let response = tokio::time::timeout(budget, client.get(url).send())
        .await
        .map_err(|_| DomainError::IndexerUnreachable("request timed out".to_string()))?
        .map_err(classify_reqwest_error)?;

    let response = check_status(response)?;

    let stream: BoxStream<'static, Result<Bytes, DomainError>> = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(classify_reqwest_error))
        .boxed();
    Ok(stream)
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DomainError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(DomainError::IndexerAuthFailed(format!("status {status}")));
    }
    if status == reqwest::StatusCode::GONE {
        return Err(DomainError::Gone);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(DomainError::NotFound);
    }
    if !status.is_success() {
        return Err(DomainError::IndexerUnreachable(format!("status {status}")));
    }
    Ok(response)
}

fn classify_reqwest_error(err: reqwest::Error) -> DomainError {
    if err.is_timeout() || err.is_connect() {
        DomainError::IndexerUnreachable(err.to_string())
    } else if err.is_decode() || err.is_body() {
        DomainError::IndexerMalformedResponse(err.to_string())
    } else {
        DomainError::IndexerUnreachable(err.to_string())
    }
}
