//! # Detail Fetcher
//!
//! One authenticated POST per record identifier against a collection's
//! `view` endpoint. A call either yields the payload out of the response
//! envelope or a [`FetchError`]; there is no retrying at this level.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{DetailPayload, FetchContext, FetchError, RecordId};
use crate::infrastructure::http_client::CoretaxClient;

/// Fetches the detail payload of a single record.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(
        &self,
        record_id: &RecordId,
        ctx: &FetchContext,
    ) -> Result<DetailPayload, FetchError>;
}

/// Request body shared by every detail endpoint.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DetailRequest<'a> {
    pub record_identifier: &'a str,
    #[serde(rename = "EinvoiceVATStatus")]
    pub einvoice_vat_status: &'a str,
    pub taxpayer_aggregate_identifier: &'a str,
}

impl<'a> DetailRequest<'a> {
    pub fn new(record_id: &'a RecordId, ctx: &'a FetchContext) -> Self {
        Self {
            record_identifier: record_id.as_str(),
            einvoice_vat_status: &ctx.status_filter,
            taxpayer_aggregate_identifier: &ctx.taxpayer_id,
        }
    }
}

/// Pulls the detail out of a `{"Payload": ...}` envelope.
pub fn extract_payload(body: Value) -> Result<DetailPayload, FetchError> {
    let Value::Object(mut envelope) = body else {
        return Err(FetchError::MalformedEnvelope(
            "response body is not a JSON object".to_string(),
        ));
    };

    let payload = envelope
        .remove("Payload")
        .ok_or_else(|| FetchError::MalformedEnvelope("missing Payload field".to_string()))?;

    let is_empty = match &payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    };
    if is_empty {
        return Err(FetchError::EmptyPayload);
    }

    Ok(payload)
}

/// Detail fetcher over the portal's HTTP API.
#[derive(Clone)]
pub struct HttpDetailFetcher {
    client: CoretaxClient,
}

impl HttpDetailFetcher {
    pub fn new(client: CoretaxClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DetailFetcher for HttpDetailFetcher {
    async fn fetch_detail(
        &self,
        record_id: &RecordId,
        ctx: &FetchContext,
    ) -> Result<DetailPayload, FetchError> {
        let request = DetailRequest::new(record_id, ctx);
        let response = self
            .client
            .post_json(&ctx.endpoint, &ctx.credential, Some(&request), None)
            .await?;

        let body: Value = response.json().await?;
        extract_payload(body)
    }
}
