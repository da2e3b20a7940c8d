//! REST client for the instrument control plane and sequence catalog.
//!
//! These calls are requests to an external collaborator; their failures
//! surface to the operator and never touch store consistency.

use reqwest::{Client, Response};
use url::Url;

use shared::domain::{InstrumentConfig, Sequence};
use shared::error::BackendErrorBody;

use crate::error::BackendError;
use tracing::warn;

pub struct BackendApi {
    http: Client,
    base_url: Url,
}

impl BackendApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the server sequence catalog. Decoding is lenient element-wise:
    /// an entry lacking `id`, `name`, or a `steps` array is discarded with
    /// a warning and the rest of the catalog is kept.
    pub async fn fetch_sequences(&self) -> Result<Vec<Sequence>, BackendError> {
        let url = self.base_url.join("api/sequences")?;
        let response = check(self.http.get(url).send().await?).await?;
        let raw: Vec<serde_json::Value> = response.json().await?;

        let mut sequences = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<Sequence>(value) {
                Ok(sequence) => sequences.push(sequence),
                Err(err) => warn!(%err, "discarding malformed sequence from backend"),
            }
        }
        Ok(sequences)
    }

    pub async fn connect_instrument(
        &self,
        name: &str,
        config: &InstrumentConfig,
    ) -> Result<(), BackendError> {
        let url = self.base_url.join(&format!("api/instruments/{name}/connect"))?;
        check(self.http.post(url).json(config).send().await?).await?;
        Ok(())
    }

    pub async fn disconnect_instrument(&self, name: &str) -> Result<(), BackendError> {
        let url = self.base_url.join(&format!("api/instruments/{name}"))?;
        check(self.http.delete(url).send().await?).await?;
        Ok(())
    }
}

/// Map non-2xx responses to `BackendError::Status`, preferring the
/// backend's `detail` field when the body carries one.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<BackendErrorBody>(&body)
        .map(|parsed| parsed.detail)
        .unwrap_or(body);
    Err(BackendError::Status {
        status: status.as_u16(),
        detail,
    })
}
