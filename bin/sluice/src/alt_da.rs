//! HTTP client for a generic alt-DA server.

use std::time::Duration;

use alloy::primitives::Bytes;
use async_trait::async_trait;
use reqwest::Client;
use sluice_batcher::{AltDaClient, BatcherError};

/// Version byte prefixing alt-DA commitments in batcher calldata.
const ALT_DA_TX_DATA_VERSION: u8 = 0x01;

const PUT_PATH: &str = "/put";

/// Posts channel data to `{server}/put` and frames the returned commitment
/// as batcher calldata.
#[derive(Debug, Clone)]
pub(crate) struct HttpAltDaClient {
    client: Client,
    base: String,
}

impl HttpAltDaClient {
    pub(crate) fn new(server: &str, timeout: Duration) -> Result<Self, BatcherError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BatcherError::AltDa(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base: server.trim_end_matches('/').to_string() })
    }

    fn put_url(&self) -> String {
        format!("{}{PUT_PATH}", self.base)
    }
}

/// Calldata carrying `commitment`.
fn commitment_calldata(commitment: &[u8]) -> Result<Bytes, BatcherError> {
    if commitment.is_empty() {
        return Err(BatcherError::AltDa("empty commitment".to_string()));
    }
    let mut data = Vec::with_capacity(commitment.len() + 1);
    data.push(ALT_DA_TX_DATA_VERSION);
    data.extend_from_slice(commitment);
    Ok(data.into())
}

#[async_trait]
impl AltDaClient for HttpAltDaClient {
    async fn set_input(&self, data: Bytes) -> Result<Bytes, BatcherError> {
        let response = self
            .client
            .post(self.put_url())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BatcherError::AltDa(format!("Failed to put input: {e}")))?;
        let commitment = response
            .bytes()
            .await
            .map_err(|e| BatcherError::AltDa(format!("Failed to read commitment: {e}")))?;
        commitment_calldata(&commitment)
    }
}
