use super::{ContinuationToken, Page, StoreError, TableStore, check_batch};
use crate::domain::{EntityKey, Filter, Projection, Record};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

const NEXT_PARTITION_KEY_HEADER: &str = "x-ms-continuation-NextPartitionKey";
const NEXT_ROW_KEY_HEADER: &str = "x-ms-continuation-NextRowKey";
const ACCESS_KEY_HEADER: &str = "x-table-access-key";
const ACCOUNT_HEADER: &str = "x-table-account";

/// Table store client speaking the service's REST protocol.
#[derive(Debug)]
pub struct HttpTableClient {
    http_client: Client,
    base_url: Url,
    account_name: String,
    access_key: Secret<String>,
}

#[derive(serde::Deserialize)]
struct QueryResponse {
    value: Vec<Record>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchRequest<'a> {
    table: &'a str,
    operations: Vec<DeleteOperation<'a>>,
}

#[derive(serde::Serialize)]
struct DeleteOperation<'a> {
    #[serde(rename = "Method")]
    method: &'static str,
    #[serde(rename = "PartitionKey")]
    partition_key: &'a str,
    #[serde(rename = "RowKey")]
    row_key: &'a str,
    #[serde(rename = "IfMatch")]
    if_match: &'static str,
}

impl HttpTableClient {
    /// Table paths are joined onto `base_url`, so an account path such as
    /// `/devstoreaccount1` is treated as a directory even without a trailing `/`.
    pub fn new(
        mut base_url: Url,
        account_name: String,
        access_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            account_name,
            access_key,
        })
    }

    fn continuation_from(headers: &HeaderMap) -> Option<ContinuationToken> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Some(ContinuationToken {
            next_partition_key: header(NEXT_PARTITION_KEY_HEADER)?,
            next_row_key: header(NEXT_ROW_KEY_HEADER),
        })
    }

    async fn ensure_success(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TableStore for HttpTableClient {
    async fn scan(
        &self,
        table: &str,
        filter: &Filter,
        projection: &Projection,
        continuation: Option<&ContinuationToken>,
    ) -> Result<Page, StoreError> {
        let mut url = self.base_url.join(&format!("{table}()"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("$filter", &filter.to_odata());
            if let Some(select) = projection.to_select() {
                query.append_pair("$select", &select);
            }
            if let Some(token) = continuation {
                query.append_pair("NextPartitionKey", &token.next_partition_key);
                if let Some(row_key) = &token.next_row_key {
                    query.append_pair("NextRowKey", row_key);
                }
            }
        }

        let response = self
            .http_client
            .get(url)
            .header(ACCOUNT_HEADER, &self.account_name)
            .header(ACCESS_KEY_HEADER, self.access_key.expose_secret())
            .header("Accept", "application/json;odata=nometadata")
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let continuation = Self::continuation_from(response.headers());
        let body: QueryResponse = response.json().await?;

        Ok(Page {
            records: body.value,
            continuation,
        })
    }

    async fn batch_delete(&self, table: &str, keys: &[EntityKey]) -> Result<(), StoreError> {
        check_batch(keys)?;
        let url = self.base_url.join("$batch")?;

        let request_body = BatchRequest {
            table,
            operations: keys
                .iter()
                .map(|key| DeleteOperation {
                    method: "DELETE",
                    partition_key: &key.partition_key,
                    row_key: &key.row_key,
                    if_match: "*",
                })
                .collect(),
        };

        let response = self
            .http_client
            .post(url)
            .header(ACCOUNT_HEADER, &self.account_name)
            .header(ACCESS_KEY_HEADER, self.access_key.expose_secret())
            .json(&request_body)
            .send()
            .await?;
        Self::ensure_success(response).await?;

        Ok(())
    }
}
