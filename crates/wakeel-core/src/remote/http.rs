//! REST adapter for a hosted PostgREST-style backend with companion
//! object storage.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::mapper::Row;
use crate::remote::RemoteAdapter;
use crate::util::compact_text;

/// HTTP implementation of [`RemoteAdapter`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Build an adapter from an explicit configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let (Some(url), Some(api_key)) = (config.url.as_deref(), config.api_key.as_deref())
        else {
            return Err(Error::Unconfigured);
        };
        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::builder().build()?,
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn storage_url(&self, bucket: &str, path: &str) -> String {
        let path = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

impl RemoteAdapter for HttpRemote {
    async fn select(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>> {
        let select = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(",")
        };
        let response = self
            .authorize(self.client.get(self.rest_url(table)))
            .query(&[("select", select.as_str())])
            .send()
            .await?;
        let response = check_rest(response, table).await?;
        Ok(response.json::<Vec<Row>>().await?)
    }

    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .authorize(self.client.post(self.rest_url(table)))
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(rows)
            .send()
            .await?;
        let response = check_rest(response, table).await?;
        Ok(response.json::<Vec<Row>>().await?)
    }

    async fn delete(&self, table: &str, key: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let matcher = format!(
            "in.({})",
            ids.iter()
                .map(|id| urlencoding::encode(id).into_owned())
                .collect::<Vec<_>>()
                .join(",")
        );
        let response = self
            .authorize(self.client.delete(self.rest_url(table)))
            .query(&[(key, matcher.as_str())])
            .send()
            .await?;
        check_rest(response, table).await?;
        Ok(())
    }

    async fn probe(&self, table: &str, column: &str) -> Result<()> {
        let response = self
            .authorize(self.client.get(self.rest_url(table)))
            .query(&[("select", column), ("limit", "1")])
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        // Unknown tables and columns come back as client errors with a
        // descriptive body; anything else is the backend misbehaving.
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            return Err(Error::Schema {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api(api_message(status, &body)))
    }

    async fn upload_blob(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.storage_url(bucket, path)))
            .header("x-upsert", "true")
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;
        check_storage(response, bucket, path).await?;
        Ok(())
    }

    async fn download_blob(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .authorize(self.client.get(self.storage_url(bucket, path)))
            .send()
            .await?;
        let response = check_storage(response, bucket, path).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_blob(&self, bucket: &str, path: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.storage_url(bucket, path)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_storage(response, bucket, path).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn api_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

async fn check_rest(response: Response, table: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::Network(format!(
            "{table}: {}",
            api_message(status, &body)
        )));
    }
    Err(Error::Api(format!("{table}: {}", api_message(status, &body))))
}

async fn check_storage(response: Response, bucket: &str, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::Network(format!(
            "{bucket}/{path}: {}",
            api_message(status, &body)
        )));
    }
    Err(Error::Storage(format!(
        "{bucket}/{path}: {}",
        api_message(status, &body)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> HttpRemote {
        HttpRemote::new(&RemoteConfig::new("https://backend.example.co/", "key")).unwrap()
    }

    #[test]
    fn new_requires_configuration() {
        let error = HttpRemote::new(&RemoteConfig::default()).unwrap_err();
        assert!(matches!(error, Error::Unconfigured));
    }

    #[test]
    fn urls_are_normalized() {
        let remote = remote();
        assert_eq!(
            remote.rest_url("clients"),
            "https://backend.example.co/rest/v1/clients"
        );
        assert_eq!(
            remote.storage_url("case-documents", "cases/c 1/doc.pdf"),
            "https://backend.example.co/storage/v1/object/case-documents/cases/c%201/doc.pdf"
        );
    }

    #[test]
    fn api_message_prefers_the_body_message() {
        let message = api_message(
            StatusCode::BAD_REQUEST,
            r#"{"message": "column clients.nope does not exist"}"#,
        );
        assert_eq!(message, "column clients.nope does not exist (400)");
    }
}
