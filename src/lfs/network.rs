//! HTTP side of the LFS batch API.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::types::{
    ACCEPT_HEADER, LFS_JSON_MEDIA_TYPE, LFS_MEDIA_TYPE, LfsBatchRequest, LfsBatchResponse,
    LfsError, LfsObjectBatch, has_authorization,
};
use crate::config::AuthConfig;

/// Requests the LFS client issues. `user`/`password` are sent as Basic auth
/// unless `headers` already carry an `Authorization` header.
#[async_trait]
pub trait LfsNetwork: Send + Sync {
    async fn post_batch_objects(
        &self,
        lfs_server_url: &str,
        request: &LfsBatchRequest,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<LfsBatchResponse, LfsError>;

    #[allow(clippy::too_many_arguments)]
    async fn upload_object(
        &self,
        href: &str,
        oid: &str,
        path: &Path,
        size: u64,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), LfsError>;

    async fn verify(
        &self,
        href: &str,
        oid: &str,
        size: u64,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), LfsError>;

    async fn download_object(
        &self,
        href: &str,
        out_path: &Path,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), LfsError>;
}

#[derive(Clone)]
pub struct ReqwestLfsNetwork {
    client: Client,
}

impl ReqwestLfsNetwork {
    pub fn new(config: &AuthConfig) -> Result<Self, LfsError> {
        let client = Client::builder()
            .connect_timeout(config.http_connect_timeout())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(ACCEPT_HEADER))
        {
            builder = builder.header(ACCEPT_HEADER, LFS_MEDIA_TYPE);
        }
        if !has_authorization(headers) {
            if let Some(user) = user {
                builder = builder.basic_auth(user, password);
            }
        }
        builder
    }
}

async fn check_status(response: Response) -> Result<Response, LfsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!("LFS request to {} failed with {}: {}", url, status, body.trim());
    Err(LfsError::HttpError {
        code: status.as_u16(),
    })
}

#[async_trait]
impl LfsNetwork for ReqwestLfsNetwork {
    async fn post_batch_objects(
        &self,
        lfs_server_url: &str,
        request: &LfsBatchRequest,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<LfsBatchResponse, LfsError> {
        let url = format!("{}/objects/batch", lfs_server_url.trim_end_matches('/'));
        tracing::debug!("POST {} ({} objects)", url, request.objects.len());

        let mut batch_headers = headers.clone();
        batch_headers.retain(|name, _| !name.eq_ignore_ascii_case(ACCEPT_HEADER));
        batch_headers.insert(ACCEPT_HEADER.to_string(), LFS_JSON_MEDIA_TYPE.to_string());

        let response = self
            .request(Method::POST, &url, &batch_headers, user, password)
            .header(CONTENT_TYPE, LFS_JSON_MEDIA_TYPE)
            .body(serde_json::to_vec(request)?)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_object(
        &self,
        href: &str,
        oid: &str,
        path: &Path,
        size: u64,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), LfsError> {
        tracing::debug!("PUT {} for object {}", href, oid);
        let file = tokio::fs::File::open(path).await?;

        let response = self
            .request(Method::PUT, href, headers, user, password)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn verify(
        &self,
        href: &str,
        oid: &str,
        size: u64,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), LfsError> {
        tracing::debug!("Verifying object {} at {}", oid, href);
        let body = LfsObjectBatch {
            oid: oid.to_string(),
            size,
        };

        let response = self
            .request(Method::POST, href, headers, user, password)
            .header(CONTENT_TYPE, LFS_JSON_MEDIA_TYPE)
            .body(serde_json::to_vec(&body)?)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn download_object(
        &self,
        href: &str,
        out_path: &Path,
        headers: &HashMap<String, String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), LfsError> {
        tracing::debug!("GET {} into {}", href, out_path.display());
        let response = self
            .request(Method::GET, href, headers, user, password)
            .send()
            .await?;
        let response = check_status(response).await?;

        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(out_path);
        if let Err(e) = write_body(response, &partial).await {
            tracing::warn!("Download of {} interrupted: {}", href, e);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        tokio::fs::rename(&partial, out_path).await?;
        Ok(())
    }
}

/// Sibling of `out_path` the body is streamed into before it is renamed.
fn partial_path(out_path: &Path) -> PathBuf {
    let mut name = out_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(format!(".{}.part", Uuid::new_v4()));
    out_path.with_file_name(name)
}

async fn write_body(response: Response, path: &Path) -> Result<(), LfsError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}
