//! Batch negotiate and per-object transfers against an LFS server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::credentials::LfsCredentials;
use super::network::LfsNetwork;
use super::ssh_auth::LfsSshAuthenticator;
use super::types::{
    ActionKind, LfsAction, LfsAuthorization, LfsBatchRequest, LfsBatchResponse, LfsError,
    LfsObject, LfsObjectBatch, LfsRef, Operation,
};
use super::url::LfsEndpoint;
use crate::config::AuthConfig;

pub struct LfsClient {
    network: Arc<dyn LfsNetwork>,
    credentials: LfsCredentials,
    ssh: Option<LfsSshAuthenticator>,
    transfers: Vec<String>,
    hash_algo: String,
}

impl LfsClient {
    pub fn new(network: Arc<dyn LfsNetwork>, credentials: LfsCredentials, config: &AuthConfig) -> Self {
        Self {
            network,
            credentials,
            ssh: None,
            transfers: config.lfs_transfer_adapters.clone(),
            hash_algo: config.lfs_hash_algo.clone(),
        }
    }

    /// Enable `git-lfs-authenticate` for SSH LFS servers.
    pub fn with_ssh(mut self, authenticator: LfsSshAuthenticator) -> Self {
        self.ssh = Some(authenticator);
        self
    }

    /// Endpoint and headers to use for one operation. HTTP servers are used as
    /// is and authenticate through the retry policy.
    pub async fn authorize(
        &self,
        lfs_server_url: &str,
        operation: Operation,
    ) -> Result<LfsAuthorization, LfsError> {
        match LfsEndpoint::parse(lfs_server_url)? {
            LfsEndpoint::Http(url) => Ok(LfsAuthorization::new(url)),
            LfsEndpoint::Ssh(_) => match &self.ssh {
                Some(authenticator) => authenticator.authenticate(lfs_server_url, operation).await,
                None => Err(LfsError::Protocol(format!(
                    "No SSH connector configured to authenticate {}",
                    lfs_server_url
                ))),
            },
        }
    }

    fn batch_request(
        &self,
        operation: Operation,
        branch: Option<&str>,
        objects: &[LfsObjectBatch],
    ) -> LfsBatchRequest {
        LfsBatchRequest {
            operation,
            git_ref: branch.map(|name| LfsRef {
                name: name.to_string(),
            }),
            objects: objects.to_vec(),
            transfers: self.transfers.clone(),
            hash_algo: self.hash_algo.clone(),
        }
    }

    pub async fn negotiate(
        &self,
        lfs_server_url: &str,
        authorization: &LfsAuthorization,
        operation: Operation,
        branch: Option<&str>,
        objects: &[LfsObjectBatch],
    ) -> Result<LfsBatchResponse, LfsError> {
        let request = &self.batch_request(operation, branch, objects);
        let network = self.network.as_ref();

        self.credentials
            .provide(lfs_server_url, &authorization.headers, |user, password| async move {
                network
                    .post_batch_objects(
                        &authorization.href,
                        request,
                        &authorization.headers,
                        user.as_deref(),
                        password.as_deref(),
                    )
                    .await
            })
            .await
    }

    fn transfer_action(object: &LfsObject, kind: ActionKind) -> Result<Option<&LfsAction>, LfsError> {
        if let Some(error) = &object.error {
            return Err(LfsError::Object {
                oid: object.oid.clone(),
                code: error.code,
                message: error.message.clone(),
            });
        }
        Ok(object.action(kind))
    }

    /// Download `object` to `out_path`. Returns `false` when the server sent no
    /// download action for it.
    pub async fn download_object(
        &self,
        lfs_server_url: &str,
        object: &LfsObject,
        out_path: &Path,
    ) -> Result<bool, LfsError> {
        let Some(action) = Self::transfer_action(object, ActionKind::Download)? else {
            return Ok(false);
        };
        let network = self.network.as_ref();

        self.credentials
            .provide(lfs_server_url, &action.header, |user, password| async move {
                network
                    .download_object(
                        &action.href,
                        out_path,
                        &action.header,
                        user.as_deref(),
                        password.as_deref(),
                    )
                    .await
            })
            .await?;
        Ok(true)
    }

    /// Upload `path` as `object`. Returns `false` when the server already has it.
    pub async fn upload_object(
        &self,
        lfs_server_url: &str,
        object: &LfsObject,
        path: &Path,
    ) -> Result<bool, LfsError> {
        let Some(action) = Self::transfer_action(object, ActionKind::Upload)? else {
            return Ok(false);
        };
        let network = self.network.as_ref();

        self.credentials
            .provide(lfs_server_url, &action.header, |user, password| async move {
                network
                    .upload_object(
                        &action.href,
                        &object.oid,
                        path,
                        object.size,
                        &action.header,
                        user.as_deref(),
                        password.as_deref(),
                    )
                    .await
            })
            .await?;
        Ok(true)
    }

    pub async fn verify_upload(
        &self,
        lfs_server_url: &str,
        object: &LfsObject,
    ) -> Result<bool, LfsError> {
        let Some(action) = Self::transfer_action(object, ActionKind::Verify)? else {
            return Ok(false);
        };
        let network = self.network.as_ref();

        self.credentials
            .provide(lfs_server_url, &action.header, |user, password| async move {
                network
                    .verify(
                        &action.href,
                        &object.oid,
                        object.size,
                        &action.header,
                        user.as_deref(),
                        password.as_deref(),
                    )
                    .await
            })
            .await?;
        Ok(true)
    }

    /// Authorize, negotiate and download every object the server offers.
    /// Returns the oids that were actually transferred.
    pub async fn download_objects<F>(
        &self,
        lfs_server_url: &str,
        branch: Option<&str>,
        objects: &[LfsObjectBatch],
        out_path_for: F,
    ) -> Result<Vec<String>, LfsError>
    where
        F: Fn(&LfsObject) -> PathBuf,
    {
        let authorization = self.authorize(lfs_server_url, Operation::Download).await?;
        let response = self
            .negotiate(lfs_server_url, &authorization, Operation::Download, branch, objects)
            .await?;

        let mut downloaded = Vec::new();
        for object in &response.objects {
            if self
                .download_object(lfs_server_url, object, &out_path_for(object))
                .await?
            {
                downloaded.push(object.oid.clone());
            }
        }
        tracing::debug!("Downloaded {} LFS objects from {}", downloaded.len(), lfs_server_url);
        Ok(downloaded)
    }

    /// Authorize, negotiate, then upload and verify each object in turn.
    /// Returns the oids that were actually uploaded.
    pub async fn upload_objects<F>(
        &self,
        lfs_server_url: &str,
        branch: Option<&str>,
        objects: &[LfsObjectBatch],
        path_for: F,
    ) -> Result<Vec<String>, LfsError>
    where
        F: Fn(&LfsObject) -> PathBuf,
    {
        let authorization = self.authorize(lfs_server_url, Operation::Upload).await?;
        let response = self
            .negotiate(lfs_server_url, &authorization, Operation::Upload, branch, objects)
            .await?;

        let mut uploaded = Vec::new();
        for object in &response.objects {
            if self
                .upload_object(lfs_server_url, object, &path_for(object))
                .await?
            {
                uploaded.push(object.oid.clone());
            }
            self.verify_upload(lfs_server_url, object).await?;
        }
        tracing::debug!("Uploaded {} LFS objects to {}", uploaded.len(), lfs_server_url);
        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::credentials::{CredentialsAccepted, CredentialsCache, CredentialsStateManager};
    use crate::lfs::types::{LfsActions, LfsObjectError};
    use crate::test_utils::{
        MockConnector, MockNetwork, NetworkCall, StaticProvider, answer_requests, init_logger,
    };

    const SERVER: &str = "https://example.com/repo.git/info/lfs";

    fn action(href: &str) -> LfsAction {
        LfsAction {
            href: href.to_string(),
            header: HashMap::new(),
            expires_at: None,
            expires_in: None,
        }
    }

    fn object(oid: &str, actions: LfsActions) -> LfsObject {
        LfsObject {
            oid: oid.to_string(),
            size: 10,
            authenticated: None,
            actions: Some(actions),
            error: None,
        }
    }

    fn lfs_client(network: Arc<MockNetwork>) -> (LfsClient, Arc<CredentialsStateManager>, Arc<CredentialsCache>) {
        let config = AuthConfig::default();
        let state = Arc::new(CredentialsStateManager::new());
        let cache = Arc::new(CredentialsCache::new().unwrap());
        let credentials = LfsCredentials::new(state.clone(), cache.clone(), config.clone());
        (LfsClient::new(network, credentials, &config), state, cache)
    }

    #[tokio::test]
    async fn download_only_object_makes_upload_and_verify_no_ops() {
        let network = Arc::new(MockNetwork::new());
        let (client, _, _) = lfs_client(network.clone());
        let object = object(
            "abc",
            LfsActions {
                download: Some(action("https://x/abc")),
                ..LfsActions::default()
            },
        );

        assert!(!client.upload_object(SERVER, &object, Path::new("abc")).await.unwrap());
        assert!(!client.verify_upload(SERVER, &object).await.unwrap());
        assert!(network.calls().is_empty());

        assert!(client.download_object(SERVER, &object, Path::new("out/abc")).await.unwrap());
        assert_eq!(
            network.calls(),
            vec![NetworkCall::Download {
                href: "https://x/abc".into(),
                out_path: PathBuf::from("out/abc"),
                user: None,
            }]
        );
    }

    #[tokio::test]
    async fn object_error_is_reported_without_network_calls() {
        let network = Arc::new(MockNetwork::new());
        let (client, _, _) = lfs_client(network.clone());
        let object = LfsObject {
            oid: "missing".into(),
            size: 1,
            authenticated: None,
            actions: None,
            error: Some(LfsObjectError {
                code: 404,
                message: "Object does not exist".into(),
            }),
        };

        let err = client
            .download_object(SERVER, &object, Path::new("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, LfsError::Object { code: 404, ref oid, .. } if oid == "missing"));
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn negotiate_sends_configured_batch_request() {
        let network = Arc::new(MockNetwork::new());
        network.push_batch(Ok(LfsBatchResponse {
            transfer: Some("basic".into()),
            objects: vec![],
            hash_algo: None,
        }));
        let (client, _, _) = lfs_client(network.clone());
        let objects = [LfsObjectBatch {
            oid: "abc".into(),
            size: 10,
        }];

        let authorization = client.authorize(SERVER, Operation::Download).await.unwrap();
        assert_eq!(authorization, LfsAuthorization::new(SERVER));
        client
            .negotiate(SERVER, &authorization, Operation::Download, Some("main"), &objects)
            .await
            .unwrap();

        let calls = network.calls();
        let [NetworkCall::Batch { url, request, user }] = calls.as_slice() else {
            panic!("expected one batch call");
        };
        assert_eq!(url, SERVER);
        assert_eq!(*user, None);
        assert_eq!(request.operation, Operation::Download);
        assert_eq!(request.git_ref.as_ref().map(|r| r.name.as_str()), Some("main"));
        assert_eq!(request.transfers, vec!["basic", "lfs-standalone-file", "ssh"]);
        assert_eq!(request.hash_algo, "sha256");
    }

    #[tokio::test]
    async fn unauthorized_transfer_prompts_and_caches_under_server_url() {
        init_logger();
        let network = Arc::new(MockNetwork::new());
        network.push_transfer(Err(LfsError::HttpError { code: 401 }));
        let (client, state, cache) = lfs_client(network.clone());
        let answers = answer_requests(
            state,
            vec![Some(CredentialsAccepted::Lfs {
                user: "octo".into(),
                password: "token".into(),
            })],
        );

        let object = object(
            "abc",
            LfsActions {
                download: Some(action("https://cdn.example.com/abc")),
                ..LfsActions::default()
            },
        );
        assert!(client.download_object(SERVER, &object, Path::new("abc")).await.unwrap());
        answers.await.unwrap();

        let users: Vec<_> = network.calls().into_iter().map(|call| call.user()).collect();
        assert_eq!(users, vec![None, Some("octo".to_string())]);
        assert!(cache.get(SERVER, true).is_some());
        assert!(cache.get("https://cdn.example.com/abc", true).is_none());
    }

    #[tokio::test]
    async fn upload_flow_uploads_then_verifies_each_object() {
        let network = Arc::new(MockNetwork::new());
        network.push_batch(Ok(LfsBatchResponse {
            transfer: None,
            objects: vec![
                object(
                    "new",
                    LfsActions {
                        upload: Some(action("https://x/new")),
                        verify: Some(action("https://x/new/verify")),
                        ..LfsActions::default()
                    },
                ),
                object("present", LfsActions::default()),
            ],
            hash_algo: None,
        }));
        let (client, _, _) = lfs_client(network.clone());

        let uploaded = client
            .upload_objects(
                SERVER,
                Some("main"),
                &[
                    LfsObjectBatch {
                        oid: "new".into(),
                        size: 10,
                    },
                    LfsObjectBatch {
                        oid: "present".into(),
                        size: 10,
                    },
                ],
                |object| PathBuf::from(format!("media/{}", object.oid)),
            )
            .await
            .unwrap();

        assert_eq!(uploaded, vec!["new"]);
        let calls = network.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[1], NetworkCall::Upload { href, oid, .. } if href == "https://x/new" && oid == "new"));
        assert!(matches!(&calls[2], NetworkCall::Verify { href, .. } if href == "https://x/new/verify"));
    }

    #[tokio::test]
    async fn ssh_server_is_authorized_through_git_lfs_authenticate() {
        let network = Arc::new(MockNetwork::new());
        let (client, _, _) = lfs_client(network.clone());
        assert!(matches!(
            client.authorize("git@example.com:objs.git", Operation::Download).await,
            Err(LfsError::Protocol(_))
        ));

        let connector = MockConnector::new().with_output(
            br#"{"href":"https://lfs.example.com/objs","header":{"Authorization":"Bearer X"}}"#,
            b"",
        );
        let client = client.with_ssh(LfsSshAuthenticator::new(
            Arc::new(connector),
            Arc::new(StaticProvider::new(None)),
        ));
        network.push_batch(Err(LfsError::HttpError { code: 401 }));

        let authorization = client
            .authorize("git@example.com:objs.git", Operation::Download)
            .await
            .unwrap();
        let result = client
            .negotiate(
                "git@example.com:objs.git",
                &authorization,
                Operation::Download,
                None,
                &[],
            )
            .await;

        // Pre-authorized requests are not retried.
        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(network.calls().len(), 1);
        assert!(matches!(&network.calls()[0], NetworkCall::Batch { url, .. } if url == "https://lfs.example.com/objs"));
    }
}
