// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Session Lifecycle
//!
//! Login, logout and authenticated calls to the protected API, with
//! automatic refresh of the access token.
//!
//! ```rust,ignore
//! let client = AuthClient::new(api_url, identity, session)?;
//! client.login("ana", "secret").await?;
//! let response = client.api().get("v1/products").await?;
//! ```

pub mod coordinator;
pub mod identity;
pub mod interceptor;
pub mod session;

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

pub use coordinator::{RefreshCoordinator, RefreshError, RequestId};
pub use identity::{HttpIdentityProvider, IdentityError, IdentityProvider, RefreshedTokens};
pub use interceptor::{ApiClient, ClientError};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore, SessionStoreError, TokenTriple};

/// Session owner for one user of the protected API.
pub struct AuthClient {
    identity: Arc<dyn IdentityProvider>,
    session: Arc<dyn SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    api: ApiClient,
}

impl AuthClient {
    pub fn new(
        api_base_url: Url,
        identity: Arc<dyn IdentityProvider>,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self, ClientError> {
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&identity),
            Arc::clone(&session),
        ));
        let api = ApiClient::new(api_base_url, Arc::clone(&session), Arc::clone(&coordinator))?;
        Ok(Self {
            identity,
            session,
            coordinator,
            api,
        })
    }

    /// Exchange credentials for a token triple and store it.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let tokens = self.identity.login(username, password).await.map_err(|e| {
            warn!(error = %e, "login failed");
            ClientError::Login(e)
        })?;
        self.session.set(tokens)?;
        info!("logged in");
        Ok(())
    }

    /// Revoke the session with the identity provider if possible, then
    /// clear it locally regardless.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(tokens) = self.session.get() {
            if let Err(e) = self.identity.logout(&tokens.access_token).await {
                warn!(error = %e, "identity provider logout failed, clearing local session anyway");
            }
        }
        self.session.clear()?;
        info!("logged out");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.get().is_some()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{spawn_resource_server, FakeIdentityProvider, ResourceServer, GOOD_PASSWORD};
    use reqwest::StatusCode;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn client_with(session: Arc<dyn SessionStore>) -> (AuthClient, Arc<FakeIdentityProvider>, ResourceServer) {
        let identity = FakeIdentityProvider::new(Default::default());
        let server = spawn_resource_server(identity.valid.clone()).await;
        let client = AuthClient::new(server.base_url.clone(), identity.clone(), session).unwrap();
        (client, identity, server)
    }

    #[tokio::test]
    async fn login_stores_session() {
        let (client, _identity, _server) = client_with(Arc::new(MemorySessionStore::new())).await;
        assert!(!client.is_authenticated());

        client.login("ana", GOOD_PASSWORD).await.unwrap();
        assert!(client.is_authenticated());
        assert_eq!(client.session().get().unwrap().access_token, "access-1");

        let response = client.api().get("items").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejected_login_leaves_session_empty() {
        let (client, _identity, _server) = client_with(Arc::new(MemorySessionStore::new())).await;

        let err = client.login("ana", "wrong").await.unwrap_err();
        assert!(matches!(err, ClientError::Login(IdentityError::Rejected)));
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn logout_clears_even_when_provider_fails() {
        let (client, identity, _server) = client_with(Arc::new(MemorySessionStore::new())).await;
        client.login("ana", GOOD_PASSWORD).await.unwrap();
        identity.fail_logout();

        client.logout().await.unwrap();
        assert!(!client.is_authenticated());
        assert_eq!(identity.logout_calls(), 1);

        client.logout().await.unwrap();
        assert_eq!(identity.logout_calls(), 1);
    }

    #[tokio::test]
    async fn revoked_access_token_is_refreshed_transparently() {
        let (client, identity, _server) = client_with(Arc::new(MemorySessionStore::new())).await;
        client.login("ana", GOOD_PASSWORD).await.unwrap();
        identity.valid.lock().unwrap().remove("access-1");

        let response = client.api().get("items").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "access-2");
        assert_eq!(client.coordinator().refresh_calls(), 1);
        assert_eq!(client.session().get().unwrap().refresh_token, "refresh-0");
    }

    /// Logs in, revokes the access token and starts a call whose refresh is
    /// held for 100ms.
    async fn call_in_refresh(
        client: &Arc<AuthClient>,
        identity: &FakeIdentityProvider,
    ) -> tokio::task::JoinHandle<Result<reqwest::Response, ClientError>> {
        client.login("ana", GOOD_PASSWORD).await.unwrap();
        identity.valid.lock().unwrap().remove("access-1");
        identity.delay_refresh(Duration::from_millis(100));

        let call = {
            let client = Arc::clone(client);
            tokio::spawn(async move { client.api().get("items").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(client.coordinator().is_refreshing());
        call
    }

    #[tokio::test]
    async fn logout_during_refresh_sticks() {
        let (client, identity, _server) = client_with(Arc::new(MemorySessionStore::new())).await;
        let client = Arc::new(client);
        let call = call_in_refresh(&client, &identity).await;

        client.logout().await.unwrap();
        let err = call.await.unwrap().unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(err.refresh_error(), Some(&RefreshError::Superseded));
        assert!(!client.coordinator().is_refreshing());
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn login_during_refresh_is_kept() {
        let (client, identity, _server) = client_with(Arc::new(MemorySessionStore::new())).await;
        let client = Arc::new(client);
        let call = call_in_refresh(&client, &identity).await;

        client.login("ana", GOOD_PASSWORD).await.unwrap();
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.refresh_error(), Some(&RefreshError::Superseded));

        let session = client.session().get().unwrap();
        assert_eq!(session.access_token, "access-2");
        assert_eq!(session.id_token, "id-2");

        let response = client.api().get("items").await.unwrap();
        assert_eq!(response.text().await.unwrap(), "access-2");
        assert_eq!(identity.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn file_backed_session_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let store = Arc::new(FileSessionStore::open(dir.path()).unwrap());
            let (client, _identity, _server) = client_with(store).await;
            client.login("ana", GOOD_PASSWORD).await.unwrap();
        }

        let store = Arc::new(FileSessionStore::open(dir.path()).unwrap());
        let (client, _identity, _server) = client_with(store).await;
        assert!(client.is_authenticated());
    }
}
