// ABOUTME: Authentication state against the attendance API
// ABOUTME: probe/login/logout each make at most one outbound call and never retry

use std::sync::Arc;

use crate::api::{ApiClient, Credentials};
use crate::audit::{AuditSink, Severity};
use crate::config::{ConfigFile, Configuration, ACCESS_TOKEN};
use crate::error::SyncError;

/// Whether the API currently accepts our token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedIn,
    LoggedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub logged_in: bool,
    pub access_token: Option<String>,
}

impl Session {
    pub fn state(&self) -> SessionState {
        if self.logged_in {
            SessionState::LoggedIn
        } else {
            SessionState::LoggedOut
        }
    }
}

/// Owns the session. Only successful ping, login and logout answers mutate it.
///
/// A token from the configuration is held from the start but the session
/// counts as logged out until `probe` or `login` confirms it.
pub struct SessionManager {
    base_address: String,
    credentials: Credentials,
    session: Session,
    config_file: Option<ConfigFile>,
    audit: Arc<dyn AuditSink>,
}

impl SessionManager {
    /// `config_file` receives the new `AccessToken` after a successful login;
    /// pass `None` to keep tokens in memory only.
    pub fn new(
        config: &Configuration,
        config_file: Option<ConfigFile>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let access_token = Some(config.access_token.clone()).filter(|token| !token.is_empty());
        Self {
            base_address: config.base_address.clone(),
            credentials: Credentials {
                login: config.login.clone(),
                password: config.password.clone(),
            },
            session: Session {
                logged_in: false,
                access_token,
            },
            config_file,
            audit,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.logged_in
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session.access_token.as_deref()
    }

    /// Ask the API whether the held token is still valid.
    ///
    /// Errors are reported to the audit sink and turn into `LoggedOut`.
    pub async fn probe(&mut self) -> SessionState {
        let Some(token) = self.session.access_token.clone() else {
            self.session.logged_in = false;
            self.audit.info("Status: You are logged out (no access token held).");
            return self.state();
        };

        let result = match ApiClient::new(&self.base_address) {
            Ok(api) => api.ping(&token).await.map_err(|e| format!("{:#}", e)),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(response) if response.success => {
                self.session.logged_in = true;
                self.audit.info("Status: You are logged in.");
            }
            Ok(_) => {
                self.session.logged_in = false;
                self.audit.info("Status: You are logged out.");
            }
            Err(message) => {
                self.session.logged_in = false;
                self.audit.error(&format!("Error occurs in Ping API: {}", message));
            }
        }

        self.state()
    }

    /// Authenticate with the configured credentials.
    ///
    /// A no-op returning the held token when already logged in.
    pub async fn login(&mut self) -> Result<String, SyncError> {
        if self.session.logged_in {
            self.audit.info("You already logged in.");
            return Ok(self.session.access_token.clone().unwrap_or_default());
        }

        match self.request_session().await {
            Ok((token, message)) => {
                self.session.access_token = Some(token.clone());
                self.session.logged_in = true;
                self.audit.report(Severity::SuccessAudit, &message);
                self.persist_token(&token);
                Ok(token)
            }
            Err(e) => {
                self.session.logged_in = false;
                let text = match e.server_message() {
                    Some(message) => message.to_string(),
                    None => format!("Error occurs in Login: {}", e),
                };
                self.audit.error(&text);
                Err(e)
            }
        }
    }

    async fn request_session(&self) -> Result<(String, String), SyncError> {
        let api = ApiClient::new(&self.base_address)?;
        let response = api
            .create_session(&self.credentials)
            .await
            .map_err(|e| SyncError::Auth(format!("{:#}", e)))?;

        if !response.success {
            return Err(SyncError::Rejected {
                operation: "login",
                message: response.error_message(),
            });
        }

        let token = response
            .access_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::Auth("login response carried no access_token".to_string()))?;
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| "Logged in successfully.".to_string());
        Ok((token, message))
    }

    fn persist_token(&self, token: &str) {
        if let Some(file) = &self.config_file {
            if let Err(e) = file.save(ACCESS_TOKEN, token) {
                self.audit.error(&format!("Error occurs in Configurations.Save(): {}", e));
            }
        }
    }

    /// Terminate the session on the server.
    ///
    /// Returns `Ok(true)` when a session was ended, `Ok(false)` when there was
    /// nothing to end.
    pub async fn logout(&mut self) -> Result<bool, SyncError> {
        if !self.session.logged_in {
            self.audit.info("You already logged out.");
            return Ok(false);
        }

        let token = self.session.access_token.clone().unwrap_or_default();
        let result = match ApiClient::new(&self.base_address) {
            Ok(api) => api
                .delete_session(&token)
                .await
                .map_err(|e| SyncError::Auth(format!("{:#}", e))),
            Err(e) => Err(e),
        };

        match result {
            Ok(response) if response.success => {
                self.session.access_token = None;
                self.session.logged_in = false;
                let message = response
                    .message
                    .unwrap_or_else(|| "Logged out successfully.".to_string());
                self.audit.report(Severity::SuccessAudit, &message);
                Ok(true)
            }
            Ok(response) => {
                let message = response.error_message();
                self.audit.error(&message);
                Err(SyncError::Rejected {
                    operation: "logout",
                    message,
                })
            }
            Err(e) => {
                self.audit.error(&format!("Error occurs in Logout: {}", e));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use mockito::{Matcher, Server};

    fn config(base: &str, token: &str) -> Configuration {
        Configuration {
            access_token: token.to_string(),
            base_address: base.to_string(),
            login: "device@example.com".to_string(),
            password: "secret".to_string(),
            ..Configuration::default()
        }
    }

    fn manager(base: &str, token: &str) -> (SessionManager, MemorySink) {
        let sink = MemorySink::new();
        let manager = SessionManager::new(&config(base, token), None, Arc::new(sink.clone()));
        (manager, sink)
    }

    #[tokio::test]
    async fn test_probe_valid_token_logs_in_without_changing_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
            .with_body(r#"{"success":"true"}"#)
            .expect(1)
            .create_async()
            .await;

        let (mut manager, sink) = manager(&server.url(), "tok");
        assert_eq!(manager.probe().await, SessionState::LoggedIn);

        mock.assert_async().await;
        assert_eq!(manager.access_token(), Some("tok"));
        assert_eq!(sink.matching(Severity::Information, "logged in").len(), 1);
    }

    #[tokio::test]
    async fn test_probe_rejected_token_logs_out() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/ping")
            .match_query(Matcher::Any)
            .with_body(r#"{"success":"false"}"#)
            .create_async()
            .await;

        let (mut manager, _sink) = manager(&server.url(), "stale");
        assert_eq!(manager.probe().await, SessionState::LoggedOut);
        assert!(!manager.is_logged_in());
    }

    #[tokio::test]
    async fn test_probe_without_token_makes_no_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let (mut manager, sink) = manager(&server.url(), "");
        assert_eq!(manager.probe().await, SessionState::LoggedOut);
        mock.assert_async().await;
        assert_eq!(sink.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_transport_error_is_reported_not_raised() {
        let (mut manager, sink) = manager("not a url", "tok");
        assert_eq!(manager.probe().await, SessionState::LoggedOut);
        assert_eq!(sink.matching(Severity::Error, "Ping").len(), 1);
    }

    #[tokio::test]
    async fn test_login_stores_token_and_persists_it() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/sessions")
            .match_body(Matcher::Json(serde_json::json!({
                "login": "device@example.com",
                "password": "secret"
            })))
            .with_body(r#"{"success":"true","access_token":"new-tok","message":"Welcome"}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("configurations.toml"));
        let sink = MemorySink::new();
        let mut manager = SessionManager::new(
            &config(&server.url(), ""),
            Some(file.clone()),
            Arc::new(sink.clone()),
        );

        let token = manager.login().await.unwrap();
        mock.assert_async().await;
        assert_eq!(token, "new-tok");
        assert!(manager.is_logged_in());
        assert_eq!(manager.access_token(), Some("new-tok"));
        assert_eq!(sink.matching(Severity::SuccessAudit, "Welcome").len(), 1);
        assert_eq!(file.load().unwrap().access_token, "new-tok");
    }

    #[tokio::test]
    async fn test_login_when_logged_in_makes_no_call() {
        let mut server = Server::new_async().await;
        let _ping = server
            .mock("GET", "/ping")
            .match_query(Matcher::Any)
            .with_body(r#"{"success":"true"}"#)
            .create_async()
            .await;
        let sessions = server
            .mock("POST", "/sessions")
            .expect(0)
            .create_async()
            .await;

        let (mut manager, sink) = manager(&server.url(), "tok");
        manager.probe().await;
        let before = manager.session().clone();

        assert_eq!(manager.login().await.unwrap(), "tok");
        sessions.assert_async().await;
        assert_eq!(manager.session(), &before);
        assert_eq!(sink.matching(Severity::Information, "already logged in").len(), 1);
    }

    #[tokio::test]
    async fn test_login_rejected_surfaces_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/sessions")
            .with_body(r#"{"success":"false","error":"Invalid login or password"}"#)
            .create_async()
            .await;

        let (mut manager, sink) = manager(&server.url(), "");
        let err = manager.login().await.unwrap_err();
        assert_eq!(err.server_message(), Some("Invalid login or password"));
        assert!(!manager.is_logged_in());
        assert_eq!(
            sink.matching(Severity::Error, "Invalid login or password").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_logout_clears_token() {
        let mut server = Server::new_async().await;
        let _ping = server
            .mock("GET", "/ping")
            .match_query(Matcher::Any)
            .with_body(r#"{"success":"true"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/sessions")
            .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
            .with_body(r#"{"success":"true","message":"Bye"}"#)
            .expect(1)
            .create_async()
            .await;

        let (mut manager, sink) = manager(&server.url(), "tok");
        manager.probe().await;
        assert!(manager.logout().await.unwrap());

        delete.assert_async().await;
        assert!(!manager.is_logged_in());
        assert_eq!(manager.access_token(), None);
        assert_eq!(sink.matching(Severity::SuccessAudit, "Bye").len(), 1);
    }

    #[tokio::test]
    async fn test_logout_when_logged_out_is_noop() {
        let (mut manager, sink) = manager("http://127.0.0.1:9/", "tok");
        assert!(!manager.logout().await.unwrap());
        assert_eq!(sink.matching(Severity::Information, "already logged out").len(), 1);
    }
}
