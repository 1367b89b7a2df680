//! Dashboard API client
//!
//! Bearer-authenticated JSON calls for agents, diagnostics and dashboard
//! statistics. The access token comes from the shared `SessionClient`, so
//! whatever the guard refreshed or recovered is what these calls send.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use session_auth::SessionClient;
use tracing::{debug, warn};

use crate::error::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub hostname: String,
    pub os_version: String,
    pub kernel_version: String,
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRequest {
    pub agent_id: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize)]
struct DiagnosticContinueRequest<'a> {
    command_output: &'a str,
    agent_id: &'a str,
    diagnostic_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticResponse {
    pub id: String,
    pub issue: String,
    pub response: String,
    pub agent_id: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub log_files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticSummary {
    pub id: String,
    pub issue: String,
    #[serde(default)]
    pub response: String,
    pub agent_id: String,
    pub status: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<DiagnosticMessage>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub log_files: Vec<String>,
}

/// One tile of the dashboard overview.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardStat {
    pub title: String,
    pub value: String,
    #[serde(default)]
    pub change: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    pub title: String,
    pub time: String,
}

pub struct DashboardClient {
    session: Arc<SessionClient>,
}

impl DashboardClient {
    pub fn new(session: Arc<SessionClient>) -> Self {
        Self { session }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self
            .session
            .get_access_token()
            .ok_or(ApiError::NotSignedIn)?;
        let url = self.session.endpoints().url(path)?;
        debug!(%method, path, "dashboard api request");
        Ok(self
            .session
            .http()
            .request(method, url)
            .bearer_auth(token.expose()))
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let err = ApiError::from_status(status.as_u16());
            warn!(status = status.as_u16(), error = %err.detail(), "dashboard api call failed");
            return Err(err);
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let response = Self::send(request).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn agents(&self) -> Result<Vec<AgentInfo>, ApiError> {
        Self::json(self.request(Method::GET, "api/agents")?).await
    }

    /// Create the agent, or update it when one with the same identity exists.
    pub async fn upsert_agent(&self, agent: &AgentInfo) -> Result<AgentInfo, ApiError> {
        Self::json(self.request(Method::POST, "api/agent-info")?.json(agent)).await
    }

    pub async fn create_diagnostic(
        &self,
        request: &DiagnosticRequest,
    ) -> Result<DiagnosticResponse, ApiError> {
        Self::json(self.request(Method::POST, "api/diagnostic")?.json(request)).await
    }

    /// Feed the output of a suggested command back into a diagnostic.
    pub async fn continue_diagnostic(
        &self,
        id: &str,
        agent_id: &str,
        command_output: &str,
    ) -> Result<DiagnosticResponse, ApiError> {
        let body = DiagnosticContinueRequest {
            command_output,
            agent_id,
            diagnostic_id: id,
        };
        let path = format!("api/diagnostic/{id}/continue");
        Self::json(self.request(Method::POST, &path)?.json(&body)).await
    }

    pub async fn diagnostic(&self, id: &str) -> Result<DiagnosticSummary, ApiError> {
        Self::json(self.request(Method::GET, &format!("api/diagnostic/{id}"))?).await
    }

    pub async fn delete_diagnostic(&self, id: &str) -> Result<(), ApiError> {
        Self::send(self.request(Method::DELETE, &format!("api/diagnostic/{id}"))?).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<Vec<DashboardStat>, ApiError> {
        Self::json(self.request(Method::GET, "api/dashboard/stats")?).await
    }

    pub async fn activities(&self) -> Result<Vec<Activity>, ApiError> {
        Self::json(self.request(Method::GET, "api/dashboard/activities")?).await
    }
}
