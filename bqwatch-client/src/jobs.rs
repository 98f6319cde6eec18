//! Job-related API endpoints

use async_trait::async_trait;
use bqwatch_core::domain::remote::{RemoteJobState, RemoteJobStatus};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::{BigQueryClient, RemoteJobClient};

impl BigQueryClient {
    /// Builds `{base}/projects/{project}/jobs/{job_id}?location={location}`
    fn job_url(&self, job_id: &str, location: Option<&str>) -> Result<Url> {
        if job_id.is_empty() {
            return Err(ClientError::InvalidRequest("job id cannot be empty".into()));
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid base URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidRequest("Base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["projects", self.project_id.as_str(), "jobs", job_id]);

        if let Some(location) = location {
            url.query_pairs_mut().append_pair("location", location);
        }

        Ok(url)
    }
}

#[async_trait]
impl RemoteJobClient for BigQueryClient {
    async fn get_status(&self, job_id: &str, location: Option<&str>) -> Result<RemoteJobStatus> {
        let url = self.job_url(job_id, location)?;
        debug!(job_id, location = location.unwrap_or("default"), "Fetching job from BigQuery");

        let mut request = self.client.get(url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(job_id.to_string()));
        }

        let resource: JobResource = self.handle_response(response).await?;
        Ok(resource.into())
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Subset of the `jobs.get` resource the poller needs
#[derive(Debug, Deserialize)]
struct JobResource {
    status: JobResourceStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResourceStatus {
    state: RemoteJobState,
    error_result: Option<Value>,
}

impl From<JobResource> for RemoteJobStatus {
    fn from(resource: JobResource) -> Self {
        RemoteJobStatus {
            state: resource.status.state,
            error_result: resource.status.error_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> BigQueryClient {
        BigQueryClient::with_client("https://bq.example.com/bigquery/v2", "proj", reqwest::Client::new())
    }

    #[test]
    fn test_job_url_without_location() {
        let url = client().job_url("job_abc", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://bq.example.com/bigquery/v2/projects/proj/jobs/job_abc"
        );
    }

    #[test]
    fn test_job_url_with_location() {
        let url = client().job_url("job_abc", Some("europe-west2")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://bq.example.com/bigquery/v2/projects/proj/jobs/job_abc?location=europe-west2"
        );
    }

    #[test]
    fn test_job_url_escapes_job_id() {
        let url = client().job_url("odd/id", None).unwrap();
        assert!(url.as_str().ends_with("/jobs/odd%2Fid"));
    }

    #[test]
    fn test_job_url_rejects_empty_id() {
        let err = client().job_url("", None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Permanent);
    }

    #[test]
    fn test_parse_running_job() {
        let body = json!({
            "kind": "bigquery#job",
            "jobReference": { "projectId": "proj", "jobId": "job_abc", "location": "US" },
            "status": { "state": "RUNNING" }
        });
        let resource: JobResource = serde_json::from_value(body).unwrap();
        let status = RemoteJobStatus::from(resource);
        assert_eq!(status, RemoteJobStatus::running());
    }

    #[test]
    fn test_parse_done_with_error() {
        let body = json!({
            "status": {
                "state": "DONE",
                "errorResult": { "reason": "invalidQuery", "message": "Syntax error" },
                "errors": [{ "reason": "invalidQuery", "message": "Syntax error" }]
            }
        });
        let resource: JobResource = serde_json::from_value(body).unwrap();
        let status = RemoteJobStatus::from(resource);
        assert_eq!(status.state, RemoteJobState::Done);
        assert_eq!(
            status.error_result,
            Some(json!({ "reason": "invalidQuery", "message": "Syntax error" }))
        );
    }

    #[test]
    fn test_parse_unknown_state_fails() {
        let body = json!({ "status": { "state": "EXPLODED" } });
        assert!(serde_json::from_value::<JobResource>(body).is_err());
    }
}
