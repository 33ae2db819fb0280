//! Reference resolution against the GitHub REST API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::collaborators::{CommitResolver, ResolvedReference};
use crate::config::GithubConfig;
use crate::error::{BenchError, Result};

const USER_AGENT: &str = concat!("vbench/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Commit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    head: Commit,
}

/// Resolves commits, branches, tags and pull request numbers of one repository.
///
/// A reference is first looked up as a commit-ish. If that fails and the
/// reference is a plain number, it is looked up as a pull request and the
/// pull request's head commit is returned.
#[derive(Clone)]
pub struct GithubResolver {
    client: reqwest::Client,
    api_url: String,
    repository: String,
    token: Option<String>,
}

impl std::fmt::Debug for GithubResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubResolver")
            .field("api_url", &self.api_url)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl GithubResolver {
    pub fn new(api_url: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: None,
        }
    }

    pub fn from_config(config: &GithubConfig) -> Self {
        Self::new(&config.api_url, &config.repository).with_token(config.token.clone())
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, reference: &str) -> Result<T> {
        let url = format!("{}/repos/{}/{path}", self.api_url, self.repository);
        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resolution_error = |message: String| BenchError::ReferenceResolution {
            reference: reference.to_string(),
            message,
        };

        let response = request
            .send()
            .await
            .map_err(|e| resolution_error(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(resolution_error(format!("GET {path} returned {status}: {error_text}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| resolution_error(e.to_string()))
    }
}

#[async_trait]
impl CommitResolver for GithubResolver {
    async fn resolve_reference(&self, reference: &str) -> Result<ResolvedReference> {
        let commit_error = match self
            .get::<Commit>(&format!("commits/{reference}"), reference)
            .await
        {
            Ok(commit) => {
                return Ok(ResolvedReference {
                    commit: commit.sha,
                    pull_request: None,
                })
            },
            Err(e) => e,
        };

        let Ok(number) = reference.parse::<u64>() else {
            return Err(commit_error);
        };
        tracing::debug!(reference, "Not a commit, trying as pull request");

        let pull = self
            .get::<PullRequest>(&format!("pulls/{number}"), reference)
            .await?;
        Ok(ResolvedReference {
            commit: pull.head.sha,
            pull_request: Some(number),
        })
    }
}
