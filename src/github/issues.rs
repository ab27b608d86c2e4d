use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;

use super::GitHubClient;
use crate::models::team::Repo;
use crate::notification::{IssueResponse, IssueTracker};

#[derive(Serialize)]
struct NewIssue<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct AssignIssue<'a> {
    assignees: [&'a str; 1],
}

/// Workflow issues in a GitHub repository.
pub struct GitHubIssues {
    client: GitHubClient,
}

impl GitHubIssues {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    fn issues_path(repo: &Repo) -> String {
        format!(
            "/repos/{}/{}/issues",
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        )
    }
}

#[async_trait]
impl IssueTracker for GitHubIssues {
    async fn create_issue(&self, repo: &Repo, title: &str, body: &str) -> anyhow::Result<IssueResponse> {
        let req = self
            .client
            .request(Method::POST, &Self::issues_path(repo))
            .json(&NewIssue { title, body });
        let resp = self.client.send(req, "create issue").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            anyhow::bail!("workflow repository {} not found", repo.full_name());
        }
        let issue: IssueResponse = GitHubClient::json(resp, "create issue").await?;
        tracing::info!(
            repo = %repo.full_name(),
            number = ?issue.number,
            url = ?issue.html_url,
            "created workflow issue"
        );
        Ok(issue)
    }

    async fn assign_issue(&self, repo: &Repo, number: i64, assignee: &str) -> anyhow::Result<()> {
        let path = format!("{}/{}", Self::issues_path(repo), number);
        let req = self
            .client
            .request(Method::PATCH, &path)
            .json(&AssignIssue { assignees: [assignee] });
        let resp = self.client.send(req, "assign issue").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            anyhow::bail!("issue {}#{} not found", repo.full_name(), number);
        }
        Ok(())
    }
}
