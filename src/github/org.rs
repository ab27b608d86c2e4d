use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::GitHubClient;
use crate::models::team::{Maintainer, MembershipRole, OrgRef, TeamRef};
use crate::org::OrgMembership;
use crate::store::LinkStore;

const PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct GhTeam {
    id: i64,
    slug: String,
    name: String,
}

#[derive(Deserialize)]
struct GhMembership {
    state: String,
}

#[derive(Deserialize)]
struct GhUser {
    login: Option<String>,
}

#[derive(Serialize)]
struct MembershipBody<'a> {
    role: &'a str,
}

/// Org membership backed by the GitHub REST API, with maintainers joined to
/// their corporate links.
pub struct GitHubOrgs {
    client: GitHubClient,
    links: Arc<dyn LinkStore>,
}

impl GitHubOrgs {
    pub fn new(client: GitHubClient, links: Arc<dyn LinkStore>) -> Self {
        Self { client, links }
    }

    fn membership_path(org: &OrgRef, team: &TeamRef, login: &str) -> String {
        format!(
            "/orgs/{}/teams/{}/memberships/{}",
            urlencoding::encode(&org.name),
            urlencoding::encode(&team.slug),
            urlencoding::encode(login)
        )
    }
}

#[async_trait]
impl OrgMembership for GitHubOrgs {
    async fn get_team(&self, org: &OrgRef, team_id: i64) -> anyhow::Result<Option<TeamRef>> {
        let path = format!("/organizations/{}/team/{}", org.id, team_id);
        let resp = self
            .client
            .send(self.client.request(Method::GET, &path), "get team")
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let team: GhTeam = GitHubClient::json(resp, "get team").await?;
        Ok(Some(TeamRef {
            id: team.id,
            slug: team.slug,
            name: team.name,
        }))
    }

    async fn is_member(&self, org: &OrgRef, team: &TeamRef, login: &str) -> anyhow::Result<bool> {
        let path = Self::membership_path(org, team, login);
        let resp = self
            .client
            .send(self.client.request(Method::GET, &path), "team membership")
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let membership: GhMembership = GitHubClient::json(resp, "team membership").await?;
        Ok(membership.state == "active")
    }

    async fn add_membership(
        &self,
        org: &OrgRef,
        team: &TeamRef,
        login: &str,
        role: MembershipRole,
    ) -> anyhow::Result<()> {
        let path = Self::membership_path(org, team, login);
        let req = self
            .client
            .request(Method::PUT, &path)
            .json(&MembershipBody { role: role.as_str() });
        let resp = self.client.send(req, "add team membership").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            anyhow::bail!("team {} or user {} not found", team.slug, login);
        }
        tracing::info!(org = %org.name, team = %team.slug, login, role = role.as_str(), "added team membership");
        Ok(())
    }

    async fn official_maintainers(
        &self,
        org: &OrgRef,
        team: &TeamRef,
    ) -> anyhow::Result<Vec<Maintainer>> {
        let mut logins = Vec::new();
        let mut page = 1;
        loop {
            let path = format!(
                "/orgs/{}/teams/{}/members?role=maintainer&per_page={}&page={}",
                urlencoding::encode(&org.name),
                urlencoding::encode(&team.slug),
                PAGE_SIZE,
                page
            );
            let resp = self
                .client
                .send(self.client.request(Method::GET, &path), "team maintainers")
                .await?;
            if resp.status() == StatusCode::NOT_FOUND {
                anyhow::bail!("team {} not found in {}", team.slug, org.name);
            }
            let users: Vec<GhUser> = GitHubClient::json(resp, "team maintainers").await?;
            let count = users.len();
            logins.extend(users.into_iter().map(|u| u.login));
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        let known: Vec<String> = logins.iter().flatten().cloned().collect();
        let mut links: HashMap<String, _> = self
            .links
            .links_for_logins(&known)
            .await?
            .into_iter()
            .map(|l| (l.github_login.to_lowercase(), l))
            .collect();

        Ok(logins
            .into_iter()
            .map(|login| {
                let link = login.as_ref().and_then(|l| links.remove(&l.to_lowercase()));
                Maintainer { login, link }
            })
            .collect())
    }
}
