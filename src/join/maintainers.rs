//! Reviewer selection and maintainer contact resolution.
//!
//! Shared by the join pipeline (strict address resolution) and the team
//! overview (best-effort).

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::directory::{resolve_addresses, DirectoryResolver, ResolutionPolicy};
use crate::models::team::{CorporateLink, Maintainer, OrgRef, TeamRef};
use crate::org::OrgMembership;

/// A maintainer who can review requests: has both a login and a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleMaintainer {
    pub login: String,
    pub link: CorporateLink,
}

impl EligibleMaintainer {
    pub fn upn(&self) -> Option<&str> {
        self.link.corporate_upn.as_deref().filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintainerContact {
    pub login: String,
    pub display_name: Option<String>,
    pub upn: Option<String>,
    pub mail: Option<String>,
}

pub fn eligible(maintainers: Vec<Maintainer>) -> Vec<EligibleMaintainer> {
    maintainers
        .into_iter()
        .filter_map(|m| match (m.login, m.link) {
            (Some(login), Some(link)) if !login.is_empty() => Some(EligibleMaintainer { login, link }),
            _ => None,
        })
        .collect()
}

pub async fn list_eligible_maintainers(
    org: &dyn OrgMembership,
    org_ref: &OrgRef,
    team: &TeamRef,
) -> anyhow::Result<Vec<EligibleMaintainer>> {
    let all = org.official_maintainers(org_ref, team).await?;
    let total = all.len();
    let eligible = eligible(all);
    tracing::debug!(
        team = %team.slug,
        total,
        eligible = eligible.len(),
        "filtered team maintainers"
    );
    Ok(eligible)
}

/// Uniform choice over `maintainers`; `None` when the slice is empty.
pub fn pick_assignee<'a, R: Rng + ?Sized>(
    maintainers: &'a [EligibleMaintainer],
    rng: &mut R,
) -> Option<&'a EligibleMaintainer> {
    maintainers.choose(rng)
}

/// Resolve mail addresses for every maintainer that has a UPN.
///
/// Maintainers without a UPN come back with `mail: None` under either policy.
pub async fn maintainer_contacts(
    directory: &dyn DirectoryResolver,
    maintainers: &[EligibleMaintainer],
    policy: ResolutionPolicy,
) -> anyhow::Result<Vec<MaintainerContact>> {
    let upns: Vec<String> = maintainers
        .iter()
        .filter_map(|m| m.upn().map(str::to_string))
        .collect();
    let mut resolved = resolve_addresses(directory, &upns, policy).await?.into_iter();

    Ok(maintainers
        .iter()
        .map(|m| {
            let mail = match m.upn() {
                Some(_) => resolved.next().flatten(),
                None => None,
            };
            MaintainerContact {
                login: m.login.clone(),
                display_name: m.link.corporate_display_name.clone(),
                upn: m.upn().map(str::to_string),
                mail,
            }
        })
        .collect())
}

/// Approver addresses for notification mail. Any resolution failure aborts.
pub async fn approver_addresses(
    directory: &dyn DirectoryResolver,
    maintainers: &[EligibleMaintainer],
) -> anyhow::Result<Vec<String>> {
    Ok(maintainer_contacts(directory, maintainers, ResolutionPolicy::Strict)
        .await?
        .into_iter()
        .filter_map(|c| c.mail)
        .collect())
}

/// Read path for the team overview page: unresolvable entries are kept
/// without an address.
pub async fn team_overview(
    org: &dyn OrgMembership,
    directory: &dyn DirectoryResolver,
    org_ref: &OrgRef,
    team: &TeamRef,
) -> anyhow::Result<Vec<MaintainerContact>> {
    let maintainers = list_eligible_maintainers(org, org_ref, team).await?;
    maintainer_contacts(directory, &maintainers, ResolutionPolicy::BestEffort).await
}
