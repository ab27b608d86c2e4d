//! Built-in HTML mail templates.

use serde_json::Value;

use super::TemplateRenderer;

pub const PLEASE_APPROVE: &str = "membershipApprovals/pleaseApprove";
pub const REQUEST_SUBMITTED: &str = "membershipApprovals/requestSubmitted";

/// Renders the membership-approval templates compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct BuiltinTemplates;

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Required string field from the render context, HTML-escaped.
fn field(context: &Value, key: &str) -> anyhow::Result<String> {
    context
        .get(key)
        .and_then(Value::as_str)
        .map(escape)
        .ok_or_else(|| anyhow::anyhow!("template context is missing '{}'", key))
}

fn footer(context: &Value) -> anyhow::Result<String> {
    Ok(format!(
        "<p style=\"color:#888;font-size:11px\">Correlation ID: {} &middot; version {}</p>",
        field(context, "correlation_id")?,
        field(context, "version")?
    ))
}

impl TemplateRenderer for BuiltinTemplates {
    fn render(&self, template: &str, context: &Value) -> anyhow::Result<String> {
        match template {
            PLEASE_APPROVE => Ok(format!(
                "<h2>{name} ({login}) wants to join {team}</h2>\
                 <p>A membership request for the <strong>{team}</strong> team in the \
                 <strong>{org}</strong> organization needs a maintainer's decision.</p>\
                 <p><strong>Requester:</strong> {name} &lt;{email}&gt;<br/>\
                 <strong>Business justification:</strong></p>\
                 <blockquote>{justification}</blockquote>\
                 <p><a href=\"{action}\">Review this request</a></p>{footer}",
                name = field(context, "requester_name")?,
                login = field(context, "requester_login")?,
                email = field(context, "requester_email")?,
                team = field(context, "team_name")?,
                org = field(context, "org_name")?,
                justification = field(context, "justification")?,
                action = field(context, "action_url")?,
                footer = footer(context)?,
            )),
            REQUEST_SUBMITTED => Ok(format!(
                "<h2>Your request to join {team} has been submitted</h2>\
                 <p>Hi {name}, the maintainers of the <strong>{team}</strong> team in the \
                 <strong>{org}</strong> organization have been asked to review your request.</p>\
                 <p><strong>Your justification:</strong></p>\
                 <blockquote>{justification}</blockquote>\
                 <p><a href=\"{action}\">View your request</a></p>{footer}",
                name = field(context, "requester_name")?,
                team = field(context, "team_name")?,
                org = field(context, "org_name")?,
                justification = field(context, "justification")?,
                action = field(context, "action_url")?,
                footer = footer(context)?,
            )),
            other => anyhow::bail!("unknown mail template '{}'", other),
        }
    }
}
