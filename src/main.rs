use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use joinflow::config::{self, Config};
use joinflow::directory::graph::GraphDirectory;
use joinflow::github::issues::GitHubIssues;
use joinflow::github::org::GitHubOrgs;
use joinflow::github::GitHubClient;
use joinflow::join::{JoinPipeline, JoinServices, SiteSettings};
use joinflow::notification::mail::HttpMailProvider;
use joinflow::notification::telemetry::WebhookTelemetry;
use joinflow::notification::templates::BuiltinTemplates;
use joinflow::notification::{IssueTracker, MailProvider};
use joinflow::store::postgres::PgStore;
use joinflow::{api, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Approval { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_approval_command(&db, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// Log to stdout (JSON when `JOINFLOW_LOG_JSON` is set) and export spans over
/// OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "joinflow"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json = std::env::var("JOINFLOW_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "joinflow=debug,tower_http=debug".into()),
        ))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(telemetry_layer)
        .init();
    Ok(())
}

/// Wire the production adapters. GitHub and the directory are required;
/// mail is optional and only needed by orgs that enable it.
fn build_services(cfg: &Config, db: &PgStore) -> anyhow::Result<JoinServices> {
    let github_cfg = cfg
        .github
        .as_ref()
        .context("JOINFLOW_GITHUB_TOKEN must be set")?;
    let github = GitHubClient::new(github_cfg)?;

    let graph_cfg = cfg.graph.clone().context(
        "JOINFLOW_GRAPH_CLIENT_ID, JOINFLOW_GRAPH_CLIENT_SECRET and JOINFLOW_GRAPH_TOKEN_URL must be set",
    )?;

    let issues: Arc<dyn IssueTracker> = Arc::new(GitHubIssues::new(github.clone()));
    let mail: Option<Arc<dyn MailProvider>> = match cfg.mail.clone() {
        Some(mail_cfg) => Some(Arc::new(HttpMailProvider::new(mail_cfg)?)),
        None => {
            tracing::warn!("mail relay is not configured; orgs with mail approvals will be rejected");
            None
        }
    };

    Ok(JoinServices {
        org: Arc::new(GitHubOrgs::new(github, Arc::new(db.clone()))),
        store: Arc::new(db.clone()),
        directory: Arc::new(GraphDirectory::new(graph_cfg)?),
        issues: Some(issues),
        mail,
        templates: Arc::new(BuiltinTemplates),
        telemetry: Arc::new(WebhookTelemetry::new(
            cfg.telemetry_webhook_urls.clone(),
            cfg.telemetry_webhook_secret.clone(),
        )?),
    })
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let services = build_services(&cfg, &db)?;
    let site = SiteSettings {
        site_url: cfg.site_url(),
        version_tag: cfg.version_tag.clone(),
    };
    tracing::info!(orgs = cfg.orgs.len(), site = %site.site_url, "configuration loaded");

    let state = Arc::new(AppState {
        pipeline: JoinPipeline::new(services.clone(), site),
        services,
        db,
        config: cfg,
    });

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("joinflow listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_approval_command(db: &PgStore, cmd: cli::ApprovalCommands) -> anyhow::Result<()> {
    match cmd {
        cli::ApprovalCommands::List { team_id } => {
            let approvals = db.list_pending_approvals(team_id).await?;

            if approvals.is_empty() {
                println!("No pending approvals.");
                return Ok(());
            }

            println!("{:<38} {:<20} {:<8} REQUESTED", "ID", "REQUESTER", "ISSUE");
            for r in approvals {
                let issue = r
                    .issue_number
                    .map(|n| format!("#{}", n))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<38} {:<20} {:<8} {}",
                    r.id,
                    r.requester_login,
                    issue,
                    r.requested_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        cli::ApprovalCommands::Show { id } => {
            let id = uuid::Uuid::parse_str(&id).context("invalid approval request ID")?;
            match db.get_approval_request(id).await? {
                Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
                None => println!("Request {} not found.", id),
            }
        }
    }
    Ok(())
}
