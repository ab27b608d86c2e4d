use clap::{Parser, Subcommand};

/// joinflow: team membership requests with maintainer approval
#[derive(Parser)]
#[command(name = "joinflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (defaults to JOINFLOW_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect stored approval requests
    Approval {
        #[command(subcommand)]
        command: ApprovalCommands,
    },
}

#[derive(Subcommand)]
pub enum ApprovalCommands {
    /// List pending approval requests for a team
    List {
        #[arg(short, long)]
        team_id: i64,
    },
    /// Show one approval request
    Show {
        #[arg(long)]
        id: String,
    },
}
