use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the `config.yaml` file.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Start the HTTP server. This is the default.
    Serve,
    /// Manage accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum UserAction {
    /// Create an account, for instance the first administrator.
    Add {
        username: String,
        password: String,
        #[arg(long, short)]
        email: Option<String>,
        /// Grant administrator rights.
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    notekeeper::telemetry::setup_tracing();

    let state = match notekeeper::initialize_state(args.config).await {
        Ok(state) => state,
        Err(err) => {
            // nothing works without the database.
            tracing::error!(error = %err, "cannot initialize notekeeper");
            std::process::exit(1);
        },
    };

    match args.cmd.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            if let Err(err) = notekeeper::serve(state).await {
                tracing::error!(error = %err, "server stopped");
                std::process::exit(1);
            }
        },
        Commands::User {
            action:
                UserAction::Add {
                    username,
                    password,
                    email,
                    admin,
                },
        } => {
            match notekeeper::add_user(&state, &username, &password, email, admin)
                .await
            {
                Ok(id) => tracing::info!(user_id = %id, %username, admin, "account created"),
                Err(err) => {
                    tracing::error!(error = %err, friendly = %err.friendly(), "cannot create account");
                    std::process::exit(1);
                },
            }
        },
    }
}
