//! Storefront Console
//!
//! Command-line front end to the session layer. Every invocation behaves like a
//! page load: the stored session is restored and verified first, then the
//! command runs against it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use sf_common::{IdentityPatch, Role};
use sf_config::{ConfigLoader, ConsoleConfig};
use sf_session::{
    storage, Decision, Navigator, RegistrationForm, RouteGuard, SessionController, SessionState,
    Shell,
};

/// Storefront session console
#[derive(Parser, Debug)]
#[command(name = "sf-console")]
#[command(about = "Sign in to the storefront API and inspect role-gated views")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, env = "STOREFRONT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an example configuration file
    ExampleConfig,

    #[command(flatten)]
    Session(SessionCommand),
}

/// Commands that run against a restored session
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Show the current session
    Status,

    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOREFRONT_PASSWORD")]
        password: String,
    },

    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOREFRONT_PASSWORD")]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        display_name: Option<String>,
        /// Register as a vendor
        #[arg(long)]
        vendor: bool,
    },

    /// Sign out
    Logout,

    /// Re-read the signed-in identity from the API
    Whoami,

    /// Change locally cached profile fields after a confirmed profile edit
    SetProfile {
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },

    /// Ask the route guard whether a view is reachable
    Open {
        /// View path, e.g. /admin/users
        path: String,
    },

    /// Perform an authenticated GET and print the JSON response
    Get {
        /// API path, e.g. /orders
        path: String,
    },
}

/// Reports forced navigation on the terminal.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, target: &str) {
        eprintln!("You have been signed out. Sign in again at {}", target);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    sf_common::logging::init_logging("sf-console", "warn");

    let args = Args::parse();

    match args.command {
        Command::ExampleConfig => {
            print!("{}", ConsoleConfig::example_toml());
            Ok(())
        }
        Command::Session(command) => run(args.config, command).await,
    }
}

async fn run(config_path: Option<PathBuf>, command: SessionCommand) -> Result<()> {
    let loader = match &config_path {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("Failed to load configuration")?;
    debug!(base_url = %config.api.base_url, backend = %config.storage.backend, "Configuration loaded");

    let controller = SessionController::from_config(
        &config,
        storage::from_config(&config.storage),
        Arc::new(ConsoleNavigator),
    )?;
    let guard = RouteGuard::storefront(config.routes.clone());

    controller.bootstrap().await;

    match command {
        SessionCommand::Status => print_state(&controller),

        SessionCommand::Login { email, password } => {
            let identity = controller.login(&email, &password).await?;
            println!("Signed in as {} ({})", identity.label(), identity.role);
            println!("Landing view: {}", config.routes.landing_for(identity.role));
        }

        SessionCommand::Register {
            email,
            password,
            first_name,
            last_name,
            display_name,
            vendor,
        } => {
            let form = RegistrationForm {
                email,
                password,
                first_name,
                last_name,
                display_name,
                role: vendor.then_some(Role::Vendor),
            };
            let identity = controller.register(&form).await?;
            println!("Registered and signed in as {} ({})", identity.label(), identity.role);
        }

        SessionCommand::Logout => {
            controller.logout().await;
            println!("Signed out");
        }

        SessionCommand::Whoami => {
            let identity = controller.refresh_identity().await?;
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }

        SessionCommand::SetProfile {
            display_name,
            first_name,
            last_name,
        } => {
            let patch = IdentityPatch {
                display_name,
                first_name,
                last_name,
                ..Default::default()
            };
            if patch.is_empty() {
                anyhow::bail!("Nothing to update");
            }
            let identity = controller.update_identity(patch)?;
            println!("Profile updated: {}", identity.label());
        }

        SessionCommand::Open { path } => {
            let state = controller.state();
            match guard.resolve(&state, &path) {
                Decision::Allow => match Shell::for_path(&path) {
                    Some(shell) => println!("{}: {}", shell, path),
                    None => println!("{}", path),
                },
                Decision::Defer => println!("Session not yet known"),
                Decision::Redirect(target) => println!("Redirected to {}", target),
            }
        }

        SessionCommand::Get { path } => {
            let body: Value = controller.http().get_json(&path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

fn print_state(controller: &SessionController) {
    match controller.state() {
        SessionState::Authenticated(identity) => {
            println!("Signed in as {} <{}>", identity.label(), identity.email);
            println!("Role: {}", identity.role);
            if let Some(shell) = Shell::for_role(identity.role) {
                println!("Console: {} ({})", shell, shell.base_path());
            }
        }
        other => println!("Not signed in ({})", other.name()),
    }
}
