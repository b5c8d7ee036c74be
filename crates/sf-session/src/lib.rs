//! # Storefront session layer
//!
//! Client-side session and authorization for the storefront console:
//!
//! - **Credential Store** ([`storage`]): access token, refresh token and identity
//!   slots in durable key/value storage
//! - **HTTP Client** ([`http`]): bearer token attachment and a single
//!   refresh-then-replay on authorization failure
//! - **Session Controller** ([`controller`]): bootstrap, login, registration,
//!   logout and identity updates
//! - **Route Guard** ([`guard`]) and role-scoped [`shell`]s
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sf_config::ConsoleConfig;
//! use sf_session::{storage, RecordingNavigator, RouteGuard, SessionController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConsoleConfig::load()?;
//!     let controller = SessionController::from_config(
//!         &config,
//!         storage::from_config(&config.storage),
//!         Arc::new(RecordingNavigator::new()),
//!     )?;
//!
//!     controller.bootstrap().await;
//!     controller.login("a@x.com", "secret").await?;
//!
//!     let guard = RouteGuard::storefront(config.routes.clone());
//!     println!("{:?}", guard.resolve(&controller.state(), "/admin"));
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod controller;
pub mod error;
pub mod guard;
pub mod http;
pub mod session;
pub mod shell;
pub mod storage;

pub use api::RegistrationForm;
pub use controller::SessionController;
pub use error::{Error, Result};
pub use guard::{Access, Decision, RoleSet, RouteGuard, RouteTable};
pub use http::{ApiResponse, HttpClient, RequestOptions};
pub use session::{Navigator, RecordingNavigator, Session, SessionContext, SessionState};
pub use shell::Shell;
pub use storage::{CredentialStore, FileStorage, KeyValueStorage, MemoryStorage, StorageError};
