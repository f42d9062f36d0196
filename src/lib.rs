//! Oppy - an interactive shell for the 1Password CLI.
//!
//! Oppy wraps the `op` command-line tool in a small REPL. Each shell is bound
//! to a named profile from an INI file, signs in once, and keeps the session
//! token in the operating system's keyring so later shells skip the password
//! prompt until the token expires.
//!
//! # Features
//!
//! - **Profiles**: domain, default vault and debug flag per INI section
//! - **Session Caching**: tokens stored in the OS keyring with an expiry
//! - **Transparent Re-auth**: a rejected session triggers one fresh sign-in
//! - **Search**: a small query language over the cached item list
//! - **Item Cache**: optional encrypted copy of the item list per vault
//! - **Passthrough**: any other command is handed to `op` unchanged
//!
//! # Quick Start
//!
//! ```no_run
//! use oppy::cli::{ProcessRunner, TerminalPrompt};
//! use oppy::config::{self, Overrides};
//! use oppy::dispatch::Dispatcher;
//! use oppy::stores::os_keyring::KeyringStore;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> oppy::Result<()> {
//!     let options = config::resolve(
//!         config::expand_home(config::DEFAULT_CONFIG_PATH),
//!         "work",
//!         &Overrides::default(),
//!     )?;
//!
//!     let dispatcher = Dispatcher::new(KeyringStore::new(), ProcessRunner, TerminalPrompt);
//!     for item in dispatcher.list_items(&options).await? {
//!         println!("{}", oppy::item::choice_label(&item));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! ```ini
//! [DEFAULT]
//! debug = no
//!
//! [work]
//! domain = acme
//! vault = Engineering
//! session_ttl = 60
//! temp_file = ~/.cache/oppy/work-items
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Provides |
//! |---------|---------|----------|
//! | `keyring-store` | yes | [`stores::os_keyring::KeyringStore`], required by the binary |
//! | `mock` | yes | [`stores::memory::MemoryStore`] and the [`mock`] test doubles |

pub mod args;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod item;
pub mod item_cache;
#[cfg(feature = "mock")]
pub mod mock;
pub mod op;
pub mod query;
pub mod session;
pub mod shell;
pub mod store;
pub mod stores;
pub mod telemetry;
pub mod validation;

pub use config::{EffectiveOptions, Overrides, Profile, ProfileSet};
pub use dispatch::Dispatcher;
pub use error::{ConfigError, OppyError, Result};
pub use query::{Query, QueryError};
pub use session::{CachedSession, SessionCache};
pub use store::SecretStore;

/// Version reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
