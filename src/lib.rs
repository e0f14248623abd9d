//! ==============================================================================
//! lib.rs - airplug client library
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     client side of the sensor -> smart-plug automation dashboard.
//!     binds nothing itself; it talks to the dashboard backend on behalf of a
//!     signed-in user.
//!
//! layout (leaf first):
//!
//!     session.rs   TokenStore            current bearer credential
//!     auth.rs      AuthClient            cognito email/password -> tokens
//!     pipeline.rs  RequestPipeline       credential injection + 401 guard
//!     api.rs       ApiClient             plugs, sensors, mappings, csv
//!     domain.rs    records               Device, PlugDevice, Mapping, ...
//!     config.rs    DashboardConfig       airplug.toml
//! ```
//!
//! ==============================================================================

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod session;

pub use api::ApiClient;
pub use auth::{AuthClient, AuthError, AuthErrorKind, AuthTokens};
pub use config::DashboardConfig;
pub use domain::{CsvExport, Device, Mapping, PlugDevice};
pub use error::{Error, Result};
pub use pipeline::{RequestPipeline, Stage, Transport, UnauthorizedCallback};
pub use session::TokenStore;
