//! A tiny HTTP service answering with the caller's IP address
//!
//! A `GET` on the configured route returns the client IP as plain text. The address is
//! taken from:
//!
//! - the connection peer address ([`axum::extract::ConnectInfo`]), by default
//! - the first entry of a proxy header like `X-Forwarded-For`, if configured
//!
//! Optionally the address is only reported when it belongs to a network (e.g.
//! `10.0.0.0/8`), and `Access-Control-Allow-*` headers are added for browser clients.
//!
//! | Request                  | Status | Body                        |
//! |--------------------------|--------|-----------------------------|
//! | other path               | 404    |                             |
//! | `OPTIONS *`              | 400    |                             |
//! | `OPTIONS` / `HEAD` route | 204    |                             |
//! | `GET` route              | 200    | client IP, if known/allowed |
//! | other method on route    | 405    |                             |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ipecho::{EchoConfig, server};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EchoConfig::new("/ip", "*", Some("10.0.0.0/8"), Some("X-Forwarded-For"))?;
//!     let listener = TcpListener::bind("127.0.0.1:1234").await?;
//!     server::serve(listener, config, server::shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod handler;
mod path;
pub mod server;
mod source;

pub use config::{EchoConfig, Settings};
pub use error::{AddressError, ConfigError};
pub use handler::router;
pub use source::AddressSource;
