//! # dectgw - Messaging gateway for DECT base stations
//!
//! dectgw sits between DECT multicell base stations and their handsets and
//! relays short text messages between handsets over the base stations'
//! XML-over-UDP messaging interface.
//!
//! ## Features
//!
//! - **Store-and-forward**: every message is confirmed to the sender at once, then re-sent to
//!   the recipient once a minute until its base station reports delivery.
//! - **Expiry**: messages still undelivered after seven days are dropped.
//! - **Roaming**: the gateway learns which base station serves which handset from
//!   `systeminfo` and `login` frames and sends retries there.
//! - **Async Design**: one tokio receive loop plus a retry task and a socket writer task.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dectgw::config::Config;
//! use dectgw::gateway::Gateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut gateway = Gateway::bind(config).await?;
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`gateway`] - UDP service, frame dispatch, message store, presence tracking
//! - [`protocol`] - frame decoding and outbound document templates
//! - [`config`] - configuration loading and validation
//! - [`logutil`] - log formatting helpers
//! - [`metrics`] - process-wide counters
//!
//! The in-memory queue and presence table are not persisted; a restart
//! loses undelivered messages.

pub mod config;
pub mod gateway;
pub mod logutil;
pub mod metrics;
pub mod protocol;
