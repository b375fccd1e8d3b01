//! Chatbridge: the backend half of a desktop AI chat client.
//!
//! It links OAuth identities for model vendors, keeps the catalog of model
//! providers and their models, and runs streaming chat turns with tool
//! calls. A UI talks to it through the [`bridge::Bridge`] invoke/push
//! boundary, either in-process or as JSON lines over stdio.
//!
//! # Quick start
//!
//! ```no_run
//! use chatbridge::app::Services;
//! use chatbridge::auth::system_launcher;
//! use chatbridge::config::load_config;
//!
//! # async fn example() {
//! let loaded = load_config(None).unwrap();
//! let services = Services::from_config(&loaded.config, system_launcher());
//! let reply = services
//!     .bridge
//!     .invoke("auth.getLinkedProviders", serde_json::Value::Null)
//!     .await;
//! println!("{reply}");
//! # }
//! ```

pub mod abort;
pub mod api;
pub mod app;
pub mod auth;
pub mod bridge;
pub mod build_info;
pub mod chat;
pub mod config;
pub mod error;
pub mod models;
pub mod settings;
pub mod store;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod tools;
pub mod types;
