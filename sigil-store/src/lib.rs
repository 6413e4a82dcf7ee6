// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Sigil Store
//!
//! Storage backends for Sigil.
//!
//! This crate provides:
//!
//! - **MemoryCache**: Bounded response cache honoring absolute and sliding expiry
//! - **SettingsStore**: Client defaults with persistence and change notifications
//! - **Keychain**: OAuth secrets in the platform credential store
//! - **Persistence**: File I/O helpers for JSON data
//!
//! ## Usage
//!
//! ```ignore
//! use sigil_store::SettingsStore;
//!
//! let store = SettingsStore::load_default().await?;
//! store.set("retry_count", "2").await?;
//! store.save().await?;
//!
//! let client = store.get().await.to_builder().build()?;
//! ```

pub mod cache;
pub mod error;
pub mod keychain;
pub mod persistence;
pub mod settings_store;

pub use cache::MemoryCache;
pub use error::StoreError;
pub use keychain::SecretKind;
pub use persistence::{default_config_dir, default_settings_path, load_json, save_json};
pub use settings_store::{DEFAULT_PROFILE, LogLevel, Settings, SettingsStore};

#[cfg(test)]
mod persistence_tests;
