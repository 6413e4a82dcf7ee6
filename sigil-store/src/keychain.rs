//! OAuth secret storage using the system keychain.
//!
//! Consumer and token secrets never touch the settings file. They are kept
//! per profile in the platform's credential store:
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)
//!
//! ## Usage
//!
//! ```ignore
//! use sigil_store::keychain::{self, SecretKind};
//!
//! keychain::store_secret("default", SecretKind::ConsumerSecret, "kd94hf93k423kf44")?;
//!
//! if let Some(secret) = keychain::get_secret("default", SecretKind::ConsumerSecret)? {
//!     println!("{} characters", secret.len());
//! }
//!
//! keychain::delete_secret("default", SecretKind::ConsumerSecret)?;
//! ```

use keyring::Entry;
use tracing::debug;

use crate::error::StoreError;

/// Service name prefix for Sigil credentials.
const SERVICE_PREFIX: &str = "Sigil";

/// The secrets a profile can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    /// OAuth consumer secret.
    ConsumerSecret,
    /// OAuth token secret.
    TokenSecret,
    /// Password for Basic auth or xAuth.
    Password,
}

impl SecretKind {
    /// All secret kinds.
    pub const ALL: [SecretKind; 3] = [Self::ConsumerSecret, Self::TokenSecret, Self::Password];

    /// Keychain account name.
    pub fn account(&self) -> &'static str {
        match self {
            Self::ConsumerSecret => "consumer_secret",
            Self::TokenSecret => "token_secret",
            Self::Password => "password",
        }
    }
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.account())
    }
}

impl std::str::FromStr for SecretKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "consumer_secret" => Ok(Self::ConsumerSecret),
            "token_secret" => Ok(Self::TokenSecret),
            "password" => Ok(Self::Password),
            other => Err(StoreError::UnknownKey(other.to_string())),
        }
    }
}

fn service_name(profile: &str) -> String {
    format!("{SERVICE_PREFIX}-{profile}")
}

fn entry(profile: &str, kind: SecretKind) -> Result<Entry, StoreError> {
    Ok(Entry::new(&service_name(profile), kind.account())?)
}

/// Stores a secret for a profile.
///
/// # Errors
///
/// Returns [`StoreError::Keychain`] if the platform store refuses the write.
pub fn store_secret(profile: &str, kind: SecretKind, secret: &str) -> Result<(), StoreError> {
    entry(profile, kind)?.set_password(secret)?;
    debug!(profile = profile, kind = %kind, "Secret stored in keychain");
    Ok(())
}

/// Retrieves a secret for a profile.
///
/// Returns `Ok(None)` when nothing is stored or the stored value is empty.
///
/// # Errors
///
/// Returns [`StoreError::Keychain`] for platform failures other than a
/// missing entry.
pub fn get_secret(profile: &str, kind: SecretKind) -> Result<Option<String>, StoreError> {
    match entry(profile, kind)?.get_password() {
        Ok(secret) if secret.is_empty() => Ok(None),
        Ok(secret) => {
            debug!(profile = profile, kind = %kind, "Secret retrieved from keychain");
            Ok(Some(secret))
        }
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Deletes a secret for a profile. Deleting a missing secret succeeds.
///
/// # Errors
///
/// Returns [`StoreError::Keychain`] if the platform store refuses the delete.
pub fn delete_secret(profile: &str, kind: SecretKind) -> Result<(), StoreError> {
    match entry(profile, kind)?.delete_credential() {
        Ok(()) => {
            debug!(profile = profile, kind = %kind, "Secret deleted from keychain");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Returns true if a non-empty secret is stored.
pub fn has_secret(profile: &str, kind: SecretKind) -> bool {
    matches!(get_secret(profile, kind), Ok(Some(_)))
}

// ============================================================================
// Tests
// ============================================================================
