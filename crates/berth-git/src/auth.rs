//! Authentication context for remote operations.
//!
//! berth never prompts for credentials itself: interactive prompting is
//! disabled unconditionally and an external askpass shim reads the account
//! identity from the environment variables set here.

use std::collections::{HashMap, HashSet};

use crate::error::GitErrorKind;

/// An account identity injected into remote operations.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Account {
    /// The account login.
    pub login: String,

    /// The API endpoint the account belongs to.
    pub endpoint: String,
}

impl Account {
    pub fn new(login: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Environment for authenticating remote operations.
///
/// Always disables interactive credential prompting (supported since git
/// 2.3), even when no account is available as a fallback.
pub fn env_for_authentication(account: Option<&Account>) -> HashMap<String, String> {
    let mut env = HashMap::from([("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]);

    if let Some(account) = account {
        env.insert("BERTH_USERNAME".to_string(), account.login.clone());
        env.insert("BERTH_ENDPOINT".to_string(), account.endpoint.clone());
    }

    env
}

/// Arguments for network operations that unset configuration values which
/// must not be read from local, global, or system git configs.
///
/// These go before the subcommand: `git -c credential.helper= pull ...`.
pub fn git_network_arguments() -> [&'static str; 2] {
    // Explicitly unset any defined credential helper; the askpass shim is
    // the only authentication path.
    ["-c", "credential.helper="]
}

/// The errors a remote operation treats as expected negative outcomes
/// rather than fatal failures.
pub fn expected_authentication_errors() -> HashSet<GitErrorKind> {
    HashSet::from([
        GitErrorKind::AuthenticationFailed,
        GitErrorKind::RepositoryNotFound,
    ])
}
