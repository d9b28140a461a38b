//! The standard fetch operation: a `berth-git` fetch of one remote.

use std::path::PathBuf;

use async_trait::async_trait;

use berth_git::{fetch, Account};

use crate::fetcher::FetchOperation;

/// Fetches one repository's remote on every scheduler tick.
///
/// No progress callback: background fetches have no observer, and the
/// scheduler swallows failures anyway.
pub struct RemoteFetch {
    repository: PathBuf,
    account: Option<Account>,
    remote: String,
}

impl RemoteFetch {
    pub fn new(repository: PathBuf, account: Option<Account>, remote: impl Into<String>) -> Self {
        Self {
            repository,
            account,
            remote: remote.into(),
        }
    }
}

#[async_trait]
impl FetchOperation for RemoteFetch {
    async fn fetch(&self) -> anyhow::Result<()> {
        fetch(&self.repository, self.account.as_ref(), &self.remote, None)
            .await
            .map_err(anyhow::Error::from)
    }
}
