//! Legacy provider access
//!
//! The legacy provider is the third-party busuanzi service whose historical
//! counts seed this service's totals. A provider performs single attempts
//! only; retries, fallbacks and caching belong to the before-count fetcher
//! in [`crate::engine`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::LegacyError;

mod envelope;
mod http;

pub use envelope::JsonpEnvelope;
pub use http::HttpLegacyProvider;

/// Counts reported by the legacy provider for one referer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LegacyCounts {
    /// Site unique visitors
    #[serde(default)]
    pub site_uv: u64,
    /// Site page views
    #[serde(default)]
    pub site_pv: u64,
    /// Page views for the referer's page
    #[serde(default)]
    pub page_pv: u64,
}

/// One-shot operations against the legacy provider
#[async_trait]
pub trait LegacyProvider: Send + Sync {
    /// Fetch the counts the provider tracks for `referer`
    async fn lookup(&self, referer: &str) -> Result<LegacyCounts, LegacyError>;

    /// Register a hit for `referer`; the response body is ignored
    async fn notify(&self, referer: &str) -> Result<(), LegacyError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider for unit tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Answers per referer; unknown referers get `fallback`
    #[derive(Default)]
    pub struct ScriptedProvider {
        answers: Mutex<HashMap<String, Option<LegacyCounts>>>,
        fallback: Option<LegacyCounts>,
        lookups: Mutex<Vec<String>>,
        notifications: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        /// Every lookup succeeds with `counts`
        pub fn answering(counts: LegacyCounts) -> Self {
            Self {
                fallback: Some(counts),
                ..Default::default()
            }
        }

        /// Every lookup fails
        pub fn failing() -> Self {
            Self::default()
        }

        /// Script `referer` to succeed with `counts` (`Some`) or fail (`None`)
        pub fn script(self, referer: &str, counts: Option<LegacyCounts>) -> Self {
            self.answers.lock().insert(referer.to_string(), counts);
            self
        }

        pub fn lookups(&self) -> Vec<String> {
            self.lookups.lock().clone()
        }

        pub fn lookup_count(&self) -> usize {
            self.lookups.lock().len()
        }

        pub fn notifications(&self) -> Vec<String> {
            self.notifications.lock().clone()
        }
    }

    #[async_trait]
    impl LegacyProvider for ScriptedProvider {
        async fn lookup(&self, referer: &str) -> Result<LegacyCounts, LegacyError> {
            self.lookups.lock().push(referer.to_string());
            let answer = self
                .answers
                .lock()
                .get(referer)
                .copied()
                .unwrap_or(self.fallback);
            answer.ok_or(LegacyError::Status(502))
        }

        async fn notify(&self, referer: &str) -> Result<(), LegacyError> {
            self.notifications.lock().push(referer.to_string());
            Ok(())
        }
    }

    pub fn counts(site_uv: u64, site_pv: u64, page_pv: u64) -> LegacyCounts {
        LegacyCounts {
            site_uv,
            site_pv,
            page_pv,
        }
    }
}
