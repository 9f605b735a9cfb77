//! Client seam consumed by the poll coordinator.

use crate::client::{PmgClient, PmgError};
use async_trait::async_trait;
use serde_json::Value;

/// Authenticated access to the appliance's management API.
///
/// [`PmgClient`] is the production implementation; the poller's tests
/// script responses per path without a network.
#[async_trait]
pub trait PmgApi: Send + Sync {
    /// Authenticated GET returning the response envelope's `data` field.
    ///
    /// # Errors
    ///
    /// Returns [`PmgError`] on authentication, status, or transport
    /// failures.
    async fn get(&self, path: &str, query: &[(String, String)])
        -> Result<Option<Value>, PmgError>;

    /// Authenticated POST with a form body, same contract as [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns [`PmgError`] on authentication, status, or transport
    /// failures.
    async fn post(&self, path: &str, form: &[(String, String)])
        -> Result<Option<Value>, PmgError>;
}

#[async_trait]
impl PmgApi for PmgClient {
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Option<Value>, PmgError> {
        PmgClient::get(self, path, query).await
    }

    async fn post(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<Option<Value>, PmgError> {
        PmgClient::post(self, path, form).await
    }
}
