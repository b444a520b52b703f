//! # sdbid environment state
//!
//! This module defines [`SdbEnv`](crate::env_state::SdbEnv), the **shared HTTP environment** used
//! by every network adapter of the crate (name resolution, identifier directory, catalogue cone
//! searches).
//!
//! ## Overview
//!
//! 1. One [`ureq::Agent`] built with a **global timeout**, so that no external call can block an
//!    invocation forever.
//! 2. A [`RetryPolicy`](crate::config::RetryPolicy) applied to every request: transient failures
//!    (timeouts, connection errors, 5xx) are retried with exponential backoff, anything else is
//!    returned immediately.
//!
//! ```text
//! SdbEnv
//! ├── http_client (ureq::Agent, timeout_global)
//! └── retry       (RetryPolicy)
//! ```
//!
//! The object is cheaply cloneable and meant to be shared between adapters.

use ureq::Agent;

use crate::{
    config::{RetryPolicy, SdbConfig},
    sdb_errors::SdbError,
};

#[derive(Debug, Clone)]
pub struct SdbEnv {
    pub http_client: Agent,
    pub retry: RetryPolicy,
}

impl Default for SdbEnv {
    fn default() -> Self {
        Self::new(&SdbConfig::default())
    }
}

impl SdbEnv {
    /// Build the environment from the timeout and retry settings of `config`.
    pub fn new(config: &SdbConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(config.http_timeout()))
            .build();
        let agent: Agent = agent_config.into();

        SdbEnv {
            http_client: agent,
            retry: config.retry.clone(),
        }
    }

    /// GET `url` with the given query parameters and return the body as text.
    ///
    /// Arguments
    /// ---------
    /// * `service`: label used in logs and errors
    /// * `url`: endpoint, without query string
    /// * `query`: query parameters, url-encoded by the client
    ///
    /// Return
    /// ------
    /// * The response body, or [`SdbError::Timeout`] / the HTTP error once retries are exhausted
    pub(crate) fn get_text(
        &self,
        service: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, SdbError> {
        self.retry.run(service, || {
            tracing::debug!(service, url, "GET");
            let mut response = self
                .http_client
                .get(url)
                .query_pairs(query.iter().map(|(k, v)| (*k, v.as_str())))
                .call()
                .map_err(|err| map_ureq_error(service, err))?;
            response
                .body_mut()
                .read_to_string()
                .map_err(|err| map_ureq_error(service, err))
        })
    }
}

fn map_ureq_error(service: &str, err: ureq::Error) -> SdbError {
    match err {
        ureq::Error::Timeout(_) => SdbError::Timeout(service.to_string()),
        other => SdbError::UreqHttpError(other),
    }
}
