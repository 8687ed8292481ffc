//! Collaborators needed to render feedback commands

use std::sync::Arc;

use tally_domain::{EnvironmentExpander, JobPolicyLookup, MessageProvider, ParameterExpander};
use tally_shared::config::ServerConfig;

/// Shared by the coordinator and the dispatch workers
pub struct RenderContext {
    pub policies: Arc<dyn JobPolicyLookup>,
    pub environment: Arc<dyn EnvironmentExpander>,
    /// Invoked in registration order
    pub providers: Vec<Arc<dyn MessageProvider>>,
}

impl RenderContext {
    pub fn new(policies: Arc<dyn JobPolicyLookup>, environment: Arc<dyn EnvironmentExpander>) -> Self {
        Self {
            policies,
            environment,
            providers: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn MessageProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn expander<'a>(&'a self, server: &'a ServerConfig) -> ParameterExpander<'a> {
        ParameterExpander::new(
            server,
            self.policies.as_ref(),
            self.environment.as_ref(),
            &self.providers,
        )
    }
}
