//! Route, run and deliver in one call.

use tracing::info;

use opentolk_kernel::{Match, Router};

use crate::dispatch::{Delivery, OutputDispatcher};
use crate::error::Result;
use crate::runner::Runner;

/// The full pipeline from input text to delivered output.
#[derive(Debug)]
pub struct Engine {
    router: Router,
    runner: Runner,
    dispatcher: OutputDispatcher,
}

impl Engine {
    pub fn new(router: Router, runner: Runner, dispatcher: OutputDispatcher) -> Self {
        Self {
            router,
            runner,
            dispatcher,
        }
    }

    /// Route `text` and handle it.  `Ok(None)` when no plugin matched.
    pub async fn handle(&self, text: &str) -> Result<Option<Delivery>> {
        let Some(matched) = self.router.route(text).await else {
            info!("no plugin matched input");
            return Ok(None);
        };
        self.execute(matched).await.map(Some)
    }

    /// Run and deliver an already routed match.
    pub async fn execute(&self, matched: Match) -> Result<Delivery> {
        let manifest = std::sync::Arc::clone(&matched.manifest);
        let outcome = self.runner.run(matched).await?;
        self.dispatcher.deliver(&manifest, outcome).await
    }

    /// Bypass routing and hand the whole text to `plugin_id`.
    pub async fn handle_with(&self, plugin_id: &str, text: &str) -> Result<Delivery> {
        let manifest = self
            .runner
            .registry()
            .resolve_step(plugin_id)
            .ok_or_else(|| opentolk_plugins::PluginError::NotFound(plugin_id.to_string()))?;
        self.execute(Match::direct(manifest, text)).await
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Replace the router, e.g. after plugins were reloaded.
    pub fn set_router(&mut self, router: Router) {
        self.router = router;
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }
}
