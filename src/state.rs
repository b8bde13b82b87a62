use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Config;
use crate::hooks::{HookChain, HookError, IndexCommand, ScriptTagFilter, SCRIPT_MARKER};
use crate::language::Localisations;
use crate::middleware::AccessGuard;
use crate::storage::{DirectorySink, InFlight};
use crate::templates::{Renderer, Templates};

/// shared application state, built once before the server runs
pub struct AppState {
    pub config: Arc<Config>,
    pub localisations: Localisations,
    pub renderer: Renderer,
    pub guard: AccessGuard,
    pub sink: DirectorySink,
    pub hooks: HookChain,
    /// track temp files still being written, so the sweep leaves them alone
    pub in_flight: InFlight,
}

impl AppState {
    /// create state with the default templates and hooks implied by `config`
    pub fn new(config: Config, localisations: Localisations) -> Result<Self, HookError> {
        let mut hooks = HookChain::new();
        if config.strip_scripts {
            hooks = hooks.with(ScriptTagFilter::new(SCRIPT_MARKER)?);
        }
        if let Some(command) = config.index_command.as_deref().and_then(IndexCommand::parse) {
            hooks = hooks.with(command);
        }
        Ok(Self::with_parts(config, localisations, Templates::default(), hooks))
    }

    pub fn with_parts(
        config: Config,
        localisations: Localisations,
        templates: Templates,
        hooks: HookChain,
    ) -> Self {
        let in_flight: InFlight = Arc::new(DashMap::new());
        let renderer = Renderer::new(
            templates,
            config.message.clone(),
            config.picture.is_some(),
            config.field.clone(),
            config.port,
            config.tls.is_some(),
        );
        let guard = AccessGuard::new(config.expected_authorization().as_deref());
        let sink = DirectorySink::new(config.directory.clone(), config.file_mode, in_flight.clone());

        Self {
            config: Arc::new(config),
            localisations,
            renderer,
            guard,
            sink,
            hooks,
            in_flight,
        }
    }
}
