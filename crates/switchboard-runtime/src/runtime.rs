//! Runtime orchestration.
//!
//! [`SwitchboardRuntime`] loads and validates configuration, initializes
//! logging, and owns the handler registry and dispatcher. Interactions are
//! submitted through an [`Ingress`] handle; the run loop dispatches each one
//! on its own task until a shutdown signal arrives, then drains what is
//! queued and in flight.
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! let runtime = SwitchboardRuntime::builder()
//!     .config_file("config/switchboard.toml")
//!     .build()?;
//! runtime.registry().register_command(mine_command())?;
//!
//! let ingress = runtime.ingress();
//! tokio::spawn(async move { gateway_loop(ingress).await });
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, SwitchboardConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use switchboard_core::{BoxedInteraction, BoxedStore};
use switchboard_framework::{Dispatcher, HandlerRegistry};

/// Handle for submitting interactions to a running runtime.
///
/// Cheap to clone. Sends wait when the queue is full.
#[derive(Debug, Clone)]
pub struct Ingress {
    tx: mpsc::Sender<BoxedInteraction>,
}

impl Ingress {
    /// Queues `interaction` for dispatch.
    pub async fn send(&self, interaction: BoxedInteraction) -> RuntimeResult<()> {
        self.tx
            .send(interaction)
            .await
            .map_err(|_| RuntimeError::IngressClosed)
    }

    /// Returns `true` once the runtime stopped accepting interactions.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Builder for [`SwitchboardRuntime`].
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    store: Option<BoxedStore>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            store: None,
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Adds a directory to search for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    /// Ignores `SWITCHBOARD_*` environment variables.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges a programmatic configuration over every other source.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Makes `store` available to handlers.
    pub fn store(mut self, store: BoxedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Loads configuration and assembles the runtime.
    pub fn build(self) -> RuntimeResult<SwitchboardRuntime> {
        let config = self.loader.load()?;
        SwitchboardRuntime::assemble(config, self.store)
    }
}

/// Owns the registry, the dispatcher and the ingress queue.
pub struct SwitchboardRuntime {
    config: SwitchboardConfig,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    ingress: Ingress,
    receiver: Mutex<Option<mpsc::Receiver<BoxedInteraction>>>,
    shutdown: CancellationToken,
}

impl SwitchboardRuntime {
    /// Starts building a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Assembles a runtime from an already loaded configuration, without a
    /// store.
    pub fn from_config(config: SwitchboardConfig) -> RuntimeResult<Self> {
        Self::assemble(config, None)
    }

    fn assemble(config: SwitchboardConfig, store: Option<BoxedStore>) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let registry = Arc::new(HandlerRegistry::new(config.registry.strict));
        let mut builder = Dispatcher::builder(Arc::clone(&registry)).options(config.to_options());
        if let Some(store) = store {
            builder = builder.store(store);
        }
        let dispatcher = Arc::new(builder.build());
        let (tx, rx) = mpsc::channel(config.dispatch.ingress_capacity);

        info!(
            log_level = %config.logging.level,
            strict = config.registry.strict,
            user_cooldown_secs = config.dispatch.user_cooldown_secs,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            registry,
            dispatcher,
            ingress: Ingress { tx },
            receiver: Mutex::new(Some(rx)),
            shutdown: CancellationToken::new(),
        })
    }

    /// The configuration the runtime was built from.
    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// The handler registry. Handlers may be registered before or while
    /// running.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// A handle for submitting interactions.
    pub fn ingress(&self) -> Ingress {
        self.ingress.clone()
    }

    /// Asks a running loop to stop. Queued and in-flight interactions are
    /// still completed.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Switchboard runtime is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_signal()).await
    }

    /// Runs until `signal` resolves or [`shutdown`](Self::shutdown) is
    /// called. A runtime runs at most once.
    pub async fn run_until<F>(&self, signal: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(RuntimeError::AlreadyRunning)?;
        self.dispatcher.init();

        let mut tasks = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                next = receiver.recv() => match next {
                    Some(interaction) => self.spawn_dispatch(&mut tasks, interaction),
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                }
            }
        }

        receiver.close();
        let mut queued = 0usize;
        while let Some(interaction) = receiver.recv().await {
            self.spawn_dispatch(&mut tasks, interaction);
            queued += 1;
        }
        debug!(queued, in_flight = tasks.len(), "Draining dispatches");
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        self.shutdown.cancel();
        self.dispatcher.shutdown().await;
        info!("Runtime stopped");
        Ok(())
    }

    fn spawn_dispatch(
        &self,
        tasks: &mut JoinSet<switchboard_framework::DispatchOutcome>,
        interaction: BoxedInteraction,
    ) {
        let dispatcher = Arc::clone(&self.dispatcher);
        tasks.spawn(async move { dispatcher.dispatch(interaction).await });
    }
}

fn log_join(joined: Result<switchboard_framework::DispatchOutcome, tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Dispatch task ended abnormally");
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C, waiting for explicit shutdown");
        std::future::pending::<()>().await;
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = wait_for_ctrl_c() => info!("Received Ctrl+C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
        info!("Received Ctrl+C");
    }
}
