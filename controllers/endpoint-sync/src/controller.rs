//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires configuration
//! into the running pieces: the discovery provider, the target accessor,
//! the watcher on the managed Endpoints object, and the scheduler that
//! drives reconciliation cycles.

use crate::config::Config;
use crate::discovery::{DiscoveryProvider, ProviderKind};
use crate::discovery::openstack::OpenStackProvider;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::rules::RuleSet;
use crate::scheduler::Scheduler;
use crate::target::{EndpointsTarget, KubeEndpointsTarget};
use crate::watcher::Watcher;
use k8s_openapi::api::core::v1::Endpoints;
use kube::{Api, Client};
use openstack_client::{ComputeClientTrait, OpenStackClient};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Main controller for managed Endpoints synchronization.
pub struct Controller {
    scheduler: Scheduler,
    watcher: Watcher,
}

impl Controller {
    /// Creates a new controller instance.
    ///
    /// Validates provider credentials up front so bad configuration fails
    /// the process at startup rather than on the first cycle.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing endpoint-sync controller");

        let provider = Self::build_provider(&config).await?;

        let kube_client = Client::try_default().await?;
        let api: Api<Endpoints> =
            Api::namespaced(kube_client, &config.namespace);
        let target: Arc<dyn EndpointsTarget> = Arc::new(KubeEndpointsTarget::new(
            api.clone(),
            config.namespace.clone(),
            config.endpoint_name.clone(),
        ));

        let rules = RuleSet::compile(&config.filters)?;
        let reconciler = Arc::new(Reconciler::new(
            provider,
            target,
            rules,
            config.default_port,
        ));

        let shutdown_rx = Self::spawn_signal_listener();
        let (scheduler, trigger) =
            Scheduler::new(reconciler, config.sync_period, shutdown_rx);
        let watcher = Watcher::new(api, config.endpoint_name.clone(), trigger);

        Ok(Self { scheduler, watcher })
    }

    async fn build_provider(
        config: &Config,
    ) -> Result<Arc<dyn DiscoveryProvider>, ControllerError> {
        match config.provider {
            ProviderKind::OpenStack => {
                let auth = config.openstack.clone().ok_or_else(|| {
                    ControllerError::InvalidConfig(
                        "OpenStack credentials are required for ENDPOINT_TYPE=openstack"
                            .to_string(),
                    )
                })?;
                let auth_url = auth.auth_url.clone();
                let client = OpenStackClient::new(auth)?;

                info!("Validating OpenStack credentials against {}", auth_url);
                client.validate_auth().await.map_err(|e| {
                    error!("OpenStack authentication failed: {}", e);
                    error!("Check OS_AUTH_URL, OS_USERNAME, OS_PASSWORD and OS_PROJECT");
                    ControllerError::OpenStack(e)
                })?;
                info!("OpenStack credentials validated");

                Ok(Arc::new(OpenStackProvider::new(Arc::new(client))))
            }
        }
    }

    /// Builds a shutdown channel flipped to `true` on SIGINT or SIGTERM.
    fn spawn_signal_listener() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            let terminate = async {
                #[cfg(unix)]
                {
                    match tokio::signal::unix::signal(
                        tokio::signal::unix::SignalKind::terminate(),
                    ) {
                        Ok(mut sig) => {
                            sig.recv().await;
                        }
                        Err(e) => {
                            warn!("Failed to install SIGTERM handler: {}", e);
                            std::future::pending::<()>().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                std::future::pending::<()>().await;
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                _ = terminate => info!("Received SIGTERM"),
            }
            let _ = tx.send(true);
        });
        rx
    }

    /// Runs the controller until shutdown or a fatal error.
    ///
    /// The watcher runs as a background task; it only accelerates
    /// convergence, so its failures are logged and the periodic loop
    /// carries on without it.
    pub async fn run(self) -> Result<(), ControllerError> {
        let watcher = self.watcher;
        tokio::spawn(async move {
            if let Err(e) = watcher.watch_managed_target().await {
                warn!("Endpoints watcher stopped: {}", e);
                warn!("Continuing with periodic sync only");
            }
        });

        self.scheduler.run().await
    }
}
