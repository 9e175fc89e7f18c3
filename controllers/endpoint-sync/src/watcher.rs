//! Managed target watcher
//!
//! Watches the managed Endpoints object for external changes and requests
//! an immediate reconciliation cycle, so externally-caused drift is
//! corrected faster than the next periodic poll. The watch is a fast path
//! only; the periodic loop alone is sufficient for correctness.

use crate::error::ControllerError;
use crate::scheduler::TriggerHandle;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Endpoints;
use kube::Api;
use kube_runtime::watcher;
use tracing::{debug, info};

/// Watches the managed Endpoints object for changes.
pub struct Watcher {
    api: Api<Endpoints>,
    name: String,
    trigger: TriggerHandle,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(api: Api<Endpoints>, name: String, trigger: TriggerHandle) -> Self {
        Self { api, name, trigger }
    }

    /// Starts watching the managed object.
    ///
    /// Each applied or deleted event requests a cycle through the trigger
    /// handle, where it coalesces with any cycle already pending.
    pub async fn watch_managed_target(&self) -> Result<(), ControllerError> {
        info!("Starting watcher for endpoints {}", self.name);

        let config =
            watcher::Config::default().fields(&format!("metadata.name={}", self.name));
        let mut stream = Box::pin(watcher(self.api.clone(), config));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Watcher stream error: {}", e)))?
        {
            match event {
                watcher::Event::Apply(_) => {
                    debug!("Endpoints {} changed externally", self.name);
                    self.trigger.notify();
                }
                watcher::Event::Delete(_) => {
                    info!("Endpoints {} deleted externally", self.name);
                    self.trigger.notify();
                }
                watcher::Event::Init => {
                    debug!("Endpoints watcher initialized");
                }
                watcher::Event::InitApply(_) => {
                    // Initial listing; the startup cycle covers this state
                    debug!("Endpoints watcher init apply");
                }
                watcher::Event::InitDone => {
                    debug!("Endpoints watcher initialization complete");
                }
            }
        }

        Ok(())
    }
}
