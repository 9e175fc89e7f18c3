//! Reconciliation logic for the managed Endpoints object.
//!
//! One cycle: read the managed target, list external records, evaluate the
//! rule set, group and translate into the desired subsets, diff against the
//! stored state, and conditionally apply. A conflict on apply re-reads the
//! target and retries within the same cycle, up to a bound; exhaustion is
//! cycle-transient and the next scheduled cycle retries from scratch.

use crate::discovery::{DiscoveryFilters, DiscoveryProvider, ExternalRecord, PortSpec};
use crate::error::ControllerError;
use crate::rules::RuleSet;
use crate::target::{ApplyOutcome, EndpointsTarget, TargetError, TargetState};
use crate::translate::{subsets_equal, translate, DesiredSubset};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bound on conditional-write attempts within one cycle. Exceeding it under
/// sustained external contention fails the cycle, never the process.
const MAX_APPLY_ATTEMPTS: u32 = 3;

/// How one reconciliation cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Stored state already matched the desired state; no write issued
    NoOp,
    /// Existing target replaced with the desired subsets
    Applied,
    /// Target was absent and has been created
    Created,
}

/// Reconciles external discovery state into the managed target.
pub struct Reconciler {
    provider: Arc<dyn DiscoveryProvider>,
    target: Arc<dyn EndpointsTarget>,
    rules: RuleSet,
    default_port: Option<PortSpec>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        provider: Arc<dyn DiscoveryProvider>,
        target: Arc<dyn EndpointsTarget>,
        rules: RuleSet,
        default_port: Option<PortSpec>,
    ) -> Self {
        Self { provider, target, rules, default_port }
    }

    /// Runs one reconciliation cycle.
    ///
    /// Discovery failure aborts the cycle with the target untouched.
    /// A missing target is treated as empty for diffing and created on
    /// apply. All writes are conditional on the last-read concurrency
    /// token; a conflict triggers re-read and recompare, never a blind
    /// overwrite.
    pub async fn reconcile_once(&self) -> Result<CycleOutcome, ControllerError> {
        let target_ref = self.target.target_ref();
        debug!("Reconciling {}", target_ref);

        let mut state = self.read_target().await?;

        let filters = DiscoveryFilters { name: self.rules.name_hint() };
        let records = self.provider.list(&filters).await?;
        debug!("Discovered {} records", records.len());

        let selected: Vec<ExternalRecord> = records
            .into_iter()
            .filter(|record| {
                if record.addresses.is_empty() {
                    // Providers skip these themselves; guard against ones
                    // that do not
                    warn!("Skipping malformed record {} ({}): no addresses", record.name, record.id);
                    return false;
                }
                self.rules.selects(record)
            })
            .collect();
        debug!("{} records selected by filter rules", selected.len());

        let desired = translate(&selected, &self.rules, self.default_port);

        let mut attempts = 0;
        loop {
            attempts += 1;

            if let Some(current) = &state {
                if subsets_equal(&desired, &current.subsets) {
                    info!("{} in sync with external state, skipping write", target_ref);
                    return Ok(CycleOutcome::NoOp);
                }
            }

            let version = state.as_ref().and_then(|s| s.resource_version.clone());
            match self.target.apply(&desired, version).await {
                Ok(ApplyOutcome::Updated(_)) => {
                    info!(
                        "{} updated: {} subsets, {} addresses",
                        target_ref,
                        desired.len(),
                        address_count(&desired)
                    );
                    return Ok(CycleOutcome::Applied);
                }
                Ok(ApplyOutcome::Created(_)) => {
                    info!(
                        "{} created: {} subsets, {} addresses",
                        target_ref,
                        desired.len(),
                        address_count(&desired)
                    );
                    return Ok(CycleOutcome::Created);
                }
                Err(TargetError::Conflict) => {
                    if attempts >= MAX_APPLY_ATTEMPTS {
                        warn!(
                            "{} still conflicting after {} attempts, deferring to next cycle",
                            target_ref, attempts
                        );
                        return Err(ControllerError::ConflictExhausted { attempts });
                    }
                    warn!(
                        "{} changed concurrently (attempt {}), re-reading",
                        target_ref, attempts
                    );
                    state = self.read_target().await?;
                }
                Err(other) => return Err(other.into_controller_error()),
            }
        }
    }

    async fn read_target(&self) -> Result<Option<TargetState>, ControllerError> {
        self.target
            .read()
            .await
            .map_err(TargetError::into_controller_error)
    }
}

fn address_count(desired: &[DesiredSubset]) -> usize {
    desired.iter().map(|s| s.addresses.len()).sum()
}
