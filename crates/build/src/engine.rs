use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use kitforge_catalog::PartRecord;
use kitforge_core::{DomainError, DomainResult, TenantId, UserId};
use kitforge_events::execute;
use kitforge_stock::{
    StockHistoryCode, StockItemId, StockLedger, StockTrackingEntry, TrackingDeltas,
};

use crate::build::Build;
use crate::kit::{
    AssignStock, CompleteKit, Kit, KitCommand, KitEvent, KitItemId, RecordInstallation,
};

/// Operational result of an allocation step. These are expected runtime
/// conditions, not errors: callers inspect the outcome, nothing is retried
/// internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// Stock was claimed and assigned to the component.
    Allocated { stock_item: StockItemId },
    /// The component already had stock assigned; nothing changed.
    AlreadyAllocated,
    /// No available lot can cover the required quantity.
    NoStock,
    /// Installation was requested for a component without stock assigned.
    NotAllocated,
    /// The component was installed.
    Installed,
    /// The component had already been installed; nothing changed.
    AlreadyInstalled,
}

/// Per-component outcomes of a bulk sweep.
#[derive(Debug, Default)]
pub struct AllocationReport {
    pub outcomes: Vec<(KitItemId, AllocationOutcome)>,
}

impl AllocationReport {
    pub fn allocated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AllocationOutcome::Allocated { .. }))
            .count()
    }

    pub fn without_stock(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AllocationOutcome::NoStock))
            .count()
    }

    pub fn installed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AllocationOutcome::Installed))
            .count()
    }
}

/// Orchestrates kit allocation against the stock ledger.
///
/// The engine mutates the kit aggregate in place and hands the resulting
/// events back to the caller for persistence and publication. Tracking
/// entries are written only after the corresponding state change has been
/// applied; a failed command releases any claim it took, including when the
/// tracking write itself fails. Callers that receive an error discard the
/// mutated aggregate and rehydrate from the stream.
pub struct KitEngine {
    ledger: Arc<dyn StockLedger>,
}

impl KitEngine {
    pub fn new(ledger: Arc<dyn StockLedger>) -> Self {
        Self { ledger }
    }

    fn tenant_of(kit: &Kit) -> DomainResult<TenantId> {
        kit.tenant_id()
            .ok_or_else(|| DomainError::invariant("kit not created"))
    }

    /// Allocate stock to one component.
    ///
    /// With an `explicit_pick` the lot is claimed directly; otherwise
    /// candidates come from [`StockLedger::available`] in oldest-first order
    /// and the first successful claim wins. Losing a claim race falls through
    /// to the next candidate.
    pub fn allocate_item(
        &self,
        kit: &mut Kit,
        item_id: KitItemId,
        user: UserId,
        explicit_pick: Option<StockItemId>,
    ) -> DomainResult<(AllocationOutcome, Vec<KitEvent>)> {
        let tenant_id = Self::tenant_of(kit)?;
        let item = kit.item(item_id).ok_or(DomainError::NotFound)?;

        if item.is_complete() {
            return Ok((AllocationOutcome::AlreadyInstalled, vec![]));
        }
        if item.is_allocated() {
            return Ok((AllocationOutcome::AlreadyAllocated, vec![]));
        }

        let required = item.quantity();
        let part = item.part();
        let candidates: Vec<StockItemId> = match explicit_pick {
            Some(pick) => vec![pick],
            None => self
                .ledger
                .available(part, required)?
                .into_iter()
                .map(|i| i.id)
                .collect(),
        };

        for candidate in candidates {
            if !self.ledger.claim(candidate, item_id.0)? {
                debug!(kit = %kit.id_typed(), stock_item = %candidate, "lost claim race, trying next lot");
                continue;
            }

            let cmd = KitCommand::AssignStock(AssignStock {
                tenant_id,
                kit_id: kit.id_typed(),
                item: item_id,
                stock_item: candidate,
                install_into: None,
                occurred_at: Utc::now(),
            });
            let events = match execute(kit, &cmd) {
                Ok(events) => events,
                Err(err) => {
                    // The claim must not outlive a failed assignment.
                    self.ledger.release(candidate)?;
                    return Err(err);
                }
            };

            if let Err(err) = self.ledger.add_tracking_entry(StockTrackingEntry::new(
                candidate,
                StockHistoryCode::KitAllocation,
                user,
                required,
                TrackingDeltas {
                    kit: Some(kit.id_typed().0),
                    kit_item: Some(item_id.0),
                },
                Utc::now(),
            )) {
                // The assignment never gets persisted, so the claim has to be
                // handed back too; otherwise the lot stays pinned to a kit item
                // that no longer exists after rehydration.
                if let Err(release_err) = self.ledger.release(candidate) {
                    warn!(kit = %kit.id_typed(), stock_item = %candidate, %release_err, "failed to release claim after tracking error");
                }
                return Err(err);
            }

            debug!(kit = %kit.id_typed(), item = %item_id, stock_item = %candidate, "allocated stock to component");
            return Ok((AllocationOutcome::Allocated { stock_item: candidate }, events));
        }

        debug!(kit = %kit.id_typed(), item = %item_id, %part, "no stock available for component");
        Ok((AllocationOutcome::NoStock, vec![]))
    }

    /// Bulk sweep: auto-allocate every component that is neither installed
    /// nor already allocated. Already-allocated components are untouched, so
    /// running the sweep twice is harmless. Partial progress stands; there is
    /// no cross-component transaction.
    pub fn allocate_stock(
        &self,
        kit: &mut Kit,
        user: UserId,
    ) -> DomainResult<(AllocationReport, Vec<KitEvent>)> {
        let pending: Vec<KitItemId> = kit.unallocated_items().map(|i| i.id()).collect();

        let mut report = AllocationReport::default();
        let mut events = Vec::new();
        for item_id in pending {
            let (outcome, mut emitted) = self.allocate_item(kit, item_id, user, None)?;
            report.outcomes.push((item_id, outcome));
            events.append(&mut emitted);
        }

        if report.without_stock() > 0 {
            warn!(
                kit = %kit.id_typed(),
                short = report.without_stock(),
                "allocation sweep left components without stock"
            );
        }
        Ok((report, events))
    }

    /// Install one component's allocated stock.
    ///
    /// Returns `NotAllocated` when no stock has been assigned (nothing is
    /// mutated). On success the component is marked installed, a tracking
    /// entry is written, and if the component has an installation target the
    /// stock item is attached to it.
    pub fn complete_item_allocation(
        &self,
        kit: &mut Kit,
        item_id: KitItemId,
        user: UserId,
    ) -> DomainResult<(AllocationOutcome, Vec<KitEvent>)> {
        let tenant_id = Self::tenant_of(kit)?;
        let item = kit.item(item_id).ok_or(DomainError::NotFound)?;

        if item.is_complete() {
            return Ok((AllocationOutcome::AlreadyInstalled, vec![]));
        }
        let Some(stock_item) = item.stock_item() else {
            return Ok((AllocationOutcome::NotAllocated, vec![]));
        };
        let install_into = item.install_into();
        let quantity = item.quantity();

        let events = execute(
            kit,
            &KitCommand::RecordInstallation(RecordInstallation {
                tenant_id,
                kit_id: kit.id_typed(),
                item: item_id,
                user,
                occurred_at: Utc::now(),
            }),
        )?;

        self.ledger.add_tracking_entry(StockTrackingEntry::new(
            stock_item,
            StockHistoryCode::KitComponentInstalled,
            user,
            quantity,
            TrackingDeltas {
                kit: Some(kit.id_typed().0),
                kit_item: Some(item_id.0),
            },
            Utc::now(),
        ))?;

        if let Some(destination) = install_into {
            self.ledger.set_belongs_to(stock_item, Some(destination))?;
        }

        debug!(kit = %kit.id_typed(), item = %item_id, %stock_item, "component installed");
        Ok((AllocationOutcome::Installed, events))
    }

    /// Bulk sweep: install every component with stock assigned and not yet
    /// installed.
    pub fn complete_allocation(
        &self,
        kit: &mut Kit,
        user: UserId,
    ) -> DomainResult<(AllocationReport, Vec<KitEvent>)> {
        let pending: Vec<KitItemId> = kit
            .allocated_items()
            .filter(|i| !i.is_complete())
            .map(|i| i.id())
            .collect();

        let mut report = AllocationReport::default();
        let mut events = Vec::new();
        for item_id in pending {
            let (outcome, mut emitted) = self.complete_item_allocation(kit, item_id, user)?;
            report.outcomes.push((item_id, outcome));
            events.append(&mut emitted);
        }
        Ok((report, events))
    }

    /// Mark the kit complete. The caller appends the returned events before
    /// dispatching any completion notification.
    pub fn complete_kit(&self, kit: &mut Kit, user: UserId) -> DomainResult<Vec<KitEvent>> {
        let tenant_id = Self::tenant_of(kit)?;
        execute(
            kit,
            &KitCommand::CompleteKit(CompleteKit {
                tenant_id,
                kit_id: kit.id_typed(),
                user,
                occurred_at: Utc::now(),
            }),
        )
    }
}

/// Users to notify when a kit completes: the build's issuer and responsible
/// owner plus everyone subscribed to the part, minus the acting user.
pub fn completion_notification_targets(
    build: &Build,
    part: &PartRecord,
    actor: UserId,
) -> BTreeSet<UserId> {
    let mut targets = BTreeSet::new();
    targets.insert(build.issued_by);
    if let Some(responsible) = build.responsible {
        targets.insert(responsible);
    }
    targets.extend(part.subscribers.iter().copied());
    targets.remove(&actor);
    targets
}
