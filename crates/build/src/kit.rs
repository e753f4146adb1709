use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kitforge_catalog::{BomCatalog, BomLineId, PartId};
use kitforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Quantity, TenantId, UserId};
use kitforge_events::Event;
use kitforge_stock::StockItemId;

use crate::build::BuildId;
use crate::status::KitStatus;

/// Kit identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KitId(pub AggregateId);

impl KitId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Default human-readable reference for a kit.
    pub fn default_reference(&self) -> String {
        format!("KIT-{}", self.0.as_uuid().simple())
    }
}

impl core::fmt::Display for KitId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kit component identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KitItemId(pub AggregateId);

impl KitItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for KitItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One component requirement of a kit, derived from a bill-of-materials line.
///
/// Lifecycle: unallocated, then stock assigned, then installed (`completed`).
/// Completed components are never mutated again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitItem {
    id: KitItemId,
    bom_line: BomLineId,
    sub_part: PartId,
    quantity: Quantity,
    stock_item: Option<StockItemId>,
    install_into: Option<StockItemId>,
    completed: bool,
    notes: Option<String>,
}

impl KitItem {
    pub fn id(&self) -> KitItemId {
        self.id
    }

    pub fn bom_line(&self) -> BomLineId {
        self.bom_line
    }

    /// The part this component consumes.
    pub fn part(&self) -> PartId {
        self.sub_part
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn stock_item(&self) -> Option<StockItemId> {
        self.stock_item
    }

    pub fn install_into(&self) -> Option<StockItemId> {
        self.install_into
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_allocated(&self) -> bool {
        self.stock_item.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

/// Aggregate root: Kit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kit {
    id: KitId,
    tenant_id: Option<TenantId>,
    build: Option<BuildId>,
    part: Option<PartId>,
    reference: String,
    title: String,
    quantity: u32,
    batch: Option<String>,
    target_date: Option<DateTime<Utc>>,
    completion_date: Option<DateTime<Utc>>,
    completed_by: Option<UserId>,
    status: KitStatus,
    link: Option<String>,
    notes: Option<String>,
    items: Vec<KitItem>,
    version: u64,
    created: bool,
}

impl Kit {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: KitId) -> Self {
        Self {
            id,
            tenant_id: None,
            build: None,
            part: None,
            reference: String::new(),
            title: String::new(),
            quantity: 0,
            batch: None,
            target_date: None,
            completion_date: None,
            completed_by: None,
            status: KitStatus::Pending,
            link: None,
            notes: None,
            items: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> KitId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn build(&self) -> Option<BuildId> {
        self.build
    }

    pub fn part(&self) -> Option<PartId> {
        self.part
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of assemblies this kit produces.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn batch(&self) -> Option<&str> {
        self.batch.as_deref()
    }

    pub fn target_date(&self) -> Option<DateTime<Utc>> {
        self.target_date
    }

    pub fn completion_date(&self) -> Option<DateTime<Utc>> {
        self.completion_date
    }

    pub fn completed_by(&self) -> Option<UserId> {
        self.completed_by
    }

    pub fn status(&self) -> KitStatus {
        self.status
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn components(&self) -> &[KitItem] {
        &self.items
    }

    pub fn item(&self, id: KitItemId) -> Option<&KitItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn allocated_items(&self) -> impl Iterator<Item = &KitItem> {
        self.items.iter().filter(|i| i.is_allocated())
    }

    /// Components still waiting for stock.
    pub fn unallocated_items(&self) -> impl Iterator<Item = &KitItem> {
        self.items
            .iter()
            .filter(|i| !i.is_allocated() && !i.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.status == KitStatus::Complete
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == KitStatus::Cancelled
    }

    /// True once every component has been installed.
    pub fn fully_installed(&self) -> bool {
        self.items.iter().all(KitItem::is_complete)
    }
}

impl AggregateRoot for Kit {
    type Id = KitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateKit.
///
/// `build_part` is the part of the referenced build order, resolved by the
/// caller; the kit's own part defaults to it when `part` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKit {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub build: BuildId,
    pub build_part: PartId,
    pub part: Option<PartId>,
    pub quantity: u32,
    pub reference: Option<String>,
    pub title: String,
    pub batch: Option<String>,
    pub target_date: Option<DateTime<Utc>>,
    pub link: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddComponent.
///
/// `bom_part` is the parent part of the referenced BOM line, resolved by the
/// caller and checked against the kit's part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddComponent {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub item_id: KitItemId,
    pub bom_line: BomLineId,
    pub bom_part: PartId,
    pub sub_part: PartId,
    pub quantity: Quantity,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignStock {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub item: KitItemId,
    pub stock_item: StockItemId,
    pub install_into: Option<StockItemId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInstallation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInstallation {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub item: KitItemId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteKit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteKit {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelKit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelKit {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KitCommand {
    CreateKit(CreateKit),
    AddComponent(AddComponent),
    AssignStock(AssignStock),
    RecordInstallation(RecordInstallation),
    CompleteKit(CompleteKit),
    CancelKit(CancelKit),
}

/// Event: KitCreated. Carries the resolved part and reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitCreated {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub build: BuildId,
    pub part: PartId,
    pub quantity: u32,
    pub reference: String,
    pub title: String,
    pub batch: Option<String>,
    pub target_date: Option<DateTime<Utc>>,
    pub link: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ComponentAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAdded {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub item_id: KitItemId,
    pub bom_line: BomLineId,
    pub sub_part: PartId,
    pub quantity: Quantity,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAssigned {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub item: KitItemId,
    pub stock_item: StockItemId,
    pub install_into: Option<StockItemId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ComponentInstalled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInstalled {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub item: KitItemId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: KitCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitCompleted {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub completed_by: UserId,
    pub completion_date: DateTime<Utc>,
}

/// Event: KitCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitCancelled {
    pub tenant_id: TenantId,
    pub kit_id: KitId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KitEvent {
    KitCreated(KitCreated),
    ComponentAdded(ComponentAdded),
    StockAssigned(StockAssigned),
    ComponentInstalled(ComponentInstalled),
    KitCompleted(KitCompleted),
    KitCancelled(KitCancelled),
}

impl Event for KitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            KitEvent::KitCreated(_) => "build.kit.created",
            KitEvent::ComponentAdded(_) => "build.kit.component_added",
            KitEvent::StockAssigned(_) => "build.kit.stock_assigned",
            KitEvent::ComponentInstalled(_) => "build.kit.component_installed",
            KitEvent::KitCompleted(_) => "build.kit.completed",
            KitEvent::KitCancelled(_) => "build.kit.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            KitEvent::KitCreated(e) => e.occurred_at,
            KitEvent::ComponentAdded(e) => e.occurred_at,
            KitEvent::StockAssigned(e) => e.occurred_at,
            KitEvent::ComponentInstalled(e) => e.occurred_at,
            KitEvent::KitCompleted(e) => e.completion_date,
            KitEvent::KitCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Kit {
    type Command = KitCommand;
    type Event = KitEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            KitEvent::KitCreated(e) => {
                self.id = e.kit_id;
                self.tenant_id = Some(e.tenant_id);
                self.build = Some(e.build);
                self.part = Some(e.part);
                self.quantity = e.quantity;
                self.reference = e.reference.clone();
                self.title = e.title.clone();
                self.batch = e.batch.clone();
                self.target_date = e.target_date;
                self.link = e.link.clone();
                self.notes = e.notes.clone();
                self.status = KitStatus::Pending;
                self.created = true;
            }
            KitEvent::ComponentAdded(e) => {
                self.items.push(KitItem {
                    id: e.item_id,
                    bom_line: e.bom_line,
                    sub_part: e.sub_part,
                    quantity: e.quantity,
                    stock_item: None,
                    install_into: None,
                    completed: false,
                    notes: e.notes.clone(),
                });
            }
            KitEvent::StockAssigned(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item) {
                    item.stock_item = Some(e.stock_item);
                    item.install_into = e.install_into;
                }
            }
            KitEvent::ComponentInstalled(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item) {
                    item.completed = true;
                }
            }
            KitEvent::KitCompleted(e) => {
                self.status = KitStatus::Complete;
                self.completed_by = Some(e.completed_by);
                self.completion_date = Some(e.completion_date);
            }
            KitEvent::KitCancelled(_) => {
                self.status = KitStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            KitCommand::CreateKit(cmd) => self.handle_create(cmd),
            KitCommand::AddComponent(cmd) => self.handle_add_component(cmd),
            KitCommand::AssignStock(cmd) => self.handle_assign_stock(cmd),
            KitCommand::RecordInstallation(cmd) => self.handle_record_installation(cmd),
            KitCommand::CompleteKit(cmd) => self.handle_complete(cmd),
            KitCommand::CancelKit(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Kit {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_kit_id(&self, kit_id: KitId) -> Result<(), DomainError> {
        if self.id != kit_id {
            return Err(DomainError::invariant("kit_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_closed() {
            return Err(DomainError::conflict("kit is closed"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateKit) -> Result<Vec<KitEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("kit already exists"));
        }

        if cmd.quantity < 1 {
            return Err(DomainError::field("quantity", "quantity must be at least 1"));
        }

        // The kit builds the same part as its build order. An omitted part
        // inherits it; a differing explicit part is rejected.
        let part = match cmd.part {
            Some(part) if part != cmd.build_part => {
                return Err(DomainError::field(
                    "part",
                    "part must match the build order part",
                ));
            }
            Some(part) => part,
            None => cmd.build_part,
        };

        let reference = match cmd.reference.as_deref() {
            Some(r) if !r.trim().is_empty() => r.to_string(),
            _ => cmd.kit_id.default_reference(),
        };

        Ok(vec![KitEvent::KitCreated(KitCreated {
            tenant_id: cmd.tenant_id,
            kit_id: cmd.kit_id,
            build: cmd.build,
            part,
            quantity: cmd.quantity,
            reference,
            title: cmd.title.clone(),
            batch: cmd.batch.clone(),
            target_date: cmd.target_date,
            link: cmd.link.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_component(&self, cmd: &AddComponent) -> Result<Vec<KitEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_kit_id(cmd.kit_id)?;
        self.ensure_open()?;

        if Some(cmd.bom_part) != self.part {
            return Err(DomainError::field(
                "bom_item",
                "bill of materials line does not belong to the kit part",
            ));
        }

        if self.items.iter().any(|i| i.bom_line == cmd.bom_line) {
            return Err(DomainError::field(
                "bom_item",
                "kit already has a component for this bill of materials line",
            ));
        }

        if self.items.iter().any(|i| i.id == cmd.item_id) {
            return Err(DomainError::conflict("component id already used"));
        }

        Ok(vec![KitEvent::ComponentAdded(ComponentAdded {
            tenant_id: cmd.tenant_id,
            kit_id: cmd.kit_id,
            item_id: cmd.item_id,
            bom_line: cmd.bom_line,
            sub_part: cmd.sub_part,
            quantity: cmd.quantity,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_stock(&self, cmd: &AssignStock) -> Result<Vec<KitEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_kit_id(cmd.kit_id)?;
        self.ensure_open()?;

        let item = self.item(cmd.item).ok_or(DomainError::NotFound)?;
        if item.is_complete() {
            return Err(DomainError::conflict("component is already installed"));
        }
        if item.is_allocated() {
            return Err(DomainError::conflict("component already has stock assigned"));
        }

        Ok(vec![KitEvent::StockAssigned(StockAssigned {
            tenant_id: cmd.tenant_id,
            kit_id: cmd.kit_id,
            item: cmd.item,
            stock_item: cmd.stock_item,
            install_into: cmd.install_into,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_installation(
        &self,
        cmd: &RecordInstallation,
    ) -> Result<Vec<KitEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_kit_id(cmd.kit_id)?;
        self.ensure_open()?;

        let item = self.item(cmd.item).ok_or(DomainError::NotFound)?;
        if item.is_complete() {
            return Err(DomainError::conflict("component is already installed"));
        }
        if !item.is_allocated() {
            return Err(DomainError::invariant("component has no stock assigned"));
        }

        Ok(vec![KitEvent::ComponentInstalled(ComponentInstalled {
            tenant_id: cmd.tenant_id,
            kit_id: cmd.kit_id,
            item: cmd.item,
            user: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteKit) -> Result<Vec<KitEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_kit_id(cmd.kit_id)?;

        if self.status == KitStatus::Complete {
            return Err(DomainError::conflict("kit is already complete"));
        }
        if self.status == KitStatus::Cancelled {
            return Err(DomainError::conflict("cancelled kits cannot be completed"));
        }

        Ok(vec![KitEvent::KitCompleted(KitCompleted {
            tenant_id: cmd.tenant_id,
            kit_id: cmd.kit_id,
            completed_by: cmd.user,
            completion_date: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelKit) -> Result<Vec<KitEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_kit_id(cmd.kit_id)?;

        if self.status == KitStatus::Complete {
            return Err(DomainError::conflict("completed kits cannot be cancelled"));
        }
        if self.status == KitStatus::Cancelled {
            return Err(DomainError::conflict("kit is already cancelled"));
        }

        Ok(vec![KitEvent::KitCancelled(KitCancelled {
            tenant_id: cmd.tenant_id,
            kit_id: cmd.kit_id,
            cancelled_by: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Build `AddComponent` commands for every BOM line of the kit's part, one
/// component per line, with the nominal line quantity scaled by the number of
/// assemblies the kit produces.
pub fn components_from_bom(
    kit: &Kit,
    catalog: &dyn BomCatalog,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<KitCommand>, DomainError> {
    let tenant_id = kit
        .tenant_id()
        .ok_or_else(|| DomainError::invariant("kit not created"))?;
    let part = kit
        .part()
        .ok_or_else(|| DomainError::invariant("kit not created"))?;

    let mut commands = Vec::new();
    for line in catalog.lines_for(part)? {
        commands.push(KitCommand::AddComponent(AddComponent {
            tenant_id,
            kit_id: kit.id_typed(),
            item_id: KitItemId::new(AggregateId::new()),
            bom_line: line.id,
            bom_part: line.part,
            sub_part: line.sub_part,
            quantity: line.quantity.scale(kit.quantity()),
            notes: None,
            occurred_at,
        }));
    }
    Ok(commands)
}
