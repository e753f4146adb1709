use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kitforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use kitforge_events::Event;

/// Part identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(pub AggregateId);

impl PartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Part.
///
/// A part is either a raw component or an assembly (something built from a
/// bill of materials). Users can subscribe to a part to be notified when kits
/// producing it are completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    id: PartId,
    tenant_id: Option<TenantId>,
    name: String,
    description: String,
    assembly: bool,
    subscribers: BTreeSet<UserId>,
    version: u64,
    created: bool,
}

impl Part {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PartId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            description: String::new(),
            assembly: false,
            subscribers: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether this part is produced from a bill of materials.
    pub fn is_assembly(&self) -> bool {
        self.assembly
    }

    pub fn subscribers(&self) -> &BTreeSet<UserId> {
        &self.subscribers
    }

    pub fn is_subscribed(&self, user: UserId) -> bool {
        self.subscribers.contains(&user)
    }
}

impl AggregateRoot for Part {
    type Id = PartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePart {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub name: String,
    pub description: String,
    pub assembly: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubscribeToPart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeToPart {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UnsubscribeFromPart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeFromPart {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartCommand {
    CreatePart(CreatePart),
    SubscribeToPart(SubscribeToPart),
    UnsubscribeFromPart(UnsubscribeFromPart),
}

/// Event: PartCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartCreated {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub name: String,
    pub description: String,
    pub assembly: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartSubscribed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSubscribed {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartUnsubscribed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUnsubscribed {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartEvent {
    PartCreated(PartCreated),
    PartSubscribed(PartSubscribed),
    PartUnsubscribed(PartUnsubscribed),
}

impl Event for PartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartEvent::PartCreated(_) => "catalog.part.created",
            PartEvent::PartSubscribed(_) => "catalog.part.subscribed",
            PartEvent::PartUnsubscribed(_) => "catalog.part.unsubscribed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartEvent::PartCreated(e) => e.occurred_at,
            PartEvent::PartSubscribed(e) => e.occurred_at,
            PartEvent::PartUnsubscribed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Part {
    type Command = PartCommand;
    type Event = PartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartEvent::PartCreated(e) => {
                self.id = e.part_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.assembly = e.assembly;
                self.created = true;
            }
            PartEvent::PartSubscribed(e) => {
                self.subscribers.insert(e.user);
            }
            PartEvent::PartUnsubscribed(e) => {
                self.subscribers.remove(&e.user);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartCommand::CreatePart(cmd) => self.handle_create(cmd),
            PartCommand::SubscribeToPart(cmd) => self.handle_subscribe(cmd),
            PartCommand::UnsubscribeFromPart(cmd) => self.handle_unsubscribe(cmd),
        }
    }
}

impl Part {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_part_id(&self, part_id: PartId) -> Result<(), DomainError> {
        if self.id != part_id {
            return Err(DomainError::invariant("part_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePart) -> Result<Vec<PartEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("part already exists"));
        }

        if cmd.name.trim().is_empty() {
            return Err(DomainError::field("name", "name cannot be empty"));
        }

        Ok(vec![PartEvent::PartCreated(PartCreated {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            assembly: cmd.assembly,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_subscribe(&self, cmd: &SubscribeToPart) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;

        // Subscribing twice is a no-op, not an error.
        if self.subscribers.contains(&cmd.user) {
            return Ok(vec![]);
        }

        Ok(vec![PartEvent::PartSubscribed(PartSubscribed {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            user: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_unsubscribe(&self, cmd: &UnsubscribeFromPart) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;

        if !self.subscribers.contains(&cmd.user) {
            return Ok(vec![]);
        }

        Ok(vec![PartEvent::PartUnsubscribed(PartUnsubscribed {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            user: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }
}
