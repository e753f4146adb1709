//! Kit completion notification fan-out.
//!
//! Subscribes to published kit envelopes and delivers one notification per
//! interested user when a kit completes. Interested users are the owning
//! build's issuer and responsible owner plus the produced part's subscribers,
//! minus whoever completed the kit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

use kitforge_build::{BuildDirectory, BuildId, KitEvent, completion_notification_targets};
use kitforge_catalog::{PartDirectory, PartId};
use kitforge_core::{AggregateId, DomainError, TenantId, UserId};
use kitforge_events::EventEnvelope;

const KIT_AGGREGATE_TYPE: &str = "build.kit";
const KIT_COMPLETED_SLUG: &str = "kit.completed";

/// One message for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub target: UserId,
    pub slug: String,
    pub title: String,
    pub message: String,
    pub link: String,
    pub kit: AggregateId,
    pub build: BuildId,
}

/// Delivery transport for notifications (mail, web push, ...).
pub trait NotificationChannel: Send + Sync {
    fn deliver(&self, notification: Notification) -> Result<(), String>;
}

impl<C> NotificationChannel for Arc<C>
where
    C: NotificationChannel + ?Sized,
{
    fn deliver(&self, notification: Notification) -> Result<(), String> {
        (**self).deliver(notification)
    }
}

/// Records deliveries instead of sending them. Test double.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    deliveries: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Notification> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl NotificationChannel for InMemoryNotifier {
    fn deliver(&self, notification: Notification) -> Result<(), String> {
        self.deliveries
            .lock()
            .map_err(|_| "notifier lock poisoned".to_string())?
            .push(notification);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("payload deserialization failed: {0}")]
    Deserialize(String),

    #[error("kit {0} completed before its creation event was seen")]
    MissingKit(AggregateId),

    #[error("directory lookup failed: {0}")]
    Directory(#[from] DomainError),

    #[error("notification delivery failed: {0}")]
    Deliver(String),
}

#[derive(Debug, Clone)]
struct KitFacts {
    build: BuildId,
    part: PartId,
    reference: String,
}

/// Envelope consumer that turns `build.kit.completed` events into
/// notifications.
///
/// Kit facts (owning build, produced part, reference) are collected from the
/// creation events flowing over the same subscription, so the fanout needs no
/// access to the event store.
pub struct KitCompletedFanout<P, B, C> {
    parts: P,
    builds: B,
    channel: C,
    kits: RwLock<HashMap<(TenantId, AggregateId), KitFacts>>,
}

impl<P, B, C> KitCompletedFanout<P, B, C>
where
    P: PartDirectory,
    B: BuildDirectory,
    C: NotificationChannel,
{
    pub fn new(parts: P, builds: B, channel: C) -> Self {
        Self {
            parts,
            builds,
            channel,
            kits: RwLock::new(HashMap::new()),
        }
    }

    /// Handle one published envelope. Non-kit envelopes are ignored.
    pub fn handle_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), FanoutError> {
        if envelope.aggregate_type() != KIT_AGGREGATE_TYPE {
            return Ok(());
        }

        let event: KitEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| FanoutError::Deserialize(e.to_string()))?;

        match event {
            KitEvent::KitCreated(created) => {
                let mut kits = self
                    .kits
                    .write()
                    .map_err(|_| FanoutError::Deliver("fanout lock poisoned".to_string()))?;
                kits.insert(
                    (created.tenant_id, created.kit_id.0),
                    KitFacts {
                        build: created.build,
                        part: created.part,
                        reference: created.reference,
                    },
                );
                Ok(())
            }
            KitEvent::KitCompleted(completed) => {
                self.fan_out(completed.tenant_id, completed.kit_id.0, completed.completed_by)
            }
            _ => Ok(()),
        }
    }

    fn fan_out(
        &self,
        tenant_id: TenantId,
        kit_id: AggregateId,
        completed_by: UserId,
    ) -> Result<(), FanoutError> {
        let facts = {
            let kits = self
                .kits
                .read()
                .map_err(|_| FanoutError::Deliver("fanout lock poisoned".to_string()))?;
            kits.get(&(tenant_id, kit_id))
                .cloned()
                .ok_or(FanoutError::MissingKit(kit_id))?
        };

        let build = self
            .builds
            .get(facts.build)?
            .ok_or(FanoutError::MissingKit(kit_id))?;
        let part = self
            .parts
            .get(facts.part)?
            .ok_or(FanoutError::MissingKit(kit_id))?;

        let targets = completion_notification_targets(&build, &part, completed_by);
        if targets.is_empty() {
            debug!(%kit_id, "kit completed with no notification targets");
            return Ok(());
        }

        let title = format!("Kit {} completed", facts.reference);
        let message = format!(
            "Kit {} for part '{}' has been fully assembled",
            facts.reference, part.name
        );
        let link = format!("/kit/{kit_id}");

        for target in &targets {
            self.channel
                .deliver(Notification {
                    tenant_id,
                    target: *target,
                    slug: KIT_COMPLETED_SLUG.to_string(),
                    title: title.clone(),
                    message: message.clone(),
                    link: link.clone(),
                    kit: kit_id,
                    build: facts.build,
                })
                .map_err(FanoutError::Deliver)?;
        }

        info!(%kit_id, targets = targets.len(), "kit completion notifications delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use kitforge_build::{Build, InMemoryBuildDirectory, KitCompleted, KitCreated, KitId};
    use kitforge_catalog::{InMemoryPartDirectory, PartRecord};

    struct Fixture {
        tenant_id: TenantId,
        kit_id: KitId,
        build_id: BuildId,
        part_id: PartId,
        issuer: UserId,
        notifier: Arc<InMemoryNotifier>,
        fanout: KitCompletedFanout<
            Arc<InMemoryPartDirectory>,
            Arc<InMemoryBuildDirectory>,
            Arc<InMemoryNotifier>,
        >,
    }

    fn fixture(responsible: Option<UserId>, subscribers: Vec<UserId>) -> Fixture {
        let tenant_id = TenantId::new();
        let kit_id = KitId(AggregateId::new());
        let build_id = BuildId(AggregateId::new());
        let part_id = PartId(AggregateId::new());
        let issuer = UserId::new();

        let parts = Arc::new(InMemoryPartDirectory::new());
        parts
            .upsert(PartRecord {
                part_id,
                name: "Main board".to_string(),
                assembly: true,
                subscribers: subscribers.into_iter().collect(),
            })
            .unwrap();

        let builds = Arc::new(InMemoryBuildDirectory::new());
        builds
            .upsert(Build {
                id: build_id,
                reference: "BO-0001".to_string(),
                part: part_id,
                issued_by: issuer,
                responsible,
            })
            .unwrap();

        let notifier = Arc::new(InMemoryNotifier::new());
        let fanout = KitCompletedFanout::new(parts, builds, Arc::clone(&notifier));

        Fixture {
            tenant_id,
            kit_id,
            build_id,
            part_id,
            issuer,
            notifier,
            fanout,
        }
    }

    fn created_envelope(f: &Fixture, seq: u64) -> EventEnvelope<JsonValue> {
        let event = KitEvent::KitCreated(KitCreated {
            tenant_id: f.tenant_id,
            kit_id: f.kit_id,
            build: f.build_id,
            part: f.part_id,
            quantity: 1,
            reference: "KIT-0001".to_string(),
            title: "Main board".to_string(),
            batch: None,
            target_date: None,
            link: None,
            notes: None,
            occurred_at: Utc::now(),
        });
        EventEnvelope::new(
            Uuid::now_v7(),
            f.tenant_id,
            f.kit_id.0,
            KIT_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn completed_envelope(f: &Fixture, seq: u64, completed_by: UserId) -> EventEnvelope<JsonValue> {
        let event = KitEvent::KitCompleted(KitCompleted {
            tenant_id: f.tenant_id,
            kit_id: f.kit_id,
            completed_by,
            completion_date: Utc::now(),
        });
        EventEnvelope::new(
            Uuid::now_v7(),
            f.tenant_id,
            f.kit_id.0,
            KIT_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn completion_notifies_issuer_responsible_and_subscribers() {
        let responsible = UserId::new();
        let subscriber = UserId::new();
        let f = fixture(Some(responsible), vec![subscriber]);
        let completer = UserId::new();

        f.fanout.handle_envelope(&created_envelope(&f, 1)).unwrap();
        f.fanout
            .handle_envelope(&completed_envelope(&f, 2, completer))
            .unwrap();

        let deliveries = f.notifier.deliveries();
        let mut targets: Vec<UserId> = deliveries.iter().map(|n| n.target).collect();
        targets.sort();
        let mut expected = vec![f.issuer, responsible, subscriber];
        expected.sort();
        assert_eq!(targets, expected);

        let first = &deliveries[0];
        assert_eq!(first.slug, "kit.completed");
        assert_eq!(first.link, format!("/kit/{}", f.kit_id.0));
        assert!(first.title.contains("KIT-0001"));
    }

    #[test]
    fn completing_user_is_not_notified() {
        let subscriber = UserId::new();
        let f = fixture(None, vec![subscriber]);

        f.fanout.handle_envelope(&created_envelope(&f, 1)).unwrap();
        // The issuer completes their own kit.
        f.fanout
            .handle_envelope(&completed_envelope(&f, 2, f.issuer))
            .unwrap();

        let targets: Vec<UserId> = f.notifier.deliveries().iter().map(|n| n.target).collect();
        assert_eq!(targets, vec![subscriber]);
    }

    #[test]
    fn completion_without_creation_is_an_error() {
        let f = fixture(None, vec![]);
        let err = f
            .fanout
            .handle_envelope(&completed_envelope(&f, 2, UserId::new()))
            .unwrap_err();
        assert!(matches!(err, FanoutError::MissingKit(_)));
    }

    #[test]
    fn non_kit_envelopes_are_ignored() {
        let f = fixture(None, vec![]);
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            f.tenant_id,
            AggregateId::new(),
            "catalog.part",
            1,
            serde_json::json!({"unknown": true}),
        );
        f.fanout.handle_envelope(&env).unwrap();
        assert!(f.notifier.deliveries().is_empty());
    }
}
