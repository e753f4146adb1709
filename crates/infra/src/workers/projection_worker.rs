use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use kitforge_core::TenantId;
use kitforge_events::{EventBus, TenantScoped};

/// How long the worker loop blocks on the bus before checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to a running worker thread. Dropping it without calling
/// [`WorkerHandle::shutdown`] detaches the thread.
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for it to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawns dedicated threads that feed bus messages into a handler.
///
/// The subscription is taken *before* the thread starts, so no message
/// published after `spawn` returns can be missed. Handler errors are logged
/// and skipped; at-least-once delivery means the read model can always be
/// repaired by rebuild.
pub struct ProjectionWorker;

impl ProjectionWorker {
    pub fn spawn<M, B, H, E>(
        name: &str,
        bus: &B,
        tenant_id: Option<TenantId>,
        handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug,
    {
        let subscription = bus.subscribe();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let worker_name = name.to_string();

        let join = std::thread::Builder::new()
            .name(format!("worker-{name}"))
            .spawn(move || worker_loop(worker_name, subscription, shutdown_rx, tenant_id, handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: String,
    subscription: kitforge_events::Subscription<M>,
    shutdown: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    mut handler: H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    loop {
        if shutdown.try_recv().is_ok() {
            debug!(worker = %name, "worker shutting down");
            return;
        }

        let message = match subscription.recv_timeout(POLL_INTERVAL) {
            Ok(message) => message,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                debug!(worker = %name, "bus disconnected, worker exiting");
                return;
            }
        };

        if let Some(pinned) = tenant_id {
            if message.tenant_id() != pinned {
                continue;
            }
        }

        if let Err(err) = handler(message) {
            warn!(worker = %name, ?err, "handler failed, message skipped");
        }
    }
}
