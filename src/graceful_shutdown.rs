//! Coordinates shutdown across listeners: signal first, then wait up to the
//! configured grace period (default 30s, §5) for in-flight resolutions to
//! finish before the process exits. Adapted from the teacher's component
//! registry; the disk-cache-persistence step is dropped since this cache is
//! in-memory only (recorded in DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{error, info, warn};

type ShutdownResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type ShutdownFn = Box<dyn Fn() -> tokio::task::JoinHandle<ShutdownResult> + Send + Sync>;

struct ShutdownComponent {
    name: String,
    shutdown_fn: ShutdownFn,
}

pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<ShutdownComponent>>>,
    grace: Duration,
}

impl GracefulShutdown {
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        GracefulShutdown {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            grace,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub async fn register_component<F, Fut>(&self, name: String, shutdown_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ShutdownResult> + Send + 'static,
    {
        let component = ShutdownComponent {
            name,
            shutdown_fn: Box::new(move || {
                let fut = shutdown_fn();
                tokio::spawn(fut)
            }),
        };
        self.components.lock().await.push(component);
    }

    pub async fn shutdown(&self) -> ShutdownResult {
        info!("initiating graceful shutdown");

        if let Err(err) = self.shutdown_tx.send(()) {
            warn!(%err, "no listeners were subscribed to the shutdown signal");
        }

        info!(grace_s = self.grace.as_secs(), "waiting for in-flight queries to finish");
        tokio::time::sleep(self.grace).await;

        let components = self.components.lock().await;
        let mut handles = Vec::new();
        for component in components.iter() {
            info!(component = %component.name, "shutting down component");
            handles.push((component.name.clone(), (component.shutdown_fn)()));
        }
        drop(components);

        for (name, handle) in handles {
            match timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => info!(component = %name, "shut down cleanly"),
                Ok(Ok(Err(err))) => error!(component = %name, %err, "shutdown failed"),
                Ok(Err(err)) => error!(component = %name, %err, "shutdown task panicked"),
                Err(_) => warn!(component = %name, "shutdown timed out"),
            }
        }

        info!("graceful shutdown complete");
        Ok(())
    }
}
