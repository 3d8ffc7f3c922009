//! Startup and shutdown of the storefront.

use crate::application::reconciler::{Phase, ReconcileError, StorefrontReconciler};
use crate::config::ShopSettings;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

pub struct LifecycleController {
    reconciler: Arc<StorefrontReconciler>,
    settings: Arc<ShopSettings>,
    guard: Mutex<()>,
}

impl LifecycleController {
    pub fn new(reconciler: Arc<StorefrontReconciler>, settings: Arc<ShopSettings>) -> Self {
        Self {
            reconciler,
            settings,
            guard: Mutex::new(()),
        }
    }

    pub fn reconciler(&self) -> &Arc<StorefrontReconciler> {
        &self.reconciler
    }

    /// Initializes the reconciler and publishes the storefront message.
    /// A no-op once the storefront is up.
    pub async fn start(&self) -> Result<(), ReconcileError> {
        let _guard = self.guard.lock().await;
        if self.reconciler.phase().await == Phase::Ready
            && self.reconciler.current_message().await.is_some()
        {
            return Ok(());
        }

        let startup = async {
            self.reconciler.initialize().await?;
            self.reconciler.force_update().await
        };
        timeout(self.settings.reconciler.startup_timeout, startup)
            .await
            .map_err(|_| ReconcileError::TimedOut { operation: "startup" })??;

        info!(channel = %self.reconciler.channel(), "Storefront started");
        Ok(())
    }

    pub async fn stop(&self) {
        let _guard = self.guard.lock().await;
        self.reconciler.cleanup().await;
        info!(channel = %self.reconciler.channel(), "Storefront stopped");
    }
}
