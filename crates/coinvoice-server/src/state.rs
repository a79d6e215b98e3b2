use std::sync::Arc;

use coinvoice::{
    InvoiceManager, InvoiceStore, ProcessorProvisioner, ProvisionError, WebhookReconciler,
};

use crate::config::ServerConfig;

pub type Manager = InvoiceManager<ProcessorProvisioner>;
pub type Reconciler = WebhookReconciler<ProcessorProvisioner>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub manager: Arc<Manager>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Wire the provisioner, manager and reconciler over `store`.
    pub fn new(config: ServerConfig, store: Arc<dyn InvoiceStore>) -> Result<Self, ProvisionError> {
        let provisioner = ProcessorProvisioner::new(config.processor.clone())?;
        let manager = Arc::new(InvoiceManager::new(provisioner).with_store(store));
        let reconciler = Arc::new(WebhookReconciler::new(
            manager.clone(),
            config.webhook.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            manager,
            reconciler,
        })
    }
}
