pub mod config;
pub mod connectors;
pub mod domain {
    pub mod merchant;
    pub mod routing_rule;
    pub mod transaction;
}
pub mod error;
pub mod http {
    pub mod handlers {
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod merchant_auth;
    }
}
pub mod repo {
    pub mod memory;
    pub mod merchants_repo;
    pub mod routing_rules_repo;
    pub mod store;
    pub mod transactions_repo;
}
pub mod router {
    pub mod rules;
}
pub mod service {
    pub mod merchant_notifier;
    pub mod orchestrator;
    pub mod reconciler;
}

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: service::orchestrator::PaymentOrchestrator,
    pub reconciler: service::reconciler::WebhookReconciler,
    pub merchants: Arc<dyn repo::store::MerchantStore>,
}
