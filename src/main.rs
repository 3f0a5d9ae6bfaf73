use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use payment_orchestrator::config::AppConfig;
use payment_orchestrator::connectors::mock::MockConnector;
use payment_orchestrator::connectors::moyasar::MoyasarConnector;
use payment_orchestrator::connectors::ConnectorRegistry;
use payment_orchestrator::domain::transaction::PspProvider;
use payment_orchestrator::repo::merchants_repo::MerchantsRepo;
use payment_orchestrator::repo::routing_rules_repo::RoutingRulesRepo;
use payment_orchestrator::repo::store::MerchantStore;
use payment_orchestrator::repo::transactions_repo::TransactionsRepo;
use payment_orchestrator::router::rules::RoutingEngine;
use payment_orchestrator::service::merchant_notifier::MerchantNotifier;
use payment_orchestrator::service::orchestrator::PaymentOrchestrator;
use payment_orchestrator::service::reconciler::WebhookReconciler;
use payment_orchestrator::AppState;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let http_client = reqwest::Client::new();

    let mut registry = ConnectorRegistry::new();
    registry.register(Arc::new(MoyasarConnector::new(
        cfg.connectors.moyasar_base_url.clone(),
        cfg.connectors.moyasar_api_key.clone(),
        Duration::from_millis(cfg.connectors.provider_timeout_ms),
        http_client.clone(),
    )));
    registry.register(Arc::new(MockConnector::new(&cfg.connectors.mock_behavior)));
    let registry = Arc::new(registry);

    let default_provider = PspProvider::parse(&cfg.default_provider)
        .ok_or_else(|| anyhow::anyhow!("unknown DEFAULT_PSP_PROVIDER {}", cfg.default_provider))?;

    let transactions = Arc::new(TransactionsRepo { pool: pool.clone() });
    let merchants: Arc<dyn MerchantStore> = Arc::new(MerchantsRepo { pool: pool.clone() });
    let routing_rules = Arc::new(RoutingRulesRepo { pool: pool.clone() });

    let notifier = MerchantNotifier::new(http_client.clone());

    let router_engine = RoutingEngine {
        rules: routing_rules,
        registry: registry.clone(),
        default_provider,
        success_rates: HashMap::new(),
    };

    let orchestrator = PaymentOrchestrator {
        transactions: transactions.clone(),
        router: router_engine,
        registry: registry.clone(),
        notifier: notifier.clone(),
    };

    let mut webhook_secrets = HashMap::new();
    if let Some(secret) = cfg.connectors.moyasar_webhook_secret.clone() {
        webhook_secrets.insert(PspProvider::Moyasar, secret);
    }
    let reconciler = WebhookReconciler {
        transactions,
        merchants: merchants.clone(),
        registry,
        notifier,
        webhook_secrets,
    };

    let state = AppState {
        orchestrator,
        reconciler,
        merchants,
    };

    let payment_routes = Router::new()
        .route(
            "/payments",
            post(payment_orchestrator::http::handlers::payments::create_payment)
                .get(payment_orchestrator::http::handlers::payments::list_payments),
        )
        .route(
            "/payments/:id",
            get(payment_orchestrator::http::handlers::payments::get_payment),
        )
        .route(
            "/payments/:id/refund",
            post(payment_orchestrator::http::handlers::payments::refund_payment),
        )
        .layer(from_fn_with_state(
            state.clone(),
            payment_orchestrator::http::middleware::merchant_auth::require_merchant,
        ));

    let app = Router::new()
        .route("/health", get(payment_orchestrator::http::handlers::payments::health))
        .route(
            "/webhooks/:provider",
            post(payment_orchestrator::http::handlers::webhooks::provider_webhook),
        )
        .merge(payment_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
