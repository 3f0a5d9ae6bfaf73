use crate::domain::merchant::Merchant;
use crate::domain::routing_rule::RoutingRule;
use crate::domain::transaction::{PaymentStatus, PspProvider, Transaction};
use uuid::Uuid;

/// Storage capability per entity. The services depend only on these traits;
/// the Postgres repos implement them for production and `repo::memory` backs
/// tests and local runs without a database.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, txn: &Transaction) -> anyhow::Result<()>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Transaction>>;

    async fn find_for_merchant(
        &self,
        id: Uuid,
        merchant_id: Uuid,
    ) -> anyhow::Result<Option<Transaction>>;

    async fn find_by_psp_id(
        &self,
        provider: PspProvider,
        psp_transaction_id: &str,
    ) -> anyhow::Result<Option<Transaction>>;

    async fn find_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        key: &str,
    ) -> anyhow::Result<Option<Transaction>>;

    /// Compare-and-swap update: `txn.version` is the version the caller read;
    /// the row is only written if it still carries that version, and the
    /// stored version is bumped. Returns false when another writer won.
    async fn update_with_version(&self, txn: &Transaction) -> anyhow::Result<bool>;

    async fn list_by_merchant(
        &self,
        merchant_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Transaction>>;
}

#[async_trait::async_trait]
pub trait MerchantStore: Send + Sync {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Merchant>>;

    async fn find_by_api_key(&self, api_key: &str) -> anyhow::Result<Option<Merchant>>;
}

#[async_trait::async_trait]
pub trait RoutingRuleStore: Send + Sync {
    /// Enabled rules visible to this merchant: global rules plus rules scoped
    /// to exactly this merchant.
    async fn list_enabled_for(&self, merchant_id: Uuid) -> anyhow::Result<Vec<RoutingRule>>;
}
