use crate::domain::merchant::Merchant;
use crate::domain::routing_rule::RoutingRule;
use crate::domain::transaction::{PaymentStatus, PspProvider, Transaction};
use crate::repo::store::{MerchantStore, RoutingRuleStore, TransactionStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: Mutex<HashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, txn: &Transaction) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("transaction store poisoned");
        if rows.contains_key(&txn.id) {
            anyhow::bail!("duplicate transaction id {}", txn.id);
        }
        rows.insert(txn.id, txn.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Transaction>> {
        Ok(self.rows.lock().expect("transaction store poisoned").get(&id).cloned())
    }

    async fn find_for_merchant(
        &self,
        id: Uuid,
        merchant_id: Uuid,
    ) -> anyhow::Result<Option<Transaction>> {
        Ok(self
            .rows
            .lock()
            .expect("transaction store poisoned")
            .get(&id)
            .filter(|t| t.merchant_id == merchant_id)
            .cloned())
    }

    async fn find_by_psp_id(
        &self,
        provider: PspProvider,
        psp_transaction_id: &str,
    ) -> anyhow::Result<Option<Transaction>> {
        Ok(self
            .rows
            .lock()
            .expect("transaction store poisoned")
            .values()
            .find(|t| {
                t.psp_provider == provider
                    && t.psp_transaction_id.as_deref() == Some(psp_transaction_id)
            })
            .cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        key: &str,
    ) -> anyhow::Result<Option<Transaction>> {
        Ok(self
            .rows
            .lock()
            .expect("transaction store poisoned")
            .values()
            .find(|t| t.merchant_id == merchant_id && t.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_with_version(&self, txn: &Transaction) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().expect("transaction store poisoned");
        let Some(current) = rows.get(&txn.id) else {
            return Ok(false);
        };
        if current.version != txn.version {
            return Ok(false);
        }
        let mut updated = txn.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        rows.insert(updated.id, updated);
        Ok(true)
    }

    async fn list_by_merchant(
        &self,
        merchant_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Transaction>> {
        let rows = self.rows.lock().expect("transaction store poisoned");
        let mut matching: Vec<Transaction> = rows
            .values()
            .filter(|t| t.merchant_id == merchant_id)
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryMerchantStore {
    rows: Mutex<HashMap<Uuid, Merchant>>,
}

impl InMemoryMerchantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, merchant: Merchant) {
        self.rows
            .lock()
            .expect("merchant store poisoned")
            .insert(merchant.id, merchant);
    }
}

#[async_trait::async_trait]
impl MerchantStore for InMemoryMerchantStore {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Merchant>> {
        Ok(self.rows.lock().expect("merchant store poisoned").get(&id).cloned())
    }

    async fn find_by_api_key(&self, api_key: &str) -> anyhow::Result<Option<Merchant>> {
        Ok(self
            .rows
            .lock()
            .expect("merchant store poisoned")
            .values()
            .find(|m| m.api_key == api_key)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRoutingRuleStore {
    rules: Mutex<Vec<RoutingRule>>,
}

impl InMemoryRoutingRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rule: RoutingRule) {
        self.rules.lock().expect("routing rule store poisoned").push(rule);
    }
}

#[async_trait::async_trait]
impl RoutingRuleStore for InMemoryRoutingRuleStore {
    async fn list_enabled_for(&self, merchant_id: Uuid) -> anyhow::Result<Vec<RoutingRule>> {
        Ok(self
            .rules
            .lock()
            .expect("routing rule store poisoned")
            .iter()
            .filter(|r| r.is_enabled)
            .filter(|r| r.merchant_id.is_none() || r.merchant_id == Some(merchant_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{Currency, PaymentMethod, PspProvider};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn stale_version_updates_are_rejected() {
        let store = InMemoryTransactionStore::new();
        let txn = transaction();
        store.insert(&txn).await.unwrap();

        let mut first_writer = txn.clone();
        first_writer.status = PaymentStatus::Paid;
        assert!(store.update_with_version(&first_writer).await.unwrap());

        // Second writer still holds version 1 and must lose.
        let mut second_writer = txn.clone();
        second_writer.status = PaymentStatus::Failed;
        assert!(!store.update_with_version(&second_writer).await.unwrap());

        let stored = store.find(txn.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert_eq!(stored.version, 2);
    }

    fn transaction() -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            psp_provider: PspProvider::Mock,
            psp_transaction_id: Some("mock_1".to_string()),
            amount: Decimal::new(1000, 2),
            refunded_amount: Decimal::ZERO,
            fee: None,
            currency: Currency::Sar,
            status: PaymentStatus::Pending,
            payment_method: PaymentMethod::CreditCard,
            card: None,
            metadata: serde_json::Map::new(),
            callback_url: None,
            error_message: None,
            psp_reference: None,
            idempotency_key: None,
            request_hash: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
