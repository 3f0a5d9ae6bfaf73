use crate::domain::transaction::{
    CardMetadata, Currency, PaymentMethod, PaymentStatus, PspProvider, Transaction,
};
use crate::repo::store::TransactionStore;
use anyhow::Context;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct TransactionsRepo {
    pub pool: PgPool,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, merchant_id, psp_provider, psp_transaction_id, amount, refunded_amount,
           fee, currency, status, payment_method, card_brand, card_last_four, card_token,
           metadata, callback_url, error_message, psp_reference, idempotency_key,
           request_hash, version, created_at, updated_at
    FROM transactions
"#;

#[async_trait::async_trait]
impl TransactionStore for TransactionsRepo {
    async fn insert(&self, txn: &Transaction) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, merchant_id, psp_provider, psp_transaction_id, amount, refunded_amount,
                fee, currency, status, payment_method, card_brand, card_last_four, card_token,
                metadata, callback_url, error_message, psp_reference, idempotency_key,
                request_hash, version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18,
                $19, $20, $21, $22
            )
            "#,
        )
        .bind(txn.id)
        .bind(txn.merchant_id)
        .bind(txn.psp_provider.as_str())
        .bind(txn.psp_transaction_id.clone())
        .bind(txn.amount)
        .bind(txn.refunded_amount)
        .bind(txn.fee)
        .bind(txn.currency.as_str())
        .bind(txn.status.as_str())
        .bind(txn.payment_method.as_str())
        .bind(txn.card.as_ref().and_then(|c| c.brand.clone()))
        .bind(txn.card.as_ref().and_then(|c| c.last_four.clone()))
        .bind(txn.card.as_ref().and_then(|c| c.token.clone()))
        .bind(serde_json::Value::Object(txn.metadata.clone()))
        .bind(txn.callback_url.clone())
        .bind(txn.error_message.clone())
        .bind(txn.psp_reference.clone())
        .bind(txn.idempotency_key.clone())
        .bind(txn.request_hash.clone())
        .bind(txn.version)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Transaction>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| map_row(&r)).transpose()
    }

    async fn find_for_merchant(
        &self,
        id: Uuid,
        merchant_id: Uuid,
    ) -> anyhow::Result<Option<Transaction>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1 AND merchant_id = $2"))
            .bind(id)
            .bind(merchant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| map_row(&r)).transpose()
    }

    async fn find_by_psp_id(
        &self,
        provider: PspProvider,
        psp_transaction_id: &str,
    ) -> anyhow::Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE psp_provider = $1 AND psp_transaction_id = $2"
        ))
        .bind(provider.as_str())
        .bind(psp_transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| map_row(&r)).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        key: &str,
    ) -> anyhow::Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE merchant_id = $1 AND idempotency_key = $2"
        ))
        .bind(merchant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| map_row(&r)).transpose()
    }

    async fn update_with_version(&self, txn: &Transaction) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3, refunded_amount = $4, fee = $5, psp_transaction_id = $6,
                card_brand = $7, card_last_four = $8, card_token = $9,
                error_message = $10, psp_reference = $11,
                version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(txn.id)
        .bind(txn.version)
        .bind(txn.status.as_str())
        .bind(txn.refunded_amount)
        .bind(txn.fee)
        .bind(txn.psp_transaction_id.clone())
        .bind(txn.card.as_ref().and_then(|c| c.brand.clone()))
        .bind(txn.card.as_ref().and_then(|c| c.last_four.clone()))
        .bind(txn.card.as_ref().and_then(|c| c.token.clone()))
        .bind(txn.error_message.clone())
        .bind(txn.psp_reference.clone())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_merchant(
        &self,
        merchant_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Transaction>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE merchant_id = $1 AND status = $2 ORDER BY created_at DESC LIMIT $3 OFFSET $4"
                ))
                .bind(merchant_id)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE merchant_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                ))
                .bind(merchant_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(map_row).collect()
    }
}

fn map_row(r: &PgRow) -> anyhow::Result<Transaction> {
    let provider: String = r.get("psp_provider");
    let currency: String = r.get("currency");
    let status: String = r.get("status");
    let method: String = r.get("payment_method");
    let metadata: serde_json::Value = r.get("metadata");

    let card_brand: Option<String> = r.get("card_brand");
    let card_last_four: Option<String> = r.get("card_last_four");
    let card_token: Option<String> = r.get("card_token");
    let card = if card_brand.is_none() && card_last_four.is_none() && card_token.is_none() {
        None
    } else {
        Some(CardMetadata {
            brand: card_brand,
            last_four: card_last_four,
            token: card_token,
        })
    };

    Ok(Transaction {
        id: r.get("id"),
        merchant_id: r.get("merchant_id"),
        psp_provider: PspProvider::parse(&provider)
            .with_context(|| format!("unknown psp_provider {provider}"))?,
        psp_transaction_id: r.get("psp_transaction_id"),
        amount: r.get("amount"),
        refunded_amount: r.get("refunded_amount"),
        fee: r.get("fee"),
        currency: Currency::parse(&currency)
            .with_context(|| format!("unknown currency {currency}"))?,
        status: PaymentStatus::parse(&status)
            .with_context(|| format!("unknown status {status}"))?,
        payment_method: PaymentMethod::parse(&method)
            .with_context(|| format!("unknown payment_method {method}"))?,
        card,
        metadata: match metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        },
        callback_url: r.get("callback_url"),
        error_message: r.get("error_message"),
        psp_reference: r.get("psp_reference"),
        idempotency_key: r.get("idempotency_key"),
        request_hash: r.get("request_hash"),
        version: r.get("version"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}
