use crate::domain::merchant::Merchant;
use crate::repo::store::MerchantStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct MerchantsRepo {
    pub pool: PgPool,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, email, api_key, webhook_url, webhook_secret, is_active,
           settings, created_at, updated_at
    FROM merchants
"#;

#[async_trait::async_trait]
impl MerchantStore for MerchantsRepo {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Merchant>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| map_row(&r)))
    }

    async fn find_by_api_key(&self, api_key: &str) -> anyhow::Result<Option<Merchant>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE api_key = $1"))
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| map_row(&r)))
    }
}

fn map_row(r: &PgRow) -> Merchant {
    let settings: serde_json::Value = r.get("settings");
    Merchant {
        id: r.get("id"),
        name: r.get("name"),
        email: r.get("email"),
        api_key: r.get("api_key"),
        webhook_url: r.get("webhook_url"),
        webhook_secret: r.get("webhook_secret"),
        is_active: r.get("is_active"),
        settings: match settings {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        },
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}
