use crate::domain::routing_rule::{RoutingRule, RuleCondition};
use crate::domain::transaction::PspProvider;
use crate::repo::store::RoutingRuleStore;
use anyhow::Context;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct RoutingRulesRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl RoutingRuleStore for RoutingRulesRepo {
    async fn list_enabled_for(&self, merchant_id: Uuid) -> anyhow::Result<Vec<RoutingRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, priority, conditions, target_psp, is_enabled, merchant_id, created_at
            FROM routing_rules
            WHERE is_enabled = true AND (merchant_id IS NULL OR merchant_id = $1)
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }
}

fn map_row(r: &PgRow) -> anyhow::Result<RoutingRule> {
    let target: String = r.get("target_psp");
    let conditions: serde_json::Value = r.get("conditions");
    let conditions: Vec<RuleCondition> =
        serde_json::from_value(conditions).context("malformed routing rule conditions")?;

    Ok(RoutingRule {
        id: r.get("id"),
        name: r.get("name"),
        priority: r.get("priority"),
        conditions,
        target_psp: PspProvider::parse(&target)
            .with_context(|| format!("unknown target_psp {target}"))?,
        is_enabled: r.get("is_enabled"),
        merchant_id: r.get("merchant_id"),
        created_at: r.get("created_at"),
    })
}
