use crate::connectors::ConnectorRegistry;
use crate::domain::routing_rule::{ConditionField, ConditionOperator, RoutingRule, RuleCondition};
use crate::domain::transaction::{Currency, PaymentMethod, PspProvider};
use crate::error::CoreError;
use crate::repo::store::RoutingRuleStore;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
}

/// Evaluates enabled routing rules for a payment. Rules are ordered by
/// priority ascending (lower number wins), merchant-scoped before global on a
/// tie, then insertion order. The first rule whose conditions all hold picks
/// the provider; otherwise the configured default applies. A provider without
/// a registered connector is rejected here, at selection time.
#[derive(Clone)]
pub struct RoutingEngine {
    pub rules: Arc<dyn RoutingRuleStore>,
    pub registry: Arc<ConnectorRegistry>,
    pub default_provider: PspProvider,
    pub success_rates: HashMap<PspProvider, f64>,
}

impl RoutingEngine {
    pub async fn select_provider(
        &self,
        merchant_id: Uuid,
        ctx: &RoutingContext,
    ) -> Result<PspProvider, CoreError> {
        let mut rules = self.rules.list_enabled_for(merchant_id).await?;
        rules.sort_by_key(|r| (r.priority, r.merchant_id.is_none(), r.created_at));

        let selected = rules
            .iter()
            .find(|rule| rule_matches(rule, ctx, &self.success_rates))
            .map(|rule| rule.target_psp)
            .unwrap_or(self.default_provider);

        if !self.registry.contains(selected) {
            return Err(CoreError::UnsupportedProvider(selected));
        }
        Ok(selected)
    }
}

pub fn rule_matches(
    rule: &RoutingRule,
    ctx: &RoutingContext,
    success_rates: &HashMap<PspProvider, f64>,
) -> bool {
    rule.conditions
        .iter()
        .all(|condition| condition_matches(condition, rule.target_psp, ctx, success_rates))
}

fn condition_matches(
    condition: &RuleCondition,
    target: PspProvider,
    ctx: &RoutingContext,
    success_rates: &HashMap<PspProvider, f64>,
) -> bool {
    match condition.field {
        ConditionField::CardType => {
            string_matches(ctx.payment_method.as_str(), condition.operator, &condition.value)
        }
        ConditionField::Currency => {
            string_matches(ctx.currency.as_str(), condition.operator, &condition.value)
        }
        ConditionField::Amount => {
            let Some(expected) = decimal_value(&condition.value) else {
                return false;
            };
            numeric_matches(ctx.amount, condition.operator, expected)
        }
        ConditionField::SuccessRate => {
            // Absent observed rate fails closed rather than matching blindly.
            let Some(rate) = success_rates.get(&target).copied() else {
                return false;
            };
            let Some(expected) = condition.value.as_f64().or_else(|| {
                condition.value.as_str().and_then(|s| s.parse::<f64>().ok())
            }) else {
                return false;
            };
            match condition.operator {
                ConditionOperator::Equals => (rate - expected).abs() < f64::EPSILON,
                ConditionOperator::GreaterThan => rate > expected,
                ConditionOperator::LessThan => rate < expected,
                ConditionOperator::Contains => false,
            }
        }
    }
}

fn string_matches(actual: &str, operator: ConditionOperator, value: &serde_json::Value) -> bool {
    let Some(expected) = value.as_str() else {
        return false;
    };
    let actual = actual.to_uppercase();
    let expected = expected.to_uppercase();
    match operator {
        ConditionOperator::Equals => actual == expected,
        ConditionOperator::Contains => actual.contains(&expected),
        ConditionOperator::GreaterThan | ConditionOperator::LessThan => false,
    }
}

fn numeric_matches(actual: Decimal, operator: ConditionOperator, expected: Decimal) -> bool {
    match operator {
        ConditionOperator::Equals => actual == expected,
        ConditionOperator::GreaterThan => actual > expected,
        ConditionOperator::LessThan => actual < expected,
        ConditionOperator::Contains => false,
    }
}

fn decimal_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn all_conditions_must_hold() {
        let rule = rule(
            10,
            None,
            PspProvider::Moyasar,
            vec![
                condition(ConditionField::Currency, ConditionOperator::Equals, "SAR"),
                condition(ConditionField::CardType, ConditionOperator::Equals, "MADA"),
            ],
        );

        let mada_sar = context(dec!(50), Currency::Sar, PaymentMethod::Mada);
        let visa_sar = context(dec!(50), Currency::Sar, PaymentMethod::CreditCard);

        assert!(rule_matches(&rule, &mada_sar, &HashMap::new()));
        assert!(!rule_matches(&rule, &visa_sar, &HashMap::new()));
    }

    #[test]
    fn amount_comparisons_use_decimal_values() {
        let mut rule = rule(
            10,
            None,
            PspProvider::Moyasar,
            vec![RuleCondition {
                field: ConditionField::Amount,
                operator: ConditionOperator::GreaterThan,
                value: serde_json::json!(100),
            }],
        );

        assert!(rule_matches(
            &rule,
            &context(dec!(100.01), Currency::Sar, PaymentMethod::CreditCard),
            &HashMap::new()
        ));
        assert!(!rule_matches(
            &rule,
            &context(dec!(100), Currency::Sar, PaymentMethod::CreditCard),
            &HashMap::new()
        ));

        rule.conditions[0].operator = ConditionOperator::LessThan;
        assert!(rule_matches(
            &rule,
            &context(dec!(99.99), Currency::Sar, PaymentMethod::CreditCard),
            &HashMap::new()
        ));
    }

    #[test]
    fn success_rate_fails_closed_without_observed_rate() {
        let rule = rule(
            10,
            None,
            PspProvider::Moyasar,
            vec![RuleCondition {
                field: ConditionField::SuccessRate,
                operator: ConditionOperator::GreaterThan,
                value: serde_json::json!(0.9),
            }],
        );
        let ctx = context(dec!(10), Currency::Sar, PaymentMethod::CreditCard);

        assert!(!rule_matches(&rule, &ctx, &HashMap::new()));

        let rates = HashMap::from([(PspProvider::Moyasar, 0.95)]);
        assert!(rule_matches(&rule, &ctx, &rates));
    }

    fn context(amount: Decimal, currency: Currency, method: PaymentMethod) -> RoutingContext {
        RoutingContext {
            amount,
            currency,
            payment_method: method,
        }
    }

    fn condition(field: ConditionField, operator: ConditionOperator, value: &str) -> RuleCondition {
        RuleCondition {
            field,
            operator,
            value: serde_json::json!(value),
        }
    }

    fn rule(
        priority: i32,
        merchant_id: Option<Uuid>,
        target: PspProvider,
        conditions: Vec<RuleCondition>,
    ) -> RoutingRule {
        RoutingRule {
            id: Uuid::new_v4(),
            name: format!("rule_p{priority}"),
            priority,
            conditions,
            target_psp: target,
            is_enabled: true,
            merchant_id,
            created_at: Utc::now(),
        }
    }
}
