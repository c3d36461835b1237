use crate::{
    entities::discount_code::{self, DiscountKind, Entity as DiscountCodeEntity},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

/// Result of validating a discount code against an order total.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiscountQuote {
    /// Normalized code, as stored in the ledger
    pub code: String,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

/// Discount code ledger: validation and atomic redemption.
#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DatabaseConnection>,
}

impl DiscountService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Case-normalization applied to every code before lookup.
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Validates a code against an order total and computes the quote.
    /// No state is mutated here; redemption happens inside the commit
    /// transaction via [`DiscountService::redeem`].
    #[instrument(skip(self), fields(code = %code))]
    pub async fn validate(
        &self,
        code: &str,
        order_total: Decimal,
    ) -> Result<DiscountQuote, ServiceError> {
        let normalized = Self::normalize(code);

        let model = DiscountCodeEntity::find()
            .filter(discount_code::Column::Code.eq(normalized.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::DiscountNotFound(normalized.clone()))?;

        if !model.active {
            return Err(ServiceError::DiscountInactive(normalized));
        }

        let now = Utc::now();
        if now < model.starts_at || now > model.ends_at {
            return Err(ServiceError::DiscountExpired(normalized));
        }

        if let Some(limit) = model.usage_limit {
            if model.redemption_count >= limit {
                return Err(ServiceError::DiscountExhausted(normalized));
            }
        }

        let discount_amount = compute_discount(model.kind, model.value, order_total);
        let final_total = order_total - discount_amount;
        debug!(
            code = %normalized,
            discount = %discount_amount,
            final_total = %final_total,
            "Discount quote computed"
        );

        Ok(DiscountQuote {
            code: normalized,
            discount_amount,
            final_total,
        })
    }

    /// Consumes one use of the code via a single conditional update:
    /// the increment only lands while `redemption_count < usage_limit`
    /// (or always, for unlimited codes). Zero affected rows means a
    /// concurrent checkout took the last use.
    ///
    /// Runs on the caller's connection so it participates in the
    /// checkout commit transaction.
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
    ) -> Result<(), ServiceError> {
        let normalized = Self::normalize(code);

        let result = DiscountCodeEntity::update_many()
            .col_expr(
                discount_code::Column::RedemptionCount,
                Expr::col(discount_code::Column::RedemptionCount).add(1),
            )
            .filter(discount_code::Column::Code.eq(normalized.clone()))
            .filter(
                Condition::any()
                    .add(discount_code::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(discount_code::Column::RedemptionCount)
                            .lt(Expr::col(discount_code::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::DiscountExhausted(normalized));
        }
        Ok(())
    }
}

/// Percentage: `round(total * value / 100)` to cents. Fixed amount:
/// `min(value, total)`. The discount never exceeds the order total and
/// the resulting total is never negative.
pub fn compute_discount(kind: DiscountKind, value: Decimal, order_total: Decimal) -> Decimal {
    let raw = match kind {
        DiscountKind::Percentage => (order_total * value / Decimal::from(100)).round_dp(2),
        DiscountKind::FixedAmount => value,
    };
    raw.min(order_total).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percentage_discount_rounds_to_cents() {
        let discount = compute_discount(DiscountKind::Percentage, dec!(10), dec!(19.99));
        assert_eq!(discount, dec!(2.00));

        let discount = compute_discount(DiscountKind::Percentage, dec!(15), dec!(33.33));
        assert_eq!(discount, dec!(5.00));
    }

    #[test]
    fn fixed_discount_never_exceeds_order_total() {
        assert_eq!(
            compute_discount(DiscountKind::FixedAmount, dec!(10), dec!(20.00)),
            dec!(10)
        );
        assert_eq!(
            compute_discount(DiscountKind::FixedAmount, dec!(50), dec!(20.00)),
            dec!(20.00)
        );
    }

    #[test]
    fn discount_is_never_negative() {
        assert_eq!(
            compute_discount(DiscountKind::FixedAmount, dec!(-5), dec!(20.00)),
            Decimal::ZERO
        );
    }

    #[test]
    fn full_percentage_discount_zeroes_the_total() {
        let total = dec!(42.50);
        let discount = compute_discount(DiscountKind::Percentage, dec!(100), total);
        assert_eq!(total - discount, Decimal::ZERO);
    }

    #[test]
    fn codes_are_case_normalized() {
        assert_eq!(DiscountService::normalize("  save10 "), "SAVE10");
        assert_eq!(DiscountService::normalize("SAVE10"), "SAVE10");
    }
}
