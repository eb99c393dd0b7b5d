//! Client wallet balances credited by refunds.

use crate::{
    entities::{Wallet, wallet},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*, sea_query::Expr};

/// Atomically adds `amount` to a user's wallet, creating the wallet if needed.
///
/// Uses `UPDATE wallets SET balance = balance + amount` so concurrent credits are
/// never lost to a read-modify-write.
pub async fn credit_wallet<C>(db: &C, user_id: &str, amount: f64) -> Result<wallet::Model>
where
    C: ConnectionTrait,
{
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidAmount { amount });
    }

    let now = chrono::Utc::now();
    let updated = Wallet::update_many()
        .col_expr(
            wallet::Column::Balance,
            Expr::col(wallet::Column::Balance).add(amount),
        )
        .col_expr(wallet::Column::UpdatedAt, Expr::value(now))
        .filter(wallet::Column::UserId.eq(user_id))
        .exec(db)
        .await?;

    if updated.rows_affected == 0 {
        wallet::ActiveModel {
            user_id: Set(user_id.to_string()),
            balance: Set(amount),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
    }

    Wallet::find_by_id(user_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| {
            Error::Database(DbErr::RecordNotFound(format!(
                "wallet for {user_id} after credit"
            )))
        })
}

/// Current wallet balance of a user, zero if they have no wallet yet.
pub async fn get_wallet_balance<C>(db: &C, user_id: &str) -> Result<f64>
where
    C: ConnectionTrait,
{
    Ok(Wallet::find_by_id(user_id.to_string())
        .one(db)
        .await?
        .map_or(0.0, |w| w.balance))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_credit_creates_then_accumulates() -> Result<()> {
        let db = setup_test_db().await?;

        assert_eq!(get_wallet_balance(&db, "student-1").await?, 0.0);

        let wallet = credit_wallet(&db, "student-1", 15000.0).await?;
        assert_eq!(wallet.balance, 15000.0);

        let wallet = credit_wallet(&db, "student-1", 2500.0).await?;
        assert_eq!(wallet.balance, 17500.0);
        assert_eq!(get_wallet_balance(&db, "student-1").await?, 17500.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_credit_rejects_invalid_amounts() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(matches!(
            credit_wallet(&db, "student-1", -1.0).await,
            Err(Error::InvalidAmount { .. })
        ));
        assert!(matches!(
            credit_wallet(&db, "student-1", f64::NAN).await,
            Err(Error::InvalidAmount { .. })
        ));
        Ok(())
    }
}
