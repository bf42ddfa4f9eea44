//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors
/// instead of panicking on unexpected values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

fn parse_optional_enum<T: std::str::FromStr>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(col)? {
        Some(s) => s.parse::<T>().map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
        }),
        None => Ok(None),
    }
}

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PROFILE_COLS: &str = "id, email, subscription_tier, current_period_end, stripe_customer_id, stripe_subscription_id, created_at, updated_at";

pub const APP_COLS: &str =
    "id, developer_id, name, pricing_type, price_cents, currency, stripe_price_id, created_at, updated_at";

pub const PLAN_COLS: &str = "tier, stripe_price_id, price_cents, currency";

pub const TRANSACTION_COLS: &str = "id, user_id, app_id, plan_tier, mode, amount_cents, currency, processor_reference, status, created_at, updated_at";

pub const APP_PURCHASE_COLS: &str =
    "id, user_id, app_id, transaction_id, processor_reference, granted_at";

pub const NOTIFICATION_COLS: &str = "id, user_id, kind, title, message, read, created_at";

// ============ FromRow Implementations ============

impl FromRow for Profile {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Profile {
            id: row.get(0)?,
            email: row.get(1)?,
            subscription_tier: parse_enum(row, 2, "subscription_tier")?,
            current_period_end: row.get(3)?,
            stripe_customer_id: row.get(4)?,
            stripe_subscription_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for App {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(App {
            id: row.get(0)?,
            developer_id: row.get(1)?,
            name: row.get(2)?,
            pricing_type: parse_enum(row, 3, "pricing_type")?,
            price_cents: row.get(4)?,
            currency: row.get(5)?,
            stripe_price_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for SubscriptionPlan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(SubscriptionPlan {
            tier: parse_enum(row, 0, "tier")?,
            stripe_price_id: row.get(1)?,
            price_cents: row.get(2)?,
            currency: row.get(3)?,
        })
    }
}

impl FromRow for Transaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            app_id: row.get(2)?,
            plan_tier: parse_optional_enum(row, 3, "plan_tier")?,
            mode: parse_enum(row, 4, "mode")?,
            amount_cents: row.get(5)?,
            currency: row.get(6)?,
            processor_reference: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for AppPurchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AppPurchase {
            id: row.get(0)?,
            user_id: row.get(1)?,
            app_id: row.get(2)?,
            transaction_id: row.get(3)?,
            processor_reference: row.get(4)?,
            granted_at: row.get(5)?,
        })
    }
}

impl FromRow for Notification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Notification {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            title: row.get(3)?,
            message: row.get(4)?,
            read: row.get::<_, i32>(5)? != 0,
            created_at: row.get(6)?,
        })
    }
}
