use log::info;

use crate::errors::Result;
use crate::gateway::{SqlGateway, SqlSession, SqlValue};

const USER_COUNT: usize = 10_000;
const BATCH: usize = 100;
const OPENING_BALANCE: i64 = 100_000;

/// Truncates the test tables and seeds deterministic bulk data: one user
/// and one wallet per sequence number, inserted in parameterized multi-row
/// batches.
pub async fn generate<G: SqlGateway>(gateway: &G) -> Result<()> {
    let mut session = gateway.session().await?;

    session
        .batch("TRUNCATE TABLE users; TRUNCATE TABLE wallets; TRUNCATE TABLE logs;")
        .await?;

    let users_sql = multi_insert(
        "INSERT INTO users (id, account, password, nickname, email) VALUES ",
        BATCH,
        5,
    );
    let mut seq: i64 = 1;
    for _ in 0..USER_COUNT / BATCH {
        let mut params = Vec::with_capacity(BATCH * 5);
        for _ in 0..BATCH {
            params.push(SqlValue::Int(seq));
            params.push(SqlValue::Text(format!("user{seq}")));
            params.push(SqlValue::Text("password".to_string()));
            params.push(SqlValue::Text(format!("user{seq}")));
            params.push(SqlValue::Text("email".to_string()));
            seq += 1;
        }
        session.execute(&users_sql, &params).await?;
    }

    let wallets_sql = multi_insert(
        "INSERT INTO wallets (id, user_id, amount) VALUES ",
        BATCH,
        3,
    );
    let mut seq: i64 = 1;
    for _ in 0..USER_COUNT / BATCH {
        let mut params = Vec::with_capacity(BATCH * 3);
        for _ in 0..BATCH {
            params.push(SqlValue::Int(seq));
            params.push(SqlValue::Int(seq));
            params.push(SqlValue::Int(OPENING_BALANCE));
            seq += 1;
        }
        session.execute(&wallets_sql, &params).await?;
    }

    info!("generated {USER_COUNT} users and {USER_COUNT} wallets");
    Ok(())
}

/// Builds `INSERT ... VALUES ($1,...),(...)` with numbered placeholders for
/// `rows` rows of `cols` columns.
fn multi_insert(prefix: &str, rows: usize, cols: usize) -> String {
    let mut sql = String::from(prefix);
    let mut placeholder = 1usize;
    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        sql.push('(');
        for col in 0..cols {
            if col > 0 {
                sql.push(',');
            }
            sql.push('$');
            sql.push_str(&placeholder.to_string());
            placeholder += 1;
        }
        sql.push(')');
    }
    sql
}
