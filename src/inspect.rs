use log::info;

use crate::errors::Result;
use crate::gateway::{SqlGateway, SqlSession, SqlValue};

/// Lists every table in the public schema with its column names, one log
/// line per table.
pub async fn show_tables<G: SqlGateway>(gateway: &G) -> Result<()> {
    let mut session = gateway.session().await?;

    let tables = session
        .query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' ORDER BY table_name",
            &[],
        )
        .await?;

    for row in tables {
        let Some(SqlValue::Text(table)) = row.into_iter().next() else {
            continue;
        };

        let columns = session
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[SqlValue::Text(table.clone())],
            )
            .await?;
        let names: Vec<&str> = columns
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_text))
            .collect();

        info!("table name: {table} -- columns: {}", names.join(", "));
    }

    info!("done");
    Ok(())
}
