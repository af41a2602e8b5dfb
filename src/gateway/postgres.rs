use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, info};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{NoTls, Row};

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::gateway::{SqlGateway, SqlRow, SqlSession, SqlValue};
use crate::IsolationLevel;

/// PostgreSQL gateway. Opens one dedicated connection per session and
/// enforces the configured connection cap; the harness core never pools or
/// shares connections itself.
pub struct PgGateway {
    pg_config: tokio_postgres::Config,
    connect_timeout: Duration,
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl PgGateway {
    /// Connects to the configured server and verifies it is reachable with a
    /// ping query before any scenario work starts.
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.postgres.host)
            .port(config.postgres.port)
            .user(&config.postgres.user)
            .password(&config.postgres.password)
            .dbname(&config.postgres.dbname);

        let gateway = Self {
            pg_config,
            connect_timeout: config.connect_timeout(),
            permits: Arc::new(Semaphore::new(config.pool.max_connections)),
            max_connections: config.pool.max_connections,
        };

        let mut probe = gateway.session().await?;
        probe.query("SELECT 1", &[]).await?;
        info!(
            "connected to postgres at {}:{}/{}",
            config.postgres.host, config.postgres.port, config.postgres.dbname
        );
        Ok(gateway)
    }
}

impl SqlGateway for PgGateway {
    type Session = PgSession;

    async fn session(&self) -> Result<PgSession> {
        let permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            Error::Connect(format!(
                "no connection permits available (max {})",
                self.max_connections
            ))
        })?;

        let connect = self.pg_config.connect(NoTls);
        let (client, connection) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                Error::Connect(format!(
                    "timed out after {:?} while opening connection",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| Error::Connect(e.to_string()))?;

        // The connection object drives the socket; it resolves once the
        // client half is dropped.
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("connection driver finished with error: {e}");
            }
        });

        Ok(PgSession {
            client,
            _driver: driver,
            _permit: permit,
        })
    }

    fn capacity(&self) -> usize {
        self.max_connections
    }
}

/// One dedicated PostgreSQL connection.
///
/// Transaction control is issued as plain statements so the transaction can
/// span any number of `execute`/`query` calls without borrowing the client.
/// Dropping the session closes the connection, which also rolls back any
/// transaction still open on it.
pub struct PgSession {
    client: tokio_postgres::Client,
    _driver: JoinHandle<()>,
    _permit: OwnedSemaphorePermit,
}

fn start_transaction_sql(isolation: IsolationLevel) -> &'static str {
    match isolation {
        IsolationLevel::ReadUncommitted => {
            "START TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"
        }
        IsolationLevel::ReadCommitted => "START TRANSACTION ISOLATION LEVEL READ COMMITTED",
        IsolationLevel::RepeatableRead => "START TRANSACTION ISOLATION LEVEL REPEATABLE READ",
        IsolationLevel::Serializable => "START TRANSACTION ISOLATION LEVEL SERIALIZABLE",
    }
}

fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn decode_row(row: &Row) -> Result<SqlRow> {
    let mut out = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Int))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .map(|v| v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))))
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .map(|v| v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))))
        } else if *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
        {
            row.try_get::<_, Option<String>>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Text))
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)
                .map(|v| v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))))
        } else {
            return Err(Error::Decode(format!(
                "unsupported column type {ty} in column {:?}",
                column.name()
            )));
        };
        out.push(value.map_err(|e| Error::Decode(e.to_string()))?);
    }
    Ok(out)
}

impl SqlSession for PgSession {
    async fn begin(&mut self, isolation: IsolationLevel) -> Result<()> {
        self.client
            .batch_execute(start_transaction_sql(isolation))
            .await
            .map_err(|e| Error::Sql(e.to_string()))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let refs = param_refs(params);
        self.client
            .execute(sql, &refs)
            .await
            .map_err(|e| Error::Sql(e.to_string()))
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let refs = param_refs(params);
        let rows = self
            .client
            .query(sql, &refs)
            .await
            .map_err(|e| Error::Sql(e.to_string()))?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(&mut self) -> Result<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| Error::Sql(e.to_string()))
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| Error::Sql(e.to_string()))
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| Error::Sql(e.to_string()))
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Int(v) => v.to_sql(ty, out),
            SqlValue::Text(s) => s.as_str().to_sql(ty, out),
            SqlValue::Null => Ok(IsNull::Yes),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <i64 as ToSql>::accepts(ty) || <&str as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}
