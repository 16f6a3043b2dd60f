//! Postgres-backed connection pools.
//!
//! # Responsibilities
//! - Build a bounded deadpool for each credential string
//! - Force read-only transaction mode on every checkout
//! - Convert rows to JSON objects for the wire
//!
//! # Design Decisions
//! - Connections are opened with `default_transaction_read_only=on` and
//!   the session characteristic is re-asserted on each checkout
//! - `min_size` connections are established up front so an unreachable
//!   credential fails at pool initialization, not on first query
//! - Unsupported column types fail the query with a structured error
//!   instead of silently dropping values

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::{Map, Value};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{NoTls, Row};

use crate::pool::{
    ConnectionFactory, ConnectionPool, PoolError, PoolOptions, PooledConnection, QueryError,
};

/// Production [`ConnectionFactory`] backed by deadpool-postgres.
pub struct PostgresFactory;

#[async_trait]
impl ConnectionFactory for PostgresFactory {
    async fn open(
        &self,
        credential: &str,
        options: &PoolOptions,
    ) -> Result<Box<dyn ConnectionPool>, PoolError> {
        let mut pg_config: tokio_postgres::Config = credential
            .parse()
            .map_err(|err: tokio_postgres::Error| PoolError::InitFailure(err.to_string()))?;
        pg_config.options("-c default_transaction_read_only=on");
        pg_config.connect_timeout(options.connect_timeout);

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(options.max_size)
            .create_timeout(Some(options.connect_timeout))
            .wait_timeout(Some(options.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|err| PoolError::InitFailure(err.to_string()))?;

        // Establish the minimum set eagerly; an unreachable credential
        // surfaces here as an initialization failure.
        let mut warm = Vec::with_capacity(options.min_size);
        for _ in 0..options.min_size {
            let conn = pool
                .get()
                .await
                .map_err(|err| PoolError::InitFailure(err.to_string()))?;
            warm.push(conn);
        }
        drop(warm);

        Ok(Box::new(PostgresPool { pool }))
    }
}

struct PostgresPool {
    pool: Pool,
}

#[async_trait]
impl ConnectionPool for PostgresPool {
    async fn checkout(&self) -> Result<Box<dyn PooledConnection>, PoolError> {
        let client = self.pool.get().await.map_err(map_checkout_error)?;

        client
            .batch_execute("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
            .await
            .map_err(|err| PoolError::InitFailure(err.to_string()))?;

        Ok(Box::new(PostgresConnection { client }))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

fn map_checkout_error(err: deadpool_postgres::PoolError) -> PoolError {
    use deadpool_postgres::PoolError as E;
    match err {
        E::Timeout(_) => PoolError::Exhausted,
        E::Closed => PoolError::Closed,
        other => PoolError::InitFailure(other.to_string()),
    }
}

struct PostgresConnection {
    client: deadpool_postgres::Object,
}

#[async_trait]
impl PooledConnection for PostgresConnection {
    async fn query_json(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, QueryError> {
        let boxed = to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client
            .query(sql, &refs)
            .await
            .map_err(|err| QueryError::Execution(err.to_string()))?;

        rows.iter().map(row_to_json).collect()
    }
}

/// Convert JSON parameters to positional query parameters.
///
/// Arrays and objects are passed through as JSONB; everything else maps
/// to the obvious scalar.
fn to_sql_params(params: &[Value]) -> Vec<Box<dyn ToSql + Send + Sync>> {
    params
        .iter()
        .map(|value| -> Box<dyn ToSql + Send + Sync> {
            match value {
                Value::Null => Box::new(Option::<String>::None),
                Value::Bool(b) => Box::new(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Box::new(i)
                    } else {
                        Box::new(n.as_f64().unwrap_or(f64::NAN))
                    }
                }
                Value::String(s) => Box::new(s.clone()),
                other => Box::new(other.clone()),
            }
        })
        .collect()
}

fn row_to_json(row: &Row) -> Result<Value, QueryError> {
    let mut object = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = column_to_json(row, index, column.type_())?;
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

fn column_to_json(row: &Row, index: usize, ty: &Type) -> Result<Value, QueryError> {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a Row,
        index: usize,
    ) -> Result<Option<T>, QueryError> {
        row.try_get(index)
            .map_err(|err| QueryError::Execution(err.to_string()))
    }

    let value = if *ty == Type::BOOL {
        get::<bool>(row, index)?.map(Value::from)
    } else if *ty == Type::INT2 {
        get::<i16>(row, index)?.map(Value::from)
    } else if *ty == Type::INT4 {
        get::<i32>(row, index)?.map(Value::from)
    } else if *ty == Type::INT8 {
        get::<i64>(row, index)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, index)?.map(Value::from)
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, index)?.map(Value::from)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        get::<String>(row, index)?.map(Value::from)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<Value>(row, index)?
    } else if *ty == Type::TIMESTAMP {
        get::<chrono::NaiveDateTime>(row, index)?.map(|t| Value::from(t.to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        get::<chrono::DateTime<chrono::Utc>>(row, index)?.map(|t| Value::from(t.to_rfc3339()))
    } else if *ty == Type::DATE {
        get::<chrono::NaiveDate>(row, index)?.map(|d| Value::from(d.to_string()))
    } else if *ty == Type::TIME {
        get::<chrono::NaiveTime>(row, index)?.map(|t| Value::from(t.to_string()))
    } else {
        return Err(QueryError::UnsupportedType(ty.name().to_string()));
    };

    Ok(value.unwrap_or(Value::Null))
}
