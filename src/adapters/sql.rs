use super::RequestAdapter;
use crate::engine::model::{HeaderMap, Request, Response};
use crate::error::{AdapterError, ErrorCode};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Column, Row, TypeInfo};
use std::time::Instant;
use uuid::Uuid;

/// Runs `request.body` as a SQL statement against the connection named by
/// the `Data-Source-Name` header, with the driver (postgres/mysql/sqlite)
/// picked from that DSN's own scheme by `sqlx::Any`. Row results are
/// reported as a JSON array body; a connection or query failure is a 500
/// with the error text as the body.
pub struct SqlAdapter;

#[async_trait]
impl RequestAdapter for SqlAdapter {
    async fn send(&self, request: &Request) -> Result<Response, AdapterError> {
        let dsn = request
            .headers
            .get("data-source-name")
            .and_then(|v| v.first())
            .ok_or_else(|| {
                AdapterError::Other(
                    ErrorCode::SQL_ADAPTER_ERROR,
                    "missing Data-Source-Name header".into(),
                )
            })?;
        let query = String::from_utf8_lossy(&request.body).to_string();

        let start = Instant::now();
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(dsn)
            .await
            .map_err(|e| {
                AdapterError::Connection(ErrorCode::SQL_ADAPTER_ERROR, e.to_string())
            })?;

        let rows = sqlx::query(&query).fetch_all(&pool).await;
        let duration = start.elapsed();

        let (status_code, reason_phrase, body) = match rows {
            Ok(rows) => {
                let json = Value::Array(rows.iter().map(row_to_json).collect());
                (200, "OK".to_string(), json.to_string().into_bytes())
            }
            Err(e) => (500, "Query Failed".to_string(), e.to_string().into_bytes()),
        };

        Ok(Response {
            request_id: Uuid::new_v4(),
            status_code,
            reason_phrase,
            protocol_version: "sql".into(),
            headers: HeaderMap::new(),
            body,
            body_error: None,
            duration,
            redirect_chain: Vec::new(),
        })
    }
}

fn row_to_json(row: &AnyRow) -> Value {
    let mut object = Map::new();
    for column in row.columns() {
        let name = column.name().to_string();
        let value = match column.type_info().name() {
            "INTEGER" | "BIGINT" | "INT" | "INT4" | "INT8" => row
                .try_get::<i64, _>(column.ordinal())
                .map(Value::from)
                .unwrap_or(Value::Null),
            "REAL" | "DOUBLE" | "FLOAT" | "FLOAT4" | "FLOAT8" => row
                .try_get::<f64, _>(column.ordinal())
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            "BOOLEAN" | "BOOL" => row
                .try_get::<bool, _>(column.ordinal())
                .map(Value::from)
                .unwrap_or(Value::Null),
            _ => row
                .try_get::<String, _>(column.ordinal())
                .map(Value::from)
                .unwrap_or(Value::Null),
        };
        object.insert(name, value);
    }
    Value::Object(object)
}
