use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::ledger::models::RecordKind;
use crate::ledger::store::{
    Accumulator, AggregateRow, Document, FieldValue, Filter, LedgerStore, Patch, Pipeline, Stage,
};

/// Postgres backed ledger, one JSONB row per record in `ledger_documents`
#[derive(Clone)]
pub struct PgStore {
    kind: RecordKind,
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool, kind: RecordKind) -> Self {
        Self { kind, pool }
    }
}

/// Field and alias names are spliced into SQL, so only plain identifiers pass
fn identifier(name: &str) -> StoreResult<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::Unsupported(format!("invalid field name '{}'", name)))
    }
}

fn push_where(
    qb: &mut QueryBuilder<'_, Postgres>,
    kind: RecordKind,
    filter: &Filter,
) -> StoreResult<()> {
    qb.push(" WHERE kind = ").push_bind(kind.as_str());
    for predicate in filter.predicates() {
        let field = identifier(&predicate.field)?;
        let op = predicate.op.as_sql();
        qb.push(" AND ");
        match &predicate.value {
            FieldValue::Int(v) => {
                qb.push(format!("(body->>'{}')::bigint {} ", field, op))
                    .push_bind(*v);
            }
            FieldValue::Text(v) => {
                qb.push(format!("body->>'{}' {} ", field, op))
                    .push_bind(v.clone());
            }
            FieldValue::Bool(v) => {
                qb.push(format!("(body->>'{}')::boolean {} ", field, op))
                    .push_bind(*v);
            }
            FieldValue::Time(v) => {
                qb.push(format!("(body->>'{}')::timestamptz {} ", field, op))
                    .push_bind(*v);
            }
        }
    }
    Ok(())
}

/// `body || jsonb_build_object(...)` carrying both set and inc fields
fn push_patch(qb: &mut QueryBuilder<'_, Postgres>, patch: &Patch) -> StoreResult<()> {
    qb.push("body || jsonb_build_object(");
    let mut first = true;
    for (field, value) in patch.sets() {
        let field = identifier(field)?;
        if !first {
            qb.push(", ");
        }
        first = false;
        qb.push(format!("'{}', ", field)).push_bind(Json(value.to_json()));
    }
    for (field, by) in patch.incs() {
        let field = identifier(field)?;
        if !first {
            qb.push(", ");
        }
        first = false;
        qb.push(format!(
            "'{}', COALESCE((body->>'{}')::bigint, 0) + ",
            field, field
        ))
        .push_bind(*by);
    }
    qb.push(")");
    Ok(())
}

fn into_document(value: Value) -> StoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Query(format!(
            "stored body is not an object: {}",
            other
        ))),
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    fn switch(&self, kind: RecordKind) -> Arc<dyn LedgerStore> {
        Arc::new(Self {
            kind,
            pool: self.pool.clone(),
        })
    }

    async fn add_one(&self, doc: Document) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_documents (id, kind, body)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.kind.as_str())
        .bind(Json(Value::Object(doc)))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_one(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ledger_documents SET body = ");
        push_patch(&mut qb, patch)?;
        qb.push(" WHERE id = (SELECT id FROM ledger_documents");
        push_where(&mut qb, self.kind, filter)?;
        qb.push(" ORDER BY created_at, id LIMIT 1)");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_many(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ledger_documents SET body = ");
        push_patch(&mut qb, patch)?;
        push_where(&mut qb, self.kind, filter)?;

        let result = qb.build().execute(&self.pool).await?;
        debug!(
            kind = %self.kind,
            updated = result.rows_affected(),
            "bulk update applied"
        );
        Ok(result.rows_affected())
    }

    async fn get_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM ledger_documents");
        push_where(&mut qb, self.kind, filter)?;
        qb.push(" ORDER BY created_at, id LIMIT 1");

        let row = qb.build().fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let Json(body): Json<Value> = row.try_get("body")?;
                Ok(Some(into_document(body)?))
            }
            None => Ok(None),
        }
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ledger_documents");
        push_where(&mut qb, self.kind, filter)?;

        let row = qb.build().fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> StoreResult<Vec<AggregateRow>> {
        let (filter, group) = pipeline.plan()?;
        let Some(Stage::Group { key, outputs }) = group else {
            return Err(StoreError::Unsupported(
                "pipeline without a group stage".to_string(),
            ));
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        let key = key.as_deref().map(identifier).transpose()?;
        match key {
            Some(key) => qb.push(format!("body->'{}' AS group_key", key)),
            None => qb.push("NULL::jsonb AS group_key"),
        };
        for (name, acc) in outputs {
            let name = identifier(name)?;
            let expr = match acc {
                Accumulator::Sum(field) => format!(
                    "COALESCE(SUM((body->>'{}')::bigint), 0)::bigint",
                    identifier(field)?
                ),
                Accumulator::DistinctCount(field) => {
                    format!("COUNT(DISTINCT body->'{}')::bigint", identifier(field)?)
                }
            };
            qb.push(format!(", {} AS \"{}\"", expr, name));
        }
        qb.push(" FROM ledger_documents");
        push_where(&mut qb, self.kind, &filter)?;
        if let Some(key) = key {
            qb.push(format!(" GROUP BY body->'{}'", key));
        }
        // no matched records means no rows, same as a document store
        qb.push(" HAVING COUNT(*) > 0");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let key: Option<Json<Value>> = row.try_get("group_key")?;
            let mut values = std::collections::HashMap::new();
            for (name, _) in outputs {
                let value: i64 = row.try_get(name.as_str())?;
                values.insert(name.clone(), value);
            }
            result.push(AggregateRow {
                key: key.map(|Json(v)| v),
                values,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rejects_injection() {
        assert!(identifier("dttm").is_ok());
        assert!(identifier("plydys").is_ok());
        assert!(identifier("tid'; DROP TABLE x; --").is_err());
        assert!(identifier("").is_err());
    }

    #[test]
    fn test_where_clause_shape() {
        let filter = Filter::new().eq("tid", 7i64).eq("desc", "playday");
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM ledger_documents");
        push_where(&mut qb, RecordKind::Transactions, &filter).unwrap();

        assert_eq!(
            qb.sql(),
            "SELECT body FROM ledger_documents WHERE kind = $1 AND (body->>'tid')::bigint = $2 AND body->>'desc' = $3"
        );
    }

    #[test]
    fn test_patch_clause_shape() {
        let patch = Patch::new().set("archived", false).inc("debit", 3);
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ledger_documents SET body = ");
        push_patch(&mut qb, &patch).unwrap();

        assert_eq!(
            qb.sql(),
            "UPDATE ledger_documents SET body = body || jsonb_build_object('archived', $1, 'debit', COALESCE((body->>'debit')::bigint, 0) + $2)"
        );
    }
}
