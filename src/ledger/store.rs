use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::ledger::models::RecordKind;
use crate::ledger::period::Window;

/// Stored record body; one flat JSON object per record
pub type Document = serde_json::Map<String, Value>;

pub fn to_document<T: Serialize>(record: &T) -> StoreResult<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Unsupported(format!(
            "record serialized to non-object {}",
            other
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Typed scalar used in filters and patches
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Bool(bool),
    Time(DateTime<Utc>),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Int(v) => Value::from(*v),
            FieldValue::Text(v) => Value::from(v.clone()),
            FieldValue::Bool(v) => Value::from(*v),
            FieldValue::Time(v) => serde_json::to_value(v).unwrap_or(Value::Null),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Time(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gte,
    Lte,
}

impl Op {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gte => ">=",
            Op::Lte => "<=",
        }
    }

    fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Op::Eq => ordering == Equal,
            Op::Gte => ordering != Less,
            Op::Lte => ordering != Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Op,
    pub value: FieldValue,
}

impl Predicate {
    /// A missing or differently typed field never matches
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(stored) = doc.get(&self.field) else {
            return false;
        };
        let ordering = match &self.value {
            FieldValue::Int(v) => stored.as_i64().map(|s| s.cmp(v)),
            FieldValue::Text(v) => stored.as_str().map(|s| s.cmp(v.as_str())),
            FieldValue::Bool(v) => stored.as_bool().map(|s| s.cmp(v)),
            FieldValue::Time(v) => stored
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|s| s.with_timezone(&Utc).cmp(v)),
        };
        ordering.map(|o| self.op.holds(o)).unwrap_or(false)
    }
}

/// Conjunction of field predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: &str, op: Op, value: impl Into<FieldValue>) -> Self {
        self.predicates.push(Predicate {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.push(field, Op::Eq, value)
    }

    pub fn gte(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.push(field, Op::Gte, value)
    }

    pub fn lte(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.push(field, Op::Lte, value)
    }

    /// Inclusive time range on `field`
    pub fn within(self, field: &str, window: Window) -> Self {
        self.gte(field, window.from).lte(field, window.to)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates.iter().all(|p| p.matches(doc))
    }
}

/// `set` and `inc` field updates applied together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    set: Vec<(String, FieldValue)>,
    inc: Vec<(String, i64)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set.push((field.to_string(), value.into()));
        self
    }

    pub fn inc(mut self, field: &str, by: i64) -> Self {
        self.inc.push((field.to_string(), by));
        self
    }

    pub fn sets(&self) -> &[(String, FieldValue)] {
        &self.set
    }

    pub fn incs(&self) -> &[(String, i64)] {
        &self.inc
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty()
    }

    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in &self.set {
            doc.insert(field.clone(), value.to_json());
        }
        for (field, by) in &self.inc {
            let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
            doc.insert(field.clone(), Value::from(current + by));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    Sum(String),
    DistinctCount(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group {
        key: Option<String>,
        outputs: Vec<(String, Accumulator)>,
    },
}

/// `match` stages followed by at most one `group` stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    /// Starts a group stage; `None` folds every matched record into one row
    pub fn group_by(mut self, key: Option<&str>) -> Self {
        self.stages.push(Stage::Group {
            key: key.map(str::to_string),
            outputs: Vec::new(),
        });
        self
    }

    fn accumulate(mut self, name: &str, acc: Accumulator) -> Self {
        match self.stages.last_mut() {
            Some(Stage::Group { outputs, .. }) => outputs.push((name.to_string(), acc)),
            _ => self.stages.push(Stage::Group {
                key: None,
                outputs: vec![(name.to_string(), acc)],
            }),
        }
        self
    }

    pub fn sum(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::Sum(field.to_string()))
    }

    pub fn distinct_count(self, name: &str, field: &str) -> Self {
        self.accumulate(name, Accumulator::DistinctCount(field.to_string()))
    }

    /// Flatten into (combined match filter, group) or reject unsupported shapes
    pub fn plan(&self) -> StoreResult<(Filter, Option<&Stage>)> {
        let mut filter = Filter::new();
        let mut group = None;
        for stage in &self.stages {
            match stage {
                Stage::Match(f) if group.is_none() => {
                    filter.predicates.extend(f.predicates.iter().cloned());
                }
                Stage::Match(_) => {
                    return Err(StoreError::Unsupported(
                        "match stage after group".to_string(),
                    ))
                }
                Stage::Group { .. } if group.is_some() => {
                    return Err(StoreError::Unsupported(
                        "more than one group stage".to_string(),
                    ))
                }
                Stage::Group { .. } => group = Some(stage),
            }
        }
        Ok((filter, group))
    }
}

/// One grouped output row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRow {
    pub key: Option<Value>,
    pub values: HashMap<String, i64>,
}

impl AggregateRow {
    pub fn get(&self, name: &str) -> i64 {
        self.values.get(name).copied().unwrap_or(0)
    }
}

/// Value of `name` in the single ungrouped row; no rows reads as zero
pub fn scalar(rows: &[AggregateRow], name: &str) -> i64 {
    rows.first().map(|row| row.get(name)).unwrap_or(0)
}

/// Persistence contract shared by every record kind.
///
/// A handle addresses one record kind; `switch` hands out a sibling handle
/// on the same connection.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    fn switch(&self, kind: RecordKind) -> Arc<dyn LedgerStore>;

    async fn add_one(&self, doc: Document) -> StoreResult<()>;

    /// Patches the first matching record, returns how many changed (0 or 1)
    async fn update_one(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64>;

    async fn update_many(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64>;

    async fn get_one(&self, filter: &Filter) -> StoreResult<Option<Document>>;

    async fn count(&self, filter: &Filter) -> StoreResult<u64>;

    async fn aggregate(&self, pipeline: &Pipeline) -> StoreResult<Vec<AggregateRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_filter_matches_typed_values() {
        let record = doc(json!({
            "tid": 7,
            "desc": "playday",
            "archived": false,
            "dttm": "2024-09-03T07:00:00Z"
        }));
        let from = Utc.with_ymd_and_hms(2024, 9, 3, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 9, 3, 23, 59, 59).unwrap();

        let filter = Filter::new()
            .eq("tid", 7i64)
            .eq("desc", "playday")
            .eq("archived", false)
            .gte("dttm", from)
            .lte("dttm", to);
        assert!(filter.matches(&record));

        assert!(!Filter::new().gte("dttm", to).matches(&record));
        assert!(!Filter::new().eq("tid", "7").matches(&record));
        assert!(!Filter::new().eq("missing", 1i64).matches(&record));
    }

    #[test]
    fn test_patch_set_and_inc() {
        let mut record = doc(json!({"tid": 7, "debit": 100, "archived": true}));
        Patch::new()
            .set("archived", false)
            .inc("debit", -15)
            .inc("credit", 5)
            .apply(&mut record);

        assert_eq!(record["archived"], json!(false));
        assert_eq!(record["debit"], json!(85));
        assert_eq!(record["credit"], json!(5));
    }

    #[test]
    fn test_pipeline_plan_rejects_match_after_group() {
        let ok = Pipeline::new()
            .matching(Filter::new().eq("desc", "playday"))
            .sum("total", "debit");
        let (filter, group) = ok.plan().unwrap();
        assert_eq!(filter.predicates().len(), 1);
        assert!(group.is_some());

        let bad = Pipeline::new()
            .sum("n", "debit")
            .matching(Filter::new().eq("tid", 1i64));
        assert!(matches!(bad.plan(), Err(StoreError::Unsupported(_))));
    }
}
