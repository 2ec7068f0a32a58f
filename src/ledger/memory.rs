use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::ledger::models::RecordKind;
use crate::ledger::store::{
    Accumulator, AggregateRow, Document, Filter, LedgerStore, Patch, Pipeline, Stage,
};

type Collections = HashMap<RecordKind, Vec<Document>>;

/// Process local store used by tests and when no database is configured
#[derive(Clone)]
pub struct MemoryStore {
    kind: RecordKind,
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot of every record of this kind
    #[cfg(test)]
    pub fn documents(&self) -> Vec<Document> {
        self.collections
            .read()
            .get(&self.kind)
            .cloned()
            .unwrap_or_default()
    }
}

fn group_rows(docs: &[&Document], stage: &Stage) -> Vec<AggregateRow> {
    let Stage::Group { key, outputs } = stage else {
        return Vec::new();
    };

    let mut buckets: Vec<(Option<Value>, Vec<&Document>)> = Vec::new();
    for &doc in docs {
        let bucket_key = key.as_ref().map(|k| doc.get(k).cloned().unwrap_or(Value::Null));
        match buckets.iter_mut().find(|(k, _)| *k == bucket_key) {
            Some((_, members)) => members.push(doc),
            None => buckets.push((bucket_key, vec![doc])),
        }
    }

    buckets
        .into_iter()
        .map(|(key, members)| {
            let values = outputs
                .iter()
                .map(|(name, acc)| {
                    let value = match acc {
                        Accumulator::Sum(field) => members
                            .iter()
                            .filter_map(|d| d.get(field).and_then(Value::as_i64))
                            .sum(),
                        Accumulator::DistinctCount(field) => members
                            .iter()
                            .filter_map(|d| d.get(field).map(|v| v.to_string()))
                            .collect::<HashSet<_>>()
                            .len() as i64,
                    };
                    (name.clone(), value)
                })
                .collect();
            AggregateRow { key, values }
        })
        .collect()
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn switch(&self, kind: RecordKind) -> Arc<dyn LedgerStore> {
        Arc::new(Self {
            kind,
            collections: self.collections.clone(),
        })
    }

    async fn add_one(&self, doc: Document) -> StoreResult<()> {
        self.collections.write().entry(self.kind).or_default().push(doc);
        Ok(())
    }

    async fn update_one(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64> {
        let mut collections = self.collections.write();
        let docs = collections.entry(self.kind).or_default();
        match docs.iter_mut().find(|d| filter.matches(d)) {
            Some(doc) => {
                patch.apply(doc);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_many(&self, filter: &Filter, patch: &Patch) -> StoreResult<u64> {
        let mut collections = self.collections.write();
        let docs = collections.entry(self.kind).or_default();
        let mut updated = 0;
        for doc in docs.iter_mut().filter(|d| filter.matches(d)) {
            patch.apply(doc);
            updated += 1;
        }
        Ok(updated)
    }

    async fn get_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(&self.kind)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        Ok(self
            .collections
            .read()
            .get(&self.kind)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> StoreResult<Vec<AggregateRow>> {
        let (filter, group) = pipeline.plan()?;
        let group = group.ok_or_else(|| {
            StoreError::Unsupported("pipeline without a group stage".to_string())
        })?;

        let collections = self.collections.read();
        let matched: Vec<&Document> = collections
            .get(&self.kind)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).collect())
            .unwrap_or_default();

        Ok(group_rows(&matched, group))
    }
}
