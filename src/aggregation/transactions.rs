use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{DomainError, DomainResult, ErrorKind, StoreError};
use crate::ledger::models::{fields, Balance, IdentityKey, LedgerEntry, RecordKind, PLAYDAY_DESC};
use crate::ledger::period::{first_of_month, Calendar};
use crate::ledger::store::{scalar, to_document, Filter, LedgerStore, Patch, Pipeline};
use crate::messages;

/// Playday figures for one calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaySummary {
    pub debits: i64,
    pub attendees: i64,
}

/// Reads and writes over ledger entries
pub struct LedgerQueries {
    store: Arc<dyn LedgerStore>,
    calendar: Calendar,
}

impl LedgerQueries {
    pub fn new(store: Arc<dyn LedgerStore>, calendar: Calendar) -> Self {
        Self {
            store: store.switch(RecordKind::Transactions),
            calendar,
        }
    }

    fn playdays_on(&self, day: NaiveDate) -> Filter {
        Filter::new()
            .eq(fields::DESC, PLAYDAY_DESC)
            .within(fields::DATE, self.calendar.day(day))
    }

    pub async fn playday_marked(&self, tid: IdentityKey, day: NaiveDate) -> DomainResult<bool> {
        let count = self
            .store
            .count(&self.playdays_on(day).eq(fields::IDENTITY, tid))
            .await
            .map_err(|e| DomainError::store("IsPlayMarkedToday", e, "checking the attendance"))?;
        Ok(count > 0)
    }

    /// Playday debits from the start of the month up to the start of `day`
    pub async fn recovered_before(&self, day: NaiveDate) -> DomainResult<i64> {
        let Some(window) = self.calendar.before_day_in_month(day) else {
            return Ok(0);
        };
        let pipeline = Pipeline::new()
            .matching(
                Filter::new()
                    .eq(fields::DESC, PLAYDAY_DESC)
                    .within(fields::DATE, window),
            )
            .group_by(None)
            .sum("recovered", fields::DEBIT);
        let rows = self
            .store
            .aggregate(&pipeline)
            .await
            .map_err(|e| DomainError::aggregation("RecoveryTillNow", e, "getting the recovery"))?;
        Ok(scalar(&rows, "recovered"))
    }

    pub async fn day_summary(&self, day: NaiveDate) -> DomainResult<DaySummary> {
        let pipeline = Pipeline::new()
            .matching(self.playdays_on(day))
            .group_by(None)
            .sum("debits", fields::DEBIT)
            .distinct_count("attendees", fields::IDENTITY);
        let rows = self
            .store
            .aggregate(&pipeline)
            .await
            .map_err(|e| DomainError::aggregation("DaySummary", e, "getting today's debits"))?;
        Ok(DaySummary {
            debits: scalar(&rows, "debits"),
            attendees: scalar(&rows, "attendees"),
        })
    }

    /// Adds `delta` to the debit of every playday entry dated `day`
    pub async fn shift_playday_debits(&self, day: NaiveDate, delta: i64) -> DomainResult<u64> {
        self.store
            .update_many(&self.playdays_on(day), &Patch::new().inc(fields::DEBIT, delta))
            .await
            .map_err(|e| DomainError::store("AdjustDailyDebit", e, "adjusting today's debits"))
    }

    /// Appends an entry; a second playday for the same day maps to `DuplicateAttendance`
    pub async fn append(&self, entry: &LedgerEntry, location: &'static str) -> DomainResult<()> {
        let doc = to_document(entry)
            .map_err(|e| DomainError::store(location, e, "recording the transaction"))?;
        match self.store.add_one(doc).await {
            Ok(()) => Ok(()),
            Err(StoreError::UniqueViolation(reason)) if entry.is_playday() => {
                Err(DomainError::new(ErrorKind::DuplicateAttendance, location)
                    .with_field("tid", entry.tid)
                    .with_field("reason", reason)
                    .with_user_message(messages::duplicate_attendance()))
            }
            Err(e) => Err(DomainError::store(location, e, "recording the transaction")),
        }
    }

    pub async fn balance(&self, tid: IdentityKey, day: NaiveDate) -> DomainResult<Balance> {
        let pipeline = Pipeline::new()
            .matching(
                Filter::new()
                    .eq(fields::IDENTITY, tid)
                    .within(fields::DATE, self.calendar.month(day)),
            )
            .group_by(None)
            .sum("credits", fields::CREDIT)
            .sum("debits", fields::DEBIT);
        let rows = self
            .store
            .aggregate(&pipeline)
            .await
            .map_err(|e| DomainError::aggregation("MyDues", e, "getting your dues"))?;
        Ok(Balance {
            tid,
            month: first_of_month(day),
            credits: scalar(&rows, "credits"),
            debits: scalar(&rows, "debits"),
        })
    }
}
