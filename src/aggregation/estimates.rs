use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{DomainError, DomainResult, ErrorKind};
use crate::ledger::models::{fields, Estimate, IdentityKey, RecordKind};
use crate::ledger::period::{days_in_month, Calendar};
use crate::ledger::store::{scalar, to_document, Filter, LedgerStore, Patch, Pipeline};
use crate::messages;

/// Whether an estimate was written fresh or replaced this month's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateUpsert {
    Inserted,
    Updated,
}

/// Monthly pledged play days, team wide and per participant
pub struct EstimateAggregator {
    store: Arc<dyn LedgerStore>,
    calendar: Calendar,
}

impl EstimateAggregator {
    pub fn new(store: Arc<dyn LedgerStore>, calendar: Calendar) -> Self {
        Self {
            store: store.switch(RecordKind::Estimates),
            calendar,
        }
    }

    async fn sum_playdays(
        &self,
        filter: Filter,
        location: &'static str,
    ) -> DomainResult<i64> {
        let pipeline = Pipeline::new()
            .matching(filter)
            .group_by(None)
            .sum("total", fields::PLAYDAYS);
        let rows = self
            .store
            .aggregate(&pipeline)
            .await
            .map_err(|e| DomainError::aggregation(location, e, "getting the monthly playdays"))?;
        Ok(scalar(&rows, "total"))
    }

    /// Sum of every participant's pledge for the month of `at`; zero when nobody answered
    pub async fn total_pledged(&self, at: DateTime<Utc>) -> DomainResult<i64> {
        let month = self.calendar.month(self.calendar.local_date(at));
        self.sum_playdays(Filter::new().within(fields::DATE, month), "TotalPlayDays")
            .await
    }

    pub async fn pledged_by(&self, tid: IdentityKey, at: DateTime<Utc>) -> DomainResult<i64> {
        let month = self.calendar.month(self.calendar.local_date(at));
        self.sum_playdays(
            Filter::new()
                .eq(fields::IDENTITY, tid)
                .within(fields::DATE, month),
            "PlayerPlayDays",
        )
        .await
    }

    /// Records `playdays` for the month of `at`, replacing an earlier answer
    pub async fn upsert(
        &self,
        tid: IdentityKey,
        playdays: u32,
        at: DateTime<Utc>,
    ) -> DomainResult<EstimateUpsert> {
        const LOC: &str = "UpsertEstimate";

        let day = self.calendar.local_date(at);
        if playdays > days_in_month(day) {
            return Err(DomainError::new(ErrorKind::InvalidField, LOC)
                .with_field("tid", tid)
                .with_field("playdays", playdays)
                .with_user_message(messages::invalid_field(
                    "invalid play days for the estimate, kindly check and send again",
                )));
        }

        let this_month = Filter::new()
            .eq(fields::IDENTITY, tid)
            .within(fields::DATE, self.calendar.month(day));
        let existing = self
            .store
            .count(&this_month)
            .await
            .map_err(|e| DomainError::store(LOC, e, "checking the estimates"))?;

        if existing > 0 {
            let patch = Patch::new()
                .set(fields::PLAYDAYS, playdays)
                .set(fields::DATE, at);
            self.store
                .update_one(&this_month, &patch)
                .await
                .map_err(|e| DomainError::store(LOC, e, "updating the estimates"))?;
            debug!(tid, playdays, "estimate updated");
            return Ok(EstimateUpsert::Updated);
        }

        let estimate = Estimate {
            tid,
            playdays,
            recorded_at: at,
        };
        let doc = to_document(&estimate)
            .map_err(|e| DomainError::store(LOC, e, "adding the estimates"))?;
        self.store
            .add_one(doc)
            .await
            .map_err(|e| DomainError::store(LOC, e, "adding the estimates"))?;

        info!(tid, playdays, "✓ Estimate recorded");
        Ok(EstimateUpsert::Inserted)
    }
}
