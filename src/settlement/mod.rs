// Settlement engine: attendance debits, deficit redistribution and dues
pub mod calc;
pub mod scheduler;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::accounts::AccountDirectory;
use crate::aggregation::{EstimateAggregator, ExpenseAggregator, LedgerQueries};
use crate::error::{DomainError, DomainResult, ErrorKind};
use crate::ledger::models::{Balance, IdentityKey, LedgerEntry, CLEAR_DUES_DESC};
use crate::ledger::period::{remaining_days, Calendar};
use crate::messages;

/// Inputs and outcome of one attendance debit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceDebit {
    pub entry: LedgerEntry,
    pub monthly_expense: i64,
    pub recovered: i64,
    pub remaining_days: u32,
    pub pledged: i64,
    pub total_pledged: i64,
}

/// Outcome of a day's redistribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdjustmentReport {
    pub day: NaiveDate,
    pub attendees: i64,
    pub expected: i64,
    pub actual: i64,
    pub per_head: i64,
    pub updated: u64,
}

impl AdjustmentReport {
    pub fn to_message(&self) -> String {
        if self.attendees == 0 || self.actual == 0 {
            return format!(
                "{} Nothing to adjust for {}, no playday debits today",
                messages::GREEN_TICK,
                self.day
            );
        }
        format!(
            "{} Debits for {} adjusted by {}{} for each of {} players\nexpected {} / collected {}",
            messages::GREEN_TICK,
            self.day,
            messages::RUPEE,
            self.per_head,
            self.attendees,
            self.expected,
            self.actual
        )
    }
}

/// Decides what each participant owes for a day of play
pub struct SettlementEngine {
    accounts: Arc<AccountDirectory>,
    estimates: Arc<EstimateAggregator>,
    expenses: Arc<ExpenseAggregator>,
    ledger: Arc<LedgerQueries>,
    calendar: Calendar,
}

impl SettlementEngine {
    pub fn new(
        accounts: Arc<AccountDirectory>,
        estimates: Arc<EstimateAggregator>,
        expenses: Arc<ExpenseAggregator>,
        ledger: Arc<LedgerQueries>,
        calendar: Calendar,
    ) -> Self {
        Self {
            accounts,
            estimates,
            expenses,
            ledger,
            calendar,
        }
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    async fn ensure_not_marked(&self, tid: IdentityKey, day: NaiveDate) -> DomainResult<()> {
        if self.ledger.playday_marked(tid, day).await? {
            return Err(DomainError::new(ErrorKind::DuplicateAttendance, "MarkAttendance")
                .with_field("tid", tid)
                .with_field("day", day)
                .with_user_message(messages::duplicate_attendance()));
        }
        Ok(())
    }

    // ========== ATTENDANCE ==========

    /// Debits today's share of the outstanding monthly expense.
    ///
    /// The share is the participant's pledge over the team's pledge. Rounding
    /// loss is left for `adjust_daily_debit` to spread.
    #[instrument(skip(self))]
    pub async fn mark_attendance(&self, tid: IdentityKey, day: NaiveDate) -> DomainResult<AttendanceDebit> {
        const LOC: &str = "MarkAttendance";

        self.accounts.lookup(tid).await?;
        self.ensure_not_marked(tid, day).await?;

        let month_of = self.calendar.start_of_day(day);
        let total_pledged = self.estimates.total_pledged(month_of).await?;
        if total_pledged <= 0 {
            return Err(DomainError::new(ErrorKind::NoEstimatesAvailable, LOC)
                .with_field("tid", tid)
                .with_user_message(messages::zero_playdays()));
        }
        let pledged = self.estimates.pledged_by(tid, month_of).await?;
        if pledged <= 0 {
            return Err(DomainError::new(ErrorKind::MissingPlayerEstimate, LOC)
                .with_field("tid", tid)
                .with_user_message(messages::missing_estimate()));
        }

        let monthly_expense = self.expenses.team_total(month_of).await?.total;
        let recovered = self.ledger.recovered_before(day).await?;
        let remaining = remaining_days(day);
        let pool = calc::daily_equity_pool(monthly_expense, recovered, remaining);
        let debit = calc::participant_debit(pool, pledged, total_pledged);

        let entry = LedgerEntry::playday(tid, debit, self.calendar.playday_stamp(day));
        self.ledger.append(&entry, LOC).await?;

        info!(
            tid,
            debit,
            pledged,
            total_pledged,
            monthly_expense,
            recovered,
            "✓ Attendance marked"
        );
        Ok(AttendanceDebit {
            entry,
            monthly_expense,
            recovered,
            remaining_days: remaining,
            pledged,
            total_pledged,
        })
    }

    /// Fixed charge for an attendee who pledged nothing this month
    #[instrument(skip(self))]
    pub async fn mark_guest_attendance(
        &self,
        tid: IdentityKey,
        day: NaiveDate,
        charge: i64,
    ) -> DomainResult<LedgerEntry> {
        const LOC: &str = "MarkGuestAttendance";

        self.accounts.lookup(tid).await?;
        self.ensure_not_marked(tid, day).await?;
        if charge <= 0 {
            return Err(DomainError::new(ErrorKind::InvalidField, LOC)
                .with_field("charge", charge)
                .with_user_message(messages::invalid_field("guest charge must be positive")));
        }

        let entry = LedgerEntry::playday(tid, charge, self.calendar.playday_stamp(day));
        self.ledger.append(&entry, LOC).await?;

        info!(tid, charge, "✓ Guest attendance marked");
        Ok(entry)
    }

    // ========== REDISTRIBUTION ==========

    /// Spreads the gap between the day's expected pool and what was debited
    /// over everyone who played that day. Not idempotent, run once per day.
    #[instrument(skip(self))]
    pub async fn adjust_daily_debit(&self, day: NaiveDate) -> DomainResult<AdjustmentReport> {
        let monthly_expense = self
            .expenses
            .team_total(self.calendar.start_of_day(day))
            .await?
            .total;
        let expected = calc::expected_daily_pool(monthly_expense, remaining_days(day));
        let summary = self.ledger.day_summary(day).await?;

        let mut report = AdjustmentReport {
            day,
            attendees: summary.attendees,
            expected,
            actual: summary.debits,
            per_head: 0,
            updated: 0,
        };

        let Some(per_head) = calc::deficit_per_head(expected, summary.debits, summary.attendees)
        else {
            warn!(day = %day, "Nothing to redistribute, no playday debits");
            return Ok(report);
        };
        report.per_head = per_head;
        if per_head != 0 {
            report.updated = self.ledger.shift_playday_debits(day, per_head).await?;
        }

        info!(
            day = %day,
            expected,
            actual = summary.debits,
            attendees = summary.attendees,
            per_head,
            updated = report.updated,
            "✓ Daily debits adjusted"
        );
        Ok(report)
    }

    // ========== DUES ==========

    #[instrument(skip(self))]
    pub async fn pay_dues(
        &self,
        tid: IdentityKey,
        amount: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerEntry> {
        const LOC: &str = "PayDues";

        self.accounts.lookup(tid).await?;
        if amount <= 0 {
            return Err(DomainError::new(ErrorKind::InvalidField, LOC)
                .with_field("tid", tid)
                .with_field("amount", amount)
                .with_user_message(messages::invalid_field("amount paid has to be positive")));
        }

        let entry = LedgerEntry::credit(tid, amount, CLEAR_DUES_DESC, at);
        self.ledger.append(&entry, LOC).await?;

        info!(tid, amount, "✓ Dues paid");
        Ok(entry)
    }

    pub async fn dues(&self, tid: IdentityKey, day: NaiveDate) -> DomainResult<Balance> {
        self.accounts.lookup(tid).await?;
        self.ledger.balance(tid, day).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::{fields, Expense, RecordKind, PLAYDAY_DESC};
    use crate::ledger::store::{Filter, LedgerStore};
    use crate::ledger::MemoryStore;
    use chrono::TimeZone;

    struct Fixture {
        store: MemoryStore,
        accounts: Arc<AccountDirectory>,
        estimates: Arc<EstimateAggregator>,
        expenses: Arc<ExpenseAggregator>,
        engine: SettlementEngine,
        calendar: Calendar,
    }

    fn fixture() -> Fixture {
        let calendar = Calendar::utc();
        let store = MemoryStore::new(RecordKind::Transactions);
        let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let accounts = Arc::new(AccountDirectory::new(shared.clone()).unwrap());
        let estimates = Arc::new(EstimateAggregator::new(shared.clone(), calendar));
        let expenses = Arc::new(ExpenseAggregator::new(shared.clone(), calendar));
        let ledger = Arc::new(LedgerQueries::new(shared, calendar));
        let engine = SettlementEngine::new(
            accounts.clone(),
            estimates.clone(),
            expenses.clone(),
            ledger,
            calendar,
        );
        Fixture {
            store,
            accounts,
            estimates,
            expenses,
            engine,
            calendar,
        }
    }

    // September has 30 days
    fn sept(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    async fn seed(f: &Fixture, pledges: &[(IdentityKey, u32)], expense: i64) {
        let at = Utc.with_ymd_and_hms(2024, 9, 1, 0, 30, 0).unwrap();
        for (tid, days) in pledges {
            f.accounts
                .register(*tid, &format!("p{}@team.in", tid), &format!("P{}", tid))
                .await
                .unwrap();
            f.estimates.upsert(*tid, *days, at).await.unwrap();
        }
        if expense > 0 {
            f.expenses
                .record(Expense {
                    tid: pledges[0].0,
                    amount: expense,
                    desc: "court rent".to_string(),
                    recorded_at: at,
                })
                .await
                .unwrap();
        }
    }

    async fn playday_count(f: &Fixture) -> u64 {
        f.store
            .switch(RecordKind::Transactions)
            .count(&Filter::new().eq(fields::DESC, PLAYDAY_DESC))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scenario_first_day_of_month() {
        let f = fixture();
        seed(&f, &[(1, 30), (2, 15), (3, 0)], 9000).await;

        let debit = f.engine.mark_attendance(1, sept(1)).await.unwrap();
        assert_eq!(debit.total_pledged, 45);
        assert_eq!(debit.recovered, 0);
        assert_eq!(debit.entry.debit, 200);
        assert_eq!(debit.entry.recorded_at, f.calendar.playday_stamp(sept(1)));

        let err = f.engine.mark_attendance(3, sept(1)).await.unwrap_err();
        assert!(err.is(ErrorKind::MissingPlayerEstimate));
        assert_eq!(playday_count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_second_mark_same_day_is_duplicate() {
        let f = fixture();
        seed(&f, &[(1, 30), (2, 15)], 9000).await;

        f.engine.mark_attendance(1, sept(1)).await.unwrap();
        let err = f.engine.mark_attendance(1, sept(1)).await.unwrap_err();
        assert!(err.is(ErrorKind::DuplicateAttendance));

        let err = f.engine.mark_guest_attendance(1, sept(1), 110).await.unwrap_err();
        assert!(err.is(ErrorKind::DuplicateAttendance));
        assert_eq!(playday_count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_zero_estimates_writes_nothing() {
        let f = fixture();
        seed(&f, &[(1, 0), (2, 0)], 9000).await;

        let err = f.engine.mark_attendance(1, sept(3)).await.unwrap_err();
        assert!(err.is(ErrorKind::NoEstimatesAvailable));
        assert_eq!(playday_count(&f).await, 0);
    }

    #[tokio::test]
    async fn test_unregistered_attendee() {
        let f = fixture();
        seed(&f, &[(1, 30)], 9000).await;

        let err = f.engine.mark_attendance(42, sept(1)).await.unwrap_err();
        assert!(err.is(ErrorKind::AccountNotFound));
    }

    #[tokio::test]
    async fn test_recovery_grows_across_days() {
        let f = fixture();
        seed(&f, &[(1, 30), (2, 15)], 9000).await;

        let mut last = 0;
        for d in 1..=5 {
            let first = f.engine.mark_attendance(1, sept(d)).await.unwrap();
            assert!(first.recovered >= last);
            last = first.recovered;
            f.engine.mark_attendance(2, sept(d)).await.unwrap();
        }
        // a full pool is collected every day, so the outstanding share stays flat
        let sixth = f.engine.mark_attendance(1, sept(6)).await.unwrap();
        assert_eq!(sixth.recovered, 1500);
        assert_eq!(sixth.entry.debit, 200);
    }

    #[tokio::test]
    async fn test_guest_attendance_fixed_charge() {
        let f = fixture();
        seed(&f, &[(1, 30), (3, 0)], 9000).await;

        let entry = f.engine.mark_guest_attendance(3, sept(2), 110).await.unwrap();
        assert_eq!(entry.debit, 110);
        assert!(entry.is_playday());
    }

    #[tokio::test]
    async fn test_adjust_spreads_shortfall() {
        let f = fixture();
        // pledges 30 + 15 + 15: pool 300 splits 150 / 75 / 75, so one absentee leaves 75 short
        seed(&f, &[(1, 30), (2, 15), (3, 15)], 9000).await;
        f.engine.mark_attendance(1, sept(1)).await.unwrap();
        f.engine.mark_attendance(2, sept(1)).await.unwrap();

        let report = f.engine.adjust_daily_debit(sept(1)).await.unwrap();
        assert_eq!(report.expected, 300);
        assert_eq!(report.actual, 225);
        assert_eq!(report.attendees, 2);
        assert_eq!(report.per_head, 38);
        assert_eq!(report.updated, 2);

        let balance = f.engine.dues(1, sept(1)).await.unwrap();
        // credit 9000 for the expense minus 150 + 38
        assert_eq!(balance.due(), 9000 - 188);
    }

    #[tokio::test]
    async fn test_adjust_without_attendance_is_noop() {
        let f = fixture();
        seed(&f, &[(1, 30)], 9000).await;
        let before = f.store.switch(RecordKind::Transactions);
        let snapshot = before.count(&Filter::new()).await.unwrap();

        let report = f.engine.adjust_daily_debit(sept(4)).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.attendees, 0);
        assert_eq!(before.count(&Filter::new()).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_adjust_never_touches_prior_days() {
        let f = fixture();
        seed(&f, &[(1, 30), (2, 15), (3, 15)], 9000).await;
        f.engine.mark_attendance(1, sept(1)).await.unwrap();
        f.engine.mark_attendance(1, sept(2)).await.unwrap();

        f.engine.adjust_daily_debit(sept(2)).await.unwrap();

        let first_day = f
            .store
            .switch(RecordKind::Transactions)
            .count(&Filter::new().eq(fields::DEBIT, 150i64))
            .await
            .unwrap();
        assert_eq!(first_day, 1);
    }

    #[tokio::test]
    async fn test_pay_dues_requires_account() {
        let f = fixture();
        let at = Utc.with_ymd_and_hms(2024, 9, 3, 9, 0, 0).unwrap();

        let err = f.engine.pay_dues(5, 500, at).await.unwrap_err();
        assert!(err.is(ErrorKind::AccountNotFound));

        seed(&f, &[(5, 30)], 0).await;
        let entry = f.engine.pay_dues(5, 500, at).await.unwrap();
        assert_eq!(entry.credit, 500);
        assert_eq!(entry.desc, CLEAR_DUES_DESC);
        assert_eq!(f.engine.dues(5, sept(3)).await.unwrap().due(), 500);
    }
}
