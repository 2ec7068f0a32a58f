use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{DomainError, DomainResult, ErrorKind};
use crate::ledger::models::{fields, Expense, IdentityKey, LedgerEntry, MonthlyExpense, RecordKind};
use crate::ledger::period::{first_of_month, Calendar};
use crate::ledger::store::{scalar, to_document, Filter, LedgerStore, Pipeline};
use crate::messages;

/// Expense totals for the month and expense recording
pub struct ExpenseAggregator {
    expenses: Arc<dyn LedgerStore>,
    transactions: Arc<dyn LedgerStore>,
    calendar: Calendar,
}

impl ExpenseAggregator {
    pub fn new(store: Arc<dyn LedgerStore>, calendar: Calendar) -> Self {
        Self {
            expenses: store.switch(RecordKind::Expenses),
            transactions: store.switch(RecordKind::Transactions),
            calendar,
        }
    }

    async fn monthly(
        &self,
        tid: Option<IdentityKey>,
        at: DateTime<Utc>,
        location: &'static str,
    ) -> DomainResult<MonthlyExpense> {
        let day = self.calendar.local_date(at);
        let mut filter = Filter::new().within(fields::DATE, self.calendar.month(day));
        if let Some(tid) = tid {
            filter = filter.eq(fields::IDENTITY, tid);
        }
        let pipeline = Pipeline::new()
            .matching(filter)
            .group_by(None)
            .sum("total", fields::AMOUNT);
        let rows = self
            .expenses
            .aggregate(&pipeline)
            .await
            .map_err(|e| DomainError::aggregation(location, e, "getting the monthly expenses"))?;

        Ok(MonthlyExpense {
            tid,
            month: first_of_month(day),
            total: scalar(&rows, "total"),
        })
    }

    pub async fn team_total(&self, at: DateTime<Utc>) -> DomainResult<MonthlyExpense> {
        self.monthly(None, at, "TeamMonthlyExpense").await
    }

    pub async fn participant_total(
        &self,
        tid: IdentityKey,
        at: DateTime<Utc>,
    ) -> DomainResult<MonthlyExpense> {
        self.monthly(Some(tid), at, "UserMonthlyExpense").await
    }

    /// Writes the expense and the mirrored credit for whoever paid it
    pub async fn record(&self, expense: Expense) -> DomainResult<Expense> {
        const LOC: &str = "RecordExpense";

        if expense.amount <= 0 || expense.desc.trim().is_empty() {
            return Err(DomainError::new(ErrorKind::InvalidField, LOC)
                .with_field("tid", expense.tid)
                .with_field("inr", expense.amount)
                .with_user_message(messages::invalid_field(
                    "one or more arguments of the expense is invalid, kindly check & send again",
                )));
        }

        let doc = to_document(&expense)
            .map_err(|e| DomainError::store(LOC, e, "recording the expense"))?;
        self.expenses
            .add_one(doc)
            .await
            .map_err(|e| DomainError::store(LOC, e, "recording the expense"))?;

        let credit = LedgerEntry::credit(
            expense.tid,
            expense.amount,
            expense.desc.clone(),
            expense.recorded_at,
        );
        let doc = to_document(&credit)
            .map_err(|e| DomainError::store(LOC, e, "recording the expense credit"))?;
        self.transactions
            .add_one(doc)
            .await
            .map_err(|e| DomainError::store(LOC, e, "recording the expense credit"))?;

        info!(tid = expense.tid, inr = expense.amount, "✓ Expense recorded");
        Ok(expense)
    }
}
