use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::accounts::AccountDirectory;
use crate::aggregation::{EstimateAggregator, ExpenseAggregator};
use crate::dispatch::command::BotCommand;
use crate::dispatch::poll::playdays_for_option;
use crate::dispatch::response::BotResponse;
use crate::error::{DomainError, DomainResult, ErrorKind};
use crate::ledger::models::{Elevation, Expense, IdentityKey};
use crate::messages;
use crate::settlement::SettlementEngine;

/// Executes typed commands against the domain services
pub struct CommandExecutor {
    accounts: Arc<AccountDirectory>,
    estimates: Arc<EstimateAggregator>,
    expenses: Arc<ExpenseAggregator>,
    engine: Arc<SettlementEngine>,
    handle: String,
    owner_id: IdentityKey,
    guest_charge: Option<i64>,
}

impl CommandExecutor {
    pub fn new(
        accounts: Arc<AccountDirectory>,
        estimates: Arc<EstimateAggregator>,
        expenses: Arc<ExpenseAggregator>,
        engine: Arc<SettlementEngine>,
        handle: impl Into<String>,
        owner_id: IdentityKey,
        guest_charge: Option<i64>,
    ) -> Self {
        Self {
            accounts,
            estimates,
            expenses,
            engine,
            handle: handle.into(),
            owner_id,
            guest_charge,
        }
    }

    /// Runs the command; poll answers produce no response
    pub async fn execute(&self, command: BotCommand, now: DateTime<Utc>) -> Option<BotResponse> {
        debug!(command = command.name(), update_id = command.update_id(), "executing");

        let origin = command.origin().copied();
        match (self.run(command, now).await, origin) {
            (Ok(Some(text)), Some(origin)) => Some(BotResponse::reply(&origin, text)),
            (Ok(_), _) => None,
            (Err(err), origin) => {
                err.log();
                origin.map(|origin| BotResponse::error(&origin, &err))
            }
        }
    }

    async fn run(&self, command: BotCommand, now: DateTime<Utc>) -> DomainResult<Option<String>> {
        let sender = command.sender();
        let today = self.engine.calendar().local_date(now);

        let text = match command {
            // ========== ACCOUNT COMMANDS ==========
            BotCommand::Register { email, name, .. } => {
                let account = self.accounts.register(sender, &email, &name).await?;
                Ok(format!(
                    "{} Registered {} with email {}",
                    messages::GREEN_TICK,
                    account.name,
                    account.email
                ))
            }
            BotCommand::EditEmail { email, .. } => {
                let account = self.accounts.update_email(sender, &email).await?;
                Ok(format!("{} Email updated to {}", messages::GREEN_TICK, account.email))
            }
            BotCommand::ShowInfo { .. } => Ok(self.accounts.lookup(sender).await?.to_message()),
            BotCommand::Deregister { .. } => {
                self.accounts.deregister(sender).await?;
                Ok(format!(
                    "{} Your account is archived, register again anytime",
                    messages::GREEN_TICK
                ))
            }
            BotCommand::Elevate { target, .. } => self.elevate(sender, target).await,
            BotCommand::Help { .. } => Ok(messages::help(&self.handle)),

            // ========== SETTLEMENT COMMANDS ==========
            BotCommand::MarkAttendance { .. } => self.mark_attendance(sender, now).await,
            BotCommand::AddExpense { amount, desc, .. } => {
                self.accounts.lookup(sender).await?;
                let expense = self
                    .expenses
                    .record(Expense {
                        tid: sender,
                        amount,
                        desc,
                        recorded_at: now,
                    })
                    .await?;
                Ok(format!(
                    "{} Expense of {}{} recorded : {}",
                    messages::GREEN_TICK,
                    messages::RUPEE,
                    expense.amount,
                    expense.desc
                ))
            }
            BotCommand::PayDues { amount, .. } => {
                let entry = self.engine.pay_dues(sender, amount, now).await?;
                Ok(format!("transacted {}", entry.to_message()))
            }
            BotCommand::ShowMyDues { .. } => Ok(self.engine.dues(sender, today).await?.to_message()),
            BotCommand::ShowMyExpenses { .. } => Ok(self
                .expenses
                .participant_total(sender, now)
                .await?
                .to_message()),
            BotCommand::ShowTeamExpenses { .. } => {
                Ok(self.expenses.team_total(now).await?.to_message())
            }

            BotCommand::Unrecognized { .. } => Ok(messages::callout_hint()),
            BotCommand::PollAnswer { option, .. } => {
                self.record_poll_answer(sender, option, now).await?;
                return Ok(None);
            }
        };
        text.map(Some)
    }

    /// Requester must be an admin or the owner; the target moves up one level
    async fn elevate(&self, requester: IdentityKey, target: IdentityKey) -> DomainResult<String> {
        const LOC: &str = "ElevateAccount";

        if requester != self.owner_id {
            let account = self.accounts.lookup(requester).await?;
            if account.elevation < Elevation::Admin {
                return Err(DomainError::new(ErrorKind::Unauthorized, LOC)
                    .with_field("requester", requester)
                    .with_field("target", target)
                    .with_user_message(messages::unauthorized()));
            }
        }

        let current = self.accounts.lookup(target).await?;
        let next = current.elevation.next().ok_or_else(|| {
            DomainError::new(ErrorKind::InvalidField, LOC)
                .with_field("target", target)
                .with_field("elevation", current.elevation)
                .with_user_message(messages::elevation_ceiling())
        })?;
        let elevated = self.accounts.elevate(target, u8::from(next)).await?;
        Ok(format!(
            "{} Successfully elevated {} to {}",
            messages::GREEN_TICK,
            elevated.name,
            elevated.elevation
        ))
    }

    async fn mark_attendance(&self, tid: IdentityKey, now: DateTime<Utc>) -> DomainResult<String> {
        let day = self.engine.calendar().local_date(now);
        match self.engine.mark_attendance(tid, day).await {
            Ok(_) => Ok(messages::noted()),
            Err(err) if err.is(ErrorKind::MissingPlayerEstimate) => match self.guest_charge {
                Some(charge) => {
                    self.engine.mark_guest_attendance(tid, day, charge).await?;
                    Ok(messages::guest_charged(charge))
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn record_poll_answer(
        &self,
        tid: IdentityKey,
        option: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let day = self.engine.calendar().local_date(now);
        let playdays = playdays_for_option(option, day).ok_or_else(|| {
            DomainError::new(ErrorKind::InvalidField, "PollAnswer")
                .with_field("tid", tid)
                .with_field("option", option)
        })?;
        let outcome = self.estimates.upsert(tid, playdays, now).await?;
        info!(tid, playdays, outcome = ?outcome, "✓ Poll answer noted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::command::Origin;
    use crate::aggregation::LedgerQueries;
    use crate::ledger::models::RecordKind;
    use crate::ledger::store::LedgerStore;
    use crate::ledger::{Calendar, MemoryStore};
    use chrono::TimeZone;

    const OWNER: IdentityKey = 1;

    struct Harness {
        executor: CommandExecutor,
        estimates: Arc<EstimateAggregator>,
        accounts: Arc<AccountDirectory>,
    }

    fn harness(guest_charge: Option<i64>) -> Harness {
        let calendar = Calendar::utc();
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new(RecordKind::Accounts));
        let accounts = Arc::new(AccountDirectory::new(store.clone()).unwrap());
        let estimates = Arc::new(EstimateAggregator::new(store.clone(), calendar));
        let expenses = Arc::new(ExpenseAggregator::new(store.clone(), calendar));
        let ledger = Arc::new(LedgerQueries::new(store, calendar));
        let engine = Arc::new(SettlementEngine::new(
            accounts.clone(),
            estimates.clone(),
            expenses.clone(),
            ledger,
            calendar,
        ));
        Harness {
            executor: CommandExecutor::new(
                accounts.clone(),
                estimates.clone(),
                expenses,
                engine,
                "@dues_bot",
                OWNER,
                guest_charge,
            ),
            estimates,
            accounts,
        }
    }

    fn origin(sender: IdentityKey) -> Origin {
        Origin {
            update_id: 1,
            chat_id: -100,
            message_id: 77,
            sender,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 6, 45, 0).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_show_info() {
        let h = harness(None);
        let reply = h
            .executor
            .execute(
                BotCommand::Register {
                    origin: origin(11),
                    email: "ana@team.in".to_string(),
                    name: "Ana".to_string(),
                },
                now(),
            )
            .await
            .unwrap();
        assert!(!reply.is_error());
        assert_eq!(reply.reply_to, Some(77));

        let info = h
            .executor
            .execute(BotCommand::ShowInfo { origin: origin(11) }, now())
            .await
            .unwrap();
        assert!(info.text.contains("ana@team.in"));
    }

    #[tokio::test]
    async fn test_error_reply_carries_user_message_only() {
        let h = harness(None);
        let reply = h
            .executor
            .execute(BotCommand::ShowMyDues { origin: origin(42) }, now())
            .await
            .unwrap();
        assert_eq!(reply.failure, Some(ErrorKind::AccountNotFound));
        assert_eq!(reply.text, messages::account_not_found(42));
    }

    #[tokio::test]
    async fn test_elevation_needs_admin_or_owner() {
        let h = harness(None);
        h.accounts.register(11, "ana@team.in", "Ana").await.unwrap();
        h.accounts.register(12, "bo@team.in", "Bo").await.unwrap();

        let denied = h
            .executor
            .execute(BotCommand::Elevate { origin: origin(11), target: 12 }, now())
            .await
            .unwrap();
        assert_eq!(denied.failure, Some(ErrorKind::Unauthorized));

        for _ in 0..2 {
            let ok = h
                .executor
                .execute(BotCommand::Elevate { origin: origin(OWNER), target: 11 }, now())
                .await
                .unwrap();
            assert!(!ok.is_error());
        }
        assert_eq!(h.accounts.lookup(11).await.unwrap().elevation, Elevation::Admin);

        let ceiling = h
            .executor
            .execute(BotCommand::Elevate { origin: origin(OWNER), target: 11 }, now())
            .await
            .unwrap();
        assert_eq!(ceiling.failure, Some(ErrorKind::InvalidField));
        assert_eq!(ceiling.text, messages::elevation_ceiling());
        assert_eq!(h.accounts.lookup(11).await.unwrap().elevation, Elevation::Admin);

        // an admin may now elevate others
        let ok = h
            .executor
            .execute(BotCommand::Elevate { origin: origin(11), target: 12 }, now())
            .await
            .unwrap();
        assert!(!ok.is_error());
    }

    #[tokio::test]
    async fn test_poll_answer_updates_estimate_silently() {
        let h = harness(None);
        let reply = h
            .executor
            .execute(
                BotCommand::PollAnswer {
                    update_id: 5,
                    participant: 11,
                    option: 1,
                },
                now(),
            )
            .await;
        assert!(reply.is_none());
        assert_eq!(h.estimates.pledged_by(11, now()).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_unknown_poll_option_is_dropped_without_reply() {
        let h = harness(None);
        let reply = h
            .executor
            .execute(
                BotCommand::PollAnswer {
                    update_id: 6,
                    participant: 11,
                    option: 9,
                },
                now(),
            )
            .await;
        assert!(reply.is_none());
        assert_eq!(h.estimates.pledged_by(11, now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attendance_without_estimate_uses_guest_charge() {
        let h = harness(Some(110));
        h.accounts.register(11, "ana@team.in", "Ana").await.unwrap();
        h.accounts.register(12, "bo@team.in", "Bo").await.unwrap();
        h.estimates.upsert(11, 30, now()).await.unwrap();

        let reply = h
            .executor
            .execute(BotCommand::MarkAttendance { origin: origin(12) }, now())
            .await
            .unwrap();
        assert_eq!(reply.text, messages::guest_charged(110));

        let again = h
            .executor
            .execute(BotCommand::MarkAttendance { origin: origin(12) }, now())
            .await
            .unwrap();
        assert_eq!(again.failure, Some(ErrorKind::DuplicateAttendance));
    }

    #[tokio::test]
    async fn test_attendance_without_estimate_and_no_guest_charge() {
        let h = harness(None);
        h.accounts.register(11, "ana@team.in", "Ana").await.unwrap();
        h.accounts.register(12, "bo@team.in", "Bo").await.unwrap();
        h.estimates.upsert(11, 30, now()).await.unwrap();

        let reply = h
            .executor
            .execute(BotCommand::MarkAttendance { origin: origin(12) }, now())
            .await
            .unwrap();
        assert_eq!(reply.failure, Some(ErrorKind::MissingPlayerEstimate));
    }

    #[tokio::test]
    async fn test_expense_needs_account() {
        let h = harness(None);
        let reply = h
            .executor
            .execute(
                BotCommand::AddExpense {
                    origin: origin(11),
                    amount: 500,
                    desc: "cocks".to_string(),
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(reply.failure, Some(ErrorKind::AccountNotFound));

        h.accounts.register(11, "ana@team.in", "Ana").await.unwrap();
        let reply = h
            .executor
            .execute(BotCommand::ShowTeamExpenses { origin: origin(11) }, now())
            .await
            .unwrap();
        assert!(reply.text.contains("0"));
    }
}
