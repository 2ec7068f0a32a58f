// Settlement scheduler - daily debit redistribution and the monthly poll
//
// Daily strategy:
// - Executes at the configured local hour, after the day's attendance
// - Redistributes the day's deficit once and posts the outcome to the group
// - On the last day of the month also posts next month's availability poll

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dispatch::poll::AvailabilityPoll;
use crate::dispatch::response::BotResponse;
use crate::dispatch::transport::Messenger;
use crate::error::{AppError, AppResult};
use crate::ledger::period::{is_last_day_of_month, Calendar};
use crate::settlement::{AdjustmentReport, SettlementEngine};

/// Scheduler configuration
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    /// Local hour to run the daily cycle (0-23)
    pub execution_hour: u32,
    /// Conversation that receives reports and polls
    pub group_id: i64,
}

/// Group-facing jobs, run on a timer or through the HTTP triggers
pub struct SettlementScheduler {
    config: ScheduleConfig,
    engine: Arc<SettlementEngine>,
    messenger: Arc<dyn Messenger>,
}

impl SettlementScheduler {
    pub fn new(
        config: ScheduleConfig,
        engine: Arc<SettlementEngine>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config,
            engine,
            messenger,
        }
    }

    pub fn calendar(&self) -> Calendar {
        self.engine.calendar()
    }

    pub fn group_id(&self) -> i64 {
        self.config.group_id
    }

    /// Redistributes `day` and posts the outcome; a failed post is logged only.
    /// A domain failure is returned unlogged, the caller reports it once.
    pub async fn adjust_and_report(&self, day: NaiveDate) -> AppResult<AdjustmentReport> {
        let report = self.engine.adjust_daily_debit(day).await?;

        let post = BotResponse::broadcast(self.config.group_id, report.to_message());
        if let Err(e) = self.messenger.send_message(&post).await {
            error!("❌ Failed to post adjustment report: {}", e);
        }
        Ok(report)
    }

    /// Posts the availability poll for the month after `today`
    pub async fn send_availability_poll(&self, today: NaiveDate) -> AppResult<AvailabilityPoll> {
        let poll = AvailabilityPoll::for_month_after(today);
        self.messenger.send_poll(self.config.group_id, &poll).await?;
        Ok(poll)
    }

    /// Start the scheduler in the background until `cancel` fires
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_daily_scheduler(cancel).await })
    }

    async fn run_daily_scheduler(&self, cancel: CancellationToken) {
        let calendar = self.calendar();

        loop {
            let now = Utc::now();
            let next_execution =
                Self::calculate_next_daily_execution(&calendar, now, self.config.execution_hour);
            let duration_until_execution = next_execution.signed_duration_since(now);

            info!(
                "⏰ Next settlement cycle scheduled for: {} UTC",
                next_execution.format("%Y-%m-%d %H:%M:%S")
            );

            let wait = Duration::from_secs(duration_until_execution.num_seconds().max(0) as u64);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let today = calendar.local_date(Utc::now());
            info!("🔄 Starting daily settlement cycle for {}", today);

            match self.adjust_and_report(today).await {
                Ok(_) => {}
                Err(AppError::Domain(e)) => e.log(),
                Err(e) => error!("❌ Daily adjustment failed: {}", e),
            }

            if is_last_day_of_month(today) {
                if let Err(e) = self.send_availability_poll(today).await {
                    error!("❌ Availability poll failed: {}", e);
                }
            }

            info!("✓ Settlement cycle completed");
        }

        info!("🛑 Settlement scheduler stopped");
    }

    /// Calculate next daily execution time in the group's local day
    fn calculate_next_daily_execution(
        calendar: &Calendar,
        now: DateTime<Utc>,
        execution_hour: u32,
    ) -> DateTime<Utc> {
        let today = calendar.local_date(now);
        let next = calendar.at_hour(today, execution_hour);

        // If execution time has passed today, schedule for tomorrow
        if next <= now {
            calendar.at_hour(today + chrono::Duration::days(1), execution_hour)
        } else {
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Timelike};
    use parking_lot::Mutex;

    use super::*;
    use crate::accounts::AccountDirectory;
    use crate::aggregation::{EstimateAggregator, ExpenseAggregator, LedgerQueries};
    use crate::ledger::models::RecordKind;
    use crate::error::{ErrorKind, StoreError, StoreResult};
    use crate::ledger::store::{AggregateRow, Document, Filter, LedgerStore, Patch, Pipeline};
    use crate::ledger::MemoryStore;

    #[derive(Default)]
    struct RecordingMessenger {
        messages: Mutex<Vec<BotResponse>>,
        polls: Mutex<Vec<(i64, AvailabilityPoll)>>,
    }

    #[async_trait::async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(&self, response: &BotResponse) -> AppResult<()> {
            self.messages.lock().push(response.clone());
            Ok(())
        }

        async fn send_poll(&self, chat_id: i64, poll: &AvailabilityPoll) -> AppResult<()> {
            self.polls.lock().push((chat_id, poll.clone()));
            Ok(())
        }
    }

    fn scheduler(messenger: Arc<RecordingMessenger>) -> SettlementScheduler {
        let calendar = Calendar::utc();
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new(RecordKind::Transactions));
        let engine = SettlementEngine::new(
            Arc::new(AccountDirectory::new(store.clone()).unwrap()),
            Arc::new(EstimateAggregator::new(store.clone(), calendar)),
            Arc::new(ExpenseAggregator::new(store.clone(), calendar)),
            Arc::new(LedgerQueries::new(store, calendar)),
            calendar,
        );
        SettlementScheduler::new(
            ScheduleConfig {
                execution_hour: 22,
                group_id: -100,
            },
            Arc::new(engine),
            messenger,
        )
    }

    #[test]
    fn test_calculate_next_daily_execution() {
        // Current time: 2024-01-01 10:00:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let calendar = Calendar::utc();

        // Execution hour: 14:00 (today)
        let next = SettlementScheduler::calculate_next_daily_execution(&calendar, now, 14);
        assert_eq!(next.hour(), 14);
        assert_eq!(next.day(), 1);

        // Execution hour: 09:00 (already passed, so tomorrow)
        let next = SettlementScheduler::calculate_next_daily_execution(&calendar, now, 9);
        assert_eq!(next.hour(), 9);
        assert_eq!(next.day(), 2);
    }

    #[test]
    fn test_next_execution_uses_local_day() {
        // 20:00 UTC is already 01:30 on the 2nd at UTC+05:30
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let calendar = Calendar::new(330);

        let next = SettlementScheduler::calculate_next_daily_execution(&calendar, now, 22);
        assert_eq!(calendar.local_date(next).day(), 2);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 16, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_adjust_and_report_posts_to_group() {
        let messenger = Arc::new(RecordingMessenger::default());
        let scheduler = scheduler(messenger.clone());
        let day = NaiveDate::from_ymd_opt(2024, 9, 3).unwrap();

        let report = scheduler.adjust_and_report(day).await.unwrap();
        assert_eq!(report.updated, 0);

        let sent = messenger.messages.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, -100);
        assert_eq!(sent[0].reply_to, None);
        assert_eq!(sent[0].text, report.to_message());
    }

    /// Store whose driver is down
    struct DownStore;

    #[async_trait::async_trait]
    impl LedgerStore for DownStore {
        fn switch(&self, _kind: RecordKind) -> Arc<dyn LedgerStore> {
            Arc::new(DownStore)
        }

        async fn add_one(&self, _doc: Document) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn update_one(&self, _filter: &Filter, _patch: &Patch) -> StoreResult<u64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn update_many(&self, _filter: &Filter, _patch: &Patch) -> StoreResult<u64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn get_one(&self, _filter: &Filter) -> StoreResult<Option<Document>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn count(&self, _filter: &Filter) -> StoreResult<u64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn aggregate(&self, _pipeline: &Pipeline) -> StoreResult<Vec<AggregateRow>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_adjust_failure_is_returned_without_posting() {
        let messenger = Arc::new(RecordingMessenger::default());
        let calendar = Calendar::utc();
        let store: Arc<dyn LedgerStore> = Arc::new(DownStore);
        let engine = SettlementEngine::new(
            Arc::new(AccountDirectory::new(store.clone()).unwrap()),
            Arc::new(EstimateAggregator::new(store.clone(), calendar)),
            Arc::new(ExpenseAggregator::new(store.clone(), calendar)),
            Arc::new(LedgerQueries::new(store, calendar)),
            calendar,
        );
        let scheduler = SettlementScheduler::new(
            ScheduleConfig {
                execution_hour: 22,
                group_id: -100,
            },
            Arc::new(engine),
            messenger.clone(),
        );

        let err = scheduler
            .adjust_and_report(NaiveDate::from_ymd_opt(2024, 9, 3).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(ref e) if e.is(ErrorKind::StoreUnavailable)));
        assert!(messenger.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_poll_goes_to_group() {
        let messenger = Arc::new(RecordingMessenger::default());
        let scheduler = scheduler(messenger.clone());

        let poll = scheduler
            .send_availability_poll(NaiveDate::from_ymd_opt(2024, 9, 30).unwrap())
            .await
            .unwrap();
        assert_eq!(poll.question, "Availability for October 2024 ?");
        assert_eq!(messenger.polls.lock()[0].0, -100);
    }
}
