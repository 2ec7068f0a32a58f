use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    accounts::AccountDirectory,
    aggregation::{EstimateAggregator, ExpenseAggregator, LedgerQueries},
    api::handler::AppState,
    config::Config,
    dispatch::{CommandExecutor, CommandGrammar, Dispatcher, FilterChain},
    error::{AppError, AppResult, StoreError},
    ledger::{Calendar, LedgerStore, MemoryStore, PgStore, RecordKind},
    settlement::{
        scheduler::{ScheduleConfig, SettlementScheduler},
        SettlementEngine,
    },
    telegram::TelegramClient,
};

/// Everything `main` needs to run the bot
pub struct App {
    pub state: AppState,
    pub dispatcher: Arc<Dispatcher>,
    pub scheduler: Arc<SettlementScheduler>,
    pub telegram: Arc<TelegramClient>,
}

pub async fn initialize_app(config: &Config) -> AppResult<App> {
    info!("Initializing application components ...");

    let calendar = Calendar::new(config.utc_offset_minutes);
    let store = initialize_store(config.database_url.as_deref()).await?;

    // Chat provider
    let token = config.resolve_bot_token()?;
    let telegram = Arc::new(TelegramClient::new(
        &config.bot_api_url,
        &token,
        Duration::from_secs(config.request_timeout_secs),
    )?);

    // Domain services
    let accounts = Arc::new(AccountDirectory::new(store.clone())?);
    let estimates = Arc::new(EstimateAggregator::new(store.clone(), calendar));
    let expenses = Arc::new(ExpenseAggregator::new(store.clone(), calendar));
    let ledger = Arc::new(LedgerQueries::new(store.clone(), calendar));
    let engine = Arc::new(SettlementEngine::new(
        accounts.clone(),
        estimates.clone(),
        expenses.clone(),
        ledger,
        calendar,
    ));
    info!("✓ Settlement engine ready");

    // Dispatch pipeline
    let grammar = Arc::new(CommandGrammar::new(&config.bot_handle)?);
    let executor = Arc::new(CommandExecutor::new(
        accounts,
        estimates,
        expenses,
        engine.clone(),
        config.bot_handle.clone(),
        config.owner_id,
        config.guest_charge,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        FilterChain::standard(grammar.clone(), config.group_id),
        grammar,
        executor,
        telegram.clone(),
    ));
    info!("✓ Dispatcher ready for {} in group {}", config.bot_handle, config.group_id);

    let scheduler = Arc::new(SettlementScheduler::new(
        ScheduleConfig {
            execution_hour: config.adjust_hour,
            group_id: config.group_id,
        },
        engine,
        telegram.clone(),
    ));

    Ok(App {
        state: AppState {
            scheduler: scheduler.clone(),
            store,
        },
        dispatcher,
        scheduler,
        telegram,
    })
}

/// Postgres when a URL is configured, otherwise a process-local store
async fn initialize_store(database_url: Option<&str>) -> AppResult<Arc<dyn LedgerStore>> {
    match database_url {
        Some(url) => {
            let pool = initialize_database(url).await?;
            Ok(Arc::new(PgStore::new(pool, RecordKind::Accounts)))
        }
        None => {
            warn!("⚠️  DATABASE_URL not set - using the in-memory store, data is lost on exit");
            Ok(Arc::new(MemoryStore::new(RecordKind::Accounts)))
        }
    }
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .map_err(StoreError::from)?;

    info!("✓ Database pool configured: 20 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| AppError::Store(StoreError::from(e)))?;

    info!("✓ Database initialized");
    Ok(pool)
}
