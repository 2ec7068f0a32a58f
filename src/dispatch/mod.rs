pub mod command;
pub mod executor;
pub mod filters;
pub mod grammar;
pub mod poll;
pub mod response;
pub mod transport;
pub mod update;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use command::BotCommand;
use filters::Route;
use transport::{Messenger, UpdateSource};
use update::BotUpdate;

pub use executor::CommandExecutor;
pub use filters::FilterChain;
pub use grammar::CommandGrammar;

/// Classifies fetched updates and runs each resulting command on its own task
pub struct Dispatcher {
    chain: FilterChain,
    grammar: Arc<CommandGrammar>,
    executor: Arc<CommandExecutor>,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(
        chain: FilterChain,
        grammar: Arc<CommandGrammar>,
        executor: Arc<CommandExecutor>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            chain,
            grammar,
            executor,
            messenger,
        }
    }

    /// Commands for one update, in filter order
    pub fn classify(&self, update: &BotUpdate) -> Vec<BotCommand> {
        debug!(update_id = update.update_id, state = "received");

        let commands: Vec<BotCommand> = self
            .chain
            .classify(update)
            .into_iter()
            .filter_map(|route| match route {
                Route::PollAnswer => self.grammar.parse_poll_answer(update),
                Route::Command => self.grammar.parse_command(update),
                Route::Callout => self.grammar.parse_callout(update),
                Route::Greeting => self.grammar.parse_greeting(update),
            })
            .collect();

        if commands.is_empty() {
            debug!(update_id = update.update_id, state = "dropped");
        }
        for command in &commands {
            debug!(
                update_id = update.update_id,
                state = "classified",
                category = ?command.category(),
                command = command.name()
            );
        }
        commands
    }

    /// Classifies the batch in arrival order, then spawns one task per command
    pub fn dispatch(&self, updates: Vec<BotUpdate>) -> Vec<JoinHandle<()>> {
        let commands: Vec<BotCommand> = updates.iter().flat_map(|u| self.classify(u)).collect();
        commands.into_iter().map(|command| self.spawn(command)).collect()
    }

    fn spawn(&self, command: BotCommand) -> JoinHandle<()> {
        let executor = self.executor.clone();
        let messenger = self.messenger.clone();

        tokio::spawn(async move {
            let update_id = command.update_id();
            let name = command.name();
            debug!(update_id, command = name, state = "executing");

            let Some(response) = executor.execute(command, Utc::now()).await else {
                return;
            };
            match messenger.send_message(&response).await {
                Ok(()) => debug!(
                    update_id,
                    command = name,
                    failed = response.is_error(),
                    state = "responded"
                ),
                Err(e) => warn!(update_id, command = name, error = %e, "❌ Failed to send response"),
            }
        })
    }

    /// Long-polls `source` until cancelled, advancing the offset past each batch
    pub async fn run(
        self: Arc<Self>,
        source: Arc<dyn UpdateSource>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        info!("🔄 Update dispatcher started");
        let mut offset = 0i64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = source.fetch_updates(offset) => match fetched {
                    Ok(updates) => {
                        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
                            offset = offset.max(last + 1);
                        }
                        if !updates.is_empty() {
                            debug!(count = updates.len(), offset, "Fetched updates");
                        }
                        self.dispatch(updates);
                    }
                    Err(e) => warn!(error = %e, offset, "❌ Failed to fetch updates"),
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("🛑 Update dispatcher stopped");
    }
}
