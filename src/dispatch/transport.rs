use async_trait::async_trait;

use crate::dispatch::poll::AvailabilityPoll;
use crate::dispatch::response::BotResponse;
use crate::dispatch::update::BotUpdate;
use crate::error::AppResult;

/// Pull side of the chat provider
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Updates with id >= `offset`, oldest first
    async fn fetch_updates(&self, offset: i64) -> AppResult<Vec<BotUpdate>>;
}

/// Push side of the chat provider
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, response: &BotResponse) -> AppResult<()>;

    async fn send_poll(&self, chat_id: i64, poll: &AvailabilityPoll) -> AppResult<()>;
}
