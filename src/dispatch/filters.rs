use std::sync::Arc;

use tracing::debug;

use crate::dispatch::grammar::CommandGrammar;
use crate::dispatch::update::BotUpdate;

/// Which parser an update is handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PollAnswer,
    Command,
    Callout,
    Greeting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub matched: bool,
    pub stop: bool,
}

impl Verdict {
    fn pass(matched: bool) -> Self {
        Self {
            matched,
            stop: false,
        }
    }

    fn terminal(matched: bool) -> Self {
        Self {
            matched,
            stop: matched,
        }
    }
}

/// Pure classifier over a single update.
///
/// Filters without a route are gates: an update that fails one is dropped.
pub trait UpdateFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn route(&self) -> Option<Route>;

    fn check(&self, update: &BotUpdate) -> Verdict;
}

pub struct PollAnswerFilter;

impl UpdateFilter for PollAnswerFilter {
    fn name(&self) -> &'static str {
        "poll_answer"
    }

    fn route(&self) -> Option<Route> {
        Some(Route::PollAnswer)
    }

    fn check(&self, update: &BotUpdate) -> Verdict {
        let matched = update
            .poll_answer
            .as_ref()
            .map(|a| !a.poll_id.is_empty())
            .unwrap_or(false);
        Verdict::terminal(matched)
    }
}

/// Only the configured group conversation is served
pub struct GroupConversationFilter {
    pub group_id: i64,
}

impl UpdateFilter for GroupConversationFilter {
    fn name(&self) -> &'static str {
        "group_conversation"
    }

    fn route(&self) -> Option<Route> {
        None
    }

    fn check(&self, update: &BotUpdate) -> Verdict {
        Verdict::pass(update.chat_id() == Some(self.group_id))
    }
}

pub struct NonZeroIdFilter;

impl UpdateFilter for NonZeroIdFilter {
    fn name(&self) -> &'static str {
        "non_zero_ids"
    }

    fn route(&self) -> Option<Route> {
        None
    }

    fn check(&self, update: &BotUpdate) -> Verdict {
        let ids_present = update.update_id != 0
            && update.message_id().map(|id| id != 0).unwrap_or(false)
            && update.sender().map(|u| u.id != 0).unwrap_or(false);
        Verdict::pass(ids_present)
    }
}

pub struct BotCommandFilter {
    pub grammar: Arc<CommandGrammar>,
}

impl UpdateFilter for BotCommandFilter {
    fn name(&self) -> &'static str {
        "bot_command"
    }

    fn route(&self) -> Option<Route> {
        Some(Route::Command)
    }

    fn check(&self, update: &BotUpdate) -> Verdict {
        Verdict::terminal(update.text().map(|t| self.grammar.is_command(t)).unwrap_or(false))
    }
}

/// Mentions the bot without being a valid command
pub struct BotCalloutFilter {
    pub grammar: Arc<CommandGrammar>,
}

impl UpdateFilter for BotCalloutFilter {
    fn name(&self) -> &'static str {
        "bot_callout"
    }

    fn route(&self) -> Option<Route> {
        Some(Route::Callout)
    }

    fn check(&self, update: &BotUpdate) -> Verdict {
        Verdict::terminal(update.text().map(|t| self.grammar.is_callout(t)).unwrap_or(false))
    }
}

pub struct GreetingFilter {
    pub grammar: Arc<CommandGrammar>,
}

impl UpdateFilter for GreetingFilter {
    fn name(&self) -> &'static str {
        "greeting"
    }

    fn route(&self) -> Option<Route> {
        Some(Route::Greeting)
    }

    fn check(&self, update: &BotUpdate) -> Verdict {
        Verdict::terminal(update.text().map(|t| self.grammar.is_greeting(t)).unwrap_or(false))
    }
}

/// Ordered filters; classification of one update is a single pass
pub struct FilterChain {
    filters: Vec<Box<dyn UpdateFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn UpdateFilter>>) -> Self {
        Self { filters }
    }

    /// The chain the bot runs with
    pub fn standard(grammar: Arc<CommandGrammar>, group_id: i64) -> Self {
        Self::new(vec![
            Box::new(PollAnswerFilter),
            Box::new(GroupConversationFilter { group_id }),
            Box::new(NonZeroIdFilter),
            Box::new(BotCommandFilter {
                grammar: grammar.clone(),
            }),
            Box::new(BotCalloutFilter {
                grammar: grammar.clone(),
            }),
            Box::new(GreetingFilter { grammar }),
        ])
    }

    /// Routes for the update in filter order; empty means dropped
    pub fn classify(&self, update: &BotUpdate) -> Vec<Route> {
        let mut routes = Vec::new();
        for filter in &self.filters {
            let verdict = filter.check(update);
            match filter.route() {
                None if !verdict.matched => {
                    debug!(
                        update_id = update.update_id,
                        filter = filter.name(),
                        "update dropped by gate"
                    );
                    return Vec::new();
                }
                None => {}
                Some(route) if verdict.matched => routes.push(route),
                Some(_) => {}
            }
            if verdict.stop {
                break;
            }
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::update::{Chat, Message, PollAnswer, User};

    const GROUP: i64 = -100;

    fn chain() -> FilterChain {
        FilterChain::standard(Arc::new(CommandGrammar::new("@dues_bot").unwrap()), GROUP)
    }

    fn message(chat: i64, message_id: i64, text: &str) -> BotUpdate {
        BotUpdate {
            update_id: 7,
            message: Some(Message {
                message_id,
                from: Some(User {
                    id: 11,
                    ..Default::default()
                }),
                chat: Chat {
                    id: chat,
                    kind: "group".to_string(),
                },
                text: Some(text.to_string()),
            }),
            poll_answer: None,
        }
    }

    #[test]
    fn test_routes() {
        let chain = chain();
        assert_eq!(
            chain.classify(&message(GROUP, 1, "@dues_bot /help")),
            vec![Route::Command]
        );
        assert_eq!(
            chain.classify(&message(GROUP, 1, "@dues_bot are you there")),
            vec![Route::Callout]
        );
        assert_eq!(
            chain.classify(&message(GROUP, 1, "good morning")),
            vec![Route::Greeting]
        );
    }

    #[test]
    fn test_drops() {
        let chain = chain();
        assert!(chain.classify(&message(-999, 1, "@dues_bot /help")).is_empty());
        assert!(chain.classify(&message(GROUP, 0, "gm")).is_empty());
        assert!(chain.classify(&message(GROUP, 1, "lunch anyone?")).is_empty());
    }

    #[test]
    fn test_poll_answer_bypasses_group_gate() {
        let update = BotUpdate {
            update_id: 8,
            message: None,
            poll_answer: Some(PollAnswer {
                poll_id: "p1".to_string(),
                user: Some(User {
                    id: 11,
                    ..Default::default()
                }),
                option_ids: vec![0],
            }),
        };
        assert_eq!(chain().classify(&update), vec![Route::PollAnswer]);

        let empty = BotUpdate {
            poll_answer: Some(PollAnswer::default()),
            ..update
        };
        assert!(chain().classify(&empty).is_empty());
    }
}
