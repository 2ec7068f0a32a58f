use regex::{Captures, Regex};

use crate::dispatch::command::{BotCommand, Origin};
use crate::dispatch::update::BotUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Register,
    EditEmail,
    ShowInfo,
    Deregister,
    Elevate,
    AddExpense,
    PayDues,
    MyDues,
    MyExpenses,
    AllExpenses,
    Help,
}

const VERBS: &[(Verb, &str)] = &[
    (Verb::Register, r"/registerme\s+(?P<email>\S+)"),
    (Verb::EditEmail, r"/editme\s+(?P<email>\S+)"),
    (Verb::ShowInfo, r"/myinfo"),
    (Verb::Deregister, r"/deregisterme"),
    (Verb::Elevate, r"/elevateacc\s+(?P<target>-?\d+)"),
    (Verb::AddExpense, r"/addexpense\s+(?P<amount>\d+)\s+(?P<desc>.+?)"),
    (Verb::PayDues, r"/paydues\s+(?P<amount>\d+)"),
    (Verb::MyDues, r"/mydues"),
    (Verb::MyExpenses, r"/myexpenses?"),
    (Verb::AllExpenses, r"/allexpenses"),
    (Verb::Help, r"/help"),
];

const GREETING: &str = r"(?i)^\s*(gm|good\s*morning)\b";

/// Compiled command patterns for one bot handle.
///
/// Built once at start-up and shared read-only.
#[derive(Debug)]
pub struct CommandGrammar {
    handle: String,
    commands: Vec<(Verb, Regex)>,
    greeting: Regex,
}

impl CommandGrammar {
    pub fn new(handle: &str) -> Result<Self, regex::Error> {
        let prefix = format!(r"^\s*{}\s+", regex::escape(handle));
        let commands = VERBS
            .iter()
            .map(|(verb, pattern)| {
                Regex::new(&format!(r"{}{}\s*$", prefix, pattern)).map(|re| (*verb, re))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            handle: handle.to_string(),
            commands,
            greeting: Regex::new(GREETING)?,
        })
    }

    pub fn is_command(&self, text: &str) -> bool {
        self.commands.iter().any(|(_, re)| re.is_match(text))
    }

    pub fn is_callout(&self, text: &str) -> bool {
        text.contains(self.handle.as_str())
    }

    pub fn is_greeting(&self, text: &str) -> bool {
        self.greeting.is_match(text)
    }

    fn origin(update: &BotUpdate) -> Option<Origin> {
        let message = update.message.as_ref()?;
        Some(Origin {
            update_id: update.update_id,
            chat_id: message.chat.id,
            message_id: message.message_id,
            sender: message.from.as_ref()?.id,
        })
    }

    /// Typed command for a message addressed to the bot.
    ///
    /// A matched verb whose arguments do not convert (e.g. an amount that
    /// overflows) comes back as `Unrecognized` so the sender still gets a reply.
    pub fn parse_command(&self, update: &BotUpdate) -> Option<BotCommand> {
        let origin = Self::origin(update)?;
        let text = update.text()?;
        let (verb, caps) = self
            .commands
            .iter()
            .find_map(|(verb, re)| re.captures(text).map(|caps| (*verb, caps)))?;

        Some(
            Self::typed(verb, &caps, origin, update)
                .unwrap_or(BotCommand::Unrecognized { origin }),
        )
    }

    fn typed(verb: Verb, caps: &Captures, origin: Origin, update: &BotUpdate) -> Option<BotCommand> {
        let arg = |caps: &Captures, name: &str| caps.name(name).map(|m| m.as_str().to_string());
        let command = match verb {
            Verb::Register => BotCommand::Register {
                origin,
                email: arg(caps, "email")?,
                name: update.sender().map(|u| u.display_name()).unwrap_or_default(),
            },
            Verb::EditEmail => BotCommand::EditEmail {
                origin,
                email: arg(caps, "email")?,
            },
            Verb::ShowInfo => BotCommand::ShowInfo { origin },
            Verb::Deregister => BotCommand::Deregister { origin },
            Verb::Elevate => BotCommand::Elevate {
                origin,
                target: arg(caps, "target")?.parse().ok()?,
            },
            Verb::AddExpense => BotCommand::AddExpense {
                origin,
                amount: arg(caps, "amount")?.parse().ok()?,
                desc: arg(caps, "desc")?,
            },
            Verb::PayDues => BotCommand::PayDues {
                origin,
                amount: arg(caps, "amount")?.parse().ok()?,
            },
            Verb::MyDues => BotCommand::ShowMyDues { origin },
            Verb::MyExpenses => BotCommand::ShowMyExpenses { origin },
            Verb::AllExpenses => BotCommand::ShowTeamExpenses { origin },
            Verb::Help => BotCommand::Help { origin },
        };
        Some(command)
    }

    pub fn parse_greeting(&self, update: &BotUpdate) -> Option<BotCommand> {
        let origin = Self::origin(update)?;
        if self.is_greeting(update.text()?) {
            Some(BotCommand::MarkAttendance { origin })
        } else {
            None
        }
    }

    pub fn parse_callout(&self, update: &BotUpdate) -> Option<BotCommand> {
        Self::origin(update).map(|origin| BotCommand::Unrecognized { origin })
    }

    /// First selected option of a poll answer
    pub fn parse_poll_answer(&self, update: &BotUpdate) -> Option<BotCommand> {
        let answer = update.poll_answer.as_ref()?;
        Some(BotCommand::PollAnswer {
            update_id: update.update_id,
            participant: answer.user.as_ref()?.id,
            option: *answer.option_ids.first()?,
        })
    }
}
