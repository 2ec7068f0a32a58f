use crate::ledger::models::IdentityKey;

/// Where a command came from and where its reply goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub update_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub sender: IdentityKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Account,
    Settlement,
    PollAnswer,
    Unrecognized,
}

/// Every action the bot understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Register { origin: Origin, email: String, name: String },
    EditEmail { origin: Origin, email: String },
    ShowInfo { origin: Origin },
    Deregister { origin: Origin },
    Elevate { origin: Origin, target: IdentityKey },
    Help { origin: Origin },
    AddExpense { origin: Origin, amount: i64, desc: String },
    PayDues { origin: Origin, amount: i64 },
    ShowMyDues { origin: Origin },
    ShowMyExpenses { origin: Origin },
    ShowTeamExpenses { origin: Origin },
    MarkAttendance { origin: Origin },
    PollAnswer { update_id: i64, participant: IdentityKey, option: u32 },
    /// Addressed to the bot but not a valid command
    Unrecognized { origin: Origin },
}

impl BotCommand {
    pub fn category(&self) -> Category {
        match self {
            BotCommand::Register { .. }
            | BotCommand::EditEmail { .. }
            | BotCommand::ShowInfo { .. }
            | BotCommand::Deregister { .. }
            | BotCommand::Elevate { .. }
            | BotCommand::Help { .. } => Category::Account,
            BotCommand::AddExpense { .. }
            | BotCommand::PayDues { .. }
            | BotCommand::ShowMyDues { .. }
            | BotCommand::ShowMyExpenses { .. }
            | BotCommand::ShowTeamExpenses { .. }
            | BotCommand::MarkAttendance { .. } => Category::Settlement,
            BotCommand::PollAnswer { .. } => Category::PollAnswer,
            BotCommand::Unrecognized { .. } => Category::Unrecognized,
        }
    }

    /// None for poll answers, which never get a reply
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            BotCommand::Register { origin, .. }
            | BotCommand::EditEmail { origin, .. }
            | BotCommand::ShowInfo { origin }
            | BotCommand::Deregister { origin }
            | BotCommand::Elevate { origin, .. }
            | BotCommand::Help { origin }
            | BotCommand::AddExpense { origin, .. }
            | BotCommand::PayDues { origin, .. }
            | BotCommand::ShowMyDues { origin }
            | BotCommand::ShowMyExpenses { origin }
            | BotCommand::ShowTeamExpenses { origin }
            | BotCommand::MarkAttendance { origin }
            | BotCommand::Unrecognized { origin } => Some(origin),
            BotCommand::PollAnswer { .. } => None,
        }
    }

    /// Participant the command acts for
    pub fn sender(&self) -> IdentityKey {
        match self {
            BotCommand::PollAnswer { participant, .. } => *participant,
            other => other.origin().map(|o| o.sender).unwrap_or_default(),
        }
    }

    pub fn update_id(&self) -> i64 {
        match self {
            BotCommand::PollAnswer { update_id, .. } => *update_id,
            other => other.origin().map(|o| o.update_id).unwrap_or_default(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::Register { .. } => "register",
            BotCommand::EditEmail { .. } => "edit_email",
            BotCommand::ShowInfo { .. } => "show_info",
            BotCommand::Deregister { .. } => "deregister",
            BotCommand::Elevate { .. } => "elevate",
            BotCommand::Help { .. } => "help",
            BotCommand::AddExpense { .. } => "add_expense",
            BotCommand::PayDues { .. } => "pay_dues",
            BotCommand::ShowMyDues { .. } => "show_my_dues",
            BotCommand::ShowMyExpenses { .. } => "show_my_expenses",
            BotCommand::ShowTeamExpenses { .. } => "show_team_expenses",
            BotCommand::MarkAttendance { .. } => "mark_attendance",
            BotCommand::PollAnswer { .. } => "poll_answer",
            BotCommand::Unrecognized { .. } => "unrecognized",
        }
    }
}
