use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::messages;

/// Description tag marking an attendance debit
pub const PLAYDAY_DESC: &str = "playday";

/// Description tag of a dues payment credit
pub const CLEAR_DUES_DESC: &str = "Clearing dues..";

/// Participant identity as issued by the chat provider
pub type IdentityKey = i64;

/// Document field names shared by the store queries
pub mod fields {
    pub const IDENTITY: &str = "tid";
    pub const EMAIL: &str = "email";
    pub const NAME: &str = "name";
    pub const ELEVATION: &str = "elevtn";
    pub const ARCHIVED: &str = "archived";
    pub const PLAYDAYS: &str = "plydys";
    pub const AMOUNT: &str = "inr";
    pub const CREDIT: &str = "credit";
    pub const DEBIT: &str = "debit";
    pub const DESC: &str = "desc";
    pub const DATE: &str = "dttm";
}

/// Four record kinds the ledger persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Accounts,
    Estimates,
    Expenses,
    Transactions,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Accounts => "accounts",
            RecordKind::Estimates => "estimates",
            RecordKind::Expenses => "expenses",
            RecordKind::Transactions => "transacs",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Privilege level, strictly ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Elevation {
    Participant = 0,
    Manager = 1,
    Admin = 2,
}

impl Elevation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Elevation::Participant => "participant",
            Elevation::Manager => "manager",
            Elevation::Admin => "admin",
        }
    }

    /// Next level up, none at the ceiling
    pub fn next(&self) -> Option<Elevation> {
        Elevation::try_from(u8::from(*self) + 1).ok()
    }
}

impl From<Elevation> for u8 {
    fn from(value: Elevation) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Elevation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Elevation::Participant),
            1 => Ok(Elevation::Manager),
            2 => Ok(Elevation::Admin),
            other => Err(format!("elevation {} is out of range", other)),
        }
    }
}

impl fmt::Display for Elevation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub tid: IdentityKey,
    pub email: String,
    pub name: String,
    #[serde(rename = "elevtn")]
    pub elevation: Elevation,
    pub archived: bool,
}

impl Account {
    pub fn new(tid: IdentityKey, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tid,
            email: email.into(),
            name: name.into(),
            elevation: Elevation::Participant,
            archived: false,
        }
    }

    pub fn to_message(&self) -> String {
        format!(
            "Hi, {}\n{} Registered with us\n{}\t{}\n{}\t{}\n{}\t{}",
            self.name,
            messages::GREEN_TICK,
            messages::EMAIL,
            self.email,
            messages::BADGE,
            self.tid,
            messages::SHIELD,
            self.elevation
        )
    }
}

/// A participant's pledged play days for one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub tid: IdentityKey,
    #[serde(rename = "plydys")]
    pub playdays: u32,
    #[serde(rename = "dttm")]
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub tid: IdentityKey,
    #[serde(rename = "inr")]
    pub amount: i64,
    pub desc: String,
    #[serde(rename = "dttm")]
    pub recorded_at: DateTime<Utc>,
}

/// Append-only money movement; balances are derived from these
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tid: IdentityKey,
    pub credit: i64,
    pub debit: i64,
    pub desc: String,
    #[serde(rename = "dttm")]
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn playday(tid: IdentityKey, debit: i64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            tid,
            credit: 0,
            debit,
            desc: PLAYDAY_DESC.to_string(),
            recorded_at,
        }
    }

    pub fn credit(
        tid: IdentityKey,
        amount: i64,
        desc: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tid,
            credit: amount,
            debit: 0,
            desc: desc.into(),
            recorded_at,
        }
    }

    pub fn is_playday(&self) -> bool {
        self.desc == PLAYDAY_DESC
    }

    pub fn to_message(&self) -> String {
        if self.credit > 0 {
            format!("{} credit {}{} : {}", messages::GREEN_TICK, messages::RUPEE, self.credit, self.desc)
        } else {
            format!("{} debit {}{} : {}", messages::WARNING, messages::RUPEE, self.debit, self.desc)
        }
    }
}

/// Credits minus debits for one participant over one month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub tid: IdentityKey,
    pub month: NaiveDate,
    pub credits: i64,
    pub debits: i64,
}

impl Balance {
    pub fn due(&self) -> i64 {
        self.credits - self.debits
    }

    pub fn to_message(&self) -> String {
        let due = self.due();
        if due < 0 {
            format!(
                "{} For {} you owe {}{}\ncredits {} / debits {}",
                messages::WARNING,
                self.month.format("%B %Y"),
                messages::RUPEE,
                -due,
                self.credits,
                self.debits
            )
        } else {
            format!(
                "{} For {} you are clear, balance {}{}\ncredits {} / debits {}",
                messages::GREEN_TICK,
                self.month.format("%B %Y"),
                messages::RUPEE,
                due,
                self.credits,
                self.debits
            )
        }
    }
}

/// Expense total for the month, per participant or team wide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyExpense {
    pub tid: Option<IdentityKey>,
    pub month: NaiveDate,
    pub total: i64,
}

impl MonthlyExpense {
    pub fn to_message(&self) -> String {
        match self.tid {
            Some(tid) => format!(
                "{} Expenses by {} in {}: {}{}",
                messages::GREEN_TICK,
                tid,
                self.month.format("%B %Y"),
                messages::RUPEE,
                self.total
            ),
            None => format!(
                "{} Team expenses in {}: {}{}",
                messages::GREEN_TICK,
                self.month.format("%B %Y"),
                messages::RUPEE,
                self.total
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_ordering_and_ceiling() {
        assert!(Elevation::Participant < Elevation::Manager);
        assert!(Elevation::Manager < Elevation::Admin);
        assert_eq!(Elevation::Participant.next(), Some(Elevation::Manager));
        assert_eq!(Elevation::Admin.next(), None);
        assert!(Elevation::try_from(3).is_err());
    }

    #[test]
    fn test_account_serializes_elevation_as_number() {
        let account = Account::new(42, "kim@example.com", "Kim");
        let value = serde_json::to_value(&account).unwrap();

        assert_eq!(value["elevtn"], 0);
        assert_eq!(value["archived"], false);
        assert_eq!(value[fields::IDENTITY], 42);
    }

    #[test]
    fn test_balance_due() {
        let balance = Balance {
            tid: 1,
            month: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            credits: 500,
            debits: 720,
        };
        assert_eq!(balance.due(), -220);
        assert!(balance.to_message().contains("you owe"));
    }
}
