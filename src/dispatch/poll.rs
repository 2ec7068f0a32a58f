use chrono::NaiveDate;
use serde::Serialize;

use crate::ledger::period::{days_in_month, next_month};

/// Fixed answers, in the order they appear in the poll
pub const OPTIONS: [&str; 4] = ["All days", "15 days", "Only on weekends", "Out for the month"];

/// Monthly availability poll posted to the group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityPoll {
    pub question: String,
    pub options: Vec<String>,
    pub is_anonymous: bool,
}

impl AvailabilityPoll {
    /// Poll asking about the month after `today`
    pub fn for_month_after(today: NaiveDate) -> Self {
        let month = next_month(today);
        Self {
            question: format!("Availability for {} ?", month.format("%B %Y")),
            options: OPTIONS.iter().map(|o| o.to_string()).collect(),
            is_anonymous: false,
        }
    }
}

/// Pledged days for a poll option, capped at the month's length
pub fn playdays_for_option(option: u32, day: NaiveDate) -> Option<u32> {
    let days = match option {
        0 => 30,
        1 => 15,
        2 => 8,
        3 => 0,
        _ => return None,
    };
    Some(days.min(days_in_month(day)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_is_about_next_month() {
        let poll = AvailabilityPoll::for_month_after(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(poll.question, "Availability for January 2025 ?");
        assert_eq!(poll.options.len(), 4);
    }

    #[test]
    fn test_option_mapping_clamped() {
        let feb = NaiveDate::from_ymd_opt(2023, 2, 10).unwrap();
        assert_eq!(playdays_for_option(0, feb), Some(28));
        assert_eq!(playdays_for_option(1, feb), Some(15));
        assert_eq!(playdays_for_option(2, feb), Some(8));
        assert_eq!(playdays_for_option(3, feb), Some(0));
        assert_eq!(playdays_for_option(4, feb), None);
    }
}
