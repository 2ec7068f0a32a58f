// Pure settlement arithmetic. Amounts are whole currency units; intermediate
// values stay in Decimal and are rounded half away from zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub fn round_units(value: Decimal) -> i64 {
    let rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// What is still owed for the month, spread over the days left including today
pub fn daily_equity_pool(monthly_expense: i64, recovered: i64, remaining_days: u32) -> Decimal {
    let remaining = Decimal::from(remaining_days.max(1));
    (Decimal::from(monthly_expense) - Decimal::from(recovered)) / remaining
}

/// Share of today's pool for a participant; `total_pledged` must be positive
pub fn participant_debit(pool: Decimal, pledged: i64, total_pledged: i64) -> i64 {
    if total_pledged <= 0 {
        return 0;
    }
    let share = Decimal::from(pledged) / Decimal::from(total_pledged);
    round_units(pool * share)
}

/// Expected share of the month's expense for a single day
pub fn expected_daily_pool(monthly_expense: i64, remaining_days: u32) -> i64 {
    round_units(Decimal::from(monthly_expense) / Decimal::from(remaining_days.max(1)))
}

/// Per attendee correction; `None` when there is nothing to spread it over
pub fn deficit_per_head(expected: i64, actual: i64, attendees: i64) -> Option<i64> {
    if attendees <= 0 || actual == 0 {
        return None;
    }
    Some(round_units(
        Decimal::from(expected - actual) / Decimal::from(attendees),
    ))
}
