//! Chat facing text. Internal causes never end up in here.

pub const WARNING: char = '\u{26A0}';
pub const RED_CROSS: char = '\u{274C}';
pub const GREEN_TICK: char = '\u{2705}';
pub const ROBOT: char = '\u{1F916}';
pub const EMAIL: char = '\u{1F4E7}';
pub const BADGE: char = '\u{1FAAA}';
pub const SHIELD: char = '\u{1F6E1}';
pub const RECYCLE: char = '\u{267B}';
pub const WILTED: char = '\u{1F940}';
pub const RUPEE: char = '\u{20B9}';
pub const QUESTION: char = '\u{2753}';

pub fn try_again() -> String {
    "Yikes! your command did not work as expected. Try to run again after a while, or if the problem persists kindly contact a sys-admin.".to_string()
}

pub fn failed_query(operation: &str) -> String {
    format!(
        "{} Internal operation: '{}' failed, try after some time\nIf this continues you may have to contact an administrator",
        WILTED, operation
    )
}

pub fn gateway_failed() -> String {
    format!(
        "{} A gateway has failed, and hence aborting your command for now. Check with an admin",
        RED_CROSS
    )
}

pub fn account_not_found(id: i64) -> String {
    format!(
        "{} No account found associated with the ID {}\nUse /registerme command to register first & then proceed",
        WARNING, id
    )
}

pub fn invalid_field(reason: &str) -> String {
    format!("{} There was a problem: {}", WARNING, reason)
}

pub fn duplicate_account(id: i64, email: &str) -> String {
    format!(
        "{} Account with ID {} or Email {} is already registered & active. Cannot register again.",
        RED_CROSS, id, email
    )
}

pub fn account_reactivated(id: i64) -> String {
    format!(
        "{} Account with ID {} was found archived, reactivated the account",
        RECYCLE, id
    )
}

pub fn elevation_ceiling() -> String {
    format!(
        "{} Account is at the highest elevation, cannot elevate any further",
        RED_CROSS
    )
}

pub fn unauthorized() -> String {
    format!(
        "{} Only an admin can elevate other accounts",
        RED_CROSS
    )
}

pub fn zero_playdays() -> String {
    format!(
        "{} Zero play days isnt something I expected, either nobody answered the poll or the data has gone bad.",
        WARNING
    )
}

pub fn missing_estimate() -> String {
    format!(
        "{} Either you have opted out of play or havent answered the poll",
        WARNING
    )
}

pub fn duplicate_attendance() -> String {
    format!("{} You seem to have already marked your attendance?", WARNING)
}

pub fn callout_hint() -> String {
    format!(
        "{} Did you mean to command me? This isn't a valid command",
        QUESTION
    )
}

pub fn noted() -> String {
    format!("{} Noted", GREEN_TICK)
}

pub fn guest_charged(charge: i64) -> String {
    format!(
        "{} You would be charged a default of {}{}/day",
        GREEN_TICK, RUPEE, charge
    )
}

pub fn help(handle: &str) -> String {
    let commands = [
        "/registerme <email>",
        "/editme <new-email>",
        "/myinfo",
        "/deregisterme",
        "/elevateacc <TelegramID>",
        "/addexpense <INR> <remarks>",
        "/paydues <INR>",
        "/mydues",
        "/myexpenses",
        "/allexpenses",
        "/help",
    ];
    let mut text = format!("{} Team dues bot\n\nCommands:", ROBOT);
    for command in commands {
        text.push('\n');
        text.push_str(handle);
        text.push(' ');
        text.push_str(command);
    }
    text.push_str("\nSay 'gm' or 'good morning' to mark your attendance");
    text
}
