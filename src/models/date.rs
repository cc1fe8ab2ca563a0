//! Date parsing and calendar helpers shared by the recurrence engine
//! and the CLI.
//!
//! Dates are plain `chrono::NaiveDate`; "no date" is `None`.

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};

/// Scan horizon for recurrence searches. Rules that never match still
/// terminate here.
pub const RECUR_HORIZON: (i32, u32, u32) = (2050, 1, 1);

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Resolves a user-supplied date token relative to the current day.
///
/// Accepts ISO `yyyy-mm-dd`, `today`/`tod`, `tomorrow`/`tom`, or a weekday
/// name (meaning the next such weekday strictly after today). Returns
/// `None` for empty input and the explicit `no date` / `no-date` tokens.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    parse_date_on(input, today())
}

/// Same as [`parse_date`], with an explicit "today" for deterministic tests.
pub fn parse_date_on(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let input = input.trim().to_lowercase();

    match input.as_str() {
        "" | "no date" | "no-date" => return None,
        "today" | "tod" => return Some(today),
        "tomorrow" | "tom" => return Some(today + Duration::days(1)),
        _ => {}
    }

    // ISO date, ignoring anything after the tenth character.
    let head = input.get(..10).unwrap_or(&input);
    if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
        return Some(date);
    }

    let weekday = parse_weekday(&input)?;
    Some(today + Duration::days(days_until_weekday(today.weekday(), weekday)))
}

/// Days to add to move from `current` to the next `wanted` weekday,
/// always at least one.
fn days_until_weekday(current: Weekday, wanted: Weekday) -> i64 {
    let mut days =
        wanted.num_days_from_monday() as i64 - current.num_days_from_monday() as i64;
    if days <= 0 {
        days += 7;
    }

    days
}

pub fn parse_weekday(input: &str) -> Option<Weekday> {
    match input.trim().to_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_label(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Dedups and orders a weekday set canonically: Monday through Saturday,
/// Sunday last.
pub fn sort_weekdays(mut weekdays: Vec<Weekday>) -> Vec<Weekday> {
    weekdays.sort_by_key(|wd| wd.num_days_from_monday());
    weekdays.dedup();

    weekdays
}

/// Steps `date` forward by `months` calendar months. Month overflow
/// carries into the next year; day overflow rolls into the following
/// month (Jan 31 + 1 month = Mar 3).
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let total = date.month0() + months;
    let year = date.year() + (total / 12) as i32;
    let month = total % 12 + 1;
    let day = date.day();

    if let Some(result) = NaiveDate::from_ymd_opt(year, month, day) {
        return result;
    }

    // Requested day does not exist in the target month.
    let last = last_day_of_month(year, month);
    last + Duration::days((day - last.day()) as i64)
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };

    // The first of a month always exists.
    first_of_next.unwrap() - Duration::days(1)
}
