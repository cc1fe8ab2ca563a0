//! Recurrence rules: decide whether a repeating item occurs on a given
//! calendar date and find its next occurrence.
//!
//! The canonical text form is `"<start-date>, <variant>"`, for example
//! `2024-01-01, daily` or `2021-01-31, weekly, wednesday & sunday`.
//! `Display` and [`Recur::parse`] are inverses for every constructible
//! value.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use super::date::{
    add_months, parse_date, parse_weekday, sort_weekdays, weekday_label, RECUR_HORIZON,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recur {
    Daily {
        start: NaiveDate,
    },
    EveryNDays {
        start: NaiveDate,
        n: u32,
    },
    Weekly {
        start: NaiveDate,
        /// Non-empty, de-duplicated, Monday..Saturday with Sunday last.
        weekdays: Vec<Weekday>,
    },
    EveryNWeeks {
        start: NaiveDate,
        n: u32,
    },
    EveryNMonths {
        start: NaiveDate,
        n: u32,
    },
}

impl Recur {
    /// Parses the canonical rule text. The first comma-separated term is a
    /// date token (ISO, `today`, `tomorrow`, weekday name); the remaining
    /// terms are matched against the variant grammars in fixed order, first
    /// match wins. Returns `None` when nothing matches.
    pub fn parse(input: &str) -> Option<Recur> {
        let mut terms = input.split(',');
        let start = parse_date(terms.next()?)?;
        let terms: Vec<&str> = terms.map(str::trim).collect();
        if terms.is_empty() {
            return None;
        }

        parse_daily(start, &terms)
            .or_else(|| parse_every_n(start, &terms, "days"))
            .or_else(|| parse_weekly(start, &terms))
            .or_else(|| parse_every_n(start, &terms, "weeks"))
            .or_else(|| parse_every_n(start, &terms, "months"))
    }

    pub fn start(&self) -> NaiveDate {
        match self {
            Recur::Daily { start }
            | Recur::EveryNDays { start, .. }
            | Recur::Weekly { start, .. }
            | Recur::EveryNWeeks { start, .. }
            | Recur::EveryNMonths { start, .. } => *start,
        }
    }

    /// Whether the rule produces an occurrence on `date`.
    pub fn recurs_on(&self, date: NaiveDate) -> bool {
        match self {
            Recur::Daily { start } => date >= *start,
            Recur::EveryNDays { start, n } => {
                date >= *start && (date - *start).num_days() % i64::from(*n) == 0
            }
            Recur::Weekly { start, weekdays } => {
                date >= *start && weekdays.contains(&date.weekday())
            }
            Recur::EveryNWeeks { start, n } => {
                date >= *start && (date - *start).num_days() % (7 * i64::from(*n)) == 0
            }
            Recur::EveryNMonths { start, n } => {
                if date < *start {
                    return false;
                }
                let mut candidate = *start;
                loop {
                    if candidate == date {
                        return true;
                    }
                    if candidate > date {
                        return false;
                    }
                    candidate = add_months(candidate, *n);
                }
            }
        }
    }

    /// The first occurrence at or after the start date.
    pub fn first(&self) -> NaiveDate {
        self.first_after(self.start() - Duration::days(1))
    }

    /// The first occurrence strictly after `date`. Bounded by a fixed
    /// horizon so a rule that never matches still terminates.
    pub fn first_after(&self, date: NaiveDate) -> NaiveDate {
        let (y, m, d) = RECUR_HORIZON;
        let limit = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MAX);

        let mut date = date;
        loop {
            date += Duration::days(1);
            if self.recurs_on(date) || date >= limit {
                return date;
            }
        }
    }
}

fn parse_daily(start: NaiveDate, terms: &[&str]) -> Option<Recur> {
    if terms.first() != Some(&"daily") {
        return None;
    }

    Some(Recur::Daily { start })
}

/// `every <N> days|weeks|months`, as a single term. N below one is
/// rejected: a non-positive step would make `recurs_on` trivially true
/// or loop forever.
fn parse_every_n(start: NaiveDate, terms: &[&str], unit: &str) -> Option<Recur> {
    if terms.len() != 1 {
        return None;
    }

    let words: Vec<&str> = terms[0].split(' ').collect();
    if words.len() != 3 || words[0] != "every" || words[2] != unit {
        return None;
    }
    let n: u32 = words[1].parse().ok()?;
    if n < 1 {
        return None;
    }

    match unit {
        "days" => Some(Recur::EveryNDays { start, n }),
        "weeks" => Some(Recur::EveryNWeeks { start, n }),
        "months" => Some(Recur::EveryNMonths { start, n }),
        _ => None,
    }
}

/// `weekly, <day> & <day> & ...`. Unrecognized weekday tokens are
/// dropped; if none remain the grammar does not match.
fn parse_weekly(start: NaiveDate, terms: &[&str]) -> Option<Recur> {
    if terms.len() < 2 || terms[0] != "weekly" {
        return None;
    }

    let weekdays: Vec<Weekday> = terms[1].split('&').filter_map(parse_weekday).collect();
    if weekdays.is_empty() {
        return None;
    }

    Some(Recur::Weekly {
        start,
        weekdays: sort_weekdays(weekdays),
    })
}

impl fmt::Display for Recur {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recur::Daily { start } => write!(f, "{}, daily", start),
            Recur::EveryNDays { start, n } => write!(f, "{}, every {} days", start, n),
            Recur::Weekly { start, weekdays } => {
                let days: Vec<&str> = weekdays.iter().copied().map(weekday_label).collect();
                write!(f, "{}, weekly, {}", start, days.join(" & "))
            }
            Recur::EveryNWeeks { start, n } => write!(f, "{}, every {} weeks", start, n),
            Recur::EveryNMonths { start, n } => {
                write!(f, "{}, every {} months", start, n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_daily() {
        assert_eq!(
            Recur::parse("2024-01-01, daily"),
            Some(Recur::Daily {
                start: date(2024, 1, 1)
            })
        );
    }

    #[test]
    fn test_parse_every_n() {
        assert_eq!(
            Recur::parse("2024-01-01, every 3 days"),
            Some(Recur::EveryNDays {
                start: date(2024, 1, 1),
                n: 3
            })
        );
        assert_eq!(
            Recur::parse("2024-01-01, every 2 weeks"),
            Some(Recur::EveryNWeeks {
                start: date(2024, 1, 1),
                n: 2
            })
        );
        assert_eq!(
            Recur::parse("2024-01-01, every 6 months"),
            Some(Recur::EveryNMonths {
                start: date(2024, 1, 1),
                n: 6
            })
        );
    }

    #[test]
    fn test_parse_rejects_nonpositive_n() {
        assert_eq!(Recur::parse("2024-01-01, every 0 days"), None);
        assert_eq!(Recur::parse("2024-01-01, every -1 weeks"), None);
        assert_eq!(Recur::parse("2024-01-01, every 0 months"), None);
    }

    #[test]
    fn test_parse_weekly_multiple_days() {
        let rule = Recur::parse("2021-01-31, weekly, sunday & thursday & wednesday")
            .expect("should parse");
        assert_eq!(
            rule,
            Recur::Weekly {
                start: date(2021, 1, 31),
                weekdays: vec![Weekday::Wed, Weekday::Thu, Weekday::Sun],
            }
        );
        // 2021-02-03 is a Wednesday, 2021-02-05 a Friday.
        assert!(rule.recurs_on(date(2021, 2, 3)));
        assert!(!rule.recurs_on(date(2021, 2, 5)));
    }

    #[test]
    fn test_parse_weekly_drops_unknown_days() {
        let rule = Recur::parse("2024-01-01, weekly, blunsday & friday").expect("should parse");
        assert_eq!(
            rule,
            Recur::Weekly {
                start: date(2024, 1, 1),
                weekdays: vec![Weekday::Fri],
            }
        );
        // All tokens unknown means the weekly grammar does not match.
        assert_eq!(Recur::parse("2024-01-01, weekly, blunsday"), None);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(Recur::parse(""), None);
        assert_eq!(Recur::parse("2024-01-01"), None);
        assert_eq!(Recur::parse("2024-01-01, sometimes"), None);
        assert_eq!(Recur::parse("nonsense, daily"), None);
        assert_eq!(Recur::parse("2024-01-01, every x days"), None);
    }

    #[test]
    fn test_roundtrip_all_variants() {
        for text in [
            "2024-01-01, daily",
            "2024-01-01, every 3 days",
            "2021-01-31, weekly, wednesday & thursday & sunday",
            "2024-01-01, every 2 weeks",
            "2024-01-01, every 6 months",
        ] {
            let rule = Recur::parse(text).expect("should parse");
            assert_eq!(rule.to_string(), text);
            assert_eq!(Recur::parse(&rule.to_string()), Some(rule));
        }
    }

    #[test]
    fn test_nothing_recurs_before_start() {
        for text in [
            "2024-06-15, daily",
            "2024-06-15, every 3 days",
            "2024-06-15, weekly, monday & tuesday & wednesday & thursday & friday & saturday & sunday",
            "2024-06-15, every 2 weeks",
            "2024-06-15, every 1 months",
        ] {
            let rule = Recur::parse(text).expect("should parse");
            assert!(!rule.recurs_on(date(2024, 6, 14)), "{}", text);
            assert!(!rule.recurs_on(date(2020, 1, 1)), "{}", text);
        }
    }

    #[test]
    fn test_daily_recurs_on_every_day_from_start() {
        let rule = Recur::parse("2024-01-01, daily").unwrap();
        assert!(rule.recurs_on(date(2024, 1, 1)));
        assert!(rule.recurs_on(date(2024, 1, 2)));
        assert!(rule.recurs_on(date(2031, 12, 31)));
    }

    #[test]
    fn test_every_n_days() {
        let rule = Recur::parse("2024-01-01, every 3 days").unwrap();
        assert!(rule.recurs_on(date(2024, 1, 1)));
        assert!(!rule.recurs_on(date(2024, 1, 2)));
        assert!(!rule.recurs_on(date(2024, 1, 3)));
        assert!(rule.recurs_on(date(2024, 1, 4)));
        assert!(rule.recurs_on(date(2024, 1, 31)));
    }

    #[test]
    fn test_every_n_weeks() {
        let rule = Recur::parse("2024-01-01, every 2 weeks").unwrap();
        assert!(rule.recurs_on(date(2024, 1, 1)));
        assert!(!rule.recurs_on(date(2024, 1, 8)));
        assert!(rule.recurs_on(date(2024, 1, 15)));
        assert!(rule.recurs_on(date(2024, 1, 29)));
    }

    #[test]
    fn test_every_n_months() {
        let rule = Recur::parse("2024-01-15, every 2 months").unwrap();
        assert!(rule.recurs_on(date(2024, 1, 15)));
        assert!(!rule.recurs_on(date(2024, 2, 15)));
        assert!(rule.recurs_on(date(2024, 3, 15)));
        assert!(rule.recurs_on(date(2025, 1, 15)));
        assert!(!rule.recurs_on(date(2024, 3, 14)));
    }

    #[test]
    fn test_every_n_months_day_overflow() {
        // Jan 31 + 1 month normalizes to Mar 2 in a leap year, so the
        // occurrences drift the way the calendar arithmetic dictates.
        let rule = Recur::parse("2024-01-31, every 1 months").unwrap();
        assert!(rule.recurs_on(date(2024, 1, 31)));
        assert!(!rule.recurs_on(date(2024, 2, 29)));
        assert!(rule.recurs_on(date(2024, 3, 2)));
    }

    #[test]
    fn test_first() {
        assert_eq!(
            Recur::parse("2024-01-01, daily").unwrap().first(),
            date(2024, 1, 1)
        );
        // 2024-01-01 is a Monday.
        assert_eq!(
            Recur::parse("2024-01-01, weekly, friday").unwrap().first(),
            date(2024, 1, 5)
        );
    }

    #[test]
    fn test_first_after() {
        let rule = Recur::parse("2024-01-01, every 3 days").unwrap();
        assert_eq!(rule.first_after(date(2024, 1, 1)), date(2024, 1, 4));
        assert_eq!(rule.first_after(date(2024, 1, 3)), date(2024, 1, 4));
        // Scanning from before the start finds the start itself.
        assert_eq!(rule.first_after(date(2023, 12, 1)), date(2024, 1, 1));
    }

    #[test]
    fn test_first_after_terminates_at_horizon() {
        // A rule whose start is past the horizon never matches within it.
        let rule = Recur::parse("2055-01-01, daily").unwrap();
        assert_eq!(rule.first_after(date(2049, 12, 20)), date(2050, 1, 1));
    }
}
