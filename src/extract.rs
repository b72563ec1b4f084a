use std::sync::OnceLock;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use regex::Regex;

/// A task recognized in free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub due_date: Option<NaiveDateTime>,
}

/// Keyword markers that flag a message as task-bearing, in match order.
/// The ASCII marker is case-insensitive; the Japanese ones are exact.
/// Each must be followed by a colon (half- or full-width) or whitespace.
fn task_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(?i)todo[:：\s]", r"やること[:：\s]", r"タスク[:：\s]"]
            .iter()
            .map(|p| Regex::new(p).expect("task pattern"))
            .collect()
    })
}

fn due_patterns() -> &'static [(Regex, DueKind)] {
    static PATTERNS: OnceLock<Vec<(Regex, DueKind)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)(?:by\s+|on\s+)?(?:today|今日)(?:まで(?:に)?)?").expect("due pattern"),
                DueKind::Today,
            ),
            (
                Regex::new(r"(?i)(?:by\s+|on\s+)?(?:tomorrow|明日)(?:まで(?:に)?)?")
                    .expect("due pattern"),
                DueKind::Tomorrow,
            ),
            (
                Regex::new(r"(?i)(?:by\s+|on\s+)?(\d{1,2})[/-](\d{1,2})(?:まで(?:に)?)?")
                    .expect("due pattern"),
                DueKind::MonthDay,
            ),
        ]
    })
}

#[derive(Clone, Copy)]
enum DueKind {
    Today,
    Tomorrow,
    MonthDay,
}

/// Classify `text` and extract a task from it, relative to `today`.
///
/// Returns `None` when no keyword matches or when nothing but the keyword
/// was said; a task never has an empty title.
pub fn extract(text: &str, today: NaiveDate) -> Option<Extracted> {
    let pattern = task_patterns().iter().find(|p| p.is_match(text))?;

    let candidate = pattern.replace(text, "").trim().to_string();
    if candidate.is_empty() {
        return None;
    }

    let (title, due_date) = match find_due_phrase(&candidate, today) {
        Some((due, start, end)) => {
            let stripped = strip_range(&candidate, start, end);
            let title = if stripped.is_empty() {
                candidate.clone()
            } else {
                stripped
            };
            (title, Some(due))
        }
        None => (candidate.clone(), None),
    };

    Some(Extracted { title, due_date })
}

/// Parse a due date out of `text` relative to `today`. Deterministic for a
/// fixed `today`; production callers pass the current local date.
#[allow(dead_code)]
pub fn parse_due_date(text: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    find_due_phrase(text, today).map(|(due, _, _)| due)
}

/// Locate the first due-date phrase and resolve it to a timestamp.
/// Returns the due timestamp and the byte range of the matched phrase
/// (particles included) so the caller can strip it from the title.
fn find_due_phrase(text: &str, today: NaiveDate) -> Option<(NaiveDateTime, usize, usize)> {
    for (pattern, kind) in due_patterns() {
        let Some(captures) = pattern.captures(text) else {
            continue;
        };
        let whole = captures.get(0)?;

        let date = match kind {
            DueKind::Today => Some(today),
            DueKind::Tomorrow => today.checked_add_days(Days::new(1)),
            DueKind::MonthDay => {
                let month: u32 = captures.get(1)?.as_str().parse().ok()?;
                let day: u32 = captures.get(2)?.as_str().parse().ok()?;
                resolve_month_day(today, month, day)
            }
        }?;

        let due = date.and_hms_milli_opt(23, 59, 59, 999)?;
        return Some((due, whole.start(), whole.end()));
    }
    None
}

/// A bare month/day lands in the current year; once it has passed it means
/// the same day next year.
fn resolve_month_day(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date < today => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
        Some(date) => Some(date),
        // 2/29 outside a leap year: try the next year before giving up.
        None => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

fn strip_range(text: &str, start: usize, end: usize) -> String {
    let before = text[..start].trim_end();
    let after = text[end..].trim_start();
    if before.is_empty() {
        after.to_string()
    } else if after.is_empty() {
        before.to_string()
    } else {
        format!("{} {}", before, after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn end_of(y: i32, m: u32, d: u32) -> NaiveDateTime {
        day(y, m, d).and_hms_milli_opt(23, 59, 59, 999).unwrap()
    }

    #[test]
    fn extracts_todo_marker() {
        let extracted = extract("TODO: buy milk", day(2024, 5, 1)).unwrap();
        assert_eq!(extracted.title, "buy milk");
        assert_eq!(extracted.due_date, None);
    }

    #[test]
    fn extracts_japanese_task_marker_with_due() {
        let extracted = extract("タスク: 資料作成 明日まで", day(2024, 5, 1)).unwrap();
        assert_eq!(extracted.title, "資料作成");
        assert_eq!(extracted.due_date, Some(end_of(2024, 5, 2)));
    }

    #[test]
    fn extracts_yarukoto_marker() {
        let extracted = extract("やること: 掃除", day(2024, 5, 1)).unwrap();
        assert_eq!(extracted.title, "掃除");
    }

    #[test]
    fn no_keyword_means_no_task() {
        assert_eq!(extract("let's have lunch tomorrow", day(2024, 5, 1)), None);
        assert_eq!(extract("明日は晴れ", day(2024, 5, 1)), None);
    }

    #[test]
    fn bare_keyword_means_no_task() {
        assert_eq!(extract("TODO:", day(2024, 5, 1)), None);
        assert_eq!(extract("タスク：  ", day(2024, 5, 1)), None);
    }

    #[test]
    fn marker_is_case_insensitive() {
        let extracted = extract("todo buy milk", day(2024, 5, 1)).unwrap();
        assert_eq!(extracted.title, "buy milk");
    }

    #[test]
    fn today_resolves_to_end_of_day() {
        assert_eq!(
            parse_due_date("今日まで", day(2024, 5, 1)),
            Some(end_of(2024, 5, 1))
        );
        assert_eq!(
            parse_due_date("finish by today", day(2024, 5, 1)),
            Some(end_of(2024, 5, 1))
        );
    }

    #[test]
    fn numeric_date_stays_in_current_year_until_passed() {
        assert_eq!(
            parse_due_date("submit 6/15", day(2024, 5, 1)),
            Some(end_of(2024, 6, 15))
        );
        assert_eq!(
            parse_due_date("submit 2-1", day(2024, 5, 1)),
            Some(end_of(2025, 2, 1))
        );
        // Due today is not yet passed.
        assert_eq!(
            parse_due_date("submit 5/1", day(2024, 5, 1)),
            Some(end_of(2024, 5, 1))
        );
    }

    #[test]
    fn parse_is_deterministic_for_fixed_today() {
        let today = day(2024, 5, 1);
        let first = parse_due_date("レポート 5/20 まで", today);
        let second = parse_due_date("レポート 5/20 まで", today);
        assert_eq!(first, second);
        assert_eq!(first, Some(end_of(2024, 5, 20)));
    }

    #[test]
    fn invalid_month_day_is_ignored() {
        assert_eq!(parse_due_date("section 13/45", day(2024, 5, 1)), None);
    }

    #[test]
    fn date_phrase_is_stripped_from_title() {
        let extracted = extract("TODO: report by 6/15", day(2024, 5, 1)).unwrap();
        assert_eq!(extracted.title, "report");
        assert_eq!(extracted.due_date, Some(end_of(2024, 6, 15)));

        let extracted = extract("タスク: 買い物 明日までに 済ませる", day(2024, 5, 1)).unwrap();
        assert_eq!(extracted.title, "買い物 済ませる");
    }

    #[test]
    fn stripping_never_empties_the_title() {
        let extracted = extract("タスク: 明日", day(2024, 5, 1)).unwrap();
        assert_eq!(extracted.title, "明日");
        assert_eq!(extracted.due_date, Some(end_of(2024, 5, 2)));
    }
}
