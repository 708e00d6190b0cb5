use chrono::{Datelike, NaiveDate};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Month(NaiveDate),
    Year(i32),
    Present,
}

impl DateBound {
    /// A bare year starts in January.
    pub fn first_month(self) -> Option<NaiveDate> {
        match self {
            DateBound::Month(date) => Some(date),
            DateBound::Year(year) => NaiveDate::from_ymd_opt(year, 1, 1),
            DateBound::Present => None,
        }
    }

    /// A bare year runs through December.
    pub fn last_month(self) -> Option<NaiveDate> {
        match self {
            DateBound::Month(date) => Some(date),
            DateBound::Year(year) => NaiveDate::from_ymd_opt(year, 12, 1),
            DateBound::Present => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised date '{0}'")]
pub struct DateError(pub String);

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const PRESENT_WORDS: [&str; 6] = ["present", "current", "now", "today", "ongoing", "current role"];

pub fn parse_month(text: &str) -> Result<DateBound, DateError> {
    let cleaned = text.trim().trim_end_matches('.').to_lowercase();
    let err = || DateError(text.trim().to_string());

    if cleaned.is_empty() {
        return Err(err());
    }
    if PRESENT_WORDS.contains(&cleaned.as_str()) {
        return Ok(DateBound::Present);
    }

    // 2020-01-15, 2020-01, 2020/01
    let iso = cleaned.replace('/', "-");
    let parts: Vec<&str> = iso.split('-').collect();
    if parts.len() >= 2 && parts[0].len() == 4 {
        let year = parts[0].parse::<i32>().map_err(|_| err())?;
        let month = parts[1].parse::<u32>().map_err(|_| err())?;
        return month_start(year, month).ok_or_else(err);
    }

    // 01/2020
    if parts.len() == 2 && parts[1].len() == 4 {
        if let Ok(month) = parts[0].parse::<u32>() {
            let year = parts[1].parse::<i32>().map_err(|_| err())?;
            return month_start(year, month).ok_or_else(err);
        }
    }

    // Jan 2020, January 2020, Sept. 2020, Jan-2020
    let words: Vec<&str> = cleaned
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | '/'))
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() == 2 {
        let name = words[0].trim_end_matches('.');
        let month = MONTHS
            .iter()
            .position(|m| name.len() >= 3 && name.starts_with(m))
            .ok_or_else(err)?;
        let year = words[1].parse::<i32>().map_err(|_| err())?;
        return month_start(year, month as u32 + 1).ok_or_else(err);
    }

    // 2020
    if words.len() == 1 && cleaned.len() == 4 {
        let year = cleaned.parse::<i32>().map_err(|_| err())?;
        return month_start(year, 1).map(|_| DateBound::Year(year)).ok_or_else(err);
    }

    Err(err())
}

fn month_start(year: i32, month: u32) -> Option<DateBound> {
    if !(1900..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1).map(DateBound::Month)
}

pub fn format_month(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Splits "Jan 2020 - Present · 3 yrs" into its two bounds. Trailing
/// duration text after a middle dot is discarded.
pub fn split_range(text: &str) -> Option<(String, Option<String>)> {
    let head = text.split('·').next().unwrap_or(text).trim();
    if head.is_empty() {
        return None;
    }

    for sep in [" - ", " – ", " — ", " to ", "–", "—"] {
        if let Some((start, end)) = head.split_once(sep) {
            let start = start.trim();
            let end = end.trim();
            if start.is_empty() {
                return None;
            }
            let end = if end.is_empty() { None } else { Some(end.to_string()) };
            return Some((start.to_string(), end));
        }
    }

    Some((head.to_string(), None))
}

/// Inclusive month-range overlap. A missing end means the range is ongoing.
pub fn ranges_overlap(
    a_start: NaiveDate,
    a_end: Option<NaiveDate>,
    b_start: NaiveDate,
    b_end: Option<NaiveDate>,
) -> bool {
    let a_end = a_end.unwrap_or(NaiveDate::MAX);
    let b_end = b_end.unwrap_or(NaiveDate::MAX);
    a_start <= b_end && b_start <= a_end
}
