//! Normalization of scraped collection data into a canonical schedule.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::LazyLock;

use chrono::{Datelike, Local, Months, NaiveDate};
use regex::Regex;

use crate::error::{CollectorError, Result};
use crate::model::{Bin, BinDay};

/// How far in the past an inferred date may fall before the following year is assumed.
pub const DEFAULT_YEAR_GRACE_MONTHS: u32 = 1;

const YEAR_SPECIFIERS: [&str; 12] = [
    "%Y", "%y", "%C", "%G", "%g", "%F", "%D", "%x", "%c", "%v", "%+", "%s",
];

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid ordinal regex"));

/// Today's local calendar date.
#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Remove English ordinal suffixes ("21st" becomes "21").
#[must_use]
pub fn strip_ordinals(text: &str) -> String {
    ORDINAL_SUFFIX.replace_all(text, "$1").into_owned()
}

/// Parse a date lacking a year relative to the local date, using the default grace window.
///
/// # Errors
///
/// See [`infer_year`].
pub fn parse_date_inferring_year(text: &str, format: &str) -> Result<NaiveDate> {
    infer_year(text, format, today(), DEFAULT_YEAR_GRACE_MONTHS)
}

/// Parse `text` with a year-less `format`, picking the current year unless the
/// result lies more than `grace_months` before `today`, in which case the next
/// year is used. A weekday that contradicts the current year also moves the
/// date to the next year.
///
/// # Errors
///
/// Returns [`CollectorError::InvalidDateFormat`] when `format` already encodes a
/// year and [`CollectorError::Date`] when the text does not parse.
pub fn infer_year(
    text: &str,
    format: &str,
    today: NaiveDate,
    grace_months: u32,
) -> Result<NaiveDate> {
    if YEAR_SPECIFIERS
        .iter()
        .any(|specifier| format.contains(specifier))
    {
        return Err(CollectorError::InvalidDateFormat(format.to_owned()));
    }

    let earliest = today
        .checked_sub_months(Months::new(grace_months))
        .unwrap_or(NaiveDate::MIN);
    let text = text.trim();
    let format_with_year = format!("{format} %Y");

    let mut last_error = None;
    for year in [today.year(), today.year() + 1] {
        match NaiveDate::parse_from_str(&format!("{text} {year}"), &format_with_year) {
            Ok(date) if date >= earliest => return Ok(date),
            Ok(_) => {}
            Err(error) => last_error = Some(error),
        }
    }

    Err(last_error.map_or_else(
        || CollectorError::unexpected(format!("No plausible year for date '{text}'")),
        CollectorError::Date,
    ))
}

/// Catalogue bins whose keys occur in `description`, compared case-insensitively.
#[must_use]
pub fn match_bins(catalogue: &[Bin], description: &str) -> Vec<Bin> {
    let description = description.to_lowercase();
    catalogue
        .iter()
        .filter(|bin| bin.keys.iter().any(|key| description.contains(key.as_str())))
        .cloned()
        .collect()
}

/// Normalize relative to the local date. See [`process_bin_days_at`].
///
/// # Errors
///
/// See [`process_bin_days_at`].
pub fn process_bin_days(bin_days: Vec<BinDay>) -> Result<Vec<BinDay>> {
    process_bin_days_at(bin_days, today())
}

/// Drop past collections, merge collections sharing a date, deduplicate bins by
/// name, and sort ascending by date.
///
/// # Errors
///
/// Returns [`CollectorError::BinDaysNotFound`] when any entry has no bins or
/// nothing remains after filtering.
pub fn process_bin_days_at(bin_days: Vec<BinDay>, today: NaiveDate) -> Result<Vec<BinDay>> {
    if let Some(empty) = bin_days.iter().find(|bin_day| bin_day.bins.is_empty()) {
        tracing::warn!(date = %empty.date, "bin day matched no bins");
        return Err(CollectorError::BinDaysNotFound);
    }

    let mut merged = BTreeMap::<NaiveDate, BinDay>::new();
    for bin_day in bin_days.into_iter().filter(|bin_day| bin_day.date >= today) {
        match merged.entry(bin_day.date) {
            Entry::Vacant(slot) => {
                let BinDay {
                    date,
                    address,
                    bins,
                } = bin_day;
                let mut unique = Vec::with_capacity(bins.len());
                push_unique(&mut unique, bins);
                slot.insert(BinDay {
                    date,
                    address,
                    bins: unique,
                });
            }
            Entry::Occupied(mut slot) => push_unique(&mut slot.get_mut().bins, bin_day.bins),
        }
    }

    if merged.is_empty() {
        return Err(CollectorError::BinDaysNotFound);
    }

    Ok(merged.into_values().collect())
}

fn push_unique(target: &mut Vec<Bin>, bins: Vec<Bin>) {
    for bin in bins {
        if !target.iter().any(|existing| existing.name == bin.name) {
            target.push(bin);
        }
    }
}
