use crate::error::{ValidationError, ValidationReason};
use crate::skywatch::record::{Payload, RawInput, Record, RecordKind};
use crate::skywatch::util::truncate_chars;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 1600;
pub const ID_HASH_LEN: usize = 16;

// `\d` would admit any Unicode digit; dates must stay ASCII to sort bytewise.
static FULL_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4})-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])$")
        .expect("valid date regex")
});
static MONTH_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-([0-9]{2})$").expect("valid slug regex"));

#[derive(Debug, Clone, Copy)]
pub struct NormalizeLimits {
    pub summary_max_chars: usize,
}

impl Default for NormalizeLimits {
    fn default() -> Self {
        Self {
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

fn required(field: &'static str, value: Option<&str>) -> Result<String, ValidationError> {
    clean(value).ok_or_else(|| ValidationError::new(field, ValidationReason::Missing))
}

pub fn validate_full_date(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let malformed = || ValidationError::new(field, ValidationReason::MalformedDate(value.into()));
    let caps = FULL_DATE.captures(value).ok_or_else(malformed)?;
    let year: i32 = caps[1].parse().map_err(|_| malformed())?;
    let month: u32 = caps[2].parse().map_err(|_| malformed())?;
    let day: u32 = caps[3].parse().map_err(|_| malformed())?;
    // The pattern admits 2025-02-31; the calendar does not.
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)?;
    Ok(())
}

pub fn validate_month_slug(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let malformed = || ValidationError::new(field, ValidationReason::MalformedSlug(value.into()));
    let caps = MONTH_SLUG.captures(value).ok_or_else(malformed)?;
    let month: u32 = caps[1].parse().map_err(|_| malformed())?;
    if !(1..=12).contains(&month) {
        return Err(malformed());
    }
    Ok(())
}

pub fn validate_external_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let lower = value.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !value.chars().any(char::is_whitespace) => Ok(()),
        _ => Err(ValidationError::new(
            field,
            ValidationReason::MalformedUrl(value.into()),
        )),
    }
}

/// Short, stable id for a record that arrived without one.
pub fn derive_id(key: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(date.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..ID_HASH_LEN].to_string()
}

fn summary(raw: &RawInput, limits: NormalizeLimits) -> Option<String> {
    clean(raw.summary.as_deref()).map(|s| truncate_chars(&s, limits.summary_max_chars))
}

fn normalize_news(raw: &RawInput, limits: NormalizeLimits) -> Result<Record, ValidationError> {
    let title = required("title", raw.title.as_deref())?;
    let date = required("date", raw.date.as_deref())?;
    validate_full_date("date", &date)?;
    let url = required("url", raw.url.as_deref())?;
    validate_external_url("url", &url)?;
    let image = clean(raw.image.as_deref());
    if let Some(image) = &image {
        validate_external_url("image", image)?;
    }

    let id = clean(raw.id.as_deref()).unwrap_or_else(|| derive_id(&url, &date));
    Ok(Record {
        id,
        key: url.clone(),
        date,
        title,
        payload: Payload::News {
            url,
            image,
            summary: summary(raw, limits),
        },
    })
}

fn normalize_report(raw: &RawInput, limits: NormalizeLimits) -> Result<Record, ValidationError> {
    let title = required("title", raw.title.as_deref())?;
    let slug = required(
        "slug",
        clean(raw.slug.as_deref())
            .or_else(|| clean(raw.date.as_deref()))
            .as_deref(),
    )?;
    validate_month_slug("slug", &slug)?;

    // A report is identified by its month; any supplied id is ignored.
    Ok(Record {
        id: slug.clone(),
        key: slug.clone(),
        date: slug,
        title,
        payload: Payload::Report {
            file: clean(raw.file.as_deref()),
            summary: summary(raw, limits),
            meta: raw.meta.clone().unwrap_or_default(),
        },
    })
}

pub fn normalize(
    raw: &RawInput,
    kind: RecordKind,
    limits: NormalizeLimits,
) -> Result<Record, ValidationError> {
    match kind {
        RecordKind::News => normalize_news(raw, limits),
        RecordKind::Report => normalize_report(raw, limits),
    }
}
