use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    UtcOffset,
};

use crate::error::{AppError, AppResult};

/// URL-friendly slug: lowercase alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn capitalized(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn article(label: &str) -> &'static str {
    match label.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

/// `Please add a name`, `Please add an address`.
pub fn missing(label: &str) -> AppError {
    AppError::validation(format!("Please add {} {}", article(label), label))
}

fn check_len(value: &str, label: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "{} can not be more than {} characters",
            capitalized(label),
            max
        )));
    }
    Ok(())
}

/// Trimmed, non-empty, at most `max` characters.
pub fn required(value: Option<String>, label: &str, max: usize) -> AppResult<String> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        return Err(missing(label));
    }
    check_len(&value, label, max)?;
    Ok(value)
}

/// Same rules as [`required`] for a field that may be left out of an update.
pub fn optional(value: Option<String>, label: &str, max: usize) -> AppResult<Option<String>> {
    match value {
        Some(v) => required(Some(v), label, max).map(Some),
        None => Ok(None),
    }
}

/// Text that may be empty but not longer than `max`.
pub fn bounded(value: Option<String>, label: &str, max: usize) -> AppResult<Option<String>> {
    let value = value.map(|v| v.trim().to_string());
    if let Some(v) = &value {
        check_len(v, label, max)?;
    }
    Ok(value)
}

/// `1990-04-21`, or the UTC day of an RFC 3339 timestamp.
pub fn calendar_date(raw: &str, label: &str) -> AppResult<Date> {
    let raw = raw.trim();
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339).map(|t| t.to_offset(UtcOffset::UTC).date()))
        .map_err(|_| {
            AppError::validation(format!(
                "{} must be a date like 1990-04-21",
                capitalized(label)
            ))
        })
}

/// Same as [`calendar_date`] for a column that may be blank, as midnight UTC.
pub fn optional_day(raw: Option<String>, label: &str) -> AppResult<Option<OffsetDateTime>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => Ok(Some(calendar_date(v, label)?.midnight().assume_utc())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Villa  Sunrise"), "villa-sunrise");
        assert_eq!(slugify("  Nhà Phố #2 / Q1 "), "nhà-phố-2-q1");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn required_messages() {
        let err = required(Some("   ".into()), "name", 50).unwrap_err();
        assert_eq!(err.to_string(), "Please add a name");
        let err = required(Some("x".repeat(51)), "name", 50).unwrap_err();
        assert_eq!(err.to_string(), "Name can not be more than 50 characters");
        assert_eq!(required(Some(" ok ".into()), "name", 50).unwrap(), "ok");
        let err = required(None, "address", 200).unwrap_err();
        assert_eq!(err.to_string(), "Please add an address");
    }

    #[test]
    fn calendar_dates() {
        let day = calendar_date("1990-04-21", "birthday").unwrap();
        assert_eq!(day.to_string(), "1990-04-21");
        let day = calendar_date("1990-04-21T23:30:00-02:00", "birthday").unwrap();
        assert_eq!(day.to_string(), "1990-04-22");
        let err = calendar_date("21/04/1990", "birthday").unwrap_err();
        assert_eq!(err.to_string(), "Birthday must be a date like 1990-04-21");

        assert_eq!(optional_day(Some(" ".into()), "birthday").unwrap(), None);
        let at = optional_day(Some("2024-02-29".into()), "complete day").unwrap().unwrap();
        assert_eq!(at.unix_timestamp(), 1_709_164_800);
    }

    #[test]
    fn optional_and_bounded() {
        assert_eq!(optional(None, "client", 50).unwrap(), None);
        assert!(optional(Some("".into()), "client", 50).is_err());
        assert_eq!(bounded(Some("".into()), "phone", 20).unwrap(), Some(String::new()));
        assert!(bounded(Some("1".repeat(21)), "phone", 20).is_err());
    }
}
