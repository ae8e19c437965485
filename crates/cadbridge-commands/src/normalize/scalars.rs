//! Scalar coercion and unit conversion.
//!
//! Only unambiguous strings change: `"42"`, `"-2.5"`, `"true"`. Leading
//! zeros, signs other than `-`, exponents, and non-finite spellings stay
//! strings. Lengths convert to millimeters and angles to degrees.

use serde_json::{Number, Value};

use super::{IssueKind, NormalizeIssue, child_path, index_path};

/// Keys whose string values are free text and never coerced.
const TEXT_KEYS: &[&str] = &[
    "name",
    "newName",
    "typeName",
    "familyName",
    "text",
    "comment",
    "comments",
    "mark",
    "title",
    "path",
    "documentPath",
    "uniqueId",
    "uniqueIds",
    "paramName",
    "parameterName",
];

fn is_text_key(key: &str) -> bool {
    TEXT_KEYS.contains(&key) || key.starts_with("__")
}

/// Coerce string-encoded booleans and numbers in place.
pub(super) fn coerce(
    value: &mut Value,
    path: &str,
    protected: bool,
    issues: &mut Vec<NormalizeIssue>,
) {
    match value {
        Value::String(s) if !protected => {
            if let Some(typed) = parse_scalar(s) {
                issues.push(NormalizeIssue::new(
                    IssueKind::Coerce,
                    path,
                    format!("{s:?} -> {typed}"),
                ));
                *value = typed;
            }
        }
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                coerce(child, &child_path(path, key), is_text_key(key), issues);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                coerce(item, &index_path(path, i), protected, issues);
            }
        }
        _ => {}
    }
}

/// Replace unit-suffixed strings with bare numbers in canonical units.
pub(super) fn convert_units(
    value: &mut Value,
    path: &str,
    protected: bool,
    issues: &mut Vec<NormalizeIssue>,
) {
    match value {
        Value::String(s) if !protected => {
            if let Some(n) = parse_unit(s) {
                let converted = number_value(n);
                issues.push(NormalizeIssue::new(
                    IssueKind::Unit,
                    path,
                    format!("{s:?} -> {converted}"),
                ));
                *value = converted;
            }
        }
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                convert_units(child, &child_path(path, key), is_text_key(key), issues);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                convert_units(item, &index_path(path, i), protected, issues);
            }
        }
        _ => {}
    }
}

/// Parse a bool, integer, or plain decimal.
pub(super) fn parse_scalar(raw: &str) -> Option<Value> {
    let t = raw.trim();
    if t.eq_ignore_ascii_case("true") {
        return Some(Value::Bool(true));
    }
    if t.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(false));
    }
    if plain_decimal(t)? {
        t.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .and_then(Number::from_f64)
            .map(Value::Number)
    } else {
        t.parse::<i64>().ok().map(Value::from)
    }
}

/// Check `-?digits(.digits)?`; `Some(true)` when a fraction is present.
///
/// Rejects empty parts and leading zeros (`"007"`, `"01.5"`).
fn plain_decimal(t: &str) -> Option<bool> {
    let unsigned = t.strip_prefix('-').unwrap_or(t);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || frac_part.is_some_and(|f| !all_digits(f)) {
        return None;
    }
    if int_part.len() > 1 && int_part.starts_with('0') {
        return None;
    }
    Some(frac_part.is_some())
}

/// Suffix -> multiplier into millimeters or degrees. `mm` precedes `m`.
const UNITS: &[(&str, f64)] = &[("mm", 1.0), ("deg", 1.0), ("°", 1.0), ("m", 1000.0)];

/// Parse `"<decimal><unit>"`, e.g. `"3000mm"`, `"1.5 m"`, `"90°"`.
pub(super) fn parse_unit(raw: &str) -> Option<f64> {
    let lower = raw.trim().to_lowercase();
    UNITS.iter().find_map(|(suffix, factor)| {
        let number = lower.strip_suffix(suffix)?.trim_end();
        let _ = plain_decimal(number)?;
        number
            .parse::<f64>()
            .ok()
            .map(|n| n * factor)
            .filter(|v| v.is_finite())
    })
}

/// Parse one point coordinate: unit-suffixed or plain finite number.
pub(super) fn parse_component(raw: &str) -> Option<f64> {
    let t = raw.trim();
    parse_unit(t).or_else(|| t.parse::<f64>().ok().filter(|f| f.is_finite()))
}

/// JSON number for a converted value: integral values become integers,
/// others are rounded to six decimals.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub(super) fn number_value(v: f64) -> Value {
    let rounded = (v * 1e6).round() / 1e6;
    if rounded.fract() == 0.0 && rounded.abs() < 9.0e15 {
        Value::from(rounded as i64)
    } else {
        Number::from_f64(rounded).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_parse_only_when_unambiguous() {
        assert_eq!(parse_scalar("42"), Some(json!(42)));
        assert_eq!(parse_scalar(" -7 "), Some(json!(-7)));
        assert_eq!(parse_scalar("2.5"), Some(json!(2.5)));
        assert_eq!(parse_scalar("0"), Some(json!(0)));
        assert_eq!(parse_scalar("0.25"), Some(json!(0.25)));
        assert_eq!(parse_scalar("TRUE"), Some(json!(true)));
        assert_eq!(parse_scalar("false"), Some(json!(false)));
        for s in ["007", "01.5", "+3", "1e3", ".5", "5.", "inf", "NaN", "", "1,2", "12abc"] {
            assert_eq!(parse_scalar(s), None, "{s}");
        }
    }

    #[test]
    fn integer_overflow_stays_string() {
        assert_eq!(parse_scalar("99999999999999999999"), None);
    }

    #[test]
    fn units_convert_to_mm_and_degrees() {
        assert_eq!(parse_unit("3000mm"), Some(3000.0));
        assert_eq!(parse_unit("3m"), Some(3000.0));
        assert_eq!(parse_unit("1.5 M"), Some(1500.0));
        assert_eq!(parse_unit("-2m"), Some(-2000.0));
        assert_eq!(parse_unit("45deg"), Some(45.0));
        assert_eq!(parse_unit("90°"), Some(90.0));
        assert_eq!(parse_unit("m"), None);
        assert_eq!(parse_unit("3 ft"), None);
        assert_eq!(parse_unit("abcm"), None);
    }

    #[test]
    fn overflowing_unit_value_is_left_alone() {
        let huge = format!("{}m", "9".repeat(400));
        assert_eq!(parse_unit(&huge), None);
        assert_eq!(parse_component(&huge), None);

        let mut v = json!({ "height": huge.clone() });
        let mut issues = Vec::new();
        convert_units(&mut v, "", false, &mut issues);
        assert_eq!(v, json!({ "height": huge }));
        assert!(issues.is_empty());
    }

    #[test]
    fn number_value_prefers_integers() {
        assert_eq!(number_value(1100.000_000_000_000_2), json!(1100));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(-0.0), json!(0));
    }

    #[test]
    fn text_keys_are_not_coerced() {
        let mut v = json!({"name": "007", "mark": "12", "uniqueIds": ["1", "2"], "count": "3"});
        let mut issues = Vec::new();
        coerce(&mut v, "", false, &mut issues);
        assert_eq!(v, json!({"name": "007", "mark": "12", "uniqueIds": ["1", "2"], "count": 3}));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn units_skip_text_keys() {
        let mut v = json!({"comment": "5m", "height": "5m"});
        let mut issues = Vec::new();
        convert_units(&mut v, "", false, &mut issues);
        assert_eq!(v, json!({"comment": "5m", "height": 5000}));
    }
}
