//! Key normalization and payload cleaning
//!
//! QD3176 sub-documents arrive with UPPER_SNAKE_CASE element names
//! (`HO_TEN`, `MA_LK`, `T_TONGCHI`). The relational layer and the
//! progress stream both speak camelCase, so every decoded fragment is
//! rewritten before it goes anywhere else. Blank strings in the source
//! mean "no value" and are stored as NULL.

use serde_json::{Map, Value};

/// Convert a single UPPER_SNAKE_CASE key to camelCase.
///
/// Keys that are already camelCase pass through unchanged, which makes
/// [`camelize_keys`] idempotent.
pub fn camelize_key(key: &str) -> String {
    if key.contains('_') {
        let mut out = String::with_capacity(key.len());
        for (i, segment) in key.split('_').filter(|s| !s.is_empty()).enumerate() {
            if i == 0 {
                out.push_str(&segment.to_lowercase());
            } else {
                let mut chars = segment.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(&chars.as_str().to_lowercase());
                }
            }
        }
        out
    } else if key.chars().all(|c| !c.is_lowercase()) {
        // Single-word keys like "MALK" have no case boundary to keep.
        key.to_lowercase()
    } else {
        key.to_string()
    }
}

/// Recursively rename all object keys from UPPER_SNAKE_CASE to camelCase.
pub fn camelize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                out.insert(camelize_key(&key), camelize_keys(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(camelize_keys).collect()),
        other => other,
    }
}

/// Recursively replace blank (empty or whitespace-only) strings with null.
///
/// Non-string scalars are left untouched; no numeric or date coercion
/// happens here.
pub fn clean_payload(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                out.insert(key, clean_payload(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(clean_payload).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camelize_key_snake() {
        assert_eq!(camelize_key("HO_TEN"), "hoTen");
        assert_eq!(camelize_key("MA_LK"), "maLk");
        assert_eq!(camelize_key("T_TONGCHI"), "tTongchi");
        assert_eq!(camelize_key("DSACH_CHI_TIET_THUOC"), "dsachChiTietThuoc");
    }

    #[test]
    fn test_camelize_key_idempotent() {
        let once = camelize_key("HO_TEN");
        assert_eq!(camelize_key(&once), once);
        assert_eq!(camelize_key("hoTen"), "hoTen");
    }

    #[test]
    fn test_camelize_key_single_word() {
        assert_eq!(camelize_key("MALK"), "malk");
        assert_eq!(camelize_key("malk"), "malk");
    }

    #[test]
    fn test_camelize_keys_recursive() {
        let input = json!({
            "HO_TEN": "Nguyen Van A",
            "DSACH_CHI_TIET_THUOC": {
                "CHI_TIET_THUOC": [
                    { "MA_THUOC": "T1" },
                    { "MA_THUOC": "T2" }
                ]
            }
        });
        let want = json!({
            "hoTen": "Nguyen Van A",
            "dsachChiTietThuoc": {
                "chiTietThuoc": [
                    { "maThuoc": "T1" },
                    { "maThuoc": "T2" }
                ]
            }
        });
        assert_eq!(camelize_keys(input), want);
    }

    #[test]
    fn test_camelize_keys_idempotent() {
        let input = json!({ "HO_TEN": "x", "NGAY_VAO": { "INNER_KEY": "y" } });
        let once = camelize_keys(input);
        let twice = camelize_keys(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clean_payload_blanks() {
        let input = json!({ "a": "", "b": "x", "c": "   " });
        let want = json!({ "a": null, "b": "x", "c": null });
        assert_eq!(clean_payload(input), want);
    }

    #[test]
    fn test_clean_payload_nested() {
        let input = json!({
            "outer": { "keep": "v", "drop": "\t\n" },
            "list": ["", "x", { "y": " " }]
        });
        let want = json!({
            "outer": { "keep": "v", "drop": null },
            "list": [null, "x", { "y": null }]
        });
        assert_eq!(clean_payload(input), want);
    }

    #[test]
    fn test_clean_payload_non_strings_untouched() {
        let input = json!({ "n": 0, "b": false, "nil": null, "s": "20240101" });
        assert_eq!(clean_payload(input.clone()), input);
    }
}
