//! Dynamic XML to JSON value conversion
//!
//! The fifteen QD3176 sub-document shapes are not validated against an
//! XSD; any well-formed XML is accepted and mapped blindly. This module
//! turns such a fragment into a `serde_json::Value` tree: elements
//! become objects, leaf text becomes strings, and repeated sibling
//! elements collapse into arrays.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlValueError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("document has no top-level element")]
    NoTopLevel,
}

/// Insert a child value under `key`, turning repeated siblings into an
/// array.
fn insert_child(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

/// Parse an XML document and return the *content* of its single
/// top-level element.
///
/// A leaf element maps to its text (empty string when the element is
/// empty); an element with children maps to an object. Attributes are
/// ignored, matching the source format which carries everything in
/// element text.
pub fn parse_to_value(xml: &str) -> Result<Value, XmlValueError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // (element name, collected children, collected text)
    let mut stack: Vec<(String, Map<String, Value>, Option<String>)> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push((name, Map::new(), None));
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let value = Value::String(String::new());
                match stack.last_mut() {
                    Some((_, children, _)) => insert_child(children, name, value),
                    None if root.is_none() => root = Some(value),
                    None => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, _, text)) = stack.last_mut() {
                    let chunk = t.unescape().unwrap_or_default().into_owned();
                    match text {
                        Some(existing) => existing.push_str(&chunk),
                        None => *text = Some(chunk),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some((_, _, text)) = stack.last_mut() {
                    let chunk = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    match text {
                        Some(existing) => existing.push_str(&chunk),
                        None => *text = Some(chunk),
                    }
                }
            }
            Ok(Event::End(_)) => {
                let (name, children, text) = match stack.pop() {
                    Some(frame) => frame,
                    None => continue,
                };
                let value = if children.is_empty() {
                    Value::String(text.unwrap_or_default())
                } else {
                    Value::Object(children)
                };
                match stack.last_mut() {
                    Some((_, parent, _)) => insert_child(parent, name, value),
                    // Keep the first top-level element only.
                    None if root.is_none() => root = Some(value),
                    None => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlValueError::Syntax(e.to_string())),
            _ => {}
        }
    }

    root.ok_or(XmlValueError::NoTopLevel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_document() {
        let value = parse_to_value(
            "<TONG_HOP><MA_LK>123</MA_LK><HO_TEN>Nguyen Van A</HO_TEN></TONG_HOP>",
        )
        .unwrap();
        assert_eq!(value, json!({ "MA_LK": "123", "HO_TEN": "Nguyen Van A" }));
    }

    #[test]
    fn test_repeated_elements_become_array() {
        let value = parse_to_value(
            "<CHI_TIET_THUOC>\
               <DSACH_CHI_TIET_THUOC>\
                 <CHI_TIET_THUOC><MA_THUOC>T1</MA_THUOC></CHI_TIET_THUOC>\
                 <CHI_TIET_THUOC><MA_THUOC>T2</MA_THUOC></CHI_TIET_THUOC>\
               </DSACH_CHI_TIET_THUOC>\
             </CHI_TIET_THUOC>",
        )
        .unwrap();
        assert_eq!(
            value,
            json!({
                "DSACH_CHI_TIET_THUOC": {
                    "CHI_TIET_THUOC": [
                        { "MA_THUOC": "T1" },
                        { "MA_THUOC": "T2" }
                    ]
                }
            })
        );
    }

    #[test]
    fn test_single_nested_element_stays_object() {
        let value = parse_to_value(
            "<R><DSACH><ITEM><A>1</A></ITEM></DSACH></R>",
        )
        .unwrap();
        assert_eq!(value, json!({ "DSACH": { "ITEM": { "A": "1" } } }));
    }

    #[test]
    fn test_empty_elements() {
        let value = parse_to_value("<R><A/><B></B></R>").unwrap();
        assert_eq!(value, json!({ "A": "", "B": "" }));
    }

    #[test]
    fn test_no_top_level() {
        assert!(matches!(
            parse_to_value("   "),
            Err(XmlValueError::NoTopLevel)
        ));
        assert!(matches!(
            parse_to_value("<?xml version=\"1.0\"?>"),
            Err(XmlValueError::NoTopLevel)
        ));
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(parse_to_value("<A><B></A>").is_err());
    }

    #[test]
    fn test_xml_declaration_and_escapes() {
        let value = parse_to_value(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><R><T>a &amp; b</T></R>",
        )
        .unwrap();
        assert_eq!(value, json!({ "T": "a & b" }));
    }
}
