//! End-to-end decode tests for QD3176 claim files.
//!
//! These run the full decode path an ingest worker performs, minus the
//! database: envelope parsing, base64 extraction, dynamic fragment
//! parsing, key normalization and descriptor-driven item extraction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use qd_server::bundle::{ClaimBundle, SubDocType};
use qd_server::normalize::{camelize_keys, clean_payload};
use qd_server::xml::{parse_to_value, ClaimEnvelope};

fn b64(xml: &str) -> String {
    BASE64.encode(xml.as_bytes())
}

fn envelope_with(entries: &[(&str, &str)]) -> String {
    let files: String = entries
        .iter()
        .map(|(tag, xml)| {
            format!(
                "<FILEHOSO><LOAIHOSO>{}</LOAIHOSO><NOIDUNGFILE>{}</NOIDUNGFILE></FILEHOSO>",
                tag,
                b64(xml)
            )
        })
        .collect();
    format!(
        "<GIAMDINHHS><THONGTINHOSO><NGAYLAP>20240101</NGAYLAP><SOLUONGHOSO>1</SOLUONGHOSO>\
         <DANHSACHHOSO><HOSO>{}</HOSO></DANHSACHHOSO></THONGTINHOSO></GIAMDINHHS>",
        files
    )
}

const XML1_FRAGMENT: &str = "<TONG_HOP>\
    <MA_LK>LK0001</MA_LK>\
    <MA_THE>DN4010123456789</MA_THE>\
    <NGAY_VAO>202401011030</NGAY_VAO>\
    <THANG_QT>1</THANG_QT>\
    <NAM_QT>2024</NAM_QT>\
    <MA_LOAI_KCB>01</MA_LOAI_KCB>\
    <MA_CSKCB>01234</MA_CSKCB>\
    <HO_TEN>Nguyen Van A</HO_TEN>\
    <DIA_CHI></DIA_CHI>\
</TONG_HOP>";

const XML2_FRAGMENT: &str = "<DSACH_CHI_TIET_THUOC>\
    <CHI_TIET_THUOC><MA_THUOC>T001</MA_THUOC><SO_LUONG>2</SO_LUONG></CHI_TIET_THUOC>\
    <CHI_TIET_THUOC><MA_THUOC>T002</MA_THUOC><SO_LUONG>1</SO_LUONG></CHI_TIET_THUOC>\
</DSACH_CHI_TIET_THUOC>";

const XML7_FRAGMENT: &str = "<GIAY_RA_VIEN>\
    <MA_LK>LK0001</MA_LK>\
    <NGAY_RA>202401051130</NGAY_RA>\
</GIAY_RA_VIEN>";

/// Decode one envelope entry the way a worker does.
fn decode(tag: &str, content_b64: &str) -> (SubDocType, serde_json::Value) {
    let kind = SubDocType::from_code(tag).expect("known type tag");
    let bytes = BASE64.decode(content_b64.as_bytes()).expect("valid base64");
    let text = String::from_utf8(bytes).expect("utf8 fragment");
    let value = parse_to_value(&text).expect("parseable fragment");
    (kind, camelize_keys(value))
}

#[test]
fn test_full_file_decodes_into_bundle() {
    let file = envelope_with(&[
        ("XML1", XML1_FRAGMENT),
        ("XML2", XML2_FRAGMENT),
        ("XML7", XML7_FRAGMENT),
    ]);

    let envelope = ClaimEnvelope::parse(&file).expect("valid envelope");
    let entries = envelope.file_entries();
    assert_eq!(entries.len(), 3);

    let mut bundle = ClaimBundle::new();
    for entry in entries {
        let tag = entry.loai_ho_so.as_deref().expect("type tag present");
        let content = entry.noi_dung_file.as_deref().expect("content present");
        let (kind, payload) = decode(tag, content);
        bundle.insert(kind, payload);
    }

    assert_eq!(bundle.len(), 3);
    assert_eq!(bundle.ma_lk(), Some("LK0001"));

    let root = bundle.get(SubDocType::Xml1).expect("root present");
    assert_eq!(root["hoTen"], "Nguyen Van A");
    assert_eq!(root["maThe"], "DN4010123456789");
}

#[test]
fn test_drug_lines_extract_as_list() {
    let (kind, payload) = decode("XML2", &b64(XML2_FRAGMENT));
    assert_eq!(kind, SubDocType::Xml2);

    let items = kind.descriptor().extract_items(&payload);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["maThuoc"], "T001");
    assert_eq!(items[1]["maThuoc"], "T002");
}

#[test]
fn test_single_drug_line_is_wrapped() {
    let fragment = "<DSACH_CHI_TIET_THUOC>\
        <CHI_TIET_THUOC><MA_THUOC>T001</MA_THUOC></CHI_TIET_THUOC>\
    </DSACH_CHI_TIET_THUOC>";
    let (kind, payload) = decode("XML2", &b64(fragment));

    let items = kind.descriptor().extract_items(&payload);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["maThuoc"], "T001");
}

#[test]
fn test_singleton_document_extracts_at_root() {
    let (kind, payload) = decode("XML7", &b64(XML7_FRAGMENT));
    assert_eq!(kind, SubDocType::Xml7);

    let items = kind.descriptor().extract_items(&payload);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["ngayRa"], "202401051130");
}

#[test]
fn test_blank_fields_clean_to_null() {
    let (_, payload) = decode("XML1", &b64(XML1_FRAGMENT));
    let cleaned = clean_payload(payload);
    assert!(cleaned["diaChi"].is_null());
    assert_eq!(cleaned["hoTen"], "Nguyen Van A");
}

#[test]
fn test_envelope_without_records_has_no_entries() {
    let file = "<GIAMDINHHS><THONGTINHOSO><NGAYLAP>20240101</NGAYLAP>\
                </THONGTINHOSO></GIAMDINHHS>";
    let envelope = ClaimEnvelope::parse(file).expect("envelope parses");
    assert!(envelope.file_entries().is_empty());
}

#[test]
fn test_garbage_file_is_rejected() {
    assert!(ClaimEnvelope::parse("this is not xml").is_err());
    assert!(ClaimEnvelope::parse("<WRONG_ROOT/>").is_err());
}
