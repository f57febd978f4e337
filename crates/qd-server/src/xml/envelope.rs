//! Outer QD3176 claim envelope
//!
//! One uploaded file is a `GIAMDINHHS` document: header information
//! plus a list of `HOSO` records, each carrying `FILEHOSO` entries. An
//! entry is a type tag (`LOAIHOSO`, "XML1".."XML15") and a base64
//! payload (`NOIDUNGFILE`) holding a second, independently parseable
//! XML document.
//!
//! The envelope shape is fixed, so it is deserialized with quick-xml's
//! serde support; only the inner fragments go through the dynamic
//! [`super::value`] parser.

use qd_common::QdError;
use serde::Deserialize;

/// Root envelope element (`GIAMDINHHS`)
#[derive(Debug, Deserialize)]
pub struct ClaimEnvelope {
    #[serde(rename = "THONGTINHOSO")]
    pub thong_tin_ho_so: ThongTinHoSo,
}

/// Envelope header (`THONGTINHOSO`)
#[derive(Debug, Deserialize)]
pub struct ThongTinHoSo {
    #[serde(rename = "NGAYLAP", default)]
    pub ngay_lap: Option<String>,
    #[serde(rename = "SOLUONGHOSO", default)]
    pub so_luong_ho_so: Option<String>,
    #[serde(rename = "DANHSACHHOSO", default)]
    pub danh_sach_ho_so: DanhSachHoSo,
}

/// Claim record list (`DANHSACHHOSO`)
#[derive(Debug, Default, Deserialize)]
pub struct DanhSachHoSo {
    #[serde(rename = "HOSO", default)]
    pub ho_so: Vec<HoSo>,
}

/// One claim record (`HOSO`)
#[derive(Debug, Default, Deserialize)]
pub struct HoSo {
    #[serde(rename = "FILEHOSO", default)]
    pub file_ho_so: Vec<FileHoSo>,
}

/// One embedded sub-document (`FILEHOSO`)
#[derive(Debug, Default, Deserialize)]
pub struct FileHoSo {
    /// Sub-document type tag, "XML1".."XML15"
    #[serde(rename = "LOAIHOSO", default)]
    pub loai_ho_so: Option<String>,
    /// Base64-encoded XML fragment
    #[serde(rename = "NOIDUNGFILE", default)]
    pub noi_dung_file: Option<String>,
}

impl ClaimEnvelope {
    /// Parse envelope XML. A document without the expected structure is
    /// a client-input error; the queue fails such jobs fast instead of
    /// retrying them.
    pub fn parse(xml: &str) -> Result<Self, QdError> {
        quick_xml::de::from_str(xml).map_err(|e| QdError::Xml(e.to_string()))
    }

    /// All `FILEHOSO` entries across every `HOSO`, in document order.
    pub fn file_entries(&self) -> Vec<&FileHoSo> {
        self.thong_tin_ho_so
            .danh_sach_ho_so
            .ho_so
            .iter()
            .flat_map(|h| h.file_ho_so.iter())
            .collect()
    }
}
