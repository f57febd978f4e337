//! Claim bundle and the sub-document descriptor table
//!
//! A claim bundle maps each sub-document type code (`XML1`..`XML15`)
//! to its decoded, key-normalized payload. The fifteen formats differ
//! in two mechanical ways only: where their repeating items live in the
//! payload, and whether they are a list or a singleton. Both facts are
//! captured in one static descriptor per type, consulted by a single
//! generic dispatch loop during persistence, instead of fifteen
//! hand-written branches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Closed set of QD3176 sub-document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubDocType {
    /// Claim summary (root record, one per claim)
    Xml1,
    /// Drug lines
    Xml2,
    /// Technical service / consumable lines
    Xml3,
    /// Paraclinical (lab/imaging) results
    Xml4,
    /// Clinical progression notes
    Xml5,
    /// Primary-care registration record
    Xml6,
    /// Hospital discharge certificate
    Xml7,
    /// Medical record summary
    Xml8,
    /// Birth certificates
    Xml9,
    /// Maternity leave certificate
    Xml10,
    /// Social-insurance sick leave certificates
    Xml11,
    /// Medical assessment record
    Xml12,
    /// Referral certificate
    Xml13,
    /// Follow-up appointment certificate
    Xml14,
    /// Tuberculosis treatment lines
    Xml15,
}

/// How one sub-document type is decomposed and stored.
#[derive(Debug)]
pub struct SubDocDescriptor {
    /// Type tag as it appears in `LOAIHOSO`
    pub code: &'static str,
    /// Path (post-camelize) from the payload root to its items;
    /// empty means the payload itself is the item
    pub items_path: &'static [&'static str],
    /// List types hold zero or more rows, singletons exactly one
    pub is_list: bool,
    /// Target table for the rows
    pub table: &'static str,
}

static DESCRIPTORS: [SubDocDescriptor; 15] = [
    SubDocDescriptor {
        code: "XML1",
        items_path: &[],
        is_list: false,
        table: "xml1_tong_hop",
    },
    SubDocDescriptor {
        code: "XML2",
        items_path: &["dsachChiTietThuoc", "chiTietThuoc"],
        is_list: true,
        table: "xml2_chi_tiet_thuoc",
    },
    SubDocDescriptor {
        code: "XML3",
        items_path: &["dsachChiTietDvkt", "chiTietDvkt"],
        is_list: true,
        table: "xml3_chi_tiet_dvkt",
    },
    SubDocDescriptor {
        code: "XML4",
        items_path: &["dsachChiTietCls", "chiTietCls"],
        is_list: true,
        table: "xml4_chi_tiet_cls",
    },
    SubDocDescriptor {
        code: "XML5",
        items_path: &["dsachChiTietDienBienBenh", "chiTietDienBienBenh"],
        is_list: true,
        table: "xml5_dien_bien_benh",
    },
    SubDocDescriptor {
        code: "XML6",
        items_path: &[],
        is_list: false,
        table: "xml6_cssk_ban_dau",
    },
    SubDocDescriptor {
        code: "XML7",
        items_path: &[],
        is_list: false,
        table: "xml7_giay_ra_vien",
    },
    SubDocDescriptor {
        code: "XML8",
        items_path: &[],
        is_list: false,
        table: "xml8_tom_tat_benh_an",
    },
    SubDocDescriptor {
        code: "XML9",
        items_path: &["dsachGiayChungSinh", "duLieuGiayChungSinh"],
        is_list: true,
        table: "xml9_giay_chung_sinh",
    },
    SubDocDescriptor {
        code: "XML10",
        items_path: &[],
        is_list: false,
        table: "xml10_nghi_duong_thai",
    },
    SubDocDescriptor {
        code: "XML11",
        items_path: &["dsachGiayNghiViec", "duLieuGiayNghiViec"],
        is_list: true,
        table: "xml11_nghi_viec_bhxh",
    },
    SubDocDescriptor {
        code: "XML12",
        items_path: &[],
        is_list: false,
        table: "xml12_giam_dinh_y_khoa",
    },
    SubDocDescriptor {
        code: "XML13",
        items_path: &[],
        is_list: false,
        table: "xml13_giay_chuyen_tuyen",
    },
    SubDocDescriptor {
        code: "XML14",
        items_path: &[],
        is_list: false,
        table: "xml14_giay_hen_kham_lai",
    },
    SubDocDescriptor {
        code: "XML15",
        items_path: &["dsachChiTietDieuTriLao", "chiTietDieuTriLao"],
        is_list: true,
        table: "xml15_dieu_tri_lao",
    },
];

impl SubDocType {
    /// All types in tag order.
    pub const ALL: [SubDocType; 15] = [
        SubDocType::Xml1,
        SubDocType::Xml2,
        SubDocType::Xml3,
        SubDocType::Xml4,
        SubDocType::Xml5,
        SubDocType::Xml6,
        SubDocType::Xml7,
        SubDocType::Xml8,
        SubDocType::Xml9,
        SubDocType::Xml10,
        SubDocType::Xml11,
        SubDocType::Xml12,
        SubDocType::Xml13,
        SubDocType::Xml14,
        SubDocType::Xml15,
    ];

    fn index(self) -> usize {
        SubDocType::ALL
            .iter()
            .position(|t| *t == self)
            .unwrap_or_default()
    }

    pub fn descriptor(self) -> &'static SubDocDescriptor {
        &DESCRIPTORS[self.index()]
    }

    /// Type tag as carried in `LOAIHOSO`, e.g. `"XML2"`.
    pub fn code(self) -> &'static str {
        self.descriptor().code
    }

    /// Resolve a `LOAIHOSO` tag, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        SubDocType::ALL
            .iter()
            .copied()
            .find(|t| t.code().eq_ignore_ascii_case(code))
    }
}

impl std::fmt::Display for SubDocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl SubDocDescriptor {
    /// Extract the rows to insert from a decoded payload.
    ///
    /// Follows `items_path`, wraps a bare object into a one-element
    /// list, and treats absence (or an explicit null) as empty. A
    /// singleton therefore yields exactly one row when present.
    ///
    /// Payloads arrive with their fragment's root element already
    /// stripped; a leading path segment naming that root is skipped
    /// when absent, so both shapes resolve.
    pub fn extract_items(&self, payload: &Value) -> Vec<Value> {
        let mut node = payload;
        for (i, segment) in self.items_path.iter().enumerate() {
            node = match node.get(segment) {
                Some(v) => v,
                None if i == 0 && self.items_path.len() > 1 => continue,
                None => return Vec::new(),
            };
        }
        match node {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }
}

/// In-memory mapping from sub-document type to decoded payload for one
/// claim.
#[derive(Debug, Default)]
pub struct ClaimBundle {
    docs: BTreeMap<SubDocType, Value>,
}

impl ClaimBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: SubDocType, payload: Value) {
        self.docs.insert(kind, payload);
    }

    pub fn get(&self, kind: SubDocType) -> Option<&Value> {
        self.docs.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// The claim's `maLk` linking code, taken from the XML1 summary.
    pub fn ma_lk(&self) -> Option<&str> {
        self.get(SubDocType::Xml1)
            .and_then(|root| root.get("maLk"))
            .and_then(Value::as_str)
    }
}
