//! QD3176 XML handling: the fixed outer envelope and the dynamic
//! sub-document fragments.

pub mod envelope;
pub mod value;

pub use envelope::{ClaimEnvelope, FileHoSo};
pub use value::{parse_to_value, XmlValueError};
