use serde::{Deserialize, Serialize};

/// Prefix shared by every selectable shape id in the vector map asset.
pub const REGION_ID_PREFIX: &str = "province-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    #[default]
    Mainland,
    Island,
}

impl RegionKind {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("island") {
            Self::Island
        } else {
            Self::Mainland
        }
    }
}

/// A selectable geographic unit. Geometry lives in the vector asset, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: RegionKind,
}

/// Whether a shape id addresses a region (`province-<digits>`).
pub fn is_region_id(id: &str) -> bool {
    region_number(id).is_some()
}

/// Numeric suffix of a region id.
pub fn region_number(id: &str) -> Option<u32> {
    let digits = id.strip_prefix(REGION_ID_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numbered_province_ids() {
        assert!(is_region_id("province-1"));
        assert!(is_region_id("province-012"));
        assert_eq!(region_number("province-12"), Some(12));
    }

    #[test]
    fn rejects_decorative_and_malformed_ids() {
        assert!(!is_region_id("province-"));
        assert!(!is_region_id("province-+3"));
        assert!(!is_region_id("province-3a"));
        assert!(!is_region_id("Province-3"));
        assert!(!is_region_id("border-3"));
        assert!(!is_region_id("province-99999999999"));
    }

    #[test]
    fn region_kind_parse_defaults_to_mainland() {
        assert_eq!(RegionKind::parse("Island"), RegionKind::Island);
        assert_eq!(RegionKind::parse(""), RegionKind::Mainland);
        assert_eq!(
            serde_json::to_string(&RegionKind::Island).unwrap(),
            "\"island\""
        );
    }
}
