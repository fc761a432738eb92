/// Fixed pin palette. A color is picked once when a region is marked visited
/// and stored with the record from then on.
pub const PIN_PALETTE: [&str; 8] = [
    "#e4572e", "#f3a712", "#29335c", "#669bbc", "#2a9d8f", "#8e5572", "#bc4b51", "#5b8e7d",
];

/// Fill used for shapes of regions that are not visited.
pub const NEUTRAL_FILL: &str = "#d8d3c4";

/// Palette entry for an arbitrary index (wraps around).
pub fn palette_color(index: usize) -> &'static str {
    PIN_PALETTE[index % PIN_PALETTE.len()]
}

pub fn is_palette_color(color: &str) -> bool {
    PIN_PALETTE
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(color.trim()))
}

/// Deterministic palette pick via CRC32 of the region id.
/// Used for stored records that predate color persistence.
pub fn fallback_pin_color(region_id: &str) -> &'static str {
    let hash = crc32fast::hash(region_id.as_bytes());
    palette_color(hash as usize)
}

/// Resolve the color a record should render with.
pub fn resolve_pin_color(region_id: &str, stored: Option<&str>) -> String {
    match stored {
        Some(color) if is_palette_color(color) => color.trim().to_ascii_lowercase(),
        _ => fallback_pin_color(region_id).to_owned(),
    }
}

/// Parse `#rrggbb` into (r, g, b).
pub fn parse_hex(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_color_is_deterministic_and_in_palette() {
        let a = fallback_pin_color("province-7");
        let b = fallback_pin_color("province-7");
        assert_eq!(a, b);
        assert!(is_palette_color(a));
    }

    #[test]
    fn resolve_keeps_stored_palette_color() {
        assert_eq!(
            resolve_pin_color("province-1", Some("#2A9D8F")),
            "#2a9d8f"
        );
    }

    #[test]
    fn resolve_replaces_unknown_or_missing_color() {
        let expected = fallback_pin_color("province-1");
        assert_eq!(resolve_pin_color("province-1", Some("hotpink")), expected);
        assert_eq!(resolve_pin_color("province-1", None), expected);
    }

    #[test]
    fn palette_colors_parse_as_hex() {
        for color in PIN_PALETTE {
            assert!(parse_hex(color).is_some(), "{color}");
        }
        assert_eq!(parse_hex("#ff0080"), Some((255, 0, 128)));
        assert_eq!(parse_hex("ff0080"), None);
        assert_eq!(parse_hex("#ff00"), None);
    }
}
