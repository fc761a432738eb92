pub mod colors;
pub mod photo;
pub mod region;
pub mod visit;

pub use colors::{
    NEUTRAL_FILL, PIN_PALETTE, fallback_pin_color, is_palette_color, palette_color, parse_hex,
    resolve_pin_color,
};
pub use photo::*;
pub use region::*;
pub use visit::*;
