mod presets;
mod record;

pub use presets::{popular_presets, PaletteStandard, PresetColor};
pub use record::{format_number, ColorRecord, Lab, Rgb, LAB_PLACEHOLDER};
