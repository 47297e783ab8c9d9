#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteStandard {
    Pantone,
    Ral,
}

impl PaletteStandard {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pantone => "Pantone",
            Self::Ral => "RAL",
        }
    }
}

/// Quick-pick entry shown before any search has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetColor {
    pub standard: PaletteStandard,
    pub code: &'static str,
    pub name: &'static str,
    pub hex: &'static str,
}

const POPULAR: &[PresetColor] = &[
    PresetColor {
        standard: PaletteStandard::Pantone,
        code: "13-1023",
        name: "Peach Fuzz",
        hex: "#FFBE98",
    },
    PresetColor {
        standard: PaletteStandard::Pantone,
        code: "18-1750",
        name: "Viva Magenta",
        hex: "#BB2649",
    },
    PresetColor {
        standard: PaletteStandard::Pantone,
        code: "17-3938",
        name: "Very Peri",
        hex: "#6667AB",
    },
    PresetColor {
        standard: PaletteStandard::Pantone,
        code: "19-4052",
        name: "Classic Blue",
        hex: "#0F4C81",
    },
    PresetColor {
        standard: PaletteStandard::Ral,
        code: "7035",
        name: "Light Grey",
        hex: "#C5C7C4",
    },
    PresetColor {
        standard: PaletteStandard::Ral,
        code: "9010",
        name: "Pure White",
        hex: "#FFFFFF",
    },
    PresetColor {
        standard: PaletteStandard::Ral,
        code: "7016",
        name: "Anthracite",
        hex: "#383E42",
    },
    PresetColor {
        standard: PaletteStandard::Ral,
        code: "3000",
        name: "Flame Red",
        hex: "#AF2B1E",
    },
];

pub fn popular_presets(standard: Option<PaletteStandard>) -> Vec<PresetColor> {
    POPULAR
        .iter()
        .filter(|preset| standard.map_or(true, |wanted| preset.standard == wanted))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{popular_presets, PaletteStandard};

    #[test]
    fn presets_split_by_standard() {
        assert_eq!(popular_presets(None).len(), 8);
        let ral = popular_presets(Some(PaletteStandard::Ral));
        assert_eq!(
            ral.iter().map(|preset| preset.code).collect::<Vec<_>>(),
            vec!["7035", "9010", "7016", "3000"]
        );
        assert!(popular_presets(Some(PaletteStandard::Pantone))
            .iter()
            .all(|preset| preset.code.contains('-')));
    }
}
