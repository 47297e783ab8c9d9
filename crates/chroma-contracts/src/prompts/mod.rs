use crate::color::format_number;

pub const JSON_MIME_TYPE: &str = "application/json";
pub const JPEG_MIME_TYPE: &str = "image/jpeg";

const RECORD_STRUCTURE: &str = r##"{
  "library": "string",
  "code": "string",
  "nameEN": "string",
  "nameZH": "string",
  "hex": "#RRGGBB",
  "rgb": { "r": number, "g": number, "b": number },
  "lab": { "l": number, "a": number, "b": number },
  "description": "string"
}"##;

const IMAGE_RECORD_STRUCTURE: &str = r##"{
  "library": "Pantone or RAL",
  "code": "color code",
  "nameEN": "name in English",
  "nameZH": "name in Chinese",
  "hex": "#RRGGBB",
  "rgb": { "r": 0, "g": 0, "b": 0 },
  "lab": { "l": 0, "a": 0, "b": 0 },
  "description": "Brief description of the color match"
}"##;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Code,
    Image,
    Value,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Image => "image",
            Self::Value => "value",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Code | Self::Image => "gemini-3-pro-preview",
            Self::Value => "gemini-3-flash-preview",
        }
    }

    /// Model capability the mode needs.
    pub fn capability(self) -> &'static str {
        match self {
            Self::Image => "vision",
            Self::Code | Self::Value => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSpace {
    Rgb,
    Lab,
}

impl ValueSpace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Lab => "lab",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rgb" => Some(Self::Rgb),
            "lab" => Some(Self::Lab),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub mode: SearchMode,
    pub text: String,
    pub attachment: Option<ImageAttachment>,
}

pub fn code_lookup_prompt(code: &str) -> PromptRequest {
    let text = format!(
        "Find the official color details for the code \"{code}\".\n\
         \n\
         Rules:\n\
         1. If the code is a 4-digit number (e.g. 7035), treat it as RAL Classic (e.g. RAL 7035).\n\
         2. If it is formatted like XX-XXXX, treat it as Pantone.\n\
         3. Return a SINGLE JSON object representing this color.\n\
         \n\
         Required JSON Structure:\n\
         {RECORD_STRUCTURE}\n"
    );
    PromptRequest {
        mode: SearchMode::Code,
        text,
        attachment: None,
    }
}

pub fn image_identification_prompt(jpeg_bytes: Vec<u8>) -> PromptRequest {
    let text = format!(
        "Analyze the image. Identify the ONE main dominant color.\n\
         Find the best matching Pantone or RAL color.\n\
         \n\
         Return a JSON object with this EXACT structure:\n\
         {IMAGE_RECORD_STRUCTURE}\n"
    );
    PromptRequest {
        mode: SearchMode::Image,
        text,
        attachment: Some(ImageAttachment {
            mime_type: JPEG_MIME_TYPE.to_string(),
            bytes: jpeg_bytes,
        }),
    }
}

pub fn value_lookup_prompt(space: ValueSpace, values: [f64; 3]) -> PromptRequest {
    let [v1, v2, v3] = values.map(format_number);
    let subject = match space {
        ValueSpace::Rgb => format!("RGB({v1}, {v2}, {v3})"),
        ValueSpace::Lab => format!("CIE L*a*b* ({v1}, {v2}, {v3})"),
    };
    PromptRequest {
        mode: SearchMode::Value,
        text: format!(
            "Find the closest Pantone or RAL color match for {subject}. \
             Return a JSON object with library, code, nameEN, nameZH, hex, rgb, lab, and description."
        ),
        attachment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        code_lookup_prompt, image_identification_prompt, value_lookup_prompt, SearchMode,
        ValueSpace, JPEG_MIME_TYPE,
    };

    #[test]
    fn code_prompt_embeds_code_and_palette_rules() {
        let prompt = code_lookup_prompt("19-4052");
        assert_eq!(prompt.mode, SearchMode::Code);
        assert!(prompt.attachment.is_none());
        assert!(prompt
            .text
            .starts_with("Find the official color details for the code \"19-4052\"."));
        assert!(prompt.text.contains("treat it as RAL Classic"));
        assert!(prompt.text.contains("formatted like XX-XXXX, treat it as Pantone"));
        assert!(prompt.text.contains("\"nameZH\": \"string\""));
        assert!(prompt.text.contains("\"lab\": { \"l\": number"));
    }

    #[test]
    fn code_prompt_is_deterministic() {
        assert_eq!(code_lookup_prompt("7035"), code_lookup_prompt("7035"));
    }

    #[test]
    fn image_prompt_attaches_jpeg() {
        let prompt = image_identification_prompt(vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(prompt.mode, SearchMode::Image);
        let attachment = prompt.attachment.expect("attachment");
        assert_eq!(attachment.mime_type, JPEG_MIME_TYPE);
        assert_eq!(attachment.bytes, vec![0xFF, 0xD8, 0xFF]);
        assert!(prompt.text.contains("ONE main dominant color"));
        assert!(prompt.text.contains("\"library\": \"Pantone or RAL\""));
    }

    #[test]
    fn value_prompts_name_the_space() {
        let rgb = value_lookup_prompt(ValueSpace::Rgb, [255.0, 128.0, 0.0]);
        assert!(rgb
            .text
            .starts_with("Find the closest Pantone or RAL color match for RGB(255, 128, 0)."));
        let lab = value_lookup_prompt(ValueSpace::Lab, [53.2, -20.0, 7.5]);
        assert!(lab.text.contains("CIE L*a*b* (53.2, -20, 7.5)"));
        assert!(lab
            .text
            .ends_with("library, code, nameEN, nameZH, hex, rgb, lab, and description."));
        assert_eq!(lab.mode, SearchMode::Value);
    }

    #[test]
    fn modes_pick_models_and_capabilities() {
        assert_eq!(SearchMode::Code.default_model(), "gemini-3-pro-preview");
        assert_eq!(SearchMode::Value.default_model(), "gemini-3-flash-preview");
        assert_eq!(SearchMode::Image.capability(), "vision");
        assert_eq!(ValueSpace::parse(" LAB "), Some(ValueSpace::Lab));
        assert_eq!(ValueSpace::parse("hsl"), None);
    }
}
