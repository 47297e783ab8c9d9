use serde_json::Value;

use crate::error::LookupError;

/// Length of the raw-text prefix kept in a parse failure.
pub const EXCERPT_CHARS: usize = 100;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// First opening and last closing position of one bracket kind.
///
/// Both characters being present is what counts as "found"; the pair may
/// still be out of order, in which case it yields no candidate text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Boundary {
    open: usize,
    close: usize,
}

impl Boundary {
    fn locate(text: &str, open: char, close: char) -> Option<Self> {
        Some(Self {
            open: text.find(open)?,
            close: text.rfind(close)?,
        })
    }

    fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        (self.close > self.open).then(|| &text[self.open..=self.close])
    }
}

/// Recovers one JSON value from model output.
///
/// Returns `Ok(None)` for empty input. Stages, in order:
/// 1. strip markdown fences and parse the remainder strictly;
/// 2. parse the outermost `[...]` span, when the array span exists and
///    either no `{...}` span exists or the `[` comes first;
/// 3. parse the outermost `{...}` span.
///
/// The array-before-object ordering is a heuristic about how models wrap
/// their answers, not a general JSON locator.
pub fn normalize(raw: &str) -> Result<Option<Value>, LookupError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let cleaned = strip_fences(raw);
    if let Some(value) = parse_strict(&cleaned) {
        return Ok(Some(value));
    }
    recover_embedded(&cleaned)
        .map(Some)
        .ok_or_else(|| LookupError::Parse {
            excerpt: raw.chars().take(EXCERPT_CHARS).collect(),
        })
}

fn strip_fences(text: &str) -> String {
    text.replace(JSON_FENCE, "")
        .replace(FENCE, "")
        .trim()
        .to_string()
}

fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok()
}

fn parse_span(text: &str, boundary: Boundary) -> Option<Value> {
    boundary.slice(text).and_then(parse_strict)
}

fn prefers_array(array: Option<Boundary>, object: Option<Boundary>) -> bool {
    match (array, object) {
        (Some(_), None) => true,
        (Some(array), Some(object)) => array.open < object.open,
        (None, _) => false,
    }
}

fn recover_embedded(cleaned: &str) -> Option<Value> {
    let object = Boundary::locate(cleaned, '{', '}');
    let array = Boundary::locate(cleaned, '[', ']');

    let from_array = if prefers_array(array, object) {
        array.and_then(|boundary| parse_span(cleaned, boundary))
    } else {
        None
    };
    from_array.or_else(|| object.and_then(|boundary| parse_span(cleaned, boundary)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize, prefers_array, Boundary};
    use crate::error::LookupError;

    #[test]
    fn empty_input_yields_nothing() -> anyhow::Result<()> {
        assert_eq!(normalize("")?, None);
        Ok(())
    }

    #[test]
    fn plain_json_parses_unchanged() -> anyhow::Result<()> {
        let raw = r#"{"library":"RAL Classic","code":"7035","rgb":{"r":203,"g":208,"b":204}}"#;
        assert_eq!(
            normalize(raw)?,
            Some(serde_json::from_str::<serde_json::Value>(raw)?)
        );
        assert_eq!(normalize("[1, 2, 3]")?, Some(json!([1, 2, 3])));
        assert_eq!(normalize("42")?, Some(json!(42)));
        Ok(())
    }

    #[test]
    fn fenced_json_matches_unwrapped() -> anyhow::Result<()> {
        let bare = r#"[{"code":"19-4052"}]"#;
        let fenced = format!("```json\n{bare}\n```");
        let fenced_no_tag = format!("```\n{bare}\n```\n");
        assert_eq!(normalize(&fenced)?, normalize(bare)?);
        assert_eq!(normalize(&fenced_no_tag)?, normalize(bare)?);
        Ok(())
    }

    #[test]
    fn leading_prose_before_object() -> anyhow::Result<()> {
        assert_eq!(
            normalize(r#"Here is the result: {"code":"7035"}"#)?,
            Some(json!({"code": "7035"}))
        );
        Ok(())
    }

    #[test]
    fn prose_around_array_keeps_whole_array() -> anyhow::Result<()> {
        assert_eq!(
            normalize(r#"prose [{"code":"A"},{"code":"B"}] trailing"#)?,
            Some(json!([{"code": "A"}, {"code": "B"}]))
        );
        Ok(())
    }

    #[test]
    fn earlier_array_wins_over_later_object() -> anyhow::Result<()> {
        assert_eq!(normalize(r#"[1] then {"x":1}"#)?, Some(json!([1])));
        Ok(())
    }

    #[test]
    fn earlier_object_wins_over_nested_array() -> anyhow::Result<()> {
        assert_eq!(
            normalize(r#"Matches: {"colors": [{"code":"Z"}]} done"#)?,
            Some(json!({"colors": [{"code": "Z"}]}))
        );
        Ok(())
    }

    #[test]
    fn failed_array_falls_back_to_object() -> anyhow::Result<()> {
        assert_eq!(
            normalize(r#"[see below] {"code":"3000"}"#)?,
            Some(json!({"code": "3000"}))
        );
        Ok(())
    }

    #[test]
    fn no_brackets_is_a_parse_error() {
        let err = normalize("Sorry, I cannot identify that color.").unwrap_err();
        let LookupError::Parse { excerpt } = err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(excerpt, "Sorry, I cannot identify that color.");
    }

    #[test]
    fn parse_error_excerpt_is_truncated() {
        let raw = format!("{}{{broken", "x".repeat(250));
        match normalize(&raw) {
            Err(LookupError::Parse { excerpt }) => {
                assert_eq!(excerpt.chars().count(), 100);
                assert!(excerpt.chars().all(|ch| ch == 'x'));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn reversed_brackets_do_not_panic() {
        assert!(matches!(
            normalize("} nothing here {"),
            Err(LookupError::Parse { .. })
        ));
        assert!(matches!(normalize("]5["), Err(LookupError::Parse { .. })));
        assert!(matches!(normalize("   "), Err(LookupError::Parse { .. })));
    }

    #[test]
    fn multibyte_prose_slices_on_char_boundaries() -> anyhow::Result<()> {
        assert_eq!(
            normalize(r#"结果如下：{"code":"7035","nameZH":"浅灰色"}。"#)?,
            Some(json!({"code": "7035", "nameZH": "浅灰色"}))
        );
        Ok(())
    }

    #[test]
    fn array_preference_rules() {
        let at = |open, close| Some(Boundary { open, close });
        assert!(prefers_array(at(0, 4), None));
        assert!(prefers_array(at(2, 9), at(5, 7)));
        assert!(!prefers_array(at(6, 9), at(1, 12)));
        assert!(!prefers_array(None, at(0, 3)));
        assert!(!prefers_array(None, None));
    }
}
