//! Parsing and validation of the agent's chosen move.

use std::sync::LazyLock;

use regex::Regex;

/// Matches the destination marker line, e.g. `移動先: 東京都` or `移動先：東京都`.
static MOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"移動先\s*[:：]\s*(.+)").unwrap());

/// Strips trailing sentence punctuation and a polite `です` suffix.
fn clean_move(raw: &str) -> String {
    let mut move_text = raw.trim();
    move_text = move_text.trim_end_matches(['。', '．', '.', '!', '！', '?', '？']);
    let mut cleaned = move_text.trim().to_string();
    if let Some(stripped) = cleaned.strip_suffix("です") {
        cleaned = stripped.trim().to_string();
    }
    cleaned
}

/// Extract the agent's destination from free-form reply text.
///
/// Takes the last `移動先:` marker in the text, cleans the remainder of that
/// line, and checks exact (case-sensitive) membership in `candidates`. Returns
/// `(None, false)` when no marker is present.
pub fn extract_move(text: &str, candidates: &[String]) -> (Option<String>, bool) {
    let Some(captures) = MOVE_RE.captures_iter(text).last() else {
        return (None, false);
    };
    let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let cleaned = clean_move(raw);
    let valid = candidates.iter().any(|candidate| candidate == &cleaned);
    (Some(cleaned), valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_marked_destination() {
        let text = "考察: ゴールへの近道を探す\n移動先: 東京都";
        let (parsed, valid) = extract_move(text, &candidates(&["東京都", "大阪府"]));
        assert_eq!(parsed.as_deref(), Some("東京都"));
        assert!(valid);
    }

    #[test]
    fn out_of_set_destination_is_invalid_but_reported() {
        let text = "移動先: 京都府";
        let (parsed, valid) = extract_move(text, &candidates(&["東京都"]));
        assert_eq!(parsed.as_deref(), Some("京都府"));
        assert!(!valid);
    }

    #[test]
    fn missing_marker_returns_none() {
        let (parsed, valid) = extract_move("東京都に行きます", &candidates(&["東京都"]));
        assert_eq!(parsed, None);
        assert!(!valid);
    }

    #[test]
    fn last_marker_wins() {
        let text = "移動先: 大阪府\nやはり変更します。\n移動先: 東京都";
        let (parsed, valid) = extract_move(text, &candidates(&["東京都", "大阪府"]));
        assert_eq!(parsed.as_deref(), Some("東京都"));
        assert!(valid);
    }

    #[test]
    fn trailing_punctuation_and_honorific_are_stripped() {
        let cases = [
            "移動先: 東京都。",
            "移動先: 東京都です。",
            "移動先：東京都です",
            "移動先: 東京都！",
        ];
        for text in cases {
            let (parsed, valid) = extract_move(text, &candidates(&["東京都"]));
            assert_eq!(parsed.as_deref(), Some("東京都"), "input: {text}");
            assert!(valid, "input: {text}");
        }
    }

    #[test]
    fn fullwidth_colon_and_extra_spaces_are_accepted() {
        let (parsed, valid) = extract_move("移動先 ： 東京都", &candidates(&["東京都"]));
        assert_eq!(parsed.as_deref(), Some("東京都"));
        assert!(valid);
    }
}
