use lazy_static::lazy_static;
use regex::{Captures, Regex};
use super::{capture_u32, normalize_punctuation, ordered_span};

type TokenFn = fn(&Captures<'_>) -> Option<Vec<u32>>;

struct TokenRule {
    pattern: Regex,
    chapters: TokenFn,
}

fn rule(pattern: &str, chapters: TokenFn) -> TokenRule {
    TokenRule {
        pattern: Regex::new(pattern).expect("token rule pattern is valid"),
        chapters,
    }
}

lazy_static! {
    static ref TOKEN_RULES: Vec<TokenRule> = vec![
        // 22:1-23:5
        rule(r"^(\d+)\s*:\s*\d+\s*-\s*(\d+)\s*:\s*\d+", chapter_span),
        // 22:1-8, 22:4
        rule(r"^(\d+)\s*:", first_chapter),
        // 22장 1-8절, 22장1절, 23편 1-3
        rule(r"^(\d+)\s*(?:장|편)\s*\d", first_chapter),
        // 1-3장, 1-3
        rule(r"^(\d+)\s*-\s*(\d+)\s*(?:장|편)?$", chapter_span),
        // legacy "22 1-8" (chapter, space, verses)
        rule(r"^(\d+)\s+\d+(?:\s*-\s*\d+)?\s*절?$", first_chapter),
        // 22, 22장, 23편
        rule(r"^(\d+)\s*(?:장|편)?$", first_chapter),
    ];
    static ref LEADING_NUMBER: Regex = Regex::new(r"\d+").expect("leading number pattern is valid");
}

fn first_chapter(caps: &Captures<'_>) -> Option<Vec<u32>> {
    Some(vec![capture_u32(caps, 1)?])
}

fn chapter_span(caps: &Captures<'_>) -> Option<Vec<u32>> {
    let (start, end) = ordered_span(capture_u32(caps, 1)?, capture_u32(caps, 2)?)?;
    Some((start..=end).collect())
}

fn segment_chapters(segment: &str) -> Vec<u32> {
    for rule in TOKEN_RULES.iter() {
        if let Some(caps) = rule.pattern.captures(segment) {
            return (rule.chapters)(&caps).unwrap_or_default();
        }
    }
    // Lenient fallback: the first number in the segment names the chapter
    LEADING_NUMBER
        .find(segment)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|n| vec![n])
        .unwrap_or_default()
}

/// Distinct chapter tokens a chapter text touches, in order of first appearance.
///
/// Looser than the range parser: verse detail is ignored and segments may be
/// separated by commas, semicolons, or line breaks.
pub fn expand_chapter_tokens(chapter_spec: &str) -> Vec<String> {
    let normalized = normalize_punctuation(chapter_spec);
    let mut seen: Vec<u32> = Vec::new();

    let segments = normalized
        .split(|c: char| c == ',' || c == ';' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|s| !s.is_empty());

    for segment in segments {
        for chapter in segment_chapters(segment) {
            if chapter > 0 && !seen.contains(&chapter) {
                seen.push(chapter);
            }
        }
    }

    seen.into_iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colon_and_korean_forms_agree() {
        assert_eq!(expand_chapter_tokens("22:1-8"), vec!["22"]);
        assert_eq!(expand_chapter_tokens("22장 1-8절"), vec!["22"]);
    }

    #[test]
    fn test_chapter_span_expands() {
        assert_eq!(expand_chapter_tokens("1-3장"), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_tokens_are_deduplicated() {
        assert_eq!(expand_chapter_tokens("22:1-8, 22:9-16, 23"), vec!["22", "23"]);
    }

    #[test]
    fn test_legacy_formats_without_colons() {
        assert_eq!(expand_chapter_tokens("22 1-8"), vec!["22"]);
        assert_eq!(expand_chapter_tokens("22장1-8절"), vec!["22"]);
        assert_eq!(expand_chapter_tokens("23편"), vec!["23"]);
    }

    #[test]
    fn test_line_separated_segments() {
        assert_eq!(expand_chapter_tokens("1장\n2장; 3장"), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_cross_chapter_span() {
        assert_eq!(expand_chapter_tokens("2:20-4:3"), vec!["2", "3", "4"]);
    }

    #[test]
    fn test_fallback_takes_first_number() {
        assert_eq!(expand_chapter_tokens("약 5장 전체"), vec!["5"]);
        assert!(expand_chapter_tokens("서론").is_empty());
    }
}
