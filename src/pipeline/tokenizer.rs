//! Byte-pair token counting with a CJK correction and a character-ratio
//! estimator fallback when the encoder cannot be constructed.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn bpe() -> Option<&'static CoreBPE> {
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(enc) => Some(enc),
        Err(e) => {
            tracing::warn!("cl100k tokenizer unavailable ({}), using estimator", e);
            None
        }
    })
    .as_ref()
}

/// CJK ranges that the BPE under-weights: Han, kana, hangul.
fn is_cjk(c: char) -> bool {
    matches!(u32::from(c),
        0x4E00..=0x9FFF        // CJK Unified Ideographs
        | 0x3400..=0x4DBF      // Extension A
        | 0x20000..=0x2A6DF    // Extension B
        | 0xF900..=0xFAFF      // Compatibility Ideographs
        | 0x3040..=0x30FF      // Hiragana + Katakana
        | 0xAC00..=0xD7AF      // Hangul Syllables
    )
}

fn cjk_char_count(text: &str) -> usize {
    text.chars().filter(|c| is_cjk(*c)).count()
}

/// Count tokens in `text`.
///
/// With `multi_language` set, CJK-heavy text gets a correction on top of the
/// BPE count: `c` CJK characters contribute roughly 2.5 tokens each where the
/// encoder assumes ~1.5.
pub fn count(text: &str, multi_language: bool) -> usize {
    if text.is_empty() {
        return 0;
    }

    let Some(enc) = bpe() else {
        return estimate(text);
    };

    let base = enc.encode_ordinary(text).len();
    if !multi_language {
        return base;
    }

    let c = cjk_char_count(text) as f64;
    let correction = ((c * 2.5).ceil() - (c * 1.5).ceil()).max(0.0) as usize;
    base + correction
}

/// Length-based fallback when the encoder is unavailable.
pub fn estimate(text: &str) -> usize {
    let cjk = cjk_char_count(text);
    let non_cjk = text.chars().count() - cjk;
    (non_cjk as f64 / 4.0).ceil() as usize + (cjk as f64 * 2.5).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(count("", true), 0);
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn latin_counts_scale_with_length() {
        let short = count("Hello world.", false);
        let long = count(&"Hello world. ".repeat(50), false);
        assert!(short >= 2);
        assert!(long > short * 20);
    }

    #[test]
    fn multi_language_adds_cjk_correction() {
        let text = "東京は日本の首都です";
        let plain = count(text, false);
        let corrected = count(text, true);
        assert!(corrected > plain, "{corrected} should exceed {plain}");
        let c = cjk_char_count(text) as f64;
        let expected = ((c * 2.5).ceil() - (c * 1.5).ceil()) as usize;
        assert_eq!(corrected - plain, expected);
    }

    #[test]
    fn correction_is_zero_without_cjk() {
        let text = "No ideographs here at all.";
        assert_eq!(count(text, true), count(text, false));
    }

    #[test]
    fn estimator_ratios() {
        // 8 ASCII chars → ceil(8/4) = 2; 4 CJK chars → ceil(4·2.5) = 10.
        assert_eq!(estimate("abcdefgh"), 2);
        assert_eq!(estimate("日本語字"), 10);
    }
}
