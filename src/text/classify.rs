/// Script family that selects a splitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Chinese,
    Other,
}

/// Share of CJK ideographs above which a text is treated as Chinese.
pub const CHINESE_RATIO_THRESHOLD: f64 = 0.3;

/// Classify `text` by its share of CJK Unified Ideographs.
///
/// Empty text classifies as [`Script::Other`].
pub fn classify(text: &str) -> Script {
    let (total, cjk) = text.chars().fold((0usize, 0usize), |(total, cjk), ch| {
        (total + 1, cjk + usize::from(is_cjk_ideograph(ch)))
    });

    if total == 0 {
        return Script::Other;
    }

    if cjk as f64 / total as f64 > CHINESE_RATIO_THRESHOLD {
        Script::Chinese
    } else {
        Script::Other
    }
}

fn is_cjk_ideograph(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_promo_copy_is_chinese() {
        assert_eq!(classify("全友家居年货节促销"), Script::Chinese);
    }

    #[test]
    fn english_copy_is_other() {
        assert_eq!(classify("Hello world, buy now"), Script::Other);
    }

    #[test]
    fn empty_text_is_other() {
        assert_eq!(classify(""), Script::Other);
    }

    #[test]
    fn ratio_must_exceed_threshold() {
        // 3 ideographs out of 10 chars is exactly 0.3
        assert_eq!(classify("买一送abcdefg"), Script::Other);
        // 4 out of 10
        assert_eq!(classify("买一送一abcdef"), Script::Chinese);
    }

    #[test]
    fn full_width_punctuation_is_not_counted() {
        assert_eq!(classify("。！？；，、abc"), Script::Other);
    }
}
