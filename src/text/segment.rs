use super::classify::{classify, Script};

/// One bounded slice of the input, in engine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub index: usize,
    pub content: String,
}

/// Preferred break characters for Chinese text.
const CHINESE_BREAKS: &[char] = &['。', '！', '？', '；', '，', '、'];
/// Half-width punctuation tried when a Chinese window has no full-width break.
const CHINESE_FALLBACK_BREAKS: &[char] = &['.', '!', '?', ';', ','];

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];
const CLAUSE_SEPARATORS: &[char] = &[',', ';', ':', '-', ')'];
const CLOSING_QUOTES: &[char] = &['"', '\'', '\u{201d}', '\u{2019}'];

/// Split `text` into ordered segments of at most `max_len` characters.
///
/// Text that already fits is returned as a single, unchanged segment.
/// Longer text is scanned in windows of `max_len` characters starting at a
/// cursor; each window is cut at the best boundary it contains, the boundary
/// punctuation stays with the emitted segment, and whitespace after the cut
/// is skipped so no later segment starts with it. Leading whitespace of
/// longer text is dropped the same way; text that is nothing but whitespace
/// comes back as one segment.
///
/// Otherwise the only segments longer than `max_len` come from a Latin window with no
/// boundary at all, where the cut is pushed forward to the end of the word
/// straddling the window edge.
pub fn segment(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return vec![text.to_string()];
    }

    let script = classify(text);
    log::debug!(
        "Segmenting {} chars as {:?} with max_len={}",
        chars.len(),
        script,
        max_len
    );

    let mut start = skip_whitespace(&chars, 0);
    if start == chars.len() {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();

    while start < chars.len() {
        if chars.len() - start <= max_len {
            out.push(chars[start..].iter().collect());
            break;
        }

        let end = start + max_len;
        let cut = match script {
            Script::Chinese => chinese_cut(&chars, start, end),
            Script::Other => latin_cut(&chars, start, end),
        };

        out.push(chars[start..cut].iter().collect());
        start = skip_whitespace(&chars, cut);
    }

    out
}

/// [`segment`] with each piece tagged by its position.
pub fn segments(text: &str, max_len: usize) -> Vec<TextSegment> {
    segment(text, max_len)
        .into_iter()
        .enumerate()
        .map(|(index, content)| TextSegment { index, content })
        .collect()
}

fn chinese_cut(chars: &[char], start: usize, end: usize) -> usize {
    rfind_any(chars, start, end, CHINESE_BREAKS)
        .or_else(|| rfind_any(chars, start, end, CHINESE_FALLBACK_BREAKS))
        .map(|i| i + 1)
        .unwrap_or(end)
}

fn latin_cut(chars: &[char], start: usize, end: usize) -> usize {
    if let Some(cut) = sentence_cut(chars, start, end) {
        return cut;
    }
    if let Some(i) = rfind_any(chars, start, end, CLAUSE_SEPARATORS) {
        return i + 1;
    }
    // Cut before the whole whitespace run; it is skipped ahead of the next window.
    if let Some(mut i) = (start + 1..end).rev().find(|&i| chars[i].is_whitespace()) {
        while i > start + 1 && chars[i - 1].is_whitespace() {
            i -= 1;
        }
        return i;
    }
    (end..chars.len())
        .find(|&i| chars[i].is_whitespace())
        .unwrap_or(end)
}

/// Right-most sentence terminator in the window that is followed by a space
/// or a closing quote. A closing quote inside the window goes with the sentence.
fn sentence_cut(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let mut best = None;
    for i in start..end {
        if !SENTENCE_TERMINATORS.contains(&chars[i]) {
            continue;
        }
        match chars.get(i + 1) {
            Some(next) if next.is_whitespace() => best = Some(i + 1),
            Some(next) if CLOSING_QUOTES.contains(next) => {
                best = Some(if i + 1 < end { i + 2 } else { i + 1 });
            }
            _ => {}
        }
    }
    best
}

fn rfind_any(chars: &[char], start: usize, end: usize, set: &[char]) -> Option<usize> {
    (start..end).rev().find(|&i| set.contains(&chars[i]))
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}
