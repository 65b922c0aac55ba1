use regex::Regex;
use std::sync::OnceLock;

/// Marks that already close a sentence.
pub const TERMINAL_MARKS: &[char] = &['。', '！', '？', '.', '!', '?', '…'];

// Trailing separators that get replaced, not followed, by a terminal mark.
const SOFT_TRAILING_MARKS: &[char] = &['，', '、', ',', ';', '；', ':', '：'];

const QUOTE_CHARS: &[char] = &['"', '\'', '`'];

fn tag_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Rust's `regex` crate has no backreferences, so opening/closing tag names
        // are not required to match.
        Regex::new(r"(?s)<[^>]+>.*?</[^>]+>").expect("valid tag block regex")
    })
}

fn hallucination_brackets_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Negated char classes so we never remove across multiple brackets.
        Regex::new(r"(?s)\[[^\]]*\]|\([^\)]*\)|\{[^\}]*\}").expect("valid bracket regex")
    })
}

fn filler_words_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(uh|um|uhm|umm|ah|eh|hmm|hm|mmm|mm)\b[,.]?").expect("valid filler regex")
    })
}

fn cjk_filler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `\b` is useless between CJK characters, so hesitation sounds are matched bare.
    RE.get_or_init(|| Regex::new(r"[嗯呃]+[，,、]?").expect("valid cjk filler regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid whitespace regex"))
}

fn any_whitespace_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace run regex"))
}

fn enhancement_thinking_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<thinking>.*?</thinking>|<think>.*?</think>|<reasoning>.*?</reasoning>")
            .expect("valid thinking regex")
    })
}

/// Cleans raw speech-to-text output:
/// - remove <TAG>...</TAG> blocks
/// - remove bracketed hallucinations
/// - remove common filler words
/// - collapse whitespace
pub fn filter_transcription_output(text: &str) -> String {
    let mut out = text.to_string();

    out = tag_block_re().replace_all(&out, "").to_string();
    out = hallucination_brackets_re()
        .replace_all(&out, "")
        .to_string();
    out = filler_words_re().replace_all(&out, "").to_string();
    out = cjk_filler_re().replace_all(&out, "").to_string();
    out = whitespace_re().replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Strips <thinking>, <think>, <reasoning> blocks from model output.
pub fn filter_enhancement_output(text: &str) -> String {
    let out = enhancement_thinking_re().replace_all(text, "");
    out.trim().to_string()
}

/// Collapses every whitespace run (including newlines) to one space and trims.
pub fn collapse_whitespace(text: &str) -> String {
    any_whitespace_run_re()
        .replace_all(text.trim(), " ")
        .to_string()
}

pub fn strip_surrounding_quotes(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || QUOTE_CHARS.contains(&c))
}

/// Removes every occurrence of each token, along with any punctuation left
/// dangling right after it; the flag reports whether anything was removed.
pub fn strip_tokens<S: AsRef<str>>(text: &str, tokens: &[S]) -> (String, bool) {
    let mut out = text.to_string();
    let mut removed = false;
    for token in tokens {
        let token = token.as_ref();
        if token.is_empty() || !out.contains(token) {
            continue;
        }

        let mut next = String::with_capacity(out.len());
        let mut rest = out.as_str();
        while let Some(idx) = rest.find(token) {
            next.push_str(&rest[..idx]);
            next.push(' ');
            rest = rest[idx + token.len()..].trim_start_matches(is_stranded_after_token);
        }
        next.push_str(rest);
        out = next;
        removed = true;
    }
    (out, removed)
}

fn is_stranded_after_token(c: char) -> bool {
    c.is_whitespace() || TERMINAL_MARKS.contains(&c) || SOFT_TRAILING_MARKS.contains(&c)
}

pub fn contains_any_token<S: AsRef<str>>(text: &str, tokens: &[S]) -> bool {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .any(|t| !t.is_empty() && text.contains(t))
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3000}'..='\u{303F}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}')
}

pub fn ends_with_terminal_mark(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .is_some_and(|c| TERMINAL_MARKS.contains(&c))
}

/// Appends `。` (CJK text) or `.` (anything else) unless a sentence-final
/// mark is already present. A dangling comma-like separator is replaced.
pub fn ensure_terminal_punctuation(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() || ends_with_terminal_mark(trimmed) {
        return trimmed.to_string();
    }

    let body = trimmed.trim_end_matches(|c: char| SOFT_TRAILING_MARKS.contains(&c) || c.is_whitespace());
    let Some(last) = body.chars().last() else {
        return trimmed.to_string();
    };

    let mark = if is_cjk(last) { '。' } else { '.' };
    let mut out = body.to_string();
    out.push(mark);
    out
}
