//! Deterministic transcript post-processing.
//!
//! An ordered list of search/replace passes fixes the mistakes the providers
//! make most often on this domain's vocabulary: homophones of product names,
//! lowercased acronyms, missing contraction apostrophes, and filler words.
//! Whitespace and punctuation cleanup runs last so it can re-normalize the
//! output of every earlier pass. The whole pipeline is a fixed point after
//! one application.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Homophone and domain-term fixes. Patterns allow any run of whitespace
/// between words so a single pass catches pre-collapse spacing.
static PHRASE_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\beye\s+tools\b", "AI tools"),
        (r"(?i)\bopen\s+eye\b", "OpenAI"),
        (r"(?i)\bchat\s+g[bp]t\b", "ChatGPT"),
        (r"(?i)\bmachine\s+earning\b", "machine learning"),
        (r"(?i)\bprompt\s+engine\s+earring\b", "prompt engineering"),
        (r"(?i)\blarge\s+language\s+modal\b", "large language model"),
        (r"(?i)\bllms\b", "LLMs"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("static pattern"), replacement))
    .collect()
});

/// Standalone acronyms that providers tend to lowercase.
static ACRONYM_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(ai|api|llm|gpu|url|json|stt|tts)\b").expect("static pattern"));

/// Contraction repairs. The apostrophe-less forms are not English words, so
/// these are safe to fix unconditionally; genuinely ambiguous forms like
/// "its" and "were" are deliberately absent.
static CONTRACTION_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bdont\b", "don't"),
        (r"(?i)\bcant\b", "can't"),
        (r"(?i)\bwont\b", "won't"),
        (r"(?i)\bdidnt\b", "didn't"),
        (r"(?i)\bdoesnt\b", "doesn't"),
        (r"(?i)\bisnt\b", "isn't"),
        (r"(?i)\barent\b", "aren't"),
        (r"(?i)\bwasnt\b", "wasn't"),
        (r"(?i)\bwerent\b", "weren't"),
        (r"(?i)\bcouldnt\b", "couldn't"),
        (r"(?i)\bshouldnt\b", "shouldn't"),
        (r"(?i)\bwouldnt\b", "wouldn't"),
        (r"(?i)\bhavent\b", "haven't"),
        (r"(?i)\bhasnt\b", "hasn't"),
        (r"(?i)\bthats\b", "that's"),
        (r"(?i)\btheres\b", "there's"),
        (r"(?i)\byoure\b", "you're"),
        (r"(?i)\btheyre\b", "they're"),
        (r"(?i)\bim\b", "I'm"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("static pattern"), replacement))
    .collect()
});

/// Filler words, with a trailing comma swallowed so removal does not leave
/// orphaned punctuation behind.
static FILLER_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:um+|uh+|erm+|hmm+)\b,?").expect("static pattern"));

static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,.;:!?])").expect("static pattern"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Applies the correction pipeline. Stateless; one instance serves all
/// requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCorrector;

impl TextCorrector {
    pub fn new() -> Self {
        Self
    }

    /// Correct one transcript. Pure and deterministic.
    pub fn correct(&self, text: &str) -> String {
        let mut out = text.to_string();

        for (pattern, replacement) in PHRASE_RULES.iter() {
            out = pattern.replace_all(&out, *replacement).into_owned();
        }

        out = ACRONYM_RULE
            .replace_all(&out, |caps: &Captures<'_>| caps[1].to_uppercase())
            .into_owned();

        for (pattern, replacement) in CONTRACTION_RULES.iter() {
            out = pattern
                .replace_all(&out, |caps: &Captures<'_>| {
                    match_case(&caps[0], replacement)
                })
                .into_owned();
        }

        out = FILLER_RULE.replace_all(&out, "").into_owned();

        // Cleanup runs last and re-normalizes everything above.
        out = WHITESPACE_RUN.replace_all(&out, " ").into_owned();
        out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1").into_owned();
        out.trim().to_string()
    }
}

/// Carry the matched word's leading capitalization onto the replacement.
/// Replacements that already start uppercase (like "I'm") are kept as-is.
fn match_case(matched: &str, replacement: &str) -> String {
    let starts_upper = matched.chars().next().is_some_and(|c| c.is_uppercase());
    let replacement_starts_upper = replacement.chars().next().is_some_and(|c| c.is_uppercase());
    if starts_upper && !replacement_starts_upper {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixes_the_ai_tools_homophone() {
        let corrector = TextCorrector::new();
        assert_eq!(
            corrector.correct("the quick brown eye tools for fashion"),
            "the quick brown AI tools for fashion"
        );
    }

    #[test]
    fn fixes_product_name_homophones() {
        let corrector = TextCorrector::new();
        assert_eq!(corrector.correct("i asked open eye about it"), "i asked OpenAI about it");
        assert_eq!(corrector.correct("chat gbt said no"), "ChatGPT said no");
        assert_eq!(corrector.correct("Chat GPT said no"), "ChatGPT said no");
    }

    #[test]
    fn uppercases_standalone_acronyms() {
        let corrector = TextCorrector::new();
        assert_eq!(
            corrector.correct("the api returns json over a url"),
            "the API returns JSON over a URL"
        );
        // Embedded occurrences are left alone.
        assert_eq!(corrector.correct("apiary maintains"), "apiary maintains");
    }

    #[test]
    fn repairs_contractions_preserving_case() {
        let corrector = TextCorrector::new();
        assert_eq!(corrector.correct("Dont worry i wont"), "Don't worry i won't");
        assert_eq!(corrector.correct("im sure thats fine"), "I'm sure that's fine");
    }

    #[test]
    fn strips_fillers_and_tidies_punctuation() {
        let corrector = TextCorrector::new();
        assert_eq!(corrector.correct("um, hello uh world"), "hello world");
        assert_eq!(corrector.correct("so , yes"), "so, yes");
        assert_eq!(corrector.correct("  spaced   out  "), "spaced out");
    }

    #[test]
    fn correction_is_idempotent() {
        let corrector = TextCorrector::new();
        let samples = [
            "the quick brown eye tools for fashion",
            "um, i asked chat gbt about the api",
            "Dont worry, im sure thats fine",
            "open eye released a new llm for prompt engine earring",
            "[no speech detected]",
            "",
            "   ",
            "plain sentence with nothing to fix.",
            "llms are large language modal systems",
        ];
        for sample in samples {
            let once = corrector.correct(sample);
            let twice = corrector.correct(&once);
            assert_eq!(once, twice, "not a fixed point for {sample:?}");
        }
    }

    #[test]
    fn output_length_is_bounded() {
        let corrector = TextCorrector::new();
        let samples = [
            "um, i asked chat gbt about the api and uh the url",
            "the quick brown eye tools for fashion",
            "dont cant wont didnt",
        ];
        for sample in samples {
            let out = corrector.correct(sample);
            assert!(
                out.len() <= sample.len() + 8,
                "{sample:?} grew to {out:?}"
            );
        }
    }

    #[test]
    fn leaves_sentinel_phrases_intact() {
        let corrector = TextCorrector::new();
        assert_eq!(corrector.correct("[no speech detected]"), "[no speech detected]");
    }
}
