use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::NormalizationConfig;

/// Canonicalize a string before comparison or key generation. Applied
/// identically to both sides of every comparison, which is what makes
/// every similarity algorithm symmetric.
pub fn normalize(input: &str, config: &NormalizationConfig) -> String {
    if !config.enabled {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut last_was_space = true;

    for ch in input.nfkd() {
        if config.strip_diacritics && is_combining_mark(ch) {
            continue;
        }

        if config.case_fold {
            // to_lowercase can expand to multiple chars (e.g. İ)
            for lowered in ch.to_lowercase() {
                push_normalized(&mut out, lowered, config, &mut last_was_space);
            }
        } else {
            push_normalized(&mut out, ch, config, &mut last_was_space);
        }
    }

    if config.collapse_whitespace {
        while out.ends_with(' ') {
            out.pop();
        }
    }

    out
}

fn push_normalized(
    out: &mut String,
    ch: char,
    config: &NormalizationConfig,
    last_was_space: &mut bool,
) {
    if ch.is_whitespace() {
        if config.collapse_whitespace {
            if !*last_was_space {
                out.push(' ');
                *last_was_space = true;
            }
        } else {
            out.push(ch);
            *last_was_space = true;
        }
        return;
    }

    if config.strip_punctuation && !ch.is_alphanumeric() {
        return;
    }

    out.push(ch);
    *last_was_space = false;
}
