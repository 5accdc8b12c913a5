use crate::config::{EditCosts, PhoneticConfig, PhoneticEncoder};

use super::edit::levenshtein_similarity;

/// Phonetic similarity: 1.0 on equal codes, optional edit-distance fallback
/// over the codes for partial credit, else 0.0.
pub fn phonetic_similarity(a: &str, b: &str, config: &PhoneticConfig) -> f64 {
    let code_a = encode(a, config.encoder);
    let code_b = encode(b, config.encoder);

    if code_a.is_empty() && code_b.is_empty() {
        return 1.0;
    }
    if code_a.is_empty() || code_b.is_empty() {
        return 0.0;
    }
    if code_a == code_b {
        return 1.0;
    }
    if config.code_fallback {
        return levenshtein_similarity(&code_a, &code_b, &EditCosts::default());
    }
    0.0
}

pub fn encode(input: &str, encoder: PhoneticEncoder) -> String {
    match encoder {
        PhoneticEncoder::Soundex => soundex(input),
        PhoneticEncoder::Cologne => cologne(input),
        PhoneticEncoder::Metaphone => metaphone(input),
    }
}

fn letters(input: &str) -> Vec<char> {
    input
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Soundex
// ---------------------------------------------------------------------------

/// Classic 4-character American Soundex.
pub fn soundex(input: &str) -> String {
    let chars = letters(input);
    let Some(&first) = chars.first() else {
        return String::new();
    };

    let digit = |c: char| -> u8 {
        match c {
            'b' | 'f' | 'p' | 'v' => 1,
            'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => 2,
            'd' | 't' => 3,
            'l' => 4,
            'm' | 'n' => 5,
            'r' => 6,
            _ => 0,
        }
    };

    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut prev = digit(first);

    for &c in &chars[1..] {
        if code.len() == 4 {
            break;
        }
        let d = digit(c);
        if d == 0 {
            // h and w are transparent; vowels break the run
            if c != 'h' && c != 'w' {
                prev = 0;
            }
            continue;
        }
        if d != prev {
            code.push(char::from(b'0' + d));
        }
        prev = d;
    }

    while code.len() < 4 {
        code.push('0');
    }
    code
}

// ---------------------------------------------------------------------------
// Cologne phonetics
// ---------------------------------------------------------------------------

/// Kölner Phonetik: digit string, no length cap. Suits German-style names
/// where Soundex truncates too aggressively.
pub fn cologne(input: &str) -> String {
    let chars = letters(input);
    if chars.is_empty() {
        return String::new();
    }

    let at = |i: isize| -> Option<char> {
        if i < 0 {
            None
        } else {
            chars.get(i as usize).copied()
        }
    };

    let mut raw = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        let prev = at(i as isize - 1);
        let next = at(i as isize + 1);

        let code: &str = match c {
            'a' | 'e' | 'i' | 'j' | 'o' | 'u' | 'y' => "0",
            'h' => "",
            'b' => "1",
            'p' => {
                if next == Some('h') {
                    "3"
                } else {
                    "1"
                }
            }
            'd' | 't' => {
                if matches!(next, Some('c') | Some('s') | Some('z')) {
                    "8"
                } else {
                    "2"
                }
            }
            'f' | 'v' | 'w' => "3",
            'g' | 'k' | 'q' => "4",
            'c' => {
                let before = matches!(
                    next,
                    Some('a') | Some('h') | Some('k') | Some('o') | Some('q') | Some('u') | Some('x')
                );
                if i == 0 {
                    if before || matches!(next, Some('l') | Some('r')) {
                        "4"
                    } else {
                        "8"
                    }
                } else if matches!(prev, Some('s') | Some('z')) {
                    "8"
                } else if before {
                    "4"
                } else {
                    "8"
                }
            }
            'x' => {
                if matches!(prev, Some('c') | Some('k') | Some('q')) {
                    "8"
                } else {
                    "48"
                }
            }
            'l' => "5",
            'm' | 'n' => "6",
            'r' => "7",
            's' | 'z' => "8",
            _ => "",
        };
        raw.push_str(code);
    }

    // Collapse runs, then drop zeros except in leading position.
    let mut out = String::with_capacity(raw.len());
    let mut prev: Option<char> = None;
    for c in raw.chars() {
        if Some(c) != prev {
            out.push(c);
        }
        prev = Some(c);
    }
    let mut result = String::with_capacity(out.len());
    for (i, c) in out.chars().enumerate() {
        if c != '0' || i == 0 {
            result.push(c);
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Metaphone
// ---------------------------------------------------------------------------

/// Metaphone-style consonant reduction (the classic rule set, uncapped).
pub fn metaphone(input: &str) -> String {
    let mut chars = letters(input);
    if chars.is_empty() {
        return String::new();
    }

    // Initial-pair exceptions
    match (chars.first().copied(), chars.get(1).copied()) {
        (Some('a'), Some('e')) => {
            chars.remove(0);
        }
        (Some('g') | Some('k') | Some('p'), Some('n')) | (Some('w'), Some('r')) => {
            chars.remove(0);
        }
        (Some('x'), _) => chars[0] = 's',
        (Some('w'), Some('h')) => {
            chars.remove(1);
        }
        _ => {}
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u');
    let n = chars.len();
    let at = |i: isize| -> Option<char> {
        if i < 0 {
            None
        } else {
            chars.get(i as usize).copied()
        }
    };

    let mut out = String::with_capacity(n);
    let mut i: usize = 0;
    while i < n {
        let c = chars[i];
        let prev = at(i as isize - 1);
        let next = at(i as isize + 1);
        let next2 = at(i as isize + 2);

        // Duplicate letters collapse, except c (for -cc-)
        if Some(c) == prev && c != 'c' {
            i += 1;
            continue;
        }

        match c {
            'a' | 'e' | 'i' | 'o' | 'u' => {
                if i == 0 {
                    out.push(c);
                }
            }
            'b' => {
                // silent in terminal -mb
                if !(i + 1 == n && prev == Some('m')) {
                    out.push('b');
                }
            }
            'c' => {
                if next == Some('i') && next2 == Some('a') {
                    out.push('x');
                } else if next == Some('h') {
                    if prev == Some('s') {
                        out.push('k');
                    } else {
                        out.push('x');
                    }
                    i += 2;
                    continue;
                } else if matches!(next, Some('i') | Some('e') | Some('y')) {
                    if prev != Some('s') {
                        out.push('s');
                    }
                } else {
                    out.push('k');
                }
            }
            'd' => {
                if next == Some('g') && matches!(next2, Some('e') | Some('y') | Some('i')) {
                    out.push('j');
                    i += 2;
                    continue;
                }
                out.push('t');
            }
            'f' => out.push('f'),
            'g' => {
                if next == Some('h') {
                    if !matches!(next2, Some(v) if is_vowel(v)) {
                        // -gh- silent unless a vowel follows
                        i += 2;
                        continue;
                    }
                    out.push('k');
                    i += 1;
                } else if next == Some('n') {
                    // gn, gned: silent g
                } else if matches!(next, Some('i') | Some('e') | Some('y')) {
                    out.push('j');
                } else {
                    out.push('k');
                }
            }
            'h' => {
                let prev_vowel = matches!(prev, Some(v) if is_vowel(v));
                let next_vowel = matches!(next, Some(v) if is_vowel(v));
                if !(prev_vowel && !next_vowel) {
                    out.push('h');
                }
            }
            'j' => out.push('j'),
            'k' => {
                if prev != Some('c') {
                    out.push('k');
                }
            }
            'l' => out.push('l'),
            'm' => out.push('m'),
            'n' => out.push('n'),
            'p' => {
                if next == Some('h') {
                    out.push('f');
                    i += 2;
                    continue;
                }
                out.push('p');
            }
            'q' => out.push('k'),
            'r' => out.push('r'),
            's' => {
                if next == Some('h') {
                    out.push('x');
                    i += 2;
                    continue;
                }
                if next == Some('i') && matches!(next2, Some('o') | Some('a')) {
                    out.push('x');
                } else {
                    out.push('s');
                }
            }
            't' => {
                if next == Some('h') {
                    out.push('0');
                    i += 2;
                    continue;
                }
                if next == Some('i') && matches!(next2, Some('o') | Some('a')) {
                    out.push('x');
                } else {
                    out.push('t');
                }
            }
            'v' => out.push('f'),
            'w' => {
                if matches!(next, Some(v) if is_vowel(v)) {
                    out.push('w');
                }
            }
            'x' => out.push_str("ks"),
            'y' => {
                if matches!(next, Some(v) if is_vowel(v)) {
                    out.push('y');
                }
            }
            'z' => out.push('s'),
            _ => {}
        }
        i += 1;
    }

    out
}
