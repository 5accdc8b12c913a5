use crate::config::WinklerConfig;

/// Jaro similarity over chars: sliding match window of
/// `floor(max_len/2) - 1`, matched characters m, transpositions t,
/// `((m/|a|) + (m/|b|) + ((m - t)/m)) / 3`. Zero when nothing matches.
pub fn jaro(a: &str, b: &str) -> f64 {
    let av: Vec<char> = a.chars().collect();
    let bv: Vec<char> = b.chars().collect();

    if av.is_empty() && bv.is_empty() {
        return 1.0;
    }
    if av.is_empty() || bv.is_empty() {
        return 0.0;
    }

    let window = (av.len().max(bv.len()) / 2).saturating_sub(1);

    let mut a_matched = vec![false; av.len()];
    let mut b_matched = vec![false; bv.len()];
    let mut matches = 0usize;

    for (i, ca) in av.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(bv.len());
        for j in lo..hi {
            if !b_matched[j] && bv[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    // Count positions where the matched sequences disagree; each swap
    // accounts for two of them.
    let mut mismatched = 0usize;
    let mut j = 0usize;
    for (i, ca) in av.iter().enumerate() {
        if !a_matched[i] {
            continue;
        }
        while !b_matched[j] {
            j += 1;
        }
        if *ca != bv[j] {
            mismatched += 1;
        }
        j += 1;
    }
    let transpositions = mismatched as f64 / 2.0;

    let m = matches as f64;
    ((m / av.len() as f64) + (m / bv.len() as f64) + ((m - transpositions) / m)) / 3.0
}

/// Jaro-Winkler: `jaro + ℓ·p·(1 - jaro)` where ℓ is the shared prefix
/// length capped by config and p the prefix scale (≤ 0.25 by validation).
pub fn jaro_winkler(a: &str, b: &str, config: &WinklerConfig) -> f64 {
    let base = jaro(a, b);
    if base == 0.0 {
        return 0.0;
    }

    let prefix = a
        .chars()
        .zip(b.chars())
        .take(config.max_prefix)
        .take_while(|(x, y)| x == y)
        .count();

    (base + prefix as f64 * config.prefix_scale * (1.0 - base)).clamp(0.0, 1.0)
}

/// Token-aware Jaro-Winkler for reordered multi-word names: greedy
/// best-pair matching across whitespace tokens (each token used at most
/// once), averaged over the larger token count.
pub fn token_jaro_winkler(a: &str, b: &str, config: &WinklerConfig) -> f64 {
    let mut left: Vec<&str> = a.split_whitespace().collect();
    let mut right: Vec<&str> = b.split_whitespace().collect();

    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    // Canonical operand order so greedy tie-breaking cannot depend on
    // argument order.
    if (right.len(), &right) < (left.len(), &left) {
        std::mem::swap(&mut left, &mut right);
    }

    let mut pairs: Vec<(f64, usize, usize)> = Vec::with_capacity(left.len() * right.len());
    for (i, lt) in left.iter().enumerate() {
        for (j, rt) in right.iter().enumerate() {
            let s = jaro_winkler(lt, rt, config);
            if s > 0.0 {
                pairs.push((s, i, j));
            }
        }
    }
    pairs.sort_by(|x, y| {
        y.0.partial_cmp(&x.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(x.1.cmp(&y.1))
            .then(x.2.cmp(&y.2))
    });

    let mut left_used = vec![false; left.len()];
    let mut right_used = vec![false; right.len()];
    let mut total = 0.0;

    for (s, i, j) in pairs {
        if left_used[i] || right_used[j] {
            continue;
        }
        left_used[i] = true;
        right_used[j] = true;
        total += s;
    }

    total / left.len().max(right.len()) as f64
}
