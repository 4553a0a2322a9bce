//! Deterministic text fingerprints for dedup and clustering.
//!
//! Everything here is pure and cheap: sha-256 content hashes, a 64-bit
//! simhash over stopworded shingles for near-duplicate detection, and
//! lexical similarity (TF-IDF cosine + token Jaccard) for same-event
//! grouping. No embeddings, no model calls.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

/// Portuguese function words excluded from fingerprint features.
const STOPWORDS: &[&str] = &[
    "a", "ao", "aos", "as", "com", "como", "contra", "da", "das", "de", "do", "dos", "e", "em",
    "entre", "na", "nas", "no", "nos", "o", "os", "ou", "para", "pela", "pelas", "pelo", "pelos",
    "por", "que", "sem", "sob", "sobre", "um", "uma", "umas", "uns",
];

/// Hex sha-256 of the input string.
pub fn content_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Per-item content hash for feed entries: title ∥ link ∥ summary.
pub fn item_hash(title: &str, link: &str, summary: &str) -> String {
    content_hash(&format!("{title}\u{1}{link}\u{1}{summary}"))
}

/// Lowercase, strip accents and punctuation, collapse whitespace.
pub fn canonical_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = true;
    for ch in input.chars() {
        let folded = fold_accent(ch.to_ascii_lowercase());
        if folded.is_ascii_alphanumeric() {
            out.push(folded);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        _ => ch,
    }
}

fn tokens(text: &str) -> Vec<String> {
    canonical_text(text)
        .split_whitespace()
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Build simhash features: 3-token shingles plus a unigram head to keep
/// signal on very short bodies.
fn simhash_features(text: &str) -> Vec<String> {
    let toks = tokens(text);
    if toks.is_empty() {
        return vec![];
    }
    if toks.len() < 3 {
        return toks;
    }
    let mut features: Vec<String> = toks.windows(3).map(|w| w.join(" ")).collect();
    features.extend(toks.iter().take(24).cloned());
    features
}

fn feature_hash64(feature: &str) -> u64 {
    let digest = Sha256::digest(feature.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("8-byte slice"))
}

/// 64-bit simhash of the input, or `None` for texts with no usable tokens.
pub fn simhash64(text: &str) -> Option<u64> {
    let features = simhash_features(text);
    if features.is_empty() {
        return None;
    }
    let mut weights = [0i32; 64];
    for feature in &features {
        let h = feature_hash64(feature);
        for (bit, weight) in weights.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }
    let mut hash = 0u64;
    for (bit, weight) in weights.iter().enumerate() {
        if *weight >= 0 {
            hash |= 1 << bit;
        }
    }
    Some(hash)
}

/// Bit similarity between two simhashes: 1 − hamming/64.
pub fn simhash_similarity(a: u64, b: u64) -> f64 {
    1.0 - (a ^ b).count_ones() as f64 / 64.0
}

/// Jaccard similarity over stopworded tokens.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let sa: HashSet<String> = tokens(a).into_iter().collect();
    let sb: HashSet<String> = tokens(b).into_iter().collect();
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let inter = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    inter / union
}

/// TF-IDF cosine between two short texts (title + lede). The corpus is just
/// the pair, so IDF only downweights terms both sides share with high
/// frequency; it behaves like a length-normalised weighted overlap.
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let tf = |toks: &[String]| -> HashMap<String, f64> {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for t in toks {
            *counts.entry(t.clone()).or_default() += 1.0;
        }
        let n = toks.len() as f64;
        counts.values_mut().for_each(|v| *v /= n);
        counts
    };

    let tfa = tf(&ta);
    let tfb = tf(&tb);

    let vocab: HashSet<&String> = tfa.keys().chain(tfb.keys()).collect();
    let idf = |term: &String| -> f64 {
        let docs = [tfa.contains_key(term), tfb.contains_key(term)]
            .iter()
            .filter(|x| **x)
            .count() as f64;
        (1.0 + 2.0 / docs).ln()
    };

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for term in vocab {
        let w = idf(term);
        let wa = tfa.get(term).copied().unwrap_or(0.0) * w;
        let wb = tfb.get(term).copied().unwrap_or(0.0) * w;
        dot += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn item_hash_varies_with_each_field() {
        let base = item_hash("t", "l", "s");
        assert_ne!(base, item_hash("t2", "l", "s"));
        assert_ne!(base, item_hash("t", "l2", "s"));
        assert_ne!(base, item_hash("t", "l", "s2"));
    }

    #[test]
    fn canonical_text_folds_accents_and_punctuation() {
        assert_eq!(
            canonical_text("Decisão: R$ 4,5 bilhões — liberados!"),
            "decisao r 4 5 bilhoes liberados"
        );
    }

    #[test]
    fn simhash_identical_texts_match() {
        let text = "governo federal publica decreto sobre licitacao de obras";
        assert_eq!(simhash64(text), simhash64(text));
    }

    #[test]
    fn simhash_near_duplicates_are_close() {
        let a = "governo federal publica decreto sobre licitacao de obras rodoviarias no parana";
        let b = "governo federal publica decreto sobre licitacao de obras rodoviarias no parana hoje";
        let (ha, hb) = (simhash64(a).unwrap(), simhash64(b).unwrap());
        assert!(
            simhash_similarity(ha, hb) > 0.85,
            "near dup similarity too low: {}",
            simhash_similarity(ha, hb)
        );
    }

    #[test]
    fn simhash_distinct_topics_are_far() {
        let a = "supremo tribunal federal julga recurso sobre marco temporal indigena";
        let b = "prefeitura anuncia cronograma de vacinacao contra gripe nas escolas";
        let (ha, hb) = (simhash64(a).unwrap(), simhash64(b).unwrap());
        assert!(
            simhash_similarity(ha, hb) < 0.85,
            "distinct topics too similar: {}",
            simhash_similarity(ha, hb)
        );
    }

    #[test]
    fn simhash_empty_is_none() {
        assert_eq!(simhash64(""), None);
        assert_eq!(simhash64("de a o"), None);
    }

    #[test]
    fn lexical_similarity_bounds() {
        let a = "congresso aprova projeto de lei sobre saneamento";
        assert!((lexical_similarity(a, a) - 1.0).abs() < 1e-9);
        assert_eq!(lexical_similarity(a, ""), 0.0);
        let unrelated = "time vence campeonato estadual de futebol";
        assert!(lexical_similarity(a, unrelated) < 0.1);
    }

    #[test]
    fn jaccard_overlap() {
        let a = "operacao policia federal investiga fraude licitacao";
        let b = "policia federal deflagra operacao contra fraude em licitacao";
        assert!(token_jaccard(a, b) > 0.5);
        assert_eq!(token_jaccard("", ""), 0.0);
    }
}
