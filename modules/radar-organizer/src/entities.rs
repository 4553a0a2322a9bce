//! Entity mentions: cheap, deterministic extraction of named institutions
//! and people. Capitalised multi-word phrases plus a short gazetteer of
//! institutional acronyms. No model calls on this path.

use std::collections::HashSet;

use radar_common::EntityMention;

/// Institutional acronyms that are entities even as single tokens.
const ACRONYMS: &[&str] = &[
    "STF", "STJ", "TSE", "TCU", "CGU", "PGR", "AGU", "PF", "ANVISA", "COPOM", "IBAMA", "INSS",
    "BNDES",
];

/// Lowercase words allowed inside a capitalised phrase
/// ("Ministério da Saúde", "Tribunal de Contas da União").
const CONNECTORS: &[&str] = &["da", "de", "do", "das", "dos", "e"];

const MAX_ENTITIES: usize = 20;

/// Extract entity mentions from a text. Keys are accent-folded lowercase;
/// labels keep the original casing.
pub fn extract_entities(text: &str) -> Vec<EntityMention> {
    let mut mentions = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut i = 0;
    while i < words.len() && mentions.len() < MAX_ENTITIES {
        let word = clean_word(words[i]);
        if word.chars().all(|c| c.is_ascii_uppercase()) && ACRONYMS.contains(&word.as_str()) {
            push_mention(&mut mentions, &mut seen, &word, &words, i, i);
            i += 1;
            continue;
        }

        if is_capitalized(&word) && i + 1 < words.len() {
            // Greedily extend: capitalised words, connectors between them.
            let mut end = i;
            let mut j = i + 1;
            while j < words.len() {
                let next = clean_word(words[j]);
                if is_capitalized(&next) {
                    end = j;
                    j += 1;
                } else if CONNECTORS.contains(&next.as_str()) && j + 1 < words.len() {
                    let after = clean_word(words[j + 1]);
                    if is_capitalized(&after) {
                        end = j + 1;
                        j += 2;
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
            if end > i {
                let label = words[i..=end]
                    .iter()
                    .map(|w| clean_word(w))
                    .collect::<Vec<_>>()
                    .join(" ");
                push_mention(&mut mentions, &mut seen, &label, &words, i, end);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    mentions
}

fn push_mention(
    mentions: &mut Vec<EntityMention>,
    seen: &mut HashSet<String>,
    label: &str,
    words: &[&str],
    start: usize,
    end: usize,
) {
    let key = radar_common::fingerprint::canonical_text(label);
    if key.len() < 2 || !seen.insert(key.clone()) {
        return;
    }
    let span_from = start.saturating_sub(3);
    let span_to = (end + 4).min(words.len());
    mentions.push(EntityMention {
        entity_key: key,
        label: label.to_string(),
        span: words[span_from..span_to].join(" "),
    });
}

fn clean_word(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric()).to_string()
}

fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            word.chars().count() >= 2 && chars.all(|c| c.is_lowercase() || !c.is_alphabetic())
        }
        _ => false,
    }
}

/// Overlap of two entity-key sets, for the same-event rule.
pub fn entity_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let sa: HashSet<&String> = a.iter().collect();
    let sb: HashSet<&String> = b.iter().collect();
    let inter = sa.intersection(&sb).count() as f64;
    inter / sa.len().min(sb.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_institutional_phrases() {
        let text = "O Ministério da Saúde e a Polícia Federal assinaram o acordo.";
        let mentions = extract_entities(text);
        let keys: Vec<&str> = mentions.iter().map(|m| m.entity_key.as_str()).collect();
        assert!(keys.contains(&"ministerio da saude"), "keys: {keys:?}");
        assert!(keys.contains(&"policia federal"), "keys: {keys:?}");
    }

    #[test]
    fn extracts_acronyms() {
        let mentions = extract_entities("Decisão do STF mantém entendimento do TCU.");
        let keys: Vec<&str> = mentions.iter().map(|m| m.entity_key.as_str()).collect();
        assert!(keys.contains(&"stf"));
        assert!(keys.contains(&"tcu"));
    }

    #[test]
    fn sentence_initial_single_words_are_not_entities() {
        let mentions = extract_entities("Ontem choveu muito. Hoje fez sol.");
        assert!(mentions.is_empty(), "got: {mentions:?}");
    }

    #[test]
    fn dedupes_repeated_mentions() {
        let text = "A Petrobras anunciou. A Petrobras Distribuidora não. A Petrobras confirmou.";
        let mentions = extract_entities(text);
        let petro_count = mentions
            .iter()
            .filter(|m| m.entity_key == "petrobras anunciou")
            .count();
        assert!(petro_count <= 1);
    }

    #[test]
    fn overlap_is_bounded_and_symmetric() {
        let a = vec!["stf".to_string(), "policia federal".to_string()];
        let b = vec!["stf".to_string(), "senado".to_string()];
        assert_eq!(entity_overlap(&a, &b), entity_overlap(&b, &a));
        assert!((entity_overlap(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(entity_overlap(&a, &[]), 0.0);
    }
}
