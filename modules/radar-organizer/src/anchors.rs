//! The regex pack: deterministic anchors out of clean text.
//!
//! Categories cover brazilian tax ids (masked and bare), judicial and
//! administrative process ids, audit-court acts, bill identifiers,
//! administrative acts with number/year, monetary values, dates and
//! times, and .gov / PDF links. Values are normalised so `(type, value)`
//! pairs compare exactly across sources.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use radar_common::{AnchorHit, AnchorType};

static CNPJ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}|\d{14})\b").unwrap());
static CPF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{3}\.\d{3}\.\d{3}-\d{2}|\d{11})\b").unwrap());
static CNJ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{7}-\d{2}\.\d{4}\.\d\.\d{2}\.\d{4}\b").unwrap());
static SEI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5}\.\d{6}/\d{4}-\d{2}\b").unwrap());
static TCU_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Acórdão\s+(\d+/\d{4})").unwrap());
static PL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:PL|PEC|PLP|PLR)\s+\d+(?:/\d{2,4})?\b").unwrap());
static ATO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:Portaria|Decreto|Resolução|Instrução Normativa)\s+(?:n[ºo°]?\s*)?\d{1,3}(?:\.\d{3})*/\d{2,4}\b",
    )
    .unwrap()
});
static VALOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Longest multiplier words first so "milhões" never half-matches "mil".
    Regex::new(r"(?i)R\$\s*\d{1,3}(?:\.\d{3})*(?:,\d{1,2})?(?:\s*(?:bilhões|bilhão|milhões|milhão|mil\b|bi\b|mi\b))?")
        .unwrap()
});
static DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").unwrap());
static HORA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[01]?\d|2[0-3]):[0-5]\d\b").unwrap());
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s"'<>]+"#).unwrap());

/// Keywords marking hard-news territory (institutions, enforcement,
/// official acts). Lowercased, accent-folded input assumed.
const HARDNEWS_KEYWORDS: &[&str] = &[
    "stf", "stj", "tse", "tcu", "cgu", "pgr", "agu", "congresso", "senado", "camara", "governo",
    "presidente", "ministerio", "policia federal", "operacao", "prisao", "decreto", "portaria",
    "licitacao", "justica", "fiscal", "selic", "copom", "anvisa", "planalto",
];

/// Keywords marking soft/noise territory for the lane heuristic.
const SOFT_NOISE_KEYWORDS: &[&str] = &[
    "bbb", "big brother", "famoso", "celebridade", "entretenimento", "fofoca", "show", "reality",
    "carnaval", "futebol", "horoscopo", "loteria",
];

/// Run the full pack over a text. Hits are deduplicated by
/// `(type, value, offset)`; the same value at two offsets is two hits.
pub fn extract_anchors(text: &str) -> Vec<AnchorHit> {
    let mut anchors = Vec::new();
    let mut seen: std::collections::HashSet<(AnchorType, String, usize)> =
        std::collections::HashSet::new();

    let mut push = |anchor_type: AnchorType, value: String, start: usize, end: usize, confidence: f64| {
        if value.is_empty() {
            return;
        }
        if seen.insert((anchor_type, value.clone(), start)) {
            anchors.push(AnchorHit {
                anchor_type,
                value,
                span: span_around(text, start, end),
                confidence,
            });
        }
    };

    for m in CNPJ_RE.find_iter(text) {
        let masked = m.as_str().contains('.');
        let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
        push(AnchorType::Cnpj, digits, m.start(), m.end(), if masked { 1.0 } else { 0.7 });
    }
    for m in CPF_RE.find_iter(text) {
        // Bare 11-digit runs collide with phone numbers and protocol ids.
        let masked = m.as_str().contains('.');
        if !masked {
            continue;
        }
        let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
        push(AnchorType::Cpf, digits, m.start(), m.end(), 1.0);
    }
    for m in CNJ_RE.find_iter(text) {
        push(AnchorType::Cnj, m.as_str().to_string(), m.start(), m.end(), 1.0);
    }
    for m in SEI_RE.find_iter(text) {
        push(AnchorType::Sei, m.as_str().to_string(), m.start(), m.end(), 1.0);
    }
    for c in TCU_RE.captures_iter(text) {
        let m = c.get(0).unwrap();
        let number = c.get(1).unwrap().as_str();
        push(
            AnchorType::Tcu,
            format!("ACORDAO {number}"),
            m.start(),
            m.end(),
            1.0,
        );
    }
    for m in PL_RE.find_iter(text) {
        push(
            AnchorType::Pl,
            collapse_upper(m.as_str()),
            m.start(),
            m.end(),
            1.0,
        );
    }
    for m in ATO_RE.find_iter(text) {
        push(
            AnchorType::Ato,
            normalize_ato(m.as_str()),
            m.start(),
            m.end(),
            1.0,
        );
    }
    for m in VALOR_RE.find_iter(text) {
        if let Some(value) = normalize_money(m.as_str()) {
            push(AnchorType::Valor, value, m.start(), m.end(), 1.0);
        }
    }
    for m in DATA_RE.find_iter(text) {
        if let Some(iso) = normalize_date(m.as_str()) {
            push(AnchorType::Data, iso, m.start(), m.end(), 0.8);
        }
    }
    for m in HORA_RE.find_iter(text) {
        push(AnchorType::Hora, m.as_str().to_string(), m.start(), m.end(), 0.8);
    }
    for m in URL_RE.find_iter(text) {
        let cleaned = m
            .as_str()
            .trim_end_matches(['.', ',', ';', ')', ']', '}', '>'])
            .to_lowercase();
        if cleaned.contains(".gov.")
            || cleaned.contains(".gov.br")
            || cleaned.contains(".leg.br")
            || cleaned.contains(".jus.br")
        {
            push(AnchorType::LinkGov, cleaned.clone(), m.start(), m.end(), 1.0);
        }
        if cleaned.contains(".pdf") {
            push(AnchorType::Pdf, cleaned, m.start(), m.end(), 1.0);
        }
    }

    anchors
}

/// Editorial lane heuristic from the keyword taxonomy.
pub fn suggest_lane(text: &str) -> &'static str {
    let folded = radar_common::fingerprint::canonical_text(text);
    if HARDNEWS_KEYWORDS.iter().any(|k| folded.contains(k)) {
        return "hardnews";
    }
    if SOFT_NOISE_KEYWORDS.iter().any(|k| folded.contains(k)) {
        return "entretenimento";
    }
    "geral"
}

/// Uppercase with collapsed whitespace (act and bill identifiers).
fn collapse_upper(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn normalize_ato(raw: &str) -> String {
    // Drop the optional "nº" marker so "Decreto nº 11.555/2025" and
    // "Decreto 11.555/2025" normalise to the same value.
    let collapsed = collapse_upper(raw);
    collapsed
        .replace(" Nº ", " ")
        .replace(" N° ", " ")
        .replace(" NO ", " ")
        .replace(" N ", " ")
}

/// `R$ 4,5 bilhões` → `BRL:4500000000.00`.
fn normalize_money(raw: &str) -> Option<String> {
    let lower = raw.to_lowercase();
    let multiplier = if lower.contains("bilh") || lower.ends_with("bi") {
        1_000_000_000.0
    } else if lower.contains("milh") || lower.ends_with("mi") {
        1_000_000.0
    } else if lower.contains("mil") {
        1_000.0
    } else {
        1.0
    };

    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let normalized = numeric.replace('.', "").replace(',', ".");
    let value: f64 = normalized.parse().ok()?;
    Some(format!("BRL:{:.2}", value * multiplier))
}

/// `dd/mm/yyyy` (2-digit years promoted) → ISO date.
fn normalize_date(raw: &str) -> Option<String> {
    let mut parts = raw.split('/');
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let mut year: i32 = parts.next()?.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// ±30 characters of context around a match, on char boundaries.
fn span_around(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(30);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + 30).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values_of(anchors: &[AnchorHit], t: AnchorType) -> Vec<String> {
        anchors
            .iter()
            .filter(|a| a.anchor_type == t)
            .map(|a| a.value.clone())
            .collect()
    }

    #[test]
    fn cnpj_masked_and_bare() {
        let anchors = extract_anchors("Contrato com a empresa 12.345.678/0001-95 firmado.");
        assert_eq!(values_of(&anchors, AnchorType::Cnpj), vec!["12345678000195"]);

        let anchors = extract_anchors("CNPJ 12345678000195 citado no processo.");
        assert_eq!(values_of(&anchors, AnchorType::Cnpj), vec!["12345678000195"]);
        assert!(anchors.iter().any(|a| a.anchor_type == AnchorType::Cnpj && a.confidence < 1.0));
    }

    #[test]
    fn cnj_judicial_id() {
        let anchors = extract_anchors("Processo CNJ 0001234-56.2025.1.00.0000 no STF.");
        assert_eq!(
            values_of(&anchors, AnchorType::Cnj),
            vec!["0001234-56.2025.1.00.0000"]
        );
    }

    #[test]
    fn sei_administrative_id() {
        let anchors = extract_anchors("Processo SEI 00123.000456/2025-11 autuado.");
        assert_eq!(
            values_of(&anchors, AnchorType::Sei),
            vec!["00123.000456/2025-11"]
        );
    }

    #[test]
    fn tcu_acordao() {
        let anchors = extract_anchors("Conforme Acórdão 1234/2025 do plenário.");
        assert_eq!(values_of(&anchors, AnchorType::Tcu), vec!["ACORDAO 1234/2025"]);
    }

    #[test]
    fn bill_identifiers() {
        let anchors = extract_anchors("O PL 1234/2025 e a PEC 45 avançaram.");
        let values = values_of(&anchors, AnchorType::Pl);
        assert!(values.contains(&"PL 1234/2025".to_string()));
        assert!(values.contains(&"PEC 45".to_string()));
    }

    #[test]
    fn ato_with_and_without_marker() {
        let a = extract_anchors("Publicado o Decreto nº 11.555/2025 nesta data.");
        let b = extract_anchors("O Decreto 11.555/2025 entra em vigor.");
        assert_eq!(values_of(&a, AnchorType::Ato), vec!["DECRETO 11.555/2025"]);
        assert_eq!(values_of(&a, AnchorType::Ato), values_of(&b, AnchorType::Ato));
    }

    #[test]
    fn money_with_multiplier() {
        let anchors = extract_anchors("Serão liberados R$ 4,5 bilhões para obras.");
        assert_eq!(
            values_of(&anchors, AnchorType::Valor),
            vec!["BRL:4500000000.00"]
        );
    }

    #[test]
    fn money_plain() {
        let anchors = extract_anchors("Multa de R$ 1.234.567,89 aplicada.");
        assert_eq!(values_of(&anchors, AnchorType::Valor), vec!["BRL:1234567.89"]);
    }

    #[test]
    fn dates_normalise_to_iso() {
        let anchors = extract_anchors("Assinado em 03/06/2025 e retificado em 5/6/25.");
        let values = values_of(&anchors, AnchorType::Data);
        assert!(values.contains(&"2025-06-03".to_string()));
        assert!(values.contains(&"2025-06-05".to_string()));
    }

    #[test]
    fn invalid_dates_are_dropped() {
        let anchors = extract_anchors("Data impossível: 32/13/2025.");
        assert!(values_of(&anchors, AnchorType::Data).is_empty());
    }

    #[test]
    fn gov_and_pdf_links() {
        let anchors = extract_anchors(
            "Íntegra em https://www.in.gov.br/web/dou/decreto.pdf, veja também https://example.com/x.",
        );
        assert_eq!(
            values_of(&anchors, AnchorType::LinkGov),
            vec!["https://www.in.gov.br/web/dou/decreto.pdf"]
        );
        assert_eq!(
            values_of(&anchors, AnchorType::Pdf),
            vec!["https://www.in.gov.br/web/dou/decreto.pdf"]
        );
    }

    #[test]
    fn bare_cpf_is_skipped() {
        let anchors = extract_anchors("Telefone 11987654321 não é CPF.");
        assert!(values_of(&anchors, AnchorType::Cpf).is_empty());
        let anchors = extract_anchors("CPF 123.456.789-01 do investigado.");
        assert_eq!(values_of(&anchors, AnchorType::Cpf), vec!["12345678901"]);
    }

    #[test]
    fn span_carries_context() {
        let anchors = extract_anchors("Antes do identificador PL 1234/2025 vem contexto útil.");
        let hit = anchors
            .iter()
            .find(|a| a.anchor_type == AnchorType::Pl)
            .unwrap();
        assert!(hit.span.contains("identificador"));
        assert!(hit.span.contains("contexto"));
    }

    #[test]
    fn lane_heuristic() {
        assert_eq!(suggest_lane("Polícia Federal deflagra operação"), "hardnews");
        assert_eq!(suggest_lane("Famoso do reality comenta fofoca"), "entretenimento");
        assert_eq!(suggest_lane("Feira de artesanato no bairro"), "geral");
    }
}
