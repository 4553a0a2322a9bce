//! PDF text extraction for the deep pool.
//!
//! `pdftotext` (poppler) does the work. OCR is the exception, not the
//! default: only when the PDF has no extractable text layer do we rasterise
//! with `pdftoppm` and run `tesseract` over the pages.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// A PDF with fewer extractable characters than this is treated as
/// image-only and routed to OCR.
const MIN_TEXT_LAYER_CHARS: usize = 64;
/// OCR page cap; gazette annexes can run to hundreds of pages.
const MAX_OCR_PAGES: u32 = 20;

#[derive(Debug)]
pub struct PdfText {
    pub text: String,
    pub used_ocr: bool,
    /// Layout heuristic: poppler preserves column alignment, so runs of
    /// multiple spaces between words on many lines indicate tables.
    pub table_like: bool,
}

/// Extract text from PDF bytes, routing image-only files through OCR.
pub async fn extract_text(bytes: &[u8]) -> Result<PdfText> {
    let dir = tempfile::tempdir().context("failed to create pdf temp dir")?;
    let pdf_path = dir.path().join("input.pdf");
    tokio::fs::write(&pdf_path, bytes)
        .await
        .context("failed to write pdf to temp file")?;

    let text = pdftotext(&pdf_path).await?;
    if text.chars().filter(|c| !c.is_whitespace()).count() >= MIN_TEXT_LAYER_CHARS {
        let table_like = looks_table_like(&text);
        return Ok(PdfText {
            text,
            used_ocr: false,
            table_like,
        });
    }

    info!("pdf has no usable text layer, routing to ocr");
    let text = ocr_pages(dir.path(), &pdf_path).await?;
    let table_like = looks_table_like(&text);
    Ok(PdfText {
        text,
        used_ocr: true,
        table_like,
    })
}

async fn pdftotext(pdf_path: &Path) -> Result<String> {
    let output = tokio::process::Command::new("pdftotext")
        .args(["-layout", "-enc", "UTF-8"])
        .arg(pdf_path)
        .arg("-") // stdout
        .output()
        .await
        .context("failed to run pdftotext (poppler-utils missing?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("pdftotext failed: {stderr}");
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Rasterise pages and OCR each one. Pages that fail OCR are skipped.
async fn ocr_pages(work_dir: &Path, pdf_path: &Path) -> Result<String> {
    let prefix = work_dir.join("page");
    let output = tokio::process::Command::new("pdftoppm")
        .args(["-png", "-r", "200", "-l", &MAX_OCR_PAGES.to_string()])
        .arg(pdf_path)
        .arg(&prefix)
        .output()
        .await
        .context("failed to run pdftoppm")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("pdftoppm failed: {stderr}");
    }

    let mut pages: Vec<std::path::PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "png") {
            pages.push(path);
        }
    }
    pages.sort();

    let mut text = String::new();
    for page in pages {
        let output = tokio::process::Command::new("tesseract")
            .arg(&page)
            .arg("stdout")
            .args(["-l", "por"])
            .output()
            .await
            .context("failed to run tesseract")?;
        if output.status.success() {
            text.push_str(&String::from_utf8_lossy(&output.stdout));
            text.push('\n');
        } else {
            warn!(page = %page.display(), "tesseract failed on page, skipping");
        }
    }
    Ok(text)
}

/// Table heuristic over layout-preserved text: a meaningful share of lines
/// with two or more multi-space column gaps.
pub fn looks_table_like(text: &str) -> bool {
    let mut lines = 0usize;
    let mut columnar = 0usize;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.len() < 10 {
            continue;
        }
        lines += 1;
        let gaps = trimmed.matches("   ").count();
        if gaps >= 2 {
            columnar += 1;
        }
    }
    lines >= 5 && columnar * 4 >= lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_heuristic_detects_columns() {
        let table = "\
Órgão                       Processo              Valor
Ministério da Saúde         00123.000456/2025     R$ 1.000.000,00
Ministério da Educação      00123.000457/2025     R$ 2.500.000,00
Ministério da Justiça       00123.000458/2025     R$ 3.750.000,00
Ministério do Planejamento  00123.000459/2025     R$ 4.000.000,00
Ministério da Fazenda       00123.000460/2025     R$ 5.250.000,00";
        assert!(looks_table_like(table));
    }

    #[test]
    fn table_heuristic_rejects_prose() {
        let prose = "O presidente assinou nesta quinta-feira o decreto que libera \
recursos para obras de infraestrutura. A medida foi publicada no \
Diário Oficial da União e entra em vigor imediatamente. Segundo o \
governo, os recursos serão aplicados ao longo de dois anos. A oposição \
criticou a medida e prometeu contestá-la no Congresso Nacional.";
        assert!(!looks_table_like(prose));
    }

    #[test]
    fn short_texts_are_not_tables() {
        assert!(!looks_table_like("a   b   c"));
    }
}
