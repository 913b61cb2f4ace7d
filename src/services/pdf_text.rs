use thiserror::Error;

const IDENTITY_H_MARKER: &str = "?Identity-H Unimplemented?";

#[derive(Debug, Error)]
pub(crate) enum PdfTextError {
    #[error("failed to load PDF: {0}")]
    Load(#[from] lopdf::Error),
    #[error("PDF has no extractable text layer")]
    NoText,
}

fn has_text_layer(text: &str) -> bool {
    !text.replace(IDENTITY_H_MARKER, "").trim().is_empty()
}

/// Page texts in page order, separated by blank lines.
pub(crate) fn extract(bytes: &[u8]) -> Result<String, PdfTextError> {
    let _span = tracing::info_span!("pdf_text.extract", bytes = bytes.len()).entered();

    let doc = lopdf::Document::load_mem(bytes)?;
    let mut pages = Vec::new();

    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => pages.push(page_text.trim_end().to_string()),
            Err(err) => tracing::warn!(page = page_num, error = %err, "Skipping unreadable page"),
        }
    }

    let text = pages.join("\n\n");
    if !has_text_layer(&text) {
        return Err(PdfTextError::NoText);
    }

    Ok(text)
}
