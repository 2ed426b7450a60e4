use crate::artifact::Artifact;
use crate::contract::{Capability, Processor};
use crate::error::ProcessError;
use crate::options::ProcessOptions;

const FEATURE: &str = "pdf";
const HINT: &str = "the `pdf` cargo feature (pdf-extract)";

/// PDF text extraction. Honours `page_start` (0-based) and `page_end`
/// (exclusive) when both are present.
///
/// Encrypted documents are opened with the `password` option; without one
/// they fail like any unreadable file. Page rendering options
/// (`render_images`, `images_dpi`, `max_pages`) are accepted but only the
/// service can honour them, which is recorded in the `note` flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfProcessor;

impl Processor for PdfProcessor {
    fn capability(&self) -> Capability {
        if cfg!(feature = "pdf") {
            Capability::Available
        } else {
            Capability::Missing {
                feature: FEATURE.to_string(),
                hint: HINT.to_string(),
            }
        }
    }

    fn process(
        &self,
        data: &[u8],
        _filename: &str,
        options: &ProcessOptions,
    ) -> Result<Artifact, ProcessError> {
        extract(data, options)
    }
}

/// Clamp the requested window to `page_count`.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn page_window(options: &ProcessOptions, page_count: usize) -> (usize, usize) {
    let to_index = |v: i64| usize::try_from(v.max(0)).unwrap_or(0).min(page_count);
    let start = options.get_i64("page_start").map(to_index).unwrap_or(0);
    let end = options
        .get_i64("page_end")
        .map(to_index)
        .unwrap_or(page_count);
    (start, end.max(start))
}

/// Empty passwords count as absent.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn password(options: &ProcessOptions) -> Option<&str> {
    options.get_str("password").filter(|pw| !pw.is_empty())
}

/// Options the local engine cannot honour, for the artifact's `note` flag.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn rendering_note(options: &ProcessOptions) -> Option<String> {
    let mut ignored = Vec::new();
    if options.get_bool("render_images").unwrap_or(false) {
        ignored.push("render_images");
    }
    for key in ["images_dpi", "max_pages"] {
        if options.get(key).is_some() {
            ignored.push(key);
        }
    }
    if ignored.is_empty() {
        return None;
    }
    Some(format!(
        "page rendering is not available locally ({} ignored); use the service",
        ignored.join(", ")
    ))
}

#[cfg(feature = "pdf")]
fn extract(data: &[u8], options: &ProcessOptions) -> Result<Artifact, ProcessError> {
    let pages = match password(options) {
        Some(pw) => pdf_extract::extract_text_from_mem_by_pages_encrypted(data, pw),
        None => pdf_extract::extract_text_from_mem_by_pages(data),
    }
    .map_err(|e| ProcessError::Failed(format!("pdf extraction failed: {e}")))?;
    let page_count = pages.len();
    let (start, end) = page_window(options, page_count);
    let text = pages[start..end].join("\n");
    let chars = text.chars().count();

    let mut artifact = Artifact::with_text(text)
        .flag("kind", "pdf")
        .flag("engine", "pdf-extract")
        .flag("pages", page_count)
        .flag("page_start", start)
        .flag("page_end", end)
        .flag("chars", chars);
    if password(options).is_some() {
        artifact = artifact.flag("decrypted", true);
    }
    if let Some(note) = rendering_note(options) {
        tracing::debug!(%note, "pdf rendering options ignored");
        artifact = artifact.flag("note", note);
    }
    Ok(artifact)
}

#[cfg(not(feature = "pdf"))]
fn extract(_data: &[u8], _options: &ProcessOptions) -> Result<Artifact, ProcessError> {
    Err(ProcessError::MissingCapability {
        feature: FEATURE.to_string(),
        hint: HINT.to_string(),
    })
}
