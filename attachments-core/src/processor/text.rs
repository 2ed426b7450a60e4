use crate::artifact::Artifact;
use crate::contract::Processor;
use crate::error::ProcessError;
use crate::options::ProcessOptions;

/// Extensions routed to [`TextProcessor`] in addition to the catch-all key.
pub const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".markdown", ".rst", ".csv", ".tsv", ".json", ".yaml", ".yml", ".toml", ".ini",
    ".cfg", ".log", ".py", ".java", ".js", ".ts", ".css", ".html", ".xml", ".tex",
];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

fn is_text_byte(b: u8) -> bool {
    matches!(b, 7 | 8 | 9 | 10 | 12 | 13 | 27) || b >= 0x20
}

/// Whether `data` looks like text: no NUL bytes and under 5% non-text bytes.
pub fn is_text_bytes(data: &[u8]) -> bool {
    if data.is_empty() {
        return true;
    }
    if data.contains(&0) {
        return false;
    }
    let non_text = data.iter().filter(|&&b| !is_text_byte(b)).count();
    (non_text as f64 / data.len() as f64) < 0.05
}

/// Decode as UTF-8 (reporting `utf-8-sig` when a BOM is stripped), else Latin-1.
pub fn guess_decode(data: &[u8]) -> (&'static str, String) {
    if let Some(rest) = data.strip_prefix(UTF8_BOM) {
        if let Ok(text) = std::str::from_utf8(rest) {
            return ("utf-8-sig", text.to_string());
        }
    }
    match std::str::from_utf8(data) {
        Ok(text) => ("utf-8", text.to_string()),
        // Every byte is a valid Latin-1 code point.
        Err(_) => ("latin-1", data.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Plain-text decoder; also the catch-all for unknown extensions that look like text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextProcessor;

impl Processor for TextProcessor {
    fn process(
        &self,
        data: &[u8],
        filename: &str,
        _options: &ProcessOptions,
    ) -> Result<Artifact, ProcessError> {
        let (encoding, text) = guess_decode(data);
        let chars = text.chars().count();
        Ok(Artifact::with_text(text)
            .flag("encoding", encoding)
            .flag("chars", chars)
            .flag("kind", "text")
            .flag("filename", filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_thresholds() {
        assert!(is_text_bytes(b""));
        assert!(is_text_bytes(b"plain\ttext\r\n"));
        assert!(!is_text_bytes(b"abc\0def"));
        // 1 control byte in 100 is tolerated, 10 in 100 is not.
        let mut mostly = vec![b'a'; 99];
        mostly.push(0x01);
        assert!(is_text_bytes(&mostly));
        let mut noisy = vec![b'a'; 90];
        noisy.extend([0x02; 10]);
        assert!(!is_text_bytes(&noisy));
        // High bytes count as text (Latin-1 range).
        assert!(is_text_bytes(&[0xE9, 0xE8, 0xFF]));
    }

    #[test]
    fn decoding_prefers_utf8_then_latin1() {
        assert_eq!(guess_decode("héllo".as_bytes()), ("utf-8", "héllo".to_string()));
        assert_eq!(
            guess_decode(b"\xEF\xBB\xBFhi"),
            ("utf-8-sig", "hi".to_string())
        );
        assert_eq!(guess_decode(b"caf\xE9"), ("latin-1", "café".to_string()));
    }

    #[test]
    fn text_artifact_flags() {
        let artifact = TextProcessor
            .process("Hello world!\n".as_bytes(), "hello.txt", &ProcessOptions::new())
            .unwrap();
        assert_eq!(artifact.text, "Hello world!\n");
        assert_eq!(artifact.flags["encoding"], "utf-8");
        assert_eq!(artifact.flags["chars"], 13);
        assert_eq!(artifact.flags["kind"], "text");
        assert_eq!(artifact.flags["filename"], "hello.txt");
    }
}
