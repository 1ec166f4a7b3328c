//! Ingestion input, validated at the boundary.

use std::fmt;

use crate::error::{RagError, Result};

/// The thing to ingest: an uploaded file or a web page.
#[derive(Clone, PartialEq, Eq)]
pub enum Source {
    /// Raw file contents with the name they were uploaded under.
    File { name: String, bytes: Vec<u8> },
    /// An `http` or `https` URL to fetch.
    Url(String),
}

impl Source {
    /// Build a source from the optional parts a transport receives.
    ///
    /// Exactly one of `file` and `url` must be present.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if both or neither are given, the
    /// file is empty, or the URL is blank or not `http(s)`.
    pub fn from_parts(file: Option<(String, Vec<u8>)>, url: Option<String>) -> Result<Self> {
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        match (file, url) {
            (Some(_), Some(_)) => Err(RagError::InvalidInput(
                "provide either a file or a URL, not both".to_string(),
            )),
            (None, None) => Err(RagError::InvalidInput(
                "No source provided. Please upload a file or provide a URL.".to_string(),
            )),
            (Some((name, bytes)), None) => Self::file(name, bytes),
            (None, Some(url)) => Self::url(url),
        }
    }

    /// A file source.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `bytes` is empty.
    pub fn file(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        if bytes.is_empty() {
            return Err(RagError::InvalidInput(format!("uploaded file '{name}' is empty")));
        }
        Ok(Self::File { name, bytes })
    }

    /// A URL source.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] unless `url` starts with `http://` or `https://`.
    pub fn url(url: impl Into<String>) -> Result<Self> {
        let url = url.into().trim().to_string();
        let lower = url.to_ascii_lowercase();
        let host = lower.strip_prefix("https://").or_else(|| lower.strip_prefix("http://"));
        if host.is_none_or(str::is_empty) {
            return Err(RagError::InvalidInput(format!("'{url}' is not an http(s) URL")));
        }
        Ok(Self::Url(url))
    }

    /// Display name recorded on every segment: the file name or the URL.
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } => name,
            Self::Url(url) => url,
        }
    }

    /// Whether this is a PDF file, judged by extension or `%PDF` magic.
    pub fn is_pdf(&self) -> bool {
        match self {
            Self::File { name, bytes } => {
                name.to_ascii_lowercase().ends_with(".pdf") || bytes.starts_with(b"%PDF")
            }
            Self::Url(_) => false,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { name, bytes } => {
                f.debug_struct("File").field("name", name).field("len", &bytes.len()).finish()
            }
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_both_and_neither() {
        let both = Source::from_parts(
            Some(("a.txt".into(), b"hi".to_vec())),
            Some("https://example.com".into()),
        );
        assert!(matches!(both, Err(RagError::InvalidInput(_))));

        let neither = Source::from_parts(None, None);
        assert!(matches!(neither, Err(RagError::InvalidInput(_))));

        // A blank URL counts as absent.
        let blank = Source::from_parts(None, Some("   ".into()));
        assert!(matches!(blank, Err(RagError::InvalidInput(_))));
    }

    #[test]
    fn accepts_exactly_one_part() {
        let file = Source::from_parts(Some(("notes.md".into(), b"# hi".to_vec())), None).unwrap();
        assert_eq!(file.name(), "notes.md");

        let url = Source::from_parts(None, Some(" https://example.com/page ".into())).unwrap();
        assert_eq!(url, Source::Url("https://example.com/page".into()));
    }

    #[test]
    fn validates_urls_and_files() {
        assert!(Source::url("ftp://example.com").is_err());
        assert!(Source::url("example.com").is_err());
        assert!(Source::url("https://").is_err());
        assert!(Source::url("HTTP://EXAMPLE.COM").is_ok());
        assert!(Source::file("empty.pdf", Vec::new()).is_err());
    }

    #[test]
    fn detects_pdf_by_extension_or_magic() {
        assert!(Source::file("Report.PDF", b"anything".to_vec()).unwrap().is_pdf());
        assert!(Source::file("upload", b"%PDF-1.7\n".to_vec()).unwrap().is_pdf());
        assert!(!Source::file("notes.txt", b"plain".to_vec()).unwrap().is_pdf());
        assert!(!Source::url("https://example.com/a.pdf").unwrap().is_pdf());
    }

    #[test]
    fn debug_hides_file_bytes() {
        let source = Source::file("a.txt", vec![0u8; 1024]).unwrap();
        assert_eq!(format!("{source:?}"), "File { name: \"a.txt\", len: 1024 }");
    }
}
