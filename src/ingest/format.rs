//! Upload acceptance: decide whether a payload is delimited text, and which delimiter.

use std::path::Path;

/// Delimited-text flavours accepted for import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimitedFormat {
    Csv,
    Tsv,
}

impl DelimitedFormat {
    pub fn delimiter(self) -> u8 {
        match self {
            DelimitedFormat::Csv => b',',
            DelimitedFormat::Tsv => b'\t',
        }
    }

    /// Detect the format from the declared content type, falling back to the
    /// file extension when the type is absent or generic.
    ///
    /// Returns `None` for anything that is not recognizably delimited text.
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>) -> Option<Self> {
        let essence = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty());

        match essence.as_deref() {
            Some("text/csv")
            | Some("application/csv")
            | Some("text/comma-separated-values")
            | Some("application/vnd.ms-excel") => Some(DelimitedFormat::Csv),
            Some("text/tab-separated-values") => Some(DelimitedFormat::Tsv),
            None | Some("application/octet-stream") | Some("text/plain") => {
                file_name.and_then(Self::from_extension)
            }
            Some(_) => None,
        }
    }

    fn from_extension(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|s| s.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(DelimitedFormat::Csv),
            "tsv" => Some(DelimitedFormat::Tsv),
            _ => None,
        }
    }
}
