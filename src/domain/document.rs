//! Document kinds and the record produced by the extractor

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fiscal document kind, derived from the `mod` element of the XML
///
/// Model code 55 is an NF-e, 65 an NFC-e. Anything else is carried through
/// as `MOD<code>` so unknown models still archive under a stable directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Nfe,
    Nfce,
    Other(String),
}

impl DocumentKind {
    pub fn from_model_code(code: &str) -> Self {
        match code.trim() {
            "55" => DocumentKind::Nfe,
            "65" => DocumentKind::Nfce,
            other => DocumentKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Nfe => write!(f, "NFE"),
            DocumentKind::Nfce => write!(f, "NFCE"),
            DocumentKind::Other(code) => write!(f, "MOD{code}"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NFE" => Ok(DocumentKind::Nfe),
            "NFCE" => Ok(DocumentKind::Nfce),
            other => match other.strip_prefix("MOD") {
                Some(code) if !code.is_empty() => Ok(DocumentKind::Other(code.to_string())),
                _ => Err(()),
            },
        }
    }
}

/// Structured record produced by the extractor for one XML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// 44-character access key, `NFe` prefix already stripped
    pub access_key: String,
    /// Issuer tax id, 14 numeric digits
    pub tax_id: String,
    /// Issuer display name as spelled in the document
    pub issuer_name: String,
    pub emission_date: NaiveDate,
    pub processed_date: NaiveDate,
    pub kind: DocumentKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_derivation_from_model_codes() {
        assert_eq!(DocumentKind::from_model_code("55"), DocumentKind::Nfe);
        assert_eq!(DocumentKind::from_model_code("65"), DocumentKind::Nfce);
        assert_eq!(
            DocumentKind::from_model_code("59"),
            DocumentKind::Other("59".to_string())
        );
    }

    #[test]
    fn kind_display_round_trips() {
        for kind in [
            DocumentKind::Nfe,
            DocumentKind::Nfce,
            DocumentKind::Other("59".to_string()),
        ] {
            let text = kind.to_string();
            assert_eq!(text.parse::<DocumentKind>().unwrap(), kind);
        }
        assert_eq!(DocumentKind::Other("59".to_string()).to_string(), "MOD59");
    }
}
