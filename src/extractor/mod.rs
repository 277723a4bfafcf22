//! NF-e / NFC-e field extraction
//!
//! Pulls the handful of fields the archiver needs out of a fiscal XML.
//! Matching is on local tag names only, so documents with or without the
//! `http://www.portalfiscal.inf.br/nfe` namespace extract identically.

use crate::domain::{DocumentKind, ExtractedDocument};
use crate::error::{ArchiverError, ArchiverResult};
use chrono::{DateTime, NaiveDate, Utc};
use roxmltree::{Document, Node};
use std::path::Path;

/// Length of a valid access key
const ACCESS_KEY_LEN: usize = 44;
/// Length of a valid tax id
const TAX_ID_LEN: usize = 14;

/// Extract the archiver record from an XML file on disk
pub async fn extract_from_path(path: &Path) -> ArchiverResult<ExtractedDocument> {
    let bytes = tokio::fs::read(path).await?;
    let content = String::from_utf8_lossy(&bytes);
    extract_from_str(&content, Utc::now().date_naive())
}

/// Extract the archiver record from XML content
pub fn extract_from_str(xml: &str, processed_date: NaiveDate) -> ArchiverResult<ExtractedDocument> {
    let doc = Document::parse(xml).map_err(ArchiverError::xml_parse)?;

    let inf_nfe = find_descendant(doc.root(), "infNFe")
        .ok_or_else(|| ArchiverError::xml_structure("missing <infNFe> element"))?;

    let access_key = parse_access_key(&inf_nfe)?;

    let ide = child_element(&inf_nfe, "ide")
        .ok_or_else(|| ArchiverError::xml_structure("missing <ide> element"))?;
    let emit = child_element(&inf_nfe, "emit")
        .ok_or_else(|| ArchiverError::xml_structure("missing <emit> element"))?;

    let model_code = child_text(&ide, "mod")
        .ok_or_else(|| ArchiverError::xml_structure("missing <mod> in <ide>"))?;
    let kind = DocumentKind::from_model_code(&model_code);

    let emission_date = parse_emission_date(&ide)?;

    let tax_id = child_text(&emit, "CNPJ")
        .ok_or_else(|| ArchiverError::xml_structure("missing <CNPJ> in <emit>"))?;
    if tax_id.len() != TAX_ID_LEN || !tax_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ArchiverError::xml_structure(format!(
            "tax id must be {TAX_ID_LEN} digits, got '{tax_id}'"
        )));
    }

    let issuer_name = child_text(&emit, "xNome")
        .ok_or_else(|| ArchiverError::xml_structure("missing <xNome> in <emit>"))?;

    Ok(ExtractedDocument {
        access_key,
        tax_id,
        issuer_name,
        emission_date,
        processed_date,
        kind,
    })
}

/// The access key lives in `infNFe/@Id`, usually with an `NFe` prefix
fn parse_access_key(inf_nfe: &Node<'_, '_>) -> ArchiverResult<String> {
    let id = inf_nfe
        .attribute("Id")
        .ok_or_else(|| ArchiverError::xml_structure("missing Id attribute on <infNFe>"))?;

    let key = id.strip_prefix("NFe").unwrap_or(id).trim();
    if key.len() != ACCESS_KEY_LEN || !key.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ArchiverError::xml_structure(format!(
            "access key must be {ACCESS_KEY_LEN} alphanumeric characters, got '{key}'"
        )));
    }

    Ok(key.to_string())
}

/// Emission date comes as `<dhEmi>` (RFC3339 datetime) or, in older layouts,
/// `<dEmi>` (plain date)
fn parse_emission_date(ide: &Node<'_, '_>) -> ArchiverResult<NaiveDate> {
    let raw = child_text(ide, "dhEmi")
        .or_else(|| child_text(ide, "dEmi"))
        .ok_or_else(|| ArchiverError::xml_structure("missing <dhEmi>/<dEmi> in <ide>"))?;

    if let Ok(datetime) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(datetime.date_naive());
    }

    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        ArchiverError::xml_structure(format!("unparseable emission date '{raw}'"))
    })
}

fn find_descendant<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_element<'a, 'i>(node: &Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const KEY: &str = "35241112345678000190550010000001231234567890";

    fn sample_xml(model: &str, emission: &str, with_namespace: bool) -> String {
        let xmlns = if with_namespace {
            r#" xmlns="http://www.portalfiscal.inf.br/nfe""#
        } else {
            ""
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc{xmlns} versao="4.00">
  <NFe>
    <infNFe Id="NFe{KEY}" versao="4.00">
      <ide>
        <mod>{model}</mod>
        <serie>1</serie>
        {emission}
      </ide>
      <emit>
        <CNPJ>12345678000190</CNPJ>
        <xNome>EMPRESA TESTE LTDA</xNome>
      </emit>
    </infNFe>
  </NFe>
</nfeProc>"#
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 10).unwrap()
    }

    #[test]
    fn extracts_nfe_with_namespace() {
        let xml = sample_xml("55", "<dhEmi>2024-11-06T10:30:00-03:00</dhEmi>", true);
        let record = extract_from_str(&xml, today()).unwrap();
        assert_eq!(record.access_key, KEY);
        assert_eq!(record.tax_id, "12345678000190");
        assert_eq!(record.issuer_name, "EMPRESA TESTE LTDA");
        assert_eq!(record.kind, DocumentKind::Nfe);
        assert_eq!(
            record.emission_date,
            NaiveDate::from_ymd_opt(2024, 11, 6).unwrap()
        );
    }

    #[test]
    fn extracts_without_namespace() {
        let xml = sample_xml("65", "<dhEmi>2024-11-06T10:30:00-03:00</dhEmi>", false);
        let record = extract_from_str(&xml, today()).unwrap();
        assert_eq!(record.kind, DocumentKind::Nfce);
    }

    #[test]
    fn accepts_plain_date_emission() {
        let xml = sample_xml("55", "<dEmi>2024-11-06</dEmi>", true);
        let record = extract_from_str(&xml, today()).unwrap();
        assert_eq!(
            record.emission_date,
            NaiveDate::from_ymd_opt(2024, 11, 6).unwrap()
        );
    }

    #[test]
    fn unknown_model_code_becomes_generic_kind() {
        let xml = sample_xml("59", "<dEmi>2024-11-06</dEmi>", true);
        let record = extract_from_str(&xml, today()).unwrap();
        assert_eq!(record.kind, DocumentKind::Other("59".to_string()));
        assert_eq!(record.kind.to_string(), "MOD59");
    }

    #[test]
    fn missing_cnpj_is_a_structure_failure() {
        let xml = sample_xml("55", "<dEmi>2024-11-06</dEmi>", true)
            .replace("<CNPJ>12345678000190</CNPJ>", "");
        let err = extract_from_str(&xml, today()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::XmlInvalidStructure);
    }

    #[test]
    fn short_access_key_is_rejected() {
        let xml =
            sample_xml("55", "<dEmi>2024-11-06</dEmi>", true).replace(KEY, "35241112345678");
        let err = extract_from_str(&xml, today()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::XmlInvalidStructure);
    }

    #[test]
    fn garbage_is_a_parse_failure() {
        let err = extract_from_str("definitely not xml <", today()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::XmlParseError);
    }
}
