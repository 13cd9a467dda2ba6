use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::docx::package::DocxPackage;
use crate::docx::paragraphs::{flatten_paragraphs, Container};
use crate::docx::xml::parse_xml_part;
use crate::placeholders;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    DocumentBody,
    TableCell,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParagraphRecord {
    pub para_id: usize,
    pub container: ContainerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_index: Option<usize>,
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TextInventory {
    pub version: u32,
    pub paragraphs: Vec<ParagraphRecord>,
    pub placeholders: Vec<String>,
}

/// Flattened paragraph texts plus the placeholder tokens already present,
/// as JSON. Diagnostic aid for building a rule set against a new source
/// document.
pub fn build_inventory(input: &Path) -> anyhow::Result<TextInventory> {
    let pkg = DocxPackage::read(input)?;
    let ent = pkg.document_entry()?;
    let part = parse_xml_part(&ent.name, &ent.data)
        .with_context(|| format!("parse xml: {}", ent.name))?;

    let mut records: Vec<ParagraphRecord> = Vec::new();
    for para in flatten_paragraphs(&part) {
        let text = para.text();
        if text.trim().is_empty() {
            continue;
        }
        let (container, table_index, row_index, cell_index) = match para.container {
            Container::Body => (ContainerKind::DocumentBody, None, None, None),
            Container::TableCell {
                table_index,
                row_index,
                cell_index,
            } => (
                ContainerKind::TableCell,
                Some(table_index),
                Some(row_index),
                Some(cell_index),
            ),
        };
        records.push(ParagraphRecord {
            para_id: records.len() + 1,
            container,
            table_index,
            row_index,
            cell_index,
            text,
        });
    }

    let found = placeholders::collect(records.iter().map(|r| r.text.as_str()));
    Ok(TextInventory {
        version: 1,
        paragraphs: records,
        placeholders: found.into_iter().collect(),
    })
}

pub fn dump_text_json(input: &Path, output: &Path) -> anyhow::Result<()> {
    let inventory = build_inventory(input)?;
    let json = serde_json::to_string_pretty(&inventory).context("serialize inventory")?;
    std::fs::write(output, json)
        .with_context(|| format!("write inventory json: {}", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{build_inventory, ContainerKind};
    use crate::template::write_template_docx;

    #[test]
    fn inventory_lists_paragraphs_and_placeholders() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("template.docx");
        write_template_docx(&path).expect("write template");

        let inv = build_inventory(&path).expect("inventory");
        assert_eq!(inv.version, 1);
        assert_eq!(inv.placeholders.len(), 18);
        assert!(inv
            .paragraphs
            .iter()
            .all(|r| matches!(r.container, ContainerKind::DocumentBody)));
        assert!(inv.paragraphs.iter().any(|r| r.text == "{{objet_social}}"));
    }
}
