use anyhow::{anyhow, Context};

use super::xml::{XmlEvent, XmlPart};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Body,
    TableCell {
        table_index: usize,
        row_index: usize,
        cell_index: usize,
    },
}

/// One `w:t` text node inside a paragraph: the index of its start (or
/// empty) element event and, when present, the index of the text event
/// holding its content.
#[derive(Clone, Debug)]
pub struct TextNode {
    pub elem_event_index: usize,
    pub text_event_index: Option<usize>,
    pub text: String,
}

/// A paragraph handle over the flattened event stream. Holds no ownership
/// of the part; all indices point back into `XmlPart::events`.
#[derive(Clone, Debug)]
pub struct Paragraph {
    pub start_event_index: usize,
    pub container: Container,
    pub nodes: Vec<TextNode>,
}

impl Paragraph {
    /// Aggregate text view: the concatenation of the run texts.
    pub fn text(&self) -> String {
        self.nodes.iter().map(|n| n.text.as_str()).collect()
    }
}

/// Flatten a document part into one ordered paragraph sequence: every body
/// paragraph in document order, then every table-cell paragraph in table
/// order, row-major, cell-major. Nested tables are not descended into,
/// matching the body-then-tables visiting order of the template scripts.
pub fn flatten_paragraphs(part: &XmlPart) -> Vec<Paragraph> {
    let mut body: Vec<Paragraph> = Vec::new();
    let mut cells: Vec<Paragraph> = Vec::new();

    let mut stack: Vec<String> = Vec::new();
    let mut tbl_depth = 0usize;
    let mut table_index = 0usize;
    let mut row_index = 0usize;
    let mut cell_index = 0usize;

    let mut current: Option<Paragraph> = None;
    // Depth of `w:p` elements nested inside the captured paragraph (text
    // boxes, drawings). Their runs belong to the inner paragraph, not the
    // aggregate text, and must survive an outer rewrite untouched.
    let mut nested_p_depth = 0usize;
    let mut current_text_elem: Option<usize> = None;

    for (idx, ev) in part.events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, .. } => {
                let parent = stack.last().map(|s| s.as_str()).unwrap_or("");
                match name.as_str() {
                    "w:tbl" => {
                        if tbl_depth == 0 {
                            table_index += 1;
                            row_index = 0;
                        }
                        tbl_depth += 1;
                    }
                    "w:tr" if tbl_depth == 1 && parent == "w:tbl" => {
                        row_index += 1;
                        cell_index = 0;
                    }
                    "w:tc" if tbl_depth == 1 && parent == "w:tr" => {
                        cell_index += 1;
                    }
                    "w:p" => {
                        if current.is_some() {
                            nested_p_depth += 1;
                        } else if parent == "w:body" && tbl_depth == 0 {
                            current = Some(Paragraph {
                                start_event_index: idx,
                                container: Container::Body,
                                nodes: Vec::new(),
                            });
                        } else if parent == "w:tc" && tbl_depth == 1 {
                            current = Some(Paragraph {
                                start_event_index: idx,
                                container: Container::TableCell {
                                    table_index,
                                    row_index,
                                    cell_index,
                                },
                                nodes: Vec::new(),
                            });
                        }
                    }
                    "w:t" => {
                        if nested_p_depth == 0 {
                            if let Some(ref mut para) = current {
                                para.nodes.push(TextNode {
                                    elem_event_index: idx,
                                    text_event_index: None,
                                    text: String::new(),
                                });
                                current_text_elem = Some(para.nodes.len() - 1);
                            }
                        }
                    }
                    _ => {}
                }
                stack.push(name.clone());
            }
            XmlEvent::Empty { name, .. } => {
                // An empty <w:t/> still counts as a run text node so a
                // write-back has somewhere to land.
                if name == "w:t" && nested_p_depth == 0 {
                    if let Some(ref mut para) = current {
                        para.nodes.push(TextNode {
                            elem_event_index: idx,
                            text_event_index: None,
                            text: String::new(),
                        });
                    }
                }
            }
            XmlEvent::End { name } => {
                let _ = stack.pop();
                match name.as_str() {
                    "w:tbl" => tbl_depth = tbl_depth.saturating_sub(1),
                    "w:t" => current_text_elem = None,
                    "w:p" => {
                        if nested_p_depth > 0 {
                            nested_p_depth -= 1;
                        } else if let Some(para) = current.take() {
                            match para.container {
                                Container::Body => body.push(para),
                                Container::TableCell { .. } => cells.push(para),
                            }
                        }
                    }
                    _ => {}
                }
            }
            XmlEvent::Text { text } => {
                if nested_p_depth == 0 {
                    if let (Some(ref mut para), Some(node_idx)) = (&mut current, current_text_elem)
                    {
                        let node = &mut para.nodes[node_idx];
                        node.text_event_index = Some(idx);
                        node.text.push_str(text);
                    }
                }
            }
            _ => {}
        }
    }

    body.extend(cells);
    body
}

/// Rewrite one text node in place, marking `xml:space="preserve"` when the
/// new text carries leading or trailing whitespace.
pub fn set_node_text(part: &mut XmlPart, node: &TextNode, new_text: &str) -> anyhow::Result<()> {
    let text_idx = node
        .text_event_index
        .ok_or_else(|| anyhow!("text node has no text event (empty w:t)"))?;
    match part.events.get_mut(text_idx) {
        Some(XmlEvent::Text { text }) => *text = new_text.to_string(),
        _ => return Err(anyhow!("expected text event at {text_idx}")),
    }
    if new_text.starts_with(' ') || new_text.ends_with(' ') {
        let ev = part
            .events
            .get_mut(node.elem_event_index)
            .context("text elem index out of range")?;
        set_attr_value(ev, "xml:space", "preserve");
    }
    Ok(())
}

/// Replace the paragraph's aggregate text. The whole new text lands in the
/// first run's text node and the remaining ones are blanked, which
/// collapses the paragraph onto a simplified run structure without moving
/// any element. Reading the aggregate text afterwards returns exactly the
/// written value.
pub fn set_paragraph_text(
    part: &mut XmlPart,
    para: &Paragraph,
    new_text: &str,
) -> anyhow::Result<()> {
    let mut target: Option<&TextNode> = None;
    for node in &para.nodes {
        if node.text_event_index.is_some() {
            target = Some(node);
            break;
        }
    }
    let target = target.ok_or_else(|| {
        anyhow!(
            "paragraph at event {} has no writable text node",
            para.start_event_index
        )
    })?;
    set_node_text(part, target, new_text)?;
    for node in &para.nodes {
        if node.elem_event_index != target.elem_event_index {
            if node.text_event_index.is_some() {
                set_node_text(part, node, "")?;
            }
        }
    }
    Ok(())
}

fn set_attr_value(ev: &mut XmlEvent, key: &str, value: &str) {
    match ev {
        XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => {
            for (k, v) in attrs.iter_mut() {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
            attrs.push((key.to_string(), value.to_string()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{flatten_paragraphs, set_paragraph_text, Container};
    use crate::docx::xml::parse_xml_part;

    const DOC: &[u8] = br#"<?xml version="1.0"?><w:document xmlns:w="u"><w:body><w:p><w:r><w:t>premier</w:t></w:r><w:r><w:t> paragraphe</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>cellule A</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>cellule B</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p><w:r><w:t>dernier</w:t></w:r></w:p></w:body></w:document>"#;

    #[test]
    fn body_paragraphs_come_before_table_cells() {
        let part = parse_xml_part("word/document.xml", DOC).expect("parse");
        let paras = flatten_paragraphs(&part);
        let texts: Vec<String> = paras.iter().map(|p| p.text()).collect();
        assert_eq!(
            texts,
            vec!["premier paragraphe", "dernier", "cellule A", "cellule B"]
        );
        assert_eq!(paras[0].container, Container::Body);
        assert_eq!(
            paras[2].container,
            Container::TableCell {
                table_index: 1,
                row_index: 1,
                cell_index: 1
            }
        );
    }

    #[test]
    fn empty_document_yields_empty_sequence() {
        let part = parse_xml_part(
            "word/document.xml",
            br#"<?xml version="1.0"?><w:document xmlns:w="u"><w:body/></w:document>"#,
        )
        .expect("parse");
        assert!(flatten_paragraphs(&part).is_empty());
    }

    #[test]
    fn text_box_paragraphs_stay_out_of_the_host_paragraph() {
        let doc: &[u8] = br#"<?xml version="1.0"?><w:document xmlns:w="u"><w:body><w:p><w:r><w:t>Statuts de SAHEL TRANSPORT</w:t></w:r><w:r><w:drawing><w:txbxContent><w:p><w:r><w:t>cachet interne</w:t></w:r></w:p></w:txbxContent></w:drawing></w:r></w:p></w:body></w:document>"#;
        let mut part = parse_xml_part("word/document.xml", doc).expect("parse");
        let paras = flatten_paragraphs(&part);
        let texts: Vec<String> = paras.iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["Statuts de SAHEL TRANSPORT"]);

        // Rewriting the host paragraph must not blank the text box runs.
        set_paragraph_text(&mut part, &paras[0], "Statuts de {{denomination}}").expect("set text");
        let xml = crate::docx::xml::write_xml_part(&part).expect("write");
        let xml = String::from_utf8(xml).expect("utf8");
        assert!(xml.contains("cachet interne"));
        assert!(xml.contains("Statuts de {{denomination}}"));
    }

    #[test]
    fn write_back_collapses_runs_and_reads_back_identically() {
        let mut part = parse_xml_part("word/document.xml", DOC).expect("parse");
        let paras = flatten_paragraphs(&part);
        set_paragraph_text(&mut part, &paras[0], "{{denomination}}").expect("set text");

        let reread = flatten_paragraphs(&part);
        assert_eq!(reread[0].text(), "{{denomination}}");
        assert_eq!(reread[1].text(), "dernier");
    }
}
