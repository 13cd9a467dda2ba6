use anyhow::Context;

use crate::docx::paragraphs::{flatten_paragraphs, set_node_text, set_paragraph_text, Paragraph};
use crate::docx::xml::{structure_hash, XmlPart};
use crate::rules::RuleSet;

/// How literal rules are matched against a paragraph.
///
/// - `Paragraph` (default): match against the aggregate text and rewrite
///   the paragraph as a single logical run. Phrases split across run
///   boundaries are always found; rewritten paragraphs collapse to one
///   style.
/// - `Run`: match each run's text independently, preserving formatting but
///   blind to phrases spanning a run boundary.
///
/// Prefix classifiers are evaluated against the trimmed aggregate text in
/// both modes. Either mode is deterministic for a given input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchMode {
    #[default]
    Paragraph,
    Run,
}

#[derive(Debug, Default)]
pub struct SubstitutionReport {
    pub paragraphs_visited: usize,
    pub paragraphs_rewritten: usize,
    pub paragraphs_blanked: usize,
}

/// Pure core of the substitution pass. Returns the rewritten text, or
/// `None` when no rule touched it.
pub fn rewrite_text(text: &str, rules: &RuleSet) -> Option<String> {
    let trimmed = text.trim();
    for prefix in &rules.prefixes {
        if trimmed.starts_with(prefix.prefix.as_str()) {
            if text == prefix.output {
                return None;
            }
            return Some(prefix.output.clone());
        }
    }
    let rewritten = apply_literal_rules(text, rules);
    if rewritten == text {
        None
    } else {
        Some(rewritten)
    }
}

/// Every literal rule in tier order; each rule replaces all occurrences of
/// its pattern, and later rules see the output of earlier ones. A pattern
/// absent from the text is silently a no-op.
fn apply_literal_rules(text: &str, rules: &RuleSet) -> String {
    let mut working = text.to_string();
    for rule in rules.ordered_rules() {
        if working.contains(rule.pattern.as_str()) {
            working = working.replace(rule.pattern.as_str(), rule.replacement.as_str());
        }
    }
    working
}

/// Apply the rule set to every flattened paragraph of the document part.
/// Texts are computed against an immutable snapshot first, then written
/// back in a single pass; paragraphs with no change are left untouched so
/// their run formatting survives.
pub fn substitute_part(
    part: &mut XmlPart,
    rules: &RuleSet,
    mode: MatchMode,
) -> anyhow::Result<SubstitutionReport> {
    let baseline = structure_hash(&part.events);
    let paragraphs = flatten_paragraphs(part);
    let mut report = SubstitutionReport {
        paragraphs_visited: paragraphs.len(),
        ..Default::default()
    };

    let mut edits: Vec<Edit> = Vec::new();
    for para in &paragraphs {
        plan_paragraph(para, rules, mode, &mut edits, &mut report);
    }

    for edit in &edits {
        match edit {
            Edit::WholeParagraph { para, text } => set_paragraph_text(part, para, text)
                .with_context(|| format!("rewrite paragraph at event {}", para.start_event_index))?,
            Edit::SingleNode { para, node_index, text } => {
                set_node_text(part, &para.nodes[*node_index], text).with_context(|| {
                    format!("rewrite run in paragraph at event {}", para.start_event_index)
                })?
            }
        }
    }

    // The pass must change text only, never element structure.
    if structure_hash(&part.events) != baseline {
        return Err(anyhow::anyhow!(
            "substitution changed non-text structure in {}",
            part.name
        ));
    }
    Ok(report)
}

enum Edit {
    WholeParagraph { para: Paragraph, text: String },
    SingleNode {
        para: Paragraph,
        node_index: usize,
        text: String,
    },
}

fn plan_paragraph(
    para: &Paragraph,
    rules: &RuleSet,
    mode: MatchMode,
    edits: &mut Vec<Edit>,
    report: &mut SubstitutionReport,
) {
    let aggregate = para.text();
    let trimmed = aggregate.trim();
    if trimmed.is_empty() {
        return;
    }

    match mode {
        // Whole-paragraph matching is exactly the pure core applied to the
        // aggregate text.
        MatchMode::Paragraph => {
            if let Some(rewritten) = rewrite_text(&aggregate, rules) {
                if rewritten.is_empty() {
                    report.paragraphs_blanked += 1;
                } else {
                    report.paragraphs_rewritten += 1;
                }
                edits.push(Edit::WholeParagraph {
                    para: para.clone(),
                    text: rewritten,
                });
            }
        }
        MatchMode::Run => {
            // Prefix classifiers still see the whole paragraph, even when
            // literal rules run per node.
            for prefix in &rules.prefixes {
                if trimmed.starts_with(prefix.prefix.as_str()) {
                    if aggregate != prefix.output {
                        if prefix.output.is_empty() {
                            report.paragraphs_blanked += 1;
                        } else {
                            report.paragraphs_rewritten += 1;
                        }
                        edits.push(Edit::WholeParagraph {
                            para: para.clone(),
                            text: prefix.output.clone(),
                        });
                    }
                    return;
                }
            }
            let mut touched = false;
            for (node_index, node) in para.nodes.iter().enumerate() {
                let rewritten = apply_literal_rules(&node.text, rules);
                if rewritten != node.text {
                    touched = true;
                    edits.push(Edit::SingleNode {
                        para: para.clone(),
                        node_index,
                        text: rewritten,
                    });
                }
            }
            if touched {
                report.paragraphs_rewritten += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{rewrite_text, substitute_part, MatchMode};
    use crate::docx::paragraphs::flatten_paragraphs;
    use crate::docx::xml::{parse_xml_part, structure_hash, XmlPart};
    use crate::rules::RuleSet;

    fn doc_with_paragraphs(texts: &[&str]) -> XmlPart {
        let mut xml = String::from(r#"<?xml version="1.0"?><w:document xmlns:w="u"><w:body>"#);
        for t in texts {
            xml.push_str("<w:p><w:r><w:t>");
            let escaped = t.replace('&', "&amp;").replace('<', "&lt;");
            xml.push_str(&escaped);
            xml.push_str("</w:t></w:r></w:p>");
        }
        xml.push_str("</w:body></w:document>");
        parse_xml_part("word/document.xml", xml.as_bytes()).expect("parse")
    }

    #[test]
    fn unmatched_paragraph_is_left_identical() {
        let rules = RuleSet::statuts_sas();
        assert_eq!(
            rewrite_text("Les actions sont nominatives et donnent lieu à une inscription en compte.", &rules),
            None
        );
    }

    #[test]
    fn denomination_is_replaced_everywhere_and_nothing_else() {
        let rules = RuleSet::statuts_sas();
        let out = rewrite_text(
            "SAHEL TRANSPORT, ci-après dénommée SAHEL TRANSPORT.",
            &rules,
        )
        .expect("changed");
        assert_eq!(out, "{{denomination}}, ci-après dénommée {{denomination}}.");
    }

    #[test]
    fn sentence_rule_wins_over_contained_name_rule() {
        let rules = RuleSet::statuts_sas();
        let out = rewrite_text(
            "Monsieur DIAOU Mamadou Né le (date) à LIEU (FRANCE) Demeurant au ({{adresse_siege_complete}})",
            &rules,
        )
        .expect("changed");
        assert_eq!(
            out,
            "{{associe_civilite}} {{associe_prenom}} {{associe_nom}} né(e) le {{associe_date_naissance}} à {{associe_lieu_naissance}} demeurant {{associe_adresse_complete}}"
        );
    }

    #[test]
    fn objet_prefix_replaces_paragraph_wholesale() {
        let rules = RuleSet::statuts_sas();
        let out = rewrite_text(
            "  La société a pour objet, tant en France qu'à l'étranger, le transport de marchandises.",
            &rules,
        )
        .expect("changed");
        assert_eq!(out, "{{objet_social}}");
    }

    #[test]
    fn boilerplate_prefix_blanks_paragraph() {
        let rules = RuleSet::statuts_sas();
        let out = rewrite_text(
            "Et plus généralement toutes opérations commerciales, financières, mobilières pouvant être nécessaires.",
            &rules,
        )
        .expect("changed");
        assert_eq!(out, "");
    }

    #[test]
    fn rule_application_is_idempotent_on_substituted_text() {
        let rules = RuleSet::statuts_sas();
        let once = rewrite_text("La durée de la société est fixée à 99 ans.", &rules)
            .expect("changed");
        assert_eq!(once, "La durée de la société est fixée à {{duree_societe}} ans.");
        assert_eq!(rewrite_text(&once, &rules), None);
    }

    #[test]
    fn paragraph_mode_matches_phrase_split_across_runs() {
        let xml = br#"<?xml version="1.0"?><w:document xmlns:w="u"><w:body><w:p><w:r><w:t>SAHEL </w:t></w:r><w:r><w:t>TRANSPORT</w:t></w:r></w:p></w:body></w:document>"#;
        let mut part = parse_xml_part("word/document.xml", xml).expect("parse");
        let rules = RuleSet::statuts_sas();

        substitute_part(&mut part, &rules, MatchMode::Paragraph).expect("substitute");
        let texts: Vec<String> = flatten_paragraphs(&part).iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["{{denomination}}"]);
    }

    #[test]
    fn run_mode_is_blind_to_cross_run_phrases_but_preserves_runs() {
        let xml = br#"<?xml version="1.0"?><w:document xmlns:w="u"><w:body><w:p><w:r><w:t>SAHEL </w:t></w:r><w:r><w:t>TRANSPORT</w:t></w:r></w:p><w:p><w:r><w:t>99 ans</w:t></w:r></w:p></w:body></w:document>"#;
        let mut part = parse_xml_part("word/document.xml", xml).expect("parse");
        let rules = RuleSet::statuts_sas();

        let report = substitute_part(&mut part, &rules, MatchMode::Run).expect("substitute");
        let texts: Vec<String> = flatten_paragraphs(&part).iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["SAHEL TRANSPORT", "{{duree_societe}} ans"]);
        assert_eq!(report.paragraphs_rewritten, 1);
    }

    #[test]
    fn substitution_rewrites_table_cells_and_keeps_structure() {
        let xml = br#"<?xml version="1.0"?><w:document xmlns:w="u"><w:body><w:p><w:r><w:t>Statuts de SAHEL TRANSPORT</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>Monsieur DIAOU Mamadou</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:body></w:document>"#;
        let mut part = parse_xml_part("word/document.xml", xml).expect("parse");
        let before = structure_hash(&part.events);
        let rules = RuleSet::statuts_sas();

        let report = substitute_part(&mut part, &rules, MatchMode::Paragraph).expect("substitute");
        assert_eq!(report.paragraphs_visited, 2);
        assert_eq!(report.paragraphs_rewritten, 2);
        assert_eq!(structure_hash(&part.events), before);

        let texts: Vec<String> = flatten_paragraphs(&part).iter().map(|p| p.text()).collect();
        assert_eq!(
            texts,
            vec![
                "Statuts de {{denomination}}",
                "{{associe_civilite}} {{associe_prenom}} {{associe_nom}}",
            ]
        );
    }

    #[test]
    fn paragraph_mode_agrees_with_the_pure_core() {
        let originals = [
            "Statuts de SAHEL TRANSPORT",
            "La société a pour objet le transport de marchandises.",
            "Et plus généralement toutes opérations commerciales.",
            "Les actions sont nominatives.",
        ];
        let mut part = doc_with_paragraphs(&originals);
        let rules = RuleSet::statuts_sas();

        let report = substitute_part(&mut part, &rules, MatchMode::Paragraph).expect("substitute");
        let texts: Vec<String> = flatten_paragraphs(&part).iter().map(|p| p.text()).collect();
        for (original, result) in originals.iter().zip(&texts) {
            let expected = rewrite_text(original, &rules).unwrap_or_else(|| original.to_string());
            assert_eq!(result, &expected);
        }
        assert_eq!(report.paragraphs_rewritten, 2);
        assert_eq!(report.paragraphs_blanked, 1);
    }

    #[test]
    fn untouched_document_reports_zero_rewrites() {
        let mut part = doc_with_paragraphs(&[
            "Article 8 - MODIFICATION DU CAPITAL",
            "Le capital social peut être augmenté, réduit ou amorti dans les conditions légales.",
        ]);
        let rules = RuleSet::statuts_sas();
        let report = substitute_part(&mut part, &rules, MatchMode::Paragraph).expect("substitute");
        assert_eq!(report.paragraphs_rewritten, 0);
        assert_eq!(report.paragraphs_blanked, 0);
    }
}
