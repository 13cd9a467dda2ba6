use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::docx::xml::{write_xml_part, XmlEvent, XmlPart};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

// A4 page, 1-inch top/bottom and 1.2-inch left/right margins, in twips.
const MARGIN_TOP_BOTTOM: &str = "1440";
const MARGIN_LEFT_RIGHT: &str = "1728";

/// Emits the fixed statutes skeleton paragraph by paragraph. Every block
/// is a plain `w:p` with a single run; headings are bold runs, the title
/// block is centered.
struct DocBuilder {
    events: Vec<XmlEvent>,
}

impl DocBuilder {
    fn new() -> Self {
        let mut events = vec![
            XmlEvent::Decl {
                version: "1.0".to_string(),
                encoding: Some("UTF-8".to_string()),
                standalone: Some("yes".to_string()),
            },
            start("w:document", &[("xmlns:w", W_NS)]),
            start("w:body", &[]),
        ];
        events.reserve(512);
        Self { events }
    }

    fn para(&mut self, text: &str, bold: bool, center: bool) {
        self.events.push(start("w:p", &[]));
        if center {
            self.events.push(start("w:pPr", &[]));
            self.events.push(empty("w:jc", &[("w:val", "center")]));
            self.events.push(XmlEvent::End {
                name: "w:pPr".to_string(),
            });
        }
        self.events.push(start("w:r", &[]));
        self.events.push(start("w:rPr", &[]));
        if bold {
            self.events.push(empty("w:b", &[]));
        }
        // 11 pt body text (w:sz counts half-points).
        self.events.push(empty("w:sz", &[("w:val", "22")]));
        self.events.push(empty("w:szCs", &[("w:val", "22")]));
        self.events.push(XmlEvent::End {
            name: "w:rPr".to_string(),
        });
        self.events.push(start("w:t", &[]));
        self.events.push(XmlEvent::Text {
            text: text.to_string(),
        });
        self.events.push(XmlEvent::End {
            name: "w:t".to_string(),
        });
        self.events.push(XmlEvent::End {
            name: "w:r".to_string(),
        });
        self.events.push(XmlEvent::End {
            name: "w:p".to_string(),
        });
    }

    fn body(&mut self, text: &str) {
        self.para(text, false, false);
    }

    fn heading(&mut self, text: &str) {
        self.para(text, true, false);
    }

    fn spacer(&mut self) {
        self.events.push(start("w:p", &[]));
        self.events.push(XmlEvent::End {
            name: "w:p".to_string(),
        });
    }

    fn page_break(&mut self) {
        self.events.push(start("w:p", &[]));
        self.events.push(start("w:r", &[]));
        self.events.push(empty("w:br", &[("w:type", "page")]));
        self.events.push(XmlEvent::End {
            name: "w:r".to_string(),
        });
        self.events.push(XmlEvent::End {
            name: "w:p".to_string(),
        });
    }

    fn finish(mut self) -> Vec<XmlEvent> {
        self.events.push(start("w:sectPr", &[]));
        self.events
            .push(empty("w:pgSz", &[("w:w", "11906"), ("w:h", "16838")]));
        self.events.push(empty(
            "w:pgMar",
            &[
                ("w:top", MARGIN_TOP_BOTTOM),
                ("w:bottom", MARGIN_TOP_BOTTOM),
                ("w:left", MARGIN_LEFT_RIGHT),
                ("w:right", MARGIN_LEFT_RIGHT),
                ("w:header", "708"),
                ("w:footer", "708"),
                ("w:gutter", "0"),
            ],
        ));
        self.events.push(XmlEvent::End {
            name: "w:sectPr".to_string(),
        });
        self.events.push(XmlEvent::End {
            name: "w:body".to_string(),
        });
        self.events.push(XmlEvent::End {
            name: "w:document".to_string(),
        });
        self.events
    }
}

fn start(name: &str, attrs: &[(&str, &str)]) -> XmlEvent {
    XmlEvent::Start {
        name: name.to_string(),
        attrs: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn empty(name: &str, attrs: &[(&str, &str)]) -> XmlEvent {
    XmlEvent::Empty {
        name: name.to_string(),
        attrs: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// The from-scratch statutes template: a fixed, deterministic sequence of
/// headings and paragraphs embedding the 18 canonical placeholders.
pub fn build_statuts_template() -> Vec<XmlEvent> {
    let mut d = DocBuilder::new();

    d.para("STATUTS", true, true);
    d.para("Société par Actions Simplifiée", false, true);
    d.spacer();

    d.heading("Les soussignés :");
    d.body("{{associe_civilite}} {{associe_prenom}} {{associe_nom}}");
    d.body("Né(e) le {{associe_date_naissance}} à {{associe_lieu_naissance}}");
    d.body("Demeurant {{associe_adresse_complete}}");
    d.spacer();
    d.body("Ont établi ainsi qu'il suit les statuts d'une société par actions simplifiée qu'ils déclarent constituer entre eux.");
    d.spacer();

    d.heading("TITRE I : FORME - DÉNOMINATION - SIÈGE - OBJET - DURÉE");
    d.spacer();

    d.heading("Article 1 - FORME");
    d.body("Il est formé une {{forme_juridique_complete}} régie par les dispositions législatives et réglementaires en vigueur, et par les présents statuts.");
    d.spacer();

    d.heading("Article 2 - DÉNOMINATION");
    d.body("La société a pour dénomination sociale : {{denomination}}");
    d.body("Dans tous les actes, la dénomination doit être précédée ou suivie de {{forme_juridique_complete}} ou {{forme_juridique_sigle}} et du montant du capital.");
    d.spacer();

    d.heading("Article 3 - SIÈGE SOCIAL");
    d.body("Le siège social est fixé à : {{adresse_siege_complete}}");
    d.body("Il pourra être transféré par décision du président, sous réserve de ratification par l'assemblée générale.");
    d.spacer();

    d.heading("Article 4 - OBJET");
    d.body("La société a pour objet :");
    d.body("{{objet_social}}");
    d.body("Et toutes opérations se rattachant directement ou indirectement à cet objet.");
    d.spacer();

    d.heading("Article 5 - DURÉE");
    d.body("La durée de la société est fixée à {{duree_societe}} années à compter de son immatriculation au RCS.");
    d.spacer();

    d.heading("TITRE II : APPORTS - CAPITAL SOCIAL");
    d.spacer();

    d.heading("Article 6 - APPORTS");
    d.body("Les associés font apport à la société de {{capital_social_formate}} euros en numéraire.");
    d.spacer();

    d.heading("Article 7 - CAPITAL SOCIAL");
    d.body("Le capital social est fixé à {{capital_social_formate}} euros.");
    d.body("Il est divisé en {{nombre_actions}} actions de {{valeur_nominale_formate}} euros chacune, libérées à hauteur de {{montant_libere_formate}} euros.");
    d.spacer();

    d.heading("Article 8 - MODIFICATION DU CAPITAL");
    d.body("Le capital social peut être augmenté, réduit ou amorti dans les conditions légales.");
    d.spacer();

    d.heading("Article 9 - FORME DES ACTIONS");
    d.body("Les actions sont nominatives et donnent lieu à une inscription en compte.");
    d.spacer();

    d.heading("Article 10 - TRANSMISSION DES ACTIONS");
    d.body("La cession des actions est libre entre associés. Elle est soumise à agrément pour les tiers.");
    d.spacer();

    d.heading("TITRE III : DIRECTION");
    d.spacer();

    d.heading("Article 11 - PRÉSIDENCE");
    d.body("La société est représentée par un président.");
    d.body("Le premier président est : {{associe_civilite}} {{associe_prenom}} {{associe_nom}}");
    d.body("Le président est nommé pour une durée illimitée.");
    d.spacer();

    d.heading("Article 12 - POUVOIRS DU PRÉSIDENT");
    d.body("Le président est investi des pouvoirs les plus étendus pour agir au nom de la société dans la limite de l'objet social.");
    d.spacer();

    d.heading("Article 13 - RÉMUNÉRATION");
    d.body("L'assemblée générale peut allouer au président une rémunération.");
    d.spacer();

    d.heading("TITRE IV : DÉCISIONS COLLECTIVES");
    d.spacer();

    d.heading("Article 14 - ASSEMBLÉES GÉNÉRALES");
    d.body("Les associés sont réunis en assemblée au moins une fois par an pour l'approbation des comptes.");
    d.spacer();

    d.heading("Article 15 - CONVOCATION");
    d.body("Les associés sont convoqués par le président par tous moyens 7 jours avant l'assemblée.");
    d.spacer();

    d.heading("Article 16 - QUORUM ET MAJORITÉ");
    d.body("Chaque action donne droit à une voix. Les décisions sont prises à la majorité des voix exprimées.");
    d.spacer();

    d.heading("TITRE V : EXERCICE SOCIAL - COMPTES");
    d.spacer();

    d.heading("Article 17 - EXERCICE SOCIAL");
    d.body("L'exercice social commence le 1er janvier et se termine le 31 décembre.");
    d.body("Le premier exercice se terminera le {{premier_exercice_fin}}.");
    d.spacer();

    d.heading("Article 18 - COMPTES ANNUELS");
    d.body("Le président établit les comptes annuels qui sont soumis à l'approbation de l'assemblée.");
    d.spacer();

    d.heading("Article 19 - AFFECTATION DU RÉSULTAT");
    d.body("Le bénéfice est réparti entre les associés proportionnellement au nombre d'actions.");
    d.spacer();

    d.heading("TITRE VI : DISSOLUTION - LIQUIDATION");
    d.spacer();

    d.heading("Article 20 - DISSOLUTION");
    d.body("La société prend fin par l'arrivée du terme, par décision de l'assemblée, ou pour toute cause légale.");
    d.spacer();

    d.heading("Article 21 - LIQUIDATION");
    d.body("En cas de dissolution, un ou plusieurs liquidateurs sont désignés par l'assemblée.");
    d.spacer();

    d.page_break();
    d.heading("Fait à {{adresse_siege_complete}}");
    d.heading("Le {{date_signature}}");
    d.spacer();
    d.spacer();
    d.heading("Signature :");
    d.spacer();
    d.spacer();
    d.body("{{associe_prenom}} {{associe_nom}}");

    d.finish()
}

const CONTENT_TYPES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const ROOT_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

/// Wrap the built document in a minimal OPC package and save it.
pub fn write_template_docx(output_path: &Path) -> anyhow::Result<()> {
    let events = build_statuts_template();
    let part = XmlPart {
        name: "word/document.xml".to_string(),
        events,
    };
    let document_xml = write_xml_part(&part).context("serialize template document")?;

    let f = File::create(output_path)
        .with_context(|| format!("create template docx: {}", output_path.display()))?;
    let mut zout = ZipWriter::new(f);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in [
        ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
        ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
        ("word/document.xml", document_xml.as_slice()),
    ] {
        zout.start_file(name, opts)
            .with_context(|| format!("start zip file: {name}"))?;
        zout.write_all(data)
            .with_context(|| format!("write zip file: {name}"))?;
    }
    zout.finish().context("finish template zip")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{build_statuts_template, write_template_docx};
    use crate::docx::package::DocxPackage;
    use crate::docx::paragraphs::flatten_paragraphs;
    use crate::docx::xml::{parse_xml_part, XmlPart};
    use crate::placeholders;

    #[test]
    fn template_emits_the_full_placeholder_contract() {
        let part = XmlPart {
            name: "word/document.xml".to_string(),
            events: build_statuts_template(),
        };
        let texts: Vec<String> = flatten_paragraphs(&part).iter().map(|p| p.text()).collect();
        let found = placeholders::collect(texts.iter().map(|s| s.as_str()));
        placeholders::verify_contract(&found).expect("exactly the 18 canonical placeholders");
        assert_eq!(found.len(), 18);
    }

    #[test]
    fn written_docx_reopens_with_identical_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("template-statuts-final.docx");
        write_template_docx(&path).expect("write template");

        let built = XmlPart {
            name: "word/document.xml".to_string(),
            events: build_statuts_template(),
        };
        let expected: Vec<String> = flatten_paragraphs(&built).iter().map(|p| p.text()).collect();

        let pkg = DocxPackage::read(&path).expect("reopen");
        let ent = pkg.document_entry().expect("document part");
        let part = parse_xml_part(&ent.name, &ent.data).expect("parse");
        let reread: Vec<String> = flatten_paragraphs(&part).iter().map(|p| p.text()).collect();
        assert_eq!(reread, expected);
    }
}
