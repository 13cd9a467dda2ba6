use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};

use statuts_template::docx::package::{verify_roundtrip, DocxPackage};
use statuts_template::docx::paragraphs::flatten_paragraphs;
use statuts_template::docx::xml::{parse_xml_part, write_xml_part};
use statuts_template::engine::{substitute_part, MatchMode};
use statuts_template::inventory::dump_text_json;
use statuts_template::placeholders;
use statuts_template::progress::ConsoleProgress;
use statuts_template::rules::RuleSet;
use statuts_template::template::write_template_docx;

const DEFAULT_EXTRACT_OUTPUT: &str = "templates/template-statuts.docx";
const DEFAULT_GENERATE_OUTPUT: &str = "templates/template-statuts-final.docx";

#[derive(Parser, Debug)]
#[command(name = "statuts-template")]
#[command(about = "SAS statutes template builder: turns a filled-in .docx into a {{placeholder}} template, or generates one from scratch", long_about = None)]
struct Args {
    /// Source .docx (the filled-in statutes)
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Build the template from scratch instead of extracting from a source
    #[arg(long)]
    generate: bool,

    /// Replacement rules TOML (default: built-in statutes rule set)
    #[arg(long, value_name = "TOML")]
    rules: Option<PathBuf>,

    /// Match rules against each run independently instead of the whole
    /// paragraph (preserves formatting, misses phrases spanning runs)
    #[arg(long)]
    run_level: bool,

    /// Write the flattened paragraph texts + placeholder inventory as
    /// JSON, then exit
    #[arg(long, value_name = "JSON")]
    dump_text: Option<PathBuf>,

    /// After writing, reopen the output and check nothing was corrupted
    #[arg(long)]
    verify_roundtrip: bool,

    /// Suppress progress output
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.generate {
        let output = args
            .output
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GENERATE_OUTPUT));
        ensure_parent_dir(&output)?;
        write_template_docx(&output)?;
        progress.info(format!("template written: {}", output.display()));
        progress.list(
            "18 placeholders:",
            placeholders::CANONICAL_PLACEHOLDERS
                .iter()
                .map(|n| format!("{{{{{n}}}}}")),
        );
        return Ok(());
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            return Ok(());
        }
    };
    if !input.exists() {
        bail!("source document not found: {}", input.display());
    }

    if let Some(json_path) = args.dump_text {
        ensure_parent_dir(&json_path)?;
        dump_text_json(&input, &json_path)?;
        progress.info(format!("text inventory written: {}", json_path.display()));
        return Ok(());
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXTRACT_OUTPUT));
    let rules = match args.rules {
        Some(path) => RuleSet::from_toml_path(&path)?,
        None => RuleSet::statuts_sas(),
    };
    let mode = if args.run_level {
        MatchMode::Run
    } else {
        MatchMode::Paragraph
    };

    progress.info(format!("loading document: {}", input.display()));
    let pkg = DocxPackage::read(&input)?;
    let ent = pkg.document_entry()?;
    let mut part = parse_xml_part(&ent.name, &ent.data)
        .with_context(|| format!("parse xml: {}", ent.name))?;

    progress.info(format!(
        "applying {} rules + {} prefix classifiers ({mode:?} mode)",
        rules.rules.len(),
        rules.prefixes.len()
    ));
    let report = substitute_part(&mut part, &rules, mode)?;
    progress.info(format!(
        "paragraphs: {} visited, {} rewritten, {} blanked",
        report.paragraphs_visited, report.paragraphs_rewritten, report.paragraphs_blanked
    ));

    // All substitution work is done before the output file is created, so
    // a failure never leaves a partially-written template behind.
    let document_xml =
        write_xml_part(&part).with_context(|| format!("serialize xml: {}", part.name))?;
    let mut rewritten: HashMap<String, Vec<u8>> = HashMap::new();
    rewritten.insert(part.name.clone(), document_xml);

    ensure_parent_dir(&output)?;
    progress.info(format!("saving template: {}", output.display()));
    pkg.save_with(&output, &rewritten)?;

    if args.verify_roundtrip {
        verify_roundtrip(&input, &output)?;
        progress.info("round-trip verified");
    }

    let texts: Vec<String> = flatten_paragraphs(&part).iter().map(|p| p.text()).collect();
    let found = placeholders::collect(texts.iter().map(|s| s.as_str()));
    progress.list(
        format!("{} placeholders in output:", found.len()).as_str(),
        found.iter().map(|n| format!("{{{{{n}}}}}")),
    );
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}
