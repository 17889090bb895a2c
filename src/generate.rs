use std::io::Write;
use std::path::PathBuf;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::basis::{group_by_basis, page_file_name, BasisKey};
use crate::html::{render_page, PageInput};
use crate::records::load_requirements;

pub const DEFAULT_EVENTS: [&str; 8] = [
    "LH-EVT-HIRE07", "LH-EVT-HIRE08", "LH-EVT-HIRE09", "LH-EVT-HIRE10",
    "LH-EVT-HIRE11", "LH-EVT-HIRE12", "LH-EVT-HIRE13", "LH-EVT-HIRE14",
];

/// A basis page that must never be generated here, e.g. because it already exists under another name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRule {
    pub event_id: String,
    pub hash: String,
    #[serde(default)]
    pub note: Option<String>,
}

pub fn default_skip_rules() -> Vec<SkipRule> {
    vec![SkipRule { event_id: "LH-EVT-HIRE07".into(), hash: "9786f3ee36".into(), note: Some("職業安定法".into()) }]
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub csv_dir: PathBuf,
    pub pages_dir: PathBuf,
    pub template_path: PathBuf,
    pub events: Vec<String>,
    pub skip_rules: Vec<SkipRule>,
    pub dry_run: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreatedPage {
    pub path: PathBuf,
    pub event_id: String,
    pub basis_name: String,
    pub basis_locator: String,
    pub basis_url: String,
    pub requirements: usize,
    pub written: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Existing,
    Listed { note: Option<String> },
}

#[derive(Clone, Debug, Serialize)]
pub struct SkippedPage {
    pub file_name: String,
    pub reason: SkipReason,
}

impl SkippedPage {
    pub fn label(&self) -> String {
        match &self.reason {
            SkipReason::Listed { note: Some(n) } => format!("{} ({})", self.file_name, n),
            _ => self.file_name.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    pub created: Vec<CreatedPage>,
    pub skipped: Vec<SkippedPage>,
}

fn listed<'a>(rules: &'a [SkipRule], event_id: &str, hash: &str) -> Option<&'a SkipRule> {
    rules.iter().find(|r| r.event_id == event_id && r.hash == hash)
}

pub fn run(cfg: &RunConfig) -> Result<RunReport> { run_keyed(cfg, BasisKey::hash_key) }

/// `run` with the page key function supplied by the caller.
fn run_keyed(cfg: &RunConfig, key_of: impl Fn(&BasisKey) -> String) -> Result<RunReport> {
    let template = std::fs::read_to_string(&cfg.template_path)
        .with_context(|| format!("reading template {}", cfg.template_path.to_string_lossy()))?;
    if !cfg.dry_run {
        std::fs::create_dir_all(&cfg.pages_dir)
            .with_context(|| format!("creating pages dir {}", cfg.pages_dir.to_string_lossy()))?;
    }
    let mut report = RunReport::default();
    for event_id in &cfg.events {
        let rows = load_requirements(&cfg.csv_dir, event_id)?;
        if rows.is_empty() { continue; }
        let event_name = match rows[0].event_name.as_str() { "" => event_id.clone(), n => n.to_string() };
        let groups = group_by_basis(rows);
        log::info!("{}: {} bases ({})", event_id, groups.len(), event_name);
        for (basis, records) in groups {
            let hash = key_of(&basis);
            let file_name = page_file_name(event_id, &hash);
            if let Some(rule) = listed(&cfg.skip_rules, event_id, &hash) {
                log::debug!("Skip listed {}", file_name);
                report.skipped.push(SkippedPage { file_name, reason: SkipReason::Listed { note: rule.note.clone() } });
                continue;
            }
            let out_path = cfg.pages_dir.join(&file_name);
            if out_path.exists() {
                log::debug!("Skip existing {}", out_path.to_string_lossy());
                report.skipped.push(SkippedPage { file_name, reason: SkipReason::Existing });
                continue;
            }
            let page = render_page(&PageInput { event_id, event_name: &event_name, basis: &basis, records: &records }, &template)
                .with_context(|| format!("rendering {}", file_name))?;
            let written = !cfg.dry_run;
            if written && !write_new(&out_path, &page)? {
                report.skipped.push(SkippedPage { file_name, reason: SkipReason::Existing });
                continue;
            }
            report.created.push(created(out_path, event_id, basis, records.len(), written));
        }
    }
    Ok(report)
}

fn created(path: PathBuf, event_id: &str, basis: BasisKey, requirements: usize, written: bool) -> CreatedPage {
    CreatedPage { path, event_id: event_id.to_string(), basis_name: basis.name, basis_locator: basis.locator, basis_url: basis.url, requirements, written }
}

/// Writes only if the file does not exist yet. Returns false when another writer got there first.
fn write_new(path: &std::path::Path, content: &str) -> Result<bool> {
    let mut f = match std::fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("creating {}", path.to_string_lossy())),
    };
    f.write_all(content.as_bytes()).with_context(|| format!("writing {}", path.to_string_lossy()))?;
    Ok(true)
}
