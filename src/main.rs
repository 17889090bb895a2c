use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap_complete::Shell;
use comfy_table::{Table, ContentArrangement};
use serde::{Deserialize, Serialize};
use is_terminal::IsTerminal;
mod records;
mod basis;
mod html;
mod generate;

use generate::{RunConfig, RunReport, SkipRule};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

const DEFAULT_CSV_DIR: &str = "docs/download/labor-hr/events/csv";
const DEFAULT_PAGES_DIR: &str = "docs/labor-hr/pages";
const DEFAULT_TEMPLATE: &str = "docs/labor-hr/pages/LH-EVT-CONS01__57fd71d406.html";
const DEFAULT_CONFIG: &str = "basis-pages.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFmt { Text, Json }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TextFormat { Lines, Table }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "basis-pages",
    about = "Generate requirement basis pages for the labor/HR requirement DB",
    long_about = "Reads per-event requirement checklists (CSV), groups rows by legal basis and writes one HTML page per basis from a template page. Existing pages are never overwritten.",
    after_long_help = "Examples:\n  basis-pages\n  basis-pages --events LH-EVT-HIRE09,LH-EVT-HIRE10 --dry-run\n  basis-pages --base-dir ../site --output json\n  basis-pages --config basis-pages.toml --text-format table",
    color = ColorChoice::Auto
)]
struct Args {
    /// Root the default csv/pages/template paths are resolved against
    #[arg(long, short = 'b')]
    base_dir: Option<PathBuf>,
    #[arg(long)]
    csv_dir: Option<PathBuf>,
    #[arg(long)]
    pages_dir: Option<PathBuf>,
    #[arg(long, short = 't')]
    template: Option<PathBuf>,
    /// Event ids to process (default LH-EVT-HIRE07..14)
    #[arg(long, short = 'e', num_args = 0.., value_delimiter = ',')]
    events: Vec<String>,
    #[arg(long, short = 'n', default_value_t = false)]
    dry_run: bool,
    /// Report format (default text)
    #[arg(long, short = 'o', value_enum)]
    output: Option<OutputFmt>,
    /// Text report layout (default lines)
    #[arg(long, value_enum)]
    text_format: Option<TextFormat>,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    config: Option<String>,
    #[arg(skip)]
    skip_rules: Option<Vec<SkipRule>>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AppConfig {
    base_dir: Option<PathBuf>,
    csv_dir: Option<PathBuf>,
    pages_dir: Option<PathBuf>,
    template: Option<PathBuf>,
    events: Option<Vec<String>>,
    dry_run: Option<bool>,
    output: Option<OutputFmt>,
    text_format: Option<TextFormat>,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
    skip: Option<Vec<SkipRule>>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        clap_complete::generate(sh, &mut cmd, "basis-pages", &mut std::io::stdout());
        return;
    }
    let cfg_err = match load_config(args.config.as_deref()) {
        Ok(Some(cfg)) => { apply_config(&mut args, cfg); None }
        Ok(None) => None,
        Err(e) => Some(e),
    };
    init_logging(&args);
    if let Some(e) = cfg_err {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let enable_color = std::io::stdout().is_terminal() && !no_color_env && term != "dumb" && !args.no_color;
    let _ = ENABLE_COLOR.set(enable_color);

    let run_cfg = run_config(&args);
    log::debug!("csv dir {}, pages dir {}, template {}", run_cfg.csv_dir.to_string_lossy(), run_cfg.pages_dir.to_string_lossy(), run_cfg.template_path.to_string_lossy());
    let report = match generate::run(&run_cfg) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    };
    log::info!("{} created, {} skipped", report.created.len(), report.skipped.len());
    match args.output.unwrap_or(OutputFmt::Text) {
        OutputFmt::Json => match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => { log::error!("JSON encode failed: {}", e); std::process::exit(1); }
        },
        OutputFmt::Text => match args.text_format.unwrap_or(TextFormat::Lines) {
            TextFormat::Lines => print_lines(&report, run_cfg.dry_run),
            TextFormat::Table => print_table(&report, run_cfg.dry_run),
        },
    }
}

/// An explicit `--config` must exist; the default file is optional.
fn load_config(explicit: Option<&str>) -> anyhow::Result<Option<AppConfig>> {
    use anyhow::Context;
    let (path, required) = match explicit { Some(p) => (p, true), None => (DEFAULT_CONFIG, false) };
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading config {}", path)),
    };
    let cfg = toml::from_str::<AppConfig>(&s).with_context(|| format!("parsing config {}", path))?;
    Ok(Some(cfg))
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.base_dir.is_none() && let Some(v) = cfg.base_dir { args.base_dir = Some(v); }
    if args.csv_dir.is_none() && let Some(v) = cfg.csv_dir { args.csv_dir = Some(v); }
    if args.pages_dir.is_none() && let Some(v) = cfg.pages_dir { args.pages_dir = Some(v); }
    if args.template.is_none() && let Some(v) = cfg.template { args.template = Some(v); }
    if args.events.is_empty() && let Some(v) = cfg.events { args.events = v; }
    if let Some(v) = cfg.dry_run { args.dry_run = args.dry_run || v; }
    if args.output.is_none() && let Some(v) = cfg.output { args.output = Some(v); }
    if args.text_format.is_none() && let Some(v) = cfg.text_format { args.text_format = Some(v); }
    if args.log_level.is_none() && let Some(v) = cfg.log_level { args.log_level = Some(v); }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path { args.log_path = Some(v); }
    if let Some(v) = cfg.skip { args.skip_rules = Some(v); }
}

fn run_config(args: &Args) -> RunConfig {
    let base = args.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let resolve = |opt: &Option<PathBuf>, def: &str| -> PathBuf {
        match opt { Some(p) if p.is_absolute() => p.clone(), Some(p) => base.join(p), None => base.join(def) }
    };
    let events = if args.events.is_empty() { generate::DEFAULT_EVENTS.iter().map(|s| s.to_string()).collect() } else { args.events.clone() };
    RunConfig {
        csv_dir: resolve(&args.csv_dir, DEFAULT_CSV_DIR),
        pages_dir: resolve(&args.pages_dir, DEFAULT_PAGES_DIR),
        template_path: resolve(&args.template, DEFAULT_TEMPLATE),
        events,
        skip_rules: args.skip_rules.clone().unwrap_or_else(generate::default_skip_rules),
        dry_run: args.dry_run,
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    if let Some(fmt) = args.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().to_rfc3339();
                    let obj = serde_json::json!({
                        "ts": ts,
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => { eprintln!("Failed to open log file {}: {}", path, e); }
        }
    }
    builder.init();
}

fn created_heading(dry_run: bool) -> &'static str {
    if dry_run { "=== 作成予定のファイル（dry-run） ===" } else { "=== 作成したファイル ===" }
}

fn report_lines(rep: &RunReport, dry_run: bool) -> Vec<String> {
    let mut out = vec![paint(created_heading(dry_run), "1;32")];
    for c in &rep.created {
        out.push(display_path(&c.path));
        out.push(format!("  basis_name: {}, basis_locator: {}, basis_url: {}", c.basis_name, c.basis_locator, c.basis_url));
    }
    out.push(String::new());
    out.push(paint("=== スキップしたファイル（既存） ===", "1;33"));
    for s in &rep.skipped { out.push(s.label()); }
    out
}

fn print_lines(rep: &RunReport, dry_run: bool) {
    for l in report_lines(rep, dry_run) { println!("{}", l); }
}

fn print_table(rep: &RunReport, dry_run: bool) {
    println!("{}", paint(created_heading(dry_run), "1;32"));
    let mut t = Table::new();
    t.set_content_arrangement(ContentArrangement::Dynamic);
    t.set_header(vec!["Path", "Basis", "Locator", "URL", "Rows"]);
    for c in &rep.created {
        t.add_row(vec![display_path(&c.path), c.basis_name.clone(), c.basis_locator.clone(), if c.basis_url.is_empty() { "-".to_string() } else { c.basis_url.clone() }, c.requirements.to_string()]);
    }
    println!("{}", t);
    println!();
    println!("{}", paint("=== スキップしたファイル（既存） ===", "1;33"));
    let mut t = Table::new();
    t.set_content_arrangement(ContentArrangement::Dynamic);
    t.set_header(vec!["File", "Reason"]);
    for s in &rep.skipped {
        let reason = match &s.reason {
            generate::SkipReason::Existing => "existing".to_string(),
            generate::SkipReason::Listed { note } => match note { Some(n) => format!("listed ({})", n), None => "listed".to_string() },
        };
        t.add_row(vec![s.file_name.clone(), reason]);
    }
    println!("{}", t);
}

fn display_path(p: &Path) -> String { p.to_string_lossy().to_string() }

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args { Args::parse_from(["basis-pages"]) }

    #[test]
    fn defaults_resolve_under_base_dir() {
        let mut a = base_args();
        a.base_dir = Some(PathBuf::from("/site"));
        let c = run_config(&a);
        assert_eq!(c.csv_dir, PathBuf::from("/site/docs/download/labor-hr/events/csv"));
        assert_eq!(c.pages_dir, PathBuf::from("/site/docs/labor-hr/pages"));
        assert_eq!(c.template_path, PathBuf::from("/site/docs/labor-hr/pages/LH-EVT-CONS01__57fd71d406.html"));
        assert_eq!(c.events.len(), 8);
        assert_eq!(c.events[0], "LH-EVT-HIRE07");
        assert_eq!(c.skip_rules, generate::default_skip_rules());
    }

    #[test]
    fn events_flag_splits_on_comma() {
        let a = Args::parse_from(["basis-pages", "--events", "LH-EVT-HIRE09,LH-EVT-HIRE10", "--dry-run"]);
        let c = run_config(&a);
        assert_eq!(c.events, vec!["LH-EVT-HIRE09".to_string(), "LH-EVT-HIRE10".to_string()]);
        assert!(c.dry_run);
    }

    #[test]
    fn config_fills_gaps_but_cli_wins() {
        let toml_s = r#"
base_dir = "/cfg"
pages_dir = "out"
events = ["LH-EVT-CONS01"]
output = "json"

[[skip]]
event_id = "LH-EVT-CONS01"
hash = "57fd71d406"
note = "template"
"#;
        let cfg: AppConfig = toml::from_str(toml_s).unwrap();
        let mut a = Args::parse_from(["basis-pages", "--pages-dir", "/cli/pages"]);
        apply_config(&mut a, cfg);
        let c = run_config(&a);
        assert_eq!(c.pages_dir, PathBuf::from("/cli/pages"));
        assert_eq!(c.csv_dir, PathBuf::from("/cfg/docs/download/labor-hr/events/csv"));
        assert_eq!(c.events, vec!["LH-EVT-CONS01".to_string()]);
        assert_eq!(a.output, Some(OutputFmt::Json));
        assert_eq!(c.skip_rules.len(), 1);
        assert_eq!(c.skip_rules[0].hash, "57fd71d406");
    }

    #[test]
    fn explicit_cli_formats_beat_config() {
        let cfg: AppConfig = toml::from_str("output = \"json\"\ntext_format = \"table\"\n").unwrap();
        let mut a = Args::parse_from(["basis-pages", "--output", "text", "--text-format", "lines"]);
        apply_config(&mut a, cfg);
        assert_eq!(a.output, Some(OutputFmt::Text));
        assert_eq!(a.text_format, Some(TextFormat::Lines));
        let cfg: AppConfig = toml::from_str("output = \"json\"\ntext_format = \"table\"\n").unwrap();
        let mut a = base_args();
        apply_config(&mut a, cfg);
        assert_eq!(a.output, Some(OutputFmt::Json));
        assert_eq!(a.text_format, Some(TextFormat::Table));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        assert!(toml::from_str::<AppConfig>("pages = \"x\"").is_err());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let p = std::env::temp_dir().join(format!("basis_pages_no_cfg_{}.toml", std::process::id()));
        assert!(load_config(Some(&p.to_string_lossy())).is_err());
    }

    #[test]
    fn text_report_lists_created_and_skipped() {
        let rep = RunReport {
            created: vec![generate::CreatedPage { path: PathBuf::from("pages/LH-EVT-HIRE09__a852ce7c25.html"), event_id: "LH-EVT-HIRE09".into(), basis_name: "労働安全衛生法".into(), basis_locator: "第66条".into(), basis_url: String::new(), requirements: 1, written: true }],
            skipped: vec![
                generate::SkippedPage { file_name: "LH-EVT-HIRE07__9786f3ee36.html".into(), reason: generate::SkipReason::Listed { note: Some("職業安定法".into()) } },
                generate::SkippedPage { file_name: "LH-EVT-HIRE08__0123456789.html".into(), reason: generate::SkipReason::Existing },
            ],
        };
        let lines = report_lines(&rep, false);
        assert_eq!(lines, vec![
            "=== 作成したファイル ===".to_string(),
            "pages/LH-EVT-HIRE09__a852ce7c25.html".to_string(),
            "  basis_name: 労働安全衛生法, basis_locator: 第66条, basis_url: ".to_string(),
            String::new(),
            "=== スキップしたファイル（既存） ===".to_string(),
            "LH-EVT-HIRE07__9786f3ee36.html (職業安定法)".to_string(),
            "LH-EVT-HIRE08__0123456789.html".to_string(),
        ]);
        let json = serde_json::to_value(&rep).unwrap();
        assert_eq!(json["skipped"][0]["reason"]["kind"], "listed");
        assert_eq!(json["skipped"][1]["reason"]["kind"], "existing");
    }
}
