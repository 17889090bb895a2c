use std::io::Read;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// One row of an event checklist CSV.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Requirement {
    pub event_name: String,
    pub basis_name: String,
    pub basis_locator: String,
    pub basis_url: String,
    pub requirement_id: String,
    pub requirement_text: String,
    /// Columns outside the core set, in header order. Carried but never rendered.
    pub extra: Vec<(String, String)>,
}

impl Requirement {
    fn from_row(headers: &[String], row: &csv::StringRecord) -> Requirement {
        let mut r = Requirement::default();
        for (idx, h) in headers.iter().enumerate() {
            let v = row.get(idx).unwrap_or("").to_string();
            match h.as_str() {
                "event_name" => r.event_name = v,
                "basis_name" => r.basis_name = v,
                "basis_locator" => r.basis_locator = v,
                "basis_url" => r.basis_url = v,
                "requirement_id" => r.requirement_id = v,
                "requirement_text" => r.requirement_text = v,
                _ => r.extra.push((h.clone(), v)),
            }
        }
        r
    }
}

pub fn csv_path_for(csv_dir: &Path, event_id: &str) -> PathBuf {
    csv_dir.join(format!("labor-hr_audit_checklist_{}_v0_1.generated.csv", event_id))
}

/// Loads the checklist for `event_id`. An absent file means the event has no requirements.
pub fn load_requirements(csv_dir: &Path, event_id: &str) -> Result<Vec<Requirement>> {
    let path = csv_path_for(csv_dir, event_id);
    if !path.exists() {
        log::debug!("No CSV for {}: {}", event_id, path.to_string_lossy());
        return Ok(vec![]);
    }
    let f = std::fs::File::open(&path).with_context(|| format!("opening CSV {}", path.to_string_lossy()))?;
    let rows = parse_requirements(f).with_context(|| format!("parsing CSV {}", path.to_string_lossy()))?;
    if let Some(first) = rows.first() && !first.extra.is_empty() {
        log::debug!("{}: passing through columns {:?}", event_id, first.extra.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>());
    }
    Ok(rows)
}

pub fn parse_requirements<R: Read>(input: R) -> Result<Vec<Requirement>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut out = Vec::new();
    for row in rdr.records() {
        let row = row?;
        out.push(Requirement::from_row(&headers, &row));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "event_name,basis_name,basis_locator,basis_url,requirement_id,requirement_text\n";

    #[test]
    fn quoted_comma_stays_in_one_field() {
        let data = format!("{}採用,\"労働基準法,第32条\",第1項,,R1,労働時間の上限\n", HEADER);
        let rows = parse_requirements(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].basis_name, "労働基準法,第32条");
        assert_eq!(rows[0].basis_locator, "第1項");
        assert_eq!(rows[0].requirement_id, "R1");
    }

    #[test]
    fn short_rows_default_to_empty() {
        let data = format!("{}採用,労働安全衛生法,第66条\n", HEADER);
        let rows = parse_requirements(data.as_bytes()).unwrap();
        assert_eq!(rows[0].basis_locator, "第66条");
        assert_eq!(rows[0].basis_url, "");
        assert_eq!(rows[0].requirement_text, "");
    }

    #[test]
    fn headers_and_values_are_trimmed() {
        let data = " event_name , basis_name ,note\n 採用 ,  職業安定法 , 備考 \n";
        let rows = parse_requirements(data.as_bytes()).unwrap();
        assert_eq!(rows[0].event_name, "採用");
        assert_eq!(rows[0].basis_name, "職業安定法");
        assert_eq!(rows[0].extra, vec![("note".to_string(), "備考".to_string())]);
    }

    #[test]
    fn all_empty_row_is_still_a_record() {
        let data = format!("{}a,b,c,,R1,x\n,,,,,\n", HEADER);
        let rows = parse_requirements(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], Requirement::default());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = std::env::temp_dir().join(format!("basis_pages_records_{}", std::process::id()));
        let rows = load_requirements(&dir, "LH-EVT-NONE").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn load_reads_conventional_path() {
        let dir = std::env::temp_dir().join(format!("basis_pages_records_load_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let p = csv_path_for(&dir, "LH-EVT-HIRE09");
        assert!(p.to_string_lossy().ends_with("labor-hr_audit_checklist_LH-EVT-HIRE09_v0_1.generated.csv"));
        std::fs::write(&p, format!("{}入社,労働安全衛生法,第66条,,R1,健康診断の実施\n", HEADER)).unwrap();
        let rows = load_requirements(&dir, "LH-EVT-HIRE09").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].requirement_text, "健康診断の実施");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
