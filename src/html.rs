use std::sync::OnceLock;
use anyhow::{bail, Result};
use regex::{NoExpand, Regex};
use crate::basis::BasisKey;
use crate::records::Requirement;

pub struct PageInput<'a> {
    pub event_id: &'a str,
    pub event_name: &'a str,
    pub basis: &'a BasisKey,
    pub records: &'a [Requirement],
}

/// Slots in the template page that receive generated content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateAnchor { Title, BackLink, Heading, Intro, TableBody }

impl TemplateAnchor {
    pub const ALL: [TemplateAnchor; 5] = [TemplateAnchor::Title, TemplateAnchor::BackLink, TemplateAnchor::Heading, TemplateAnchor::Intro, TemplateAnchor::TableBody];

    pub fn name(self) -> &'static str {
        match self {
            TemplateAnchor::Title => "title",
            TemplateAnchor::BackLink => "back link",
            TemplateAnchor::Heading => "h1",
            TemplateAnchor::Intro => "intro sentence",
            TemplateAnchor::TableBody => "tbody",
        }
    }

    fn pattern(self) -> &'static Regex {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let all = PATTERNS.get_or_init(|| {
            [
                r"(?s)<title>.*?</title>",
                r#"<a class="back" href="[^"]*">← 根拠一覧に戻る</a>"#,
                r"(?s)<h1>.*?</h1>",
                r"本ページは、[^<]*?に関して、[^<]*?を根拠として制度上確認が求められる事項を整理した要件一覧です。",
                r"(?s)<tbody>.*?</tbody>",
            ]
            .iter()
            .map(|p| Regex::new(p).expect("static template pattern"))
            .collect()
        });
        &all[self as usize]
    }
}

/// Anchors missing from `template`; empty when the template is usable.
pub fn missing_anchors(template: &str) -> Vec<TemplateAnchor> {
    TemplateAnchor::ALL.into_iter().filter(|a| !a.pattern().is_match(template)).collect()
}

pub fn render_page(input: &PageInput, template: &str) -> Result<String> {
    if let Some(a) = missing_anchors(template).first() { bail!("template anchor not found: {}", a.name()); }
    let ev = html_escape(input.event_name);
    let basis_name = html_escape(&input.basis.name);
    let title = format!("<title>{}</title>", html_escape(&format!("{}｜{}｜労務・人事制度 要件DB", input.event_name, input.basis.name)));
    let back = format!("<a class=\"back\" href=\"{}\">← 根拠一覧に戻る</a>", html_escape(&format!("../nav/evt/{}.html", input.event_id)));
    let h1 = format!("<h1>{}</h1>", ev);
    let intro = format!("本ページは、{}に関して、{}を根拠として制度上確認が求められる事項を整理した要件一覧です。", ev, basis_name);
    let tbody = format!("<tbody>\n{}\n      </tbody>", render_rows(input.basis, input.records));
    let mut out = template.to_string();
    for (anchor, rep) in [(TemplateAnchor::Title, title), (TemplateAnchor::BackLink, back), (TemplateAnchor::Heading, h1), (TemplateAnchor::Intro, intro), (TemplateAnchor::TableBody, tbody)] {
        out = anchor.pattern().replace_all(&out, NoExpand(&rep)).into_owned();
    }
    Ok(out)
}

/// Table rows sorted by requirement id (string order, stable).
pub fn render_rows(basis: &BasisKey, records: &[Requirement]) -> String {
    let url_cell = if basis.url.is_empty() { "-".to_string() } else { format!("<a class=\"btn-link\" href=\"{}\" target=\"_blank\">一次情報を開く</a>", html_escape(&basis.url)) };
    let display = html_escape(&basis.display());
    let mut sorted: Vec<&Requirement> = records.iter().collect();
    sorted.sort_by(|a, b| a.requirement_id.cmp(&b.requirement_id));
    let mut rows: Vec<String> = Vec::with_capacity(sorted.len());
    for r in sorted {
        let id = html_escape(&r.requirement_id);
        let text = html_escape(&r.requirement_text);
        rows.push(format!("        <tr data-req-id=\"{id}\">\n          <td class=\"req-cell\"><span id=\"{id}\" class=\"req-anchor\"></span>{text}</td>\n          <td>{display}</td>\n          <td>{url_cell}</td>\n        </tr>"));
    }
    rows.join("\n")
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;").replace('\'', "&#x27;")
}

#[cfg(test)]
pub(crate) const SAMPLE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head>
  <meta charset="utf-8">
  <title>ハラスメント事案の発生｜労働契約法｜労務・人事制度 要件DB</title>
</head>
<body>
  <a class="back" href="../nav/evt/LH-EVT-CONS01.html">← 根拠一覧に戻る</a>
  <h1>ハラスメント事案の発生</h1>
  <p class="lead">本ページは、ハラスメント事案の発生に関して、労働契約法を根拠として制度上確認が求められる事項を整理した要件一覧です。</p>
  <table class="req-table">
    <thead><tr><th>要件</th><th>根拠</th><th>一次情報</th></tr></thead>
    <tbody>
        <tr data-req-id="LH-REQ-0001">
          <td class="req-cell"><span id="LH-REQ-0001" class="req-anchor"></span>安全配慮義務を果たしていること</td>
          <td>労働契約法 / 第5条</td>
          <td>-</td>
        </tr>
      </tbody>
  </table>
</body>
</html>
"#;
