//! Protocol summary to DOCX.
//!
//! [`layout`] fixes the block order; [`render_docx`] hands the blocks to
//! `docx-rs`, which writes the WordprocessingML package.

use std::io::Cursor;

use chrono::Utc;
use docx_rs::{
    AlignmentType, BreakType, Docx, PageMargin, Paragraph, Run, RunFonts, Style, StyleType,
    Table, TableCell, TableRow, WidthType,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const SUMMARY_FILENAME: &str = "方案摘要.docx";
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const TITLE: &str = "关键文献方案摘要";

/// Summary as accepted by the renderer. Absent keys render as empty text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SummaryDocument {
    #[serde(deserialize_with = "text")]
    pub study_title: String,
    #[serde(deserialize_with = "text")]
    pub sponsor: String,
    #[serde(deserialize_with = "text")]
    pub protocol_number: String,
    #[serde(deserialize_with = "text")]
    pub principal_investigator: String,
    #[serde(deserialize_with = "text")]
    pub drug_name_specification: String,
    #[serde(deserialize_with = "text")]
    pub indication: String,
    #[serde(deserialize_with = "text")]
    pub trial_phase: String,
    #[serde(deserialize_with = "text")]
    pub center_count: String,
    #[serde(deserialize_with = "text")]
    pub study_period: String,
    #[serde(deserialize_with = "group")]
    pub study_objectives: StudyObjectives,
    #[serde(deserialize_with = "group")]
    pub efficacy_endpoints: EfficacyEndpoints,
    #[serde(deserialize_with = "group")]
    pub trial_design: TrialDesign,
    #[serde(deserialize_with = "text")]
    pub trial_process: String,
    #[serde(deserialize_with = "text")]
    pub sample_size: String,
    #[serde(deserialize_with = "text")]
    pub investigational_drug: String,
    #[serde(deserialize_with = "text")]
    pub concomitant_treatment: String,
    #[serde(deserialize_with = "text")]
    pub rescue_treatment: String,
    #[serde(deserialize_with = "text")]
    pub inclusion_exclusion_criteria: String,
    #[serde(deserialize_with = "text")]
    pub withdrawal_termination_criteria: String,
    #[serde(deserialize_with = "text")]
    pub statistical_analysis: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudyObjectives {
    #[serde(deserialize_with = "text")]
    pub primary_objective: String,
    #[serde(deserialize_with = "text")]
    pub secondary_objective: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EfficacyEndpoints {
    #[serde(deserialize_with = "text")]
    pub primary_endpoint: String,
    #[serde(deserialize_with = "text")]
    pub secondary_endpoint: String,
    #[serde(deserialize_with = "text")]
    pub exploratory_endpoint: String,
    #[serde(deserialize_with = "text")]
    pub safety_evaluation: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrialDesign {
    #[serde(deserialize_with = "text")]
    pub study_population_selection: String,
    #[serde(deserialize_with = "text")]
    pub positive_control_selection: String,
    #[serde(deserialize_with = "text")]
    pub primary_endpoint_selection: String,
}

/// Strings pass through, null becomes empty, other scalars are printed.
fn text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

/// A null or non-object group renders as all-empty.
fn group<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + serde::de::DeserializeOwned,
{
    match Value::deserialize(de)? {
        value @ Value::Object(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        _ => Ok(T::default()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Title(String),
    Table(Vec<(String, String)>),
    Heading(String),
    Paragraph(String),
}

/// Fixed layout: title, basic-info table, objectives, endpoints, design,
/// then one heading per remaining field.
pub fn layout(summary: &SummaryDocument) -> Vec<Block> {
    let s = summary;
    let mut blocks = vec![Block::Title(TITLE.to_owned())];

    let basic_info = [
        ("研究题目", &s.study_title),
        ("申办者", &s.sponsor),
        ("方案编号", &s.protocol_number),
        ("组长单位/主要研究者", &s.principal_investigator),
        ("试验药物名称及规格", &s.drug_name_specification),
        ("适应症", &s.indication),
        ("试验分期", &s.trial_phase),
        ("研究中心数", &s.center_count),
        ("研究周期", &s.study_period),
    ];
    blocks.push(Block::Table(
        basic_info
            .iter()
            .map(|(label, value)| (label.to_string(), value.to_string()))
            .collect(),
    ));

    let labelled = |label: &str, value: &str| Block::Paragraph(format!("{label}: {value}"));

    blocks.push(Block::Heading("研究目的".to_owned()));
    blocks.push(labelled("主要目的", &s.study_objectives.primary_objective));
    blocks.push(labelled("次要目的", &s.study_objectives.secondary_objective));

    let e = &s.efficacy_endpoints;
    blocks.push(Block::Heading("疗效指标".to_owned()));
    blocks.push(labelled("主要终点", &e.primary_endpoint));
    blocks.push(labelled("次要终点", &e.secondary_endpoint));
    blocks.push(labelled("探索性终点", &e.exploratory_endpoint));
    blocks.push(labelled("安全性评价", &e.safety_evaluation));

    let d = &s.trial_design;
    blocks.push(Block::Heading("试验设计".to_owned()));
    blocks.push(labelled(
        "研究人群选择及导入期设计依据",
        &d.study_population_selection,
    ));
    blocks.push(labelled("阳性对照药品选择及依据", &d.positive_control_selection));
    blocks.push(labelled(
        "主要疗效终点的选择及依据",
        &d.primary_endpoint_selection,
    ));

    let other_info = [
        ("试验流程", &s.trial_process),
        ("样本量", &s.sample_size),
        ("试验用药品，规格，用法用量", &s.investigational_drug),
        ("合并治疗", &s.concomitant_treatment),
        ("挽救治疗", &s.rescue_treatment),
        ("入排标准", &s.inclusion_exclusion_criteria),
        ("退出和中止/终止标准", &s.withdrawal_termination_criteria),
        ("统计分析", &s.statistical_analysis),
    ];
    for (label, value) in other_info {
        blocks.push(Block::Heading(label.to_owned()));
        blocks.push(Block::Paragraph(value.clone()));
    }

    blocks
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("pack docx archive: {0}")]
    Pack(String),
}

/// Render `summary` to DOCX bytes.
pub fn render_docx(summary: &SummaryDocument) -> Result<Vec<u8>, RenderError> {
    let created = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let mut docx = Docx::new()
        .page_size(11906, 16838)
        .page_margin(
            PageMargin::new()
                .top(1440)
                .bottom(1440)
                .left(1800)
                .right(1800),
        )
        .default_fonts(RunFonts::new().east_asia("SimSun"))
        .default_size(22)
        .add_style(
            Style::new("Title", StyleType::Paragraph)
                .name("Title")
                .bold()
                .size(44),
        )
        .add_style(
            Style::new("Heading1", StyleType::Paragraph)
                .name("Heading 1")
                .bold()
                .size(32),
        )
        .created_at(&created)
        .updated_at(&created);

    for block in layout(summary) {
        docx = match block {
            Block::Title(text) => docx.add_paragraph(
                paragraph(&text)
                    .style("Title")
                    .align(AlignmentType::Center),
            ),
            Block::Heading(text) => docx.add_paragraph(paragraph(&text).style("Heading1")),
            Block::Paragraph(text) => docx.add_paragraph(paragraph(&text)),
            Block::Table(rows) => docx.add_table(table(&rows)),
        };
    }

    let mut out = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut out)
        .map_err(|e| RenderError::Pack(e.to_string()))?;
    Ok(out.into_inner())
}

/// One run per paragraph; newlines become text-wrapping breaks.
fn paragraph(text: &str) -> Paragraph {
    let text = sanitize(text);
    if text.is_empty() {
        return Paragraph::new();
    }
    let mut run = Run::new();
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(line.strip_suffix('\r').unwrap_or(line));
    }
    Paragraph::new().add_run(run)
}

fn table(rows: &[(String, String)]) -> Table {
    const LABEL_WIDTH: usize = 2400;
    const VALUE_WIDTH: usize = 5900;

    let rows = rows
        .iter()
        .map(|(label, value)| {
            TableRow::new(vec![
                TableCell::new()
                    .add_paragraph(paragraph(label))
                    .width(LABEL_WIDTH, WidthType::Dxa),
                TableCell::new()
                    .add_paragraph(paragraph(value))
                    .width(VALUE_WIDTH, WidthType::Dxa),
            ])
        })
        .collect();
    Table::new(rows).set_grid(vec![LABEL_WIDTH, VALUE_WIDTH])
}

/// Drop characters XML 1.0 cannot carry; escaping is left to the writer.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|&c| match c {
            '\t' | '\n' | '\r' => true,
            '\u{FFFE}' | '\u{FFFF}' => false,
            c => (c as u32) >= 0x20,
        })
        .collect()
}
