use crate::schema::{Field, FieldKind, OutputSchema};

pub struct PromptTemplate {
    pub system: &'static str,
    pub role: &'static str,
    pub task: &'static str,
    pub closing: &'static str,
}

pub const CDE_EXTRACTION: PromptTemplate = PromptTemplate {
    system: "你是一名医学文献信息提取专家，请严格按照给定的 JSON Schema 返回提取结果。",
    role: "你是一名医学文献信息提取专家。请从下面的临床试验文献中提取关键信息。",
    task: "请提取以下关键信息：",
    closing: "",
};

pub const FOREIGN_TRIAL_EXTRACTION: PromptTemplate = PromptTemplate {
    system: "你是一名医学文献信息提取专家，请严格按照给定的 JSON Schema 返回提取结果。",
    role: "你是一名国外医学试验文献信息提取专家。请从下面的国外试验文献中提取关键信息。",
    task: "请提取以下关键信息：",
    closing: "",
};

pub const SUMMARY: PromptTemplate = PromptTemplate {
    system: "你是一名临床试验方案摘要专家，请严格按照给定的 JSON Schema 返回提取结果。",
    role: "你是一名临床试验方案摘要专家。请从下面的医学试验文献中提取用于撰写方案摘要的关键信息。",
    task: "请尽可能准确、详细地提取以下关键信息：",
    closing: "注意嵌套对象的结构必须与 Schema 完全一致。",
};

const MISSING_VALUE_RULE: &str =
    "如果某项信息在文献中不存在或不明确，请填写\"未提及\"或\"信息不明确\"，不要省略字段。";

/// Render the user message: role line, the document, the numbered field
/// list derived from `schema`, then the output rules.
pub fn render(template: &PromptTemplate, schema: &OutputSchema, content: &str) -> String {
    let mut out = String::new();
    out.push_str(template.role);
    out.push_str("\n\n文献内容：\n");
    out.push_str(content);
    if !content.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(template.task);
    out.push('\n');
    for (idx, field) in schema.fields.iter().enumerate() {
        out.push_str(&format!("{}. {}", idx + 1, describe(field)));
        out.push('\n');
    }
    out.push('\n');
    out.push_str(MISSING_VALUE_RULE);
    out.push('\n');
    out.push_str("返回内容必须是严格符合要求的 JSON。");
    if !template.closing.is_empty() {
        out.push_str(template.closing);
    }
    out.push('\n');
    out
}

fn describe(field: &Field) -> String {
    let mut line = field.label.to_owned();
    if !field.hint.is_empty() {
        line.push_str(" - ");
        line.push_str(field.hint);
    }
    if let FieldKind::Group(children) = field.kind {
        let names = children.iter().map(|c| c.label).collect::<Vec<_>>();
        line.push_str(&format!("（{}）", names.join("、")));
    }
    line
}
