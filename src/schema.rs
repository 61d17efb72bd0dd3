//! Output schemas for schema-constrained generation.
//!
//! Each schema is a static table of fields. The same table drives the JSON
//! Schema sent to the model, the numbered field list in the prompt, and the
//! validation of whatever comes back.

use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static str,
    /// Short label used in the prompt.
    pub label: &'static str,
    /// Extra guidance for the prompt.
    pub hint: &'static str,
    /// JSON Schema `description` when it says more than `label`.
    pub description: Option<&'static str>,
    pub kind: FieldKind,
}

impl Field {
    const fn described(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn description(&self) -> &'static str {
        match self.description {
            Some(description) => description,
            None => self.label,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    Group(&'static [Field]),
}

#[derive(Debug, Clone, Copy)]
pub struct OutputSchema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

const fn text(key: &'static str, label: &'static str, hint: &'static str) -> Field {
    Field {
        key,
        label,
        hint,
        description: None,
        kind: FieldKind::Text,
    }
}

const fn group(
    key: &'static str,
    label: &'static str,
    hint: &'static str,
    fields: &'static [Field],
) -> Field {
    Field {
        key,
        label,
        hint,
        description: None,
        kind: FieldKind::Group(fields),
    }
}

const DESIGN_HINT: &str = "分组及样本量、给药周期、剂量、随机及盲法、PK/PD、非劣效/优效/等效设计等";
const DESIGN_DESCRIPTION: &str =
    "方案设计（分组及样本量、给药周期、剂量、随机及盲法、PK/PD、非劣优效/等效设计等）";

pub const CDE_EXTRACTION: OutputSchema = OutputSchema {
    name: "medical_trial_extraction",
    fields: &[
        text("company_name", "公司名称", "开展试验的公司或机构"),
        text("drug_name", "试验药物名称/代号", "试验药物的正式名称或代号"),
        text("dosage_form", "剂型/规格", "药物剂型与规格"),
        text("trial_phase", "试验分期/单药联合", "临床分期，以及单药还是联合用药"),
        text("study_design", "方案设计", DESIGN_HINT).described(DESIGN_DESCRIPTION),
        text("primary_endpoint", "主要指标", "主要终点指标"),
        text("inclusion_criteria", "入选人物画像", "受试者入选标准"),
        text("exclusion_criteria", "排除人物画像", "受试者排除标准"),
        text("total_sample_size", "总样本量", "计划招募的受试者总数"),
        text("center_count", "中心数", "参与的研究中心数量"),
        text("first_patient_in", "首例入组日期", "第一例受试者入组日期"),
        text("study_completion_date", "试验完成日期", "预计或实际完成日期"),
    ],
};

pub const FOREIGN_TRIAL_EXTRACTION: OutputSchema = OutputSchema {
    name: "foreign_trial_extraction",
    fields: &[
        text(
            "company_publication_country",
            "公司名称/发表时间/试验国家",
            "格式如：Vyne Therapeutics Inc./2016年/美国、多米尼加共和国",
        ),
        text("drug_name", "试验药物名称/代号", "试验药物的正式名称或代号"),
        text("dosage_form", "剂型/规格", "药物剂型与规格，如：4%"),
        text("trial_phase", "试验分期/单药联合", "临床分期，以及单药还是联合用药，如：III期"),
        text("study_design", "方案设计", DESIGN_HINT).described(DESIGN_DESCRIPTION),
        text("primary_secondary_endpoints", "主要指标/次要指标", "主要及次要终点指标"),
        text("inclusion_criteria", "入选人物画像", "受试者的详细入选标准"),
        text("exclusion_criteria", "排除人物画像", "受试者的详细排除标准"),
        text("confidence_interval_values", "置信区间/界值/个体内CV值", "统计学相关数值"),
        text(
            "trial_results_conclusions",
            "PK/PD/主次疗评指标试验结果及试验结论",
            "具体试验结果与结论",
        ),
        text("center_count", "中心数", "参与的研究中心数量"),
        text("reference_level", "参考等级（强、一般、弱）", "该文献的参考价值：强、一般或弱"),
    ],
};

const OBJECTIVE_FIELDS: &[Field] = &[
    text("primary_objective", "主要目的", ""),
    text("secondary_objective", "次要目的", ""),
];

const ENDPOINT_FIELDS: &[Field] = &[
    text("primary_endpoint", "主要终点", ""),
    text("secondary_endpoint", "次要终点", ""),
    text("exploratory_endpoint", "探索性终点", ""),
    text("safety_evaluation", "安全性评价", ""),
];

const DESIGN_FIELDS: &[Field] = &[
    text("study_population_selection", "研究人群选择及导入期设计依据", ""),
    text("positive_control_selection", "阳性对照药品选择及依据", ""),
    text("primary_endpoint_selection", "主要疗效终点的选择及依据", ""),
];

pub const SUMMARY: OutputSchema = OutputSchema {
    name: "summary_extraction",
    fields: &[
        text("study_title", "研究题目", "试验的完整标题"),
        text("drug_name_specification", "试验药物名称及规格", "药物名称、剂型、规格等完整信息"),
        text("indication", "适应症", "试验药物针对的疾病或症状"),
        text("trial_phase", "试验分期", "如I期、II期、III期"),
        text("center_count", "研究中心数", "参与的研究中心数量"),
        text("study_period", "研究周期", "试验持续时间或计划周期"),
        group(
            "study_objectives",
            "研究目的",
            "主要目的与次要目的",
            OBJECTIVE_FIELDS,
        ),
        group(
            "efficacy_endpoints",
            "疗效指标",
            "主要终点、次要终点、探索性终点、安全性评价",
            ENDPOINT_FIELDS,
        ),
        group(
            "trial_design",
            "试验设计",
            "研究人群选择及导入期设计依据、阳性对照药品选择及依据、主要疗效终点的选择及依据",
            DESIGN_FIELDS,
        ),
        text("trial_process", "试验流程", "具体实施流程和步骤"),
        text("sample_size", "样本量", "计划招募人数及计算依据"),
        text("investigational_drug", "试验用药品，规格，用法用量", "详细用药信息"),
        text("concomitant_treatment", "合并治疗", "允许的合并用药或治疗"),
        text("rescue_treatment", "挽救治疗", "紧急情况下的挽救措施"),
        text("inclusion_exclusion_criteria", "入排标准", "受试者入选与排除标准"),
        text("withdrawal_termination_criteria", "退出和中止/终止标准", "退出、中止或终止的条件"),
        text("statistical_analysis", "统计分析", "统计分析方法与计划"),
    ],
};

impl OutputSchema {
    pub fn required_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.key)
    }

    /// JSON Schema document: every property required, no extras.
    pub fn to_json_schema(&self) -> Value {
        object_schema(self.fields, None)
    }

    /// Check that `value` has exactly the declared shape.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        validate_object(self.fields, value, "")
    }
}

fn object_schema(fields: &[Field], description: Option<&str>) -> Value {
    let mut properties = Map::new();
    for field in fields {
        let property = match field.kind {
            FieldKind::Text => json!({ "type": "string", "description": field.description() }),
            FieldKind::Group(children) => object_schema(children, Some(field.description())),
        };
        properties.insert(field.key.to_owned(), property);
    }
    let required = fields.iter().map(|f| f.key).collect::<Vec<_>>();

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    });
    if let (Some(description), Some(obj)) = (description, schema.as_object_mut()) {
        obj.insert("description".to_owned(), json!(description));
    }
    schema
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("expected a JSON object at `{0}`")]
    NotAnObject(String),
    #[error("missing required field `{0}`")]
    Missing(String),
    #[error("field `{0}` must be a string")]
    NotAString(String),
    #[error("unexpected field `{0}`")]
    Unexpected(String),
}

fn validate_object(fields: &[Field], value: &Value, at: &str) -> Result<(), SchemaViolation> {
    let Some(obj) = value.as_object() else {
        let at = if at.is_empty() { "$" } else { at };
        return Err(SchemaViolation::NotAnObject(at.to_owned()));
    };

    for field in fields {
        let path = join_path(at, field.key);
        let Some(child) = obj.get(field.key) else {
            return Err(SchemaViolation::Missing(path));
        };
        match field.kind {
            FieldKind::Text if !child.is_string() => return Err(SchemaViolation::NotAString(path)),
            FieldKind::Text => {}
            FieldKind::Group(children) => validate_object(children, child, &path)?,
        }
    }

    if let Some(extra) = obj.keys().find(|k| !fields.iter().any(|f| f.key == *k)) {
        return Err(SchemaViolation::Unexpected(join_path(at, extra)));
    }
    Ok(())
}

fn join_path(at: &str, key: &str) -> String {
    if at.is_empty() {
        key.to_owned()
    } else {
        format!("{at}.{key}")
    }
}
