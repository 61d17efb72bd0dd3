//! Prompt/schema pairings and the calls that use them.

use serde_json::{Map, Value};

use crate::completion::{CompletionBackend, StructuredPrompt};
use crate::literature::Section;
use crate::openai::CompletionError;
use crate::prompts::{self, PromptTemplate};
use crate::schema::{self, OutputSchema};

#[derive(Clone, Copy)]
pub struct Contract {
    pub template: &'static PromptTemplate,
    pub schema: &'static OutputSchema,
}

impl Contract {
    pub fn for_section(section: Section) -> Self {
        match section {
            Section::CdeRegistry => Self {
                template: &prompts::CDE_EXTRACTION,
                schema: &schema::CDE_EXTRACTION,
            },
            Section::ForeignTrial => Self {
                template: &prompts::FOREIGN_TRIAL_EXTRACTION,
                schema: &schema::FOREIGN_TRIAL_EXTRACTION,
            },
        }
    }

    pub fn summary() -> Self {
        Self {
            template: &prompts::SUMMARY,
            schema: &schema::SUMMARY,
        }
    }

    /// Send `content` with this contract and return the validated object.
    pub async fn run(
        &self,
        backend: &dyn CompletionBackend,
        content: &str,
    ) -> Result<Map<String, Value>, CompletionError> {
        let user = prompts::render(self.template, self.schema, content);
        let json_schema = self.schema.to_json_schema();
        let prompt = StructuredPrompt {
            system: self.template.system,
            user: &user,
            schema_name: self.schema.name,
            schema: &json_schema,
        };

        let value = backend.complete_json(&prompt).await?;
        self.schema
            .validate(&value)
            .map_err(|err| CompletionError::Malformed(err.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(CompletionError::Malformed("expected a JSON object".to_owned())),
        }
    }
}

pub async fn extract_key_info(
    backend: &dyn CompletionBackend,
    content: &str,
    section: Section,
) -> Result<Map<String, Value>, CompletionError> {
    let contract = Contract::for_section(section);
    let result = contract.run(backend, content).await;
    match &result {
        Ok(_) => tracing::info!(%section, schema = contract.schema.name, "extracted key info"),
        Err(err) => tracing::error!(%section, error = %err, "key info extraction failed"),
    }
    result
}

pub async fn generate_summary(
    backend: &dyn CompletionBackend,
    content: &str,
) -> Result<Map<String, Value>, CompletionError> {
    let result = Contract::summary().run(backend, content).await;
    match &result {
        Ok(_) => tracing::info!("generated protocol summary"),
        Err(err) => tracing::error!(error = %err, "protocol summary failed"),
    }
    result
}
