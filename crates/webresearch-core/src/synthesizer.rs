use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::WebResearchError;
use crate::content::ContentRecord;
use crate::llm::LlmClient;

const INSTRUCTIONS: &str = "INSTRUCTIONS:
1. Only include factual information from the provided sources
2. Include citations in square brackets like [1] after statements
3. Format your response as a well-structured report with markdown headers
4. For \"what is\" questions, focus on clear definitions first, then details
5. Do NOT include separate Resources or References sections at the end
6. Do NOT label your report with titles like \"Research Report\" or \"Machine Learning Research Report\"
7. Start directly with informative content

Your report should synthesize the information into a cohesive, readable format without unnecessary headers.";

/// Builds the report prompt and hands it to the configured model.
#[derive(Clone)]
pub struct ReportSynthesizer {
    llm: Arc<dyn LlmClient>,
}

impl ReportSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub fn build_prompt(query: &str, records: &[ContentRecord]) -> String {
        let sources = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                format!(
                    "Source {}: {}\nURL: {}\nContent: {}\n",
                    index + 1,
                    record.source,
                    record.url,
                    record.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut prompt = String::new();
        let _ = writeln!(prompt, "Create a comprehensive research report for the query: {query}");
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Based on the following information sources:");
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "{sources}");
        let _ = writeln!(prompt);
        prompt.push_str(INSTRUCTIONS);
        prompt
    }

    #[instrument(name = "synthesize", skip(self, records), fields(records = records.len(), model = %self.llm.model()))]
    pub async fn synthesize(
        &self,
        query: &str,
        records: &[ContentRecord],
    ) -> Result<String, WebResearchError> {
        let prompt = Self::build_prompt(query, records);
        let report = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|err| WebResearchError::Llm(format!("{err:#}")))?;

        let report = report.trim();
        if report.is_empty() {
            return Err(WebResearchError::Llm("model returned an empty report".into()));
        }

        info!(report_chars = report.len(), "report synthesized");
        Ok(report.to_string())
    }
}
