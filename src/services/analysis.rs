//! Per-row prompt task: render, ask the model, extract the answer.

use async_trait::async_trait;

use crate::error::WorkError;
use crate::models::{WorkItem, WorkOutput};
use crate::services::extract::OutputExtractor;
use crate::services::llm::ChatBackend;
use crate::services::prompt::PromptTemplate;
use crate::services::work::UnitOfWork;

/// Unit of work that sends one rendered prompt per row.
pub struct PromptTask<B> {
    template: PromptTemplate,
    backend: B,
    extractor: Box<dyn OutputExtractor>,
}

impl<B: ChatBackend> PromptTask<B> {
    pub fn new(template: PromptTemplate, backend: B, extractor: Box<dyn OutputExtractor>) -> Self {
        Self {
            template,
            backend,
            extractor,
        }
    }
}

#[async_trait]
impl<B: ChatBackend> UnitOfWork for PromptTask<B> {
    async fn process(&self, item: &WorkItem) -> Result<WorkOutput, WorkError> {
        let prompt = self
            .template
            .render(item)
            .map_err(|e| WorkError::Permanent(e.to_string()))?;

        let response = self.backend.chat(&prompt).await?;

        match self.extractor.parse(&response) {
            Ok(parsed) => Ok(WorkOutput::new(response)
                .with_extracted(parsed.text)
                .with_fields(parsed.fields)),
            Err(e) => Err(WorkError::Unparseable {
                response,
                reason: e.to_string(),
            }),
        }
    }
}
