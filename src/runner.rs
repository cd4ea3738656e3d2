//! Run Driver: walks a schema's fields in order against one document.

use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::executor::{Executor, FieldOutcome};
use crate::identifier::IdentifierStore;
use crate::schema::{FieldDefinition, Schema};
use crate::surface::{ClickOptions, DocumentSurface, Locator};
use crate::timing::Jitter;
use crate::value::Record;

/// What happened to one field.
#[derive(Debug)]
pub struct FieldReport {
    pub name: String,
    pub outcome: FieldOutcome,
}

#[derive(Debug)]
pub struct RunReport {
    pub fields: Vec<FieldReport>,
    pub submitted: bool,
    /// The record as it stands after the run, including any issued identifier.
    pub record: Record,
}

impl RunReport {
    pub fn applied(&self) -> usize {
        self.fields.iter().filter(|f| f.outcome.is_applied()).count()
    }

    pub fn skipped(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f.outcome, FieldOutcome::Skipped(_)))
            .count()
    }
}

pub struct Runner<'a> {
    surface: &'a dyn DocumentSurface,
    schema: &'a Schema,
    identifiers: &'a dyn IdentifierStore,
    submit: bool,
}

impl<'a> Runner<'a> {
    pub fn new(
        surface: &'a dyn DocumentSurface,
        schema: &'a Schema,
        identifiers: &'a dyn IdentifierStore,
    ) -> Self {
        Self {
            surface,
            schema,
            identifiers,
            submit: false,
        }
    }

    /// Click the schema's submit target once everything is filled.
    pub fn submit(mut self, submit: bool) -> Self {
        self.submit = submit;
        self
    }

    /// Navigate to the schema URL and wait until the page is ready to fill.
    /// A ready-wait timeout ends the run.
    pub async fn open(&self) -> Result<()> {
        let options = &self.schema.options;
        info!("Opening {}", self.schema.url);
        self.surface
            .goto(&self.schema.url, options.wait_until)
            .await?;
        self.wait_until_ready().await
    }

    /// Selector wait and fixed pause configured to run before filling.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let options = &self.schema.options;
        if let Some(selector) = options.wait_for_selector.as_deref() {
            info!("Waiting for {selector}");
            self.surface
                .wait_for_selector(selector, options.wait_for_selector_timeout())
                .await?;
        }
        if options.pause_before_fill_ms > 0 {
            self.surface
                .wait_for_timeout(Duration::from_millis(options.pause_before_fill_ms))
                .await;
        }
        Ok(())
    }

    /// Fill every field, then the optional draft/save steps and submit.
    pub async fn fill(&self, record: Record) -> Result<RunReport> {
        let options = &self.schema.options;
        let executor = Executor::new(self.surface, options, self.identifiers)
            .with_clipboard_origin(origin_of(&self.schema.url));
        let pacing = Jitter::new(options.pacing_jitter);

        let mut record = record;
        let mut reports = Vec::with_capacity(self.schema.fields.len() + 2);

        for field in &self.schema.fields {
            record = self.step(&executor, field, record, &mut reports).await?;
            let pause = pacing.sample(options.between_fields_delay_ms);
            if !pause.is_zero() {
                self.surface.wait_for_timeout(pause).await;
            }
        }

        if options.click_draft {
            if let Some(draft) = &self.schema.draft {
                record = self.step(&executor, draft, record, &mut reports).await?;
            }
        }
        if options.click_save_progress {
            if let Some(save) = &self.schema.save_progress {
                record = self.step(&executor, save, record, &mut reports).await?;
            }
        }
        if options.pause_after_draft_ms > 0 {
            self.surface
                .wait_for_timeout(Duration::from_millis(options.pause_after_draft_ms))
                .await;
        }

        let submitted = self.finish().await?;
        Ok(RunReport {
            fields: reports,
            submitted,
            record,
        })
    }

    /// `open` followed by `fill`.
    pub async fn run(&self, record: Record) -> Result<RunReport> {
        self.open().await?;
        self.fill(record).await
    }

    async fn step(
        &self,
        executor: &Executor<'_>,
        field: &FieldDefinition,
        record: Record,
        reports: &mut Vec<FieldReport>,
    ) -> Result<Record> {
        let execution = executor.execute(field, &record).await;
        let record = execution.record.unwrap_or(record);
        match execution.outcome {
            FieldOutcome::Failed(e) => Err(Error::FieldFailed {
                field: field.name.clone(),
                source: Box::new(e),
            }),
            outcome => {
                reports.push(FieldReport {
                    name: field.name.clone(),
                    outcome,
                });
                Ok(record)
            }
        }
    }

    async fn finish(&self) -> Result<bool> {
        let Some(submit) = &self.schema.submit else {
            info!("Form filled. Review the page before submitting.");
            return Ok(false);
        };
        if !self.submit {
            info!("Form filled. Review the page, then rerun with --submit if desired.");
            return Ok(false);
        }
        let target = Locator::css(submit.selector.as_str());
        if self.surface.count(&target).await? == 0 {
            warn!("Submit target {} not found", submit.selector);
            return Ok(false);
        }
        self.surface
            .click(&target.first(), ClickOptions::default())
            .await?;
        info!("Submitted form.");
        Ok(true)
    }
}

/// Scheme + host (+ port) of `url`, used to scope clipboard permission.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
