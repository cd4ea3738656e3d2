//! Action Executor: performs one field's interaction against the document.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RunOptions;
use crate::error::{Error, Result};
use crate::identifier::{next_identifier, IdentifierStore};
use crate::locator::{self, TagInput};
use crate::schema::{EnterPress, FieldAction, FieldDefinition, TagEntry, TagOptions, Transform};
use crate::surface::{ClickOptions, DocumentSurface, Locator};
use crate::timing::{self, Jitter};
use crate::value::{
    build_comma_separated_value, extract_us_size, normalize_text, split_list, stringify, Record,
};

/// Elements scanned when matching text by normalized comparison.
const CANDIDATE_SELECTOR: &str = "span,div,button";

const PAGE_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";
const PAGE_BOTTOM_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No selector, label, placeholder or text configured.
    NoTarget,
    NotFound,
    NoEditableTarget,
    EmptyValue,
    AlreadyChecked,
    NoIdentifier,
    /// None of the requested texts were on the page.
    NothingMatched(Vec<String>),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoTarget => f.write_str("no selector/label/placeholder/text"),
            SkipReason::NotFound => f.write_str("target not found"),
            SkipReason::NoEditableTarget => f.write_str("no editable tag input"),
            SkipReason::EmptyValue => f.write_str("empty value"),
            SkipReason::AlreadyChecked => f.write_str("already checked"),
            SkipReason::NoIdentifier => f.write_str("no identifier available"),
            SkipReason::NothingMatched(texts) => write!(f, "none of {texts:?} found"),
        }
    }
}

#[derive(Debug)]
pub enum FieldOutcome {
    Applied,
    Skipped(SkipReason),
    Failed(Error),
}

impl FieldOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FieldOutcome::Applied)
    }
}

/// Outcome of one field plus the record to carry forward when the field changed it.
#[derive(Debug)]
pub struct Execution {
    pub outcome: FieldOutcome,
    pub record: Option<Record>,
}

pub struct Executor<'a> {
    surface: &'a dyn DocumentSurface,
    options: &'a RunOptions,
    identifiers: &'a dyn IdentifierStore,
    clipboard_origin: Option<String>,
    typing: Jitter,
}

impl<'a> Executor<'a> {
    pub fn new(
        surface: &'a dyn DocumentSurface,
        options: &'a RunOptions,
        identifiers: &'a dyn IdentifierStore,
    ) -> Self {
        Self {
            surface,
            options,
            identifiers,
            clipboard_origin: options.clipboard_origin.clone(),
            typing: Jitter::new(options.typing_jitter),
        }
    }

    pub fn with_clipboard_origin(mut self, origin: Option<String>) -> Self {
        if self.clipboard_origin.is_none() {
            self.clipboard_origin = origin;
        }
        self
    }

    /// Run one field. Never returns an error: surface failures become
    /// [`FieldOutcome::Failed`] and the caller decides whether to continue.
    pub async fn execute(&self, field: &FieldDefinition, record: &Record) -> Execution {
        if field.scroll.page_bottom {
            self.scroll_page_bottom().await;
        }

        let mut patched = None;
        let value = if field.value.auto_identifier {
            let issued = next_identifier(record, &self.options.identifier, self.identifiers);
            if issued.value.is_empty() {
                return self.skip(field, SkipReason::NoIdentifier, None);
            }
            if &issued.record != record {
                patched = Some(issued.record);
            }
            issued.value
        } else {
            resolve_value(field, record)
        };

        if field.is_inert() {
            return self.skip(field, SkipReason::NoTarget, patched);
        }
        if field.value.skip_if_empty && value.is_empty() {
            return self.skip(field, SkipReason::EmptyValue, patched);
        }

        let record = patched.as_ref().unwrap_or(record);
        let outcome = match self.dispatch(field, record, &value).await {
            Ok(FieldOutcome::Skipped(reason)) => {
                info!("Skipping {}: {}", field.name, reason);
                FieldOutcome::Skipped(reason)
            }
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Field {} failed: {}", field.name, e);
                FieldOutcome::Failed(e)
            }
        };
        Execution {
            outcome,
            record: patched,
        }
    }

    fn skip(&self, field: &FieldDefinition, reason: SkipReason, record: Option<Record>) -> Execution {
        info!("Skipping {}: {}", field.name, reason);
        Execution {
            outcome: FieldOutcome::Skipped(reason),
            record,
        }
    }

    async fn dispatch(
        &self,
        field: &FieldDefinition,
        record: &Record,
        value: &str,
    ) -> Result<FieldOutcome> {
        debug!(field = %field.name, action = field.action.kind(), "executing field");
        match &field.action {
            FieldAction::ClickEachText {
                scope,
                exact,
                normalize,
            } => {
                let raw = field
                    .value
                    .key_path
                    .as_deref()
                    .and_then(|k| record.resolve_raw(k));
                self.click_each_text(field, raw, scope.as_deref(), *exact, *normalize)
                    .await
            }
            FieldAction::TypeEachTag(opts) => {
                let raw = field
                    .value
                    .key_path
                    .as_deref()
                    .and_then(|k| record.resolve_raw(k));
                self.type_each_tag(field, raw, opts).await
            }
            FieldAction::Fill {
                clear,
                no_typing_delay,
                enter,
            } => {
                let Some(first) = self.locate(field).await? else {
                    return Ok(FieldOutcome::Skipped(SkipReason::NotFound));
                };
                if self.options.typing_delay_ms > 0 && !no_typing_delay {
                    if *clear {
                        self.surface.fill(&first, "").await?;
                    }
                    self.surface
                        .type_text(&first, value, self.typing_delay())
                        .await?;
                } else {
                    self.surface.fill(&first, value).await?;
                }
                self.press_enter(&first, enter.as_ref()).await?;
                Ok(FieldOutcome::Applied)
            }
            FieldAction::Type { enter } => {
                let Some(first) = self.locate(field).await? else {
                    return Ok(FieldOutcome::Skipped(SkipReason::NotFound));
                };
                self.surface
                    .type_text(&first, value, self.typing_delay())
                    .await?;
                self.press_enter(&first, enter.as_ref()).await?;
                Ok(FieldOutcome::Applied)
            }
            FieldAction::Click { center, force } => {
                let Some(first) = self.locate(field).await? else {
                    return Ok(FieldOutcome::Skipped(SkipReason::NotFound));
                };
                let point = if *center {
                    self.surface.bounding_box(&first).await?.map(|b| b.center())
                } else {
                    None
                };
                match point {
                    Some((x, y)) => self.surface.mouse_click(x, y).await?,
                    None => {
                        self.surface
                            .click(&first, ClickOptions { force: *force })
                            .await?
                    }
                }
                Ok(FieldOutcome::Applied)
            }
            FieldAction::Check {
                force,
                checked_indicator,
            } => {
                if let Some(indicator) = checked_indicator {
                    if self.already_checked(indicator).await? {
                        return Ok(FieldOutcome::Skipped(SkipReason::AlreadyChecked));
                    }
                }
                let Some(first) = self.locate(field).await? else {
                    return Ok(FieldOutcome::Skipped(SkipReason::NotFound));
                };
                self.surface
                    .check(&first, ClickOptions { force: *force })
                    .await?;
                Ok(FieldOutcome::Applied)
            }
            FieldAction::Select => {
                let Some(first) = self.locate(field).await? else {
                    return Ok(FieldOutcome::Skipped(SkipReason::NotFound));
                };
                self.surface.select_option(&first, value).await?;
                Ok(FieldOutcome::Applied)
            }
        }
    }

    /// Resolve the field's target and bring it into view. Returns the first match.
    async fn locate(&self, field: &FieldDefinition) -> Result<Option<Locator>> {
        let Some(target) = locator::resolve(self.surface, &field.target).await? else {
            return Ok(None);
        };
        self.scroll(field, &target).await;
        Ok(Some(target.first()))
    }

    async fn click_each_text(
        &self,
        field: &FieldDefinition,
        raw: Option<serde_json::Value>,
        scope: Option<&str>,
        exact: bool,
        normalize: bool,
    ) -> Result<FieldOutcome> {
        let texts = match &raw {
            Some(serde_json::Value::Array(_)) => split_list(raw.as_ref()),
            Some(v) if normalize => {
                let whole = stringify(v).trim().to_string();
                if whole.is_empty() {
                    Vec::new()
                } else {
                    vec![whole]
                }
            }
            other => split_list(other.as_ref()),
        };
        if texts.is_empty() {
            return Ok(FieldOutcome::Skipped(SkipReason::EmptyValue));
        }
        let scope = scope.map(Locator::css);

        let mut missing = Vec::new();
        match (&scope, normalize) {
            (Some(scope), true) => {
                let candidates = scope.locate(CANDIDATE_SELECTOR);
                let total = self.surface.count(&candidates).await?;
                let mut seen = Vec::with_capacity(total);
                for i in 0..total {
                    let text = self
                        .surface
                        .inner_text(&candidates.nth(i))
                        .await
                        .unwrap_or_default();
                    seen.push(normalize_text(&text));
                }
                for text in &texts {
                    let wanted = normalize_text(text);
                    if wanted.is_empty() {
                        info!("Skipping {}: \"{}\" has nothing to compare", field.name, text);
                        missing.push(text.clone());
                        continue;
                    }
                    match seen.iter().position(|s| *s == wanted) {
                        Some(i) => {
                            let item = candidates.nth(i);
                            self.scroll(field, &item).await;
                            self.surface.click(&item, ClickOptions::default()).await?;
                        }
                        None => {
                            info!("Skipping {}: \"{}\" not found", field.name, text);
                            missing.push(text.clone());
                        }
                    }
                }
            }
            _ => {
                for text in &texts {
                    let matches = match &scope {
                        Some(scope) => scope.get_by_text(text, exact),
                        None => Locator::text(text, exact),
                    };
                    if self.surface.count(&matches).await? == 0 {
                        info!("Skipping {}: \"{}\" not found", field.name, text);
                        missing.push(text.clone());
                        continue;
                    }
                    self.scroll(field, &matches).await;
                    self.surface
                        .click(&matches.first(), ClickOptions::default())
                        .await?;
                }
            }
        }

        if missing.len() == texts.len() {
            Ok(FieldOutcome::Skipped(SkipReason::NothingMatched(missing)))
        } else {
            Ok(FieldOutcome::Applied)
        }
    }

    async fn type_each_tag(
        &self,
        field: &FieldDefinition,
        raw: Option<serde_json::Value>,
        opts: &TagOptions,
    ) -> Result<FieldOutcome> {
        let mut tags = split_list(raw.as_ref());
        if tags.is_empty() {
            return Ok(FieldOutcome::Skipped(SkipReason::EmptyValue));
        }
        if opts.join {
            tags = vec![tags.join(", ")];
        }

        let input = match locator::resolve_tag_input(
            self.surface,
            &field.target,
            opts.anchor.as_deref(),
            opts.editable_target,
        )
        .await?
        {
            TagInput::Found(input) => input,
            TagInput::NotEditable => {
                return Ok(FieldOutcome::Skipped(SkipReason::NoEditableTarget))
            }
            TagInput::Missing => return Ok(FieldOutcome::Skipped(SkipReason::NotFound)),
        };

        self.scroll(field, &input).await;
        self.focus_tag_input(&input, opts).await?;

        let mut clipboard_ready = false;
        if opts.entry == TagEntry::Paste {
            clipboard_ready = self.prepare_clipboard(field).await;
        }

        let key_delay = if opts.no_typing_delay {
            Duration::ZERO
        } else {
            self.typing_delay()
        };
        for tag in &tags {
            if opts.refocus_each {
                self.focus_tag_input(&input, opts).await?;
            }
            match opts.entry {
                TagEntry::Type => self.surface.type_text(&input, tag, key_delay).await?,
                TagEntry::InsertText => self.surface.insert_text(tag).await?,
                TagEntry::Paste => {
                    if clipboard_ready {
                        self.paste_or_insert(field, &input, tag).await?;
                    } else {
                        self.surface.insert_text(tag).await?;
                    }
                }
            }
            if !opts.settle.is_zero() {
                self.surface.wait_for_timeout(opts.settle).await;
            }
            self.surface.press(&input, "Enter").await?;
        }
        Ok(FieldOutcome::Applied)
    }

    async fn focus_tag_input(&self, input: &Locator, opts: &TagOptions) -> Result<()> {
        if opts.focus_script || !opts.focus_click {
            self.surface.focus(input).await?;
        }
        if opts.focus_click {
            self.surface
                .click(input, ClickOptions { force: opts.force })
                .await?;
        }
        Ok(())
    }

    async fn prepare_clipboard(&self, field: &FieldDefinition) -> bool {
        let Some(origin) = self.clipboard_origin.as_deref() else {
            return true;
        };
        match self.surface.grant_clipboard(origin).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Clipboard permission denied for {}: {}", field.name, e);
                false
            }
        }
    }

    async fn paste_or_insert(&self, field: &FieldDefinition, input: &Locator, tag: &str) -> Result<()> {
        match self.surface.write_clipboard(tag).await {
            Ok(()) => self.surface.paste(input).await,
            Err(e) => {
                warn!("Clipboard write failed for {}, inserting text instead: {}", field.name, e);
                self.surface.insert_text(tag).await
            }
        }
    }

    async fn already_checked(&self, indicator: &str) -> Result<bool> {
        let indicator = Locator::css(indicator);
        if self.surface.count(&indicator).await? == 0 {
            return Ok(false);
        }
        self.surface.is_checked(&indicator.first()).await
    }

    async fn press_enter(&self, target: &Locator, enter: Option<&EnterPress>) -> Result<()> {
        let Some(enter) = enter else {
            return Ok(());
        };
        self.surface.press(target, "Enter").await?;
        if !enter.delay_after.is_zero() {
            self.surface.wait_for_timeout(enter.delay_after).await;
        }
        Ok(())
    }

    async fn scroll(&self, field: &FieldDefinition, target: &Locator) {
        if field.scroll.skip {
            return;
        }
        timing::scroll_into_view(self.surface, target, self.options.scroll_timeout(), &field.name)
            .await;
    }

    async fn scroll_page_bottom(&self) {
        match self.surface.evaluate(PAGE_BOTTOM_SCRIPT).await {
            Ok(_) => self.surface.wait_for_timeout(PAGE_BOTTOM_SETTLE).await,
            Err(e) => warn!("Could not scroll page to bottom: {e}"),
        }
    }

    fn typing_delay(&self) -> Duration {
        self.typing.sample(self.options.typing_delay_ms)
    }
}

/// Resolve and transform a field's value from the record.
pub fn resolve_value(field: &FieldDefinition, record: &Record) -> String {
    let Some(key) = field.value.key_path.as_deref() else {
        return String::new();
    };
    match field.value.transform {
        None => record.resolve(key),
        Some(Transform::UsSize) => extract_us_size(&record.resolve(key)),
        Some(Transform::CommaJoin) => build_comma_separated_value(record.resolve_raw(key).as_ref()),
    }
}
