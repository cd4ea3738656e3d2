//! Locator Resolver: turns a field's target into a locator with live matches.

use tracing::debug;

use crate::error::Result;
use crate::schema::Target;
use crate::surface::{DocumentSurface, Locator};

/// Elements that accept typed text inside a tag-input container.
pub const EDITABLE_SELECTOR: &str = "input:not([type='hidden']), textarea, \
    [contenteditable='true'], [contenteditable=''], [role='textbox']";

/// Try each configured strategy in order and return the first with at least one match.
pub async fn resolve(surface: &dyn DocumentSurface, target: &Target) -> Result<Option<Locator>> {
    for locator in target.strategies() {
        let count = surface.count(&locator).await?;
        debug!(%locator, count, "locator strategy");
        if count > 0 {
            return Ok(Some(locator));
        }
    }
    Ok(None)
}

/// Where tag text should go, or why there is nowhere to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagInput {
    Found(Locator),
    /// Containers matched but none of them accepts text.
    NotEditable,
    Missing,
}

/// Resolve a tag-input target. The direct strategies are tried first; when
/// they find nothing usable and `anchor` is set, the tags control following
/// the anchor text is tried next. With `narrow` set, each container is
/// narrowed to its editable sub-target.
pub async fn resolve_tag_input(
    surface: &dyn DocumentSurface,
    target: &Target,
    anchor: Option<&str>,
    narrow: bool,
) -> Result<TagInput> {
    let mut matched = false;
    if let Some(direct) = resolve(surface, target).await? {
        matched = true;
        if let Some(input) = usable(surface, &direct, narrow).await? {
            return Ok(TagInput::Found(input));
        }
    }
    if let Some(anchor) = anchor {
        let sibling = Locator::text(anchor, target.exact).following_tags();
        let count = surface.count(&sibling).await?;
        debug!(locator = %sibling, count, "following tags control");
        if count > 0 {
            matched = true;
            if let Some(input) = usable(surface, &sibling, narrow).await? {
                return Ok(TagInput::Found(input));
            }
        }
    }
    Ok(if matched {
        TagInput::NotEditable
    } else {
        TagInput::Missing
    })
}

async fn usable(
    surface: &dyn DocumentSurface,
    container: &Locator,
    narrow: bool,
) -> Result<Option<Locator>> {
    if narrow {
        editable_target(surface, container).await
    } else {
        Ok(Some(container.first()))
    }
}

/// Narrow a container to the element text should be typed into: an editable
/// descendant if there is one, else the container when it is editable itself.
pub async fn editable_target(
    surface: &dyn DocumentSurface,
    container: &Locator,
) -> Result<Option<Locator>> {
    let first = container.first();
    let inner = first.locate(EDITABLE_SELECTOR);
    if surface.count(&inner).await? > 0 {
        return Ok(Some(inner.first()));
    }
    if surface.is_editable(&first).await? {
        return Ok(Some(first));
    }
    Ok(None)
}
