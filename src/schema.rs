//! Form schemas: the declarative description of what to fill and how.
//!
//! Schemas arrive as loosely typed JSON with many optional flags. They are
//! converted once, up front, into [`FieldDefinition`]s whose [`FieldAction`]
//! carries only the options that apply to that action; flag combinations
//! that make no sense are rejected here instead of being ignored at run time.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::RunOptions;
use crate::surface::Locator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema must include a url")]
    MissingUrl,

    #[error("schema must include a fields array")]
    MissingFields,

    #[error("field '{field}': unknown action '{action}'")]
    UnknownAction { field: String, action: String },

    #[error("field '{field}': unknown transform '{transform}'")]
    UnknownTransform { field: String, transform: String },

    #[error("field '{field}': '{flag}' does not apply to action '{action}'")]
    FlagNotApplicable {
        field: String,
        flag: &'static str,
        action: &'static str,
    },

    #[error("field '{field}': '{flag}' requires '{requires}'")]
    FlagRequires {
        field: String,
        flag: &'static str,
        requires: &'static str,
    },

    #[error("field '{field}': more than one tag entry strategy set ({strategies})")]
    ConflictingEntry { field: String, strategies: String },

    #[error("field '{field}': unknown tag entry strategy '{entry}'")]
    UnknownEntry { field: String, entry: String },

    #[error("malformed schema: {0}")]
    Malformed(String),
}

/// A validated schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub url: String,
    pub options: RunOptions,
    pub fields: Vec<FieldDefinition>,
    pub draft: Option<FieldDefinition>,
    pub save_progress: Option<FieldDefinition>,
    pub submit: Option<SubmitTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTarget {
    pub selector: String,
}

impl Schema {
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let raw: RawSchema =
            serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        raw.try_into()
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }
}

/// Which element(s) a field targets. Strategies are tried in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub selector: Option<String>,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub text: Option<String>,
    pub exact: bool,
}

impl Target {
    pub fn is_empty(&self) -> bool {
        self.selector.is_none()
            && self.label.is_none()
            && self.placeholder.is_none()
            && self.text.is_none()
    }

    /// Configured strategies in fallback order: selector, label, placeholder, text.
    pub fn strategies(&self) -> Vec<Locator> {
        let exact = self.exact;
        [
            self.selector.as_deref().map(Locator::css),
            self.label.as_deref().map(|t| Locator::label(t, exact)),
            self.placeholder.as_deref().map(|t| Locator::placeholder(t, exact)),
            self.text.as_deref().map(|t| Locator::text(t, exact)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// First size token, preferring `US <n>`.
    UsSize,
    /// Trimmed, non-blank entries joined with `", "`.
    CommaJoin,
}

impl Transform {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "us_size" | "usSize" | "size" => Some(Transform::UsSize),
            "comma_join" | "commaJoin" | "comma" => Some(Transform::CommaJoin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSpec {
    pub key_path: Option<String>,
    pub transform: Option<Transform>,
    /// Take the value from the auto-identifier sequence.
    pub auto_identifier: bool,
    /// Skip the field when the resolved value is empty.
    pub skip_if_empty: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollPolicy {
    pub skip: bool,
    /// Scroll the whole window to the bottom before this field.
    pub page_bottom: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnterPress {
    pub delay_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEntry {
    /// Key presses.
    Type,
    /// Keyboard-level text insertion.
    InsertText,
    /// Clipboard write then paste; falls back to insertion.
    Paste,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOptions {
    pub entry: TagEntry,
    pub focus_script: bool,
    pub focus_click: bool,
    pub refocus_each: bool,
    /// Enter all tags as one comma-joined string.
    pub join: bool,
    pub settle: Duration,
    pub force: bool,
    /// Narrow the match to an editable element inside it.
    pub editable_target: bool,
    /// Text anchor used to find a tags control that follows it.
    pub anchor: Option<String>,
    pub no_typing_delay: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAction {
    Fill {
        clear: bool,
        no_typing_delay: bool,
        enter: Option<EnterPress>,
    },
    Type {
        enter: Option<EnterPress>,
    },
    Click {
        center: bool,
        force: bool,
    },
    Check {
        force: bool,
        /// Selector whose checked state means the field is already set.
        checked_indicator: Option<String>,
    },
    Select,
    ClickEachText {
        scope: Option<String>,
        exact: bool,
        normalize: bool,
    },
    TypeEachTag(TagOptions),
}

impl FieldAction {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldAction::Fill { .. } => "fill",
            FieldAction::Type { .. } => "type",
            FieldAction::Click { .. } => "click",
            FieldAction::Check { .. } => "check",
            FieldAction::Select => "select",
            FieldAction::ClickEachText { .. } => "click_each_text",
            FieldAction::TypeEachTag(_) => "type_each_tag",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub target: Target,
    pub value: ValueSpec,
    pub scroll: ScrollPolicy,
    pub action: FieldAction,
}

impl FieldDefinition {
    /// A field with nothing to locate (or, for `click_each_text`, nothing to click).
    pub fn is_inert(&self) -> bool {
        match &self.action {
            FieldAction::ClickEachText { .. } => self.value.key_path.is_none(),
            _ => self.target.is_empty(),
        }
    }
}

// ── Raw JSON shape ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    url: Option<String>,
    #[serde(default)]
    options: RunOptions,
    fields: Option<Vec<RawField>>,
    draft: Option<RawField>,
    save_progress: Option<RawField>,
    submit: Option<RawSubmit>,
}

#[derive(Debug, Deserialize)]
struct RawSubmit {
    selector: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawField {
    name: Option<String>,
    selector: Option<String>,
    label: Option<String>,
    placeholder: Option<String>,
    text: Option<String>,
    exact: bool,
    action: Option<String>,
    value: Option<String>,
    transform: Option<String>,
    #[serde(alias = "autoSku")]
    auto_id: bool,
    skip_if_empty: bool,
    skip_scroll: bool,
    scroll_page_bottom: bool,
    force: bool,
    clear: Option<bool>,
    press_enter: bool,
    enter_delay_ms: Option<u64>,
    no_typing_delay: bool,
    click_element_center: bool,
    checked_selector: Option<String>,
    scope: Option<String>,
    normalize_comparison: bool,
    entry: Option<String>,
    use_type: bool,
    use_keyboard: bool,
    use_paste: bool,
    focus_script: bool,
    click_to_focus: Option<bool>,
    refocus_each_tag: bool,
    join_tags: bool,
    tag_settle_ms: Option<u64>,
    tag_anchor: Option<String>,
    detect_tag_input: Option<bool>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = SchemaError;

    fn try_from(raw: RawSchema) -> Result<Self, SchemaError> {
        let url = raw
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or(SchemaError::MissingUrl)?;
        let fields = raw
            .fields
            .ok_or(SchemaError::MissingFields)?
            .into_iter()
            .map(FieldDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Schema {
            url,
            options: raw.options,
            fields,
            draft: raw.draft.map(FieldDefinition::try_from).transpose()?,
            save_progress: raw.save_progress.map(FieldDefinition::try_from).transpose()?,
            submit: raw
                .submit
                .and_then(|s| s.selector)
                .map(|selector| SubmitTarget { selector }),
        })
    }
}

impl TryFrom<RawField> for FieldDefinition {
    type Error = SchemaError;

    fn try_from(raw: RawField) -> Result<Self, SchemaError> {
        let name = raw
            .name
            .clone()
            .or_else(|| raw.selector.clone())
            .unwrap_or_else(|| "field".to_string());
        let action_name = raw.action.as_deref().unwrap_or("fill");

        let transform = match raw.transform.as_deref() {
            None => None,
            Some(t) => Some(Transform::parse(t).ok_or_else(|| SchemaError::UnknownTransform {
                field: name.clone(),
                transform: t.to_string(),
            })?),
        };

        let enter = raw.press_enter.then(|| EnterPress {
            delay_after: Duration::from_millis(raw.enter_delay_ms.unwrap_or(0)),
        });

        let action = match action_name {
            "fill" => FieldAction::Fill {
                clear: raw.clear.unwrap_or(true),
                no_typing_delay: raw.no_typing_delay,
                enter,
            },
            "type" => FieldAction::Type { enter },
            "click" => FieldAction::Click {
                center: raw.click_element_center,
                force: raw.force,
            },
            "check" => FieldAction::Check {
                force: raw.force,
                checked_indicator: raw.checked_selector.clone(),
            },
            "select" => FieldAction::Select,
            "click_each_text" => FieldAction::ClickEachText {
                scope: raw.scope.clone(),
                exact: raw.exact,
                normalize: raw.normalize_comparison,
            },
            "type_each_tag" => FieldAction::TypeEachTag(TagOptions {
                entry: tag_entry(&name, &raw)?,
                focus_script: raw.focus_script,
                focus_click: raw.click_to_focus.unwrap_or(true),
                refocus_each: raw.refocus_each_tag,
                join: raw.join_tags,
                settle: Duration::from_millis(raw.tag_settle_ms.unwrap_or(0)),
                force: raw.force,
                editable_target: raw.detect_tag_input.unwrap_or(true),
                anchor: raw.tag_anchor.clone().or_else(|| raw.text.clone()),
                no_typing_delay: raw.no_typing_delay,
            }),
            other => {
                return Err(SchemaError::UnknownAction {
                    field: name,
                    action: other.to_string(),
                })
            }
        };

        check_flags(&name, &action, &raw)?;

        Ok(FieldDefinition {
            name,
            target: Target {
                selector: raw.selector,
                label: raw.label,
                placeholder: raw.placeholder,
                text: raw.text,
                exact: raw.exact,
            },
            value: ValueSpec {
                key_path: raw.value,
                transform,
                auto_identifier: raw.auto_id,
                skip_if_empty: raw.skip_if_empty,
            },
            scroll: ScrollPolicy {
                skip: raw.skip_scroll,
                page_bottom: raw.scroll_page_bottom,
            },
            action,
        })
    }
}

fn tag_entry(field: &str, raw: &RawField) -> Result<TagEntry, SchemaError> {
    let mut chosen: Vec<(&'static str, TagEntry)> = Vec::new();
    if let Some(entry) = raw.entry.as_deref() {
        let parsed = match entry {
            "type" => TagEntry::Type,
            "insert" | "keyboard" => TagEntry::InsertText,
            "paste" => TagEntry::Paste,
            other => {
                return Err(SchemaError::UnknownEntry {
                    field: field.to_string(),
                    entry: other.to_string(),
                })
            }
        };
        chosen.push(("entry", parsed));
    }
    for (flag, set, entry) in [
        ("useType", raw.use_type, TagEntry::Type),
        ("useKeyboard", raw.use_keyboard, TagEntry::InsertText),
        ("usePaste", raw.use_paste, TagEntry::Paste),
    ] {
        if set {
            chosen.push((flag, entry));
        }
    }
    chosen.dedup_by_key(|(_, entry)| *entry);
    match chosen.as_slice() {
        [] => Ok(TagEntry::Type),
        [(_, entry)] => Ok(*entry),
        many => Err(SchemaError::ConflictingEntry {
            field: field.to_string(),
            strategies: many.iter().map(|(f, _)| *f).collect::<Vec<_>>().join(", "),
        }),
    }
}

fn check_flags(field: &str, action: &FieldAction, raw: &RawField) -> Result<(), SchemaError> {
    use FieldAction as A;
    let is_tag = matches!(action, A::TypeEachTag(_));
    let rules: [(&'static str, bool, bool); 20] = [
        ("clickElementCenter", raw.click_element_center, matches!(action, A::Click { .. })),
        ("checkedSelector", raw.checked_selector.is_some(), matches!(action, A::Check { .. })),
        ("scope", raw.scope.is_some(), matches!(action, A::ClickEachText { .. })),
        (
            "normalizeComparison",
            raw.normalize_comparison,
            matches!(action, A::ClickEachText { .. }),
        ),
        (
            "pressEnter",
            raw.press_enter,
            matches!(action, A::Fill { .. } | A::Type { .. }),
        ),
        (
            "enterDelayMs",
            raw.enter_delay_ms.is_some(),
            matches!(action, A::Fill { .. } | A::Type { .. }),
        ),
        ("clear", raw.clear.is_some(), matches!(action, A::Fill { .. })),
        (
            "noTypingDelay",
            raw.no_typing_delay,
            matches!(action, A::Fill { .. }) || is_tag,
        ),
        (
            "force",
            raw.force,
            matches!(action, A::Click { .. } | A::Check { .. }) || is_tag,
        ),
        ("entry", raw.entry.is_some(), is_tag),
        ("useType", raw.use_type, is_tag),
        ("usePaste", raw.use_paste, is_tag),
        ("useKeyboard", raw.use_keyboard, is_tag),
        ("focusScript", raw.focus_script, is_tag),
        ("refocusEachTag", raw.refocus_each_tag, is_tag),
        ("joinTags", raw.join_tags, is_tag),
        ("tagAnchor", raw.tag_anchor.is_some(), is_tag),
        ("tagSettleMs", raw.tag_settle_ms.is_some(), is_tag),
        ("clickToFocus", raw.click_to_focus.is_some(), is_tag),
        ("detectTagInput", raw.detect_tag_input.is_some(), is_tag),
    ];
    for (flag, set, allowed) in rules {
        if set && !allowed {
            return Err(SchemaError::FlagNotApplicable {
                field: field.to_string(),
                flag,
                action: action.kind(),
            });
        }
    }
    if raw.enter_delay_ms.is_some() && !raw.press_enter {
        return Err(SchemaError::FlagRequires {
            field: field.to_string(),
            flag: "enterDelayMs",
            requires: "pressEnter",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(value: Value) -> Result<FieldDefinition, SchemaError> {
        let raw: RawField = serde_json::from_value(value).unwrap();
        FieldDefinition::try_from(raw)
    }

    #[test]
    fn requires_url_and_fields() {
        assert_eq!(
            Schema::from_value(json!({ "fields": [] })).unwrap_err(),
            SchemaError::MissingUrl
        );
        assert_eq!(
            Schema::from_value(json!({ "url": "https://x.test" })).unwrap_err(),
            SchemaError::MissingFields
        );
        assert!(matches!(
            Schema::from_json_str("{ not json").unwrap_err(),
            SchemaError::Malformed(_)
        ));
    }

    #[test]
    fn parses_full_schema() {
        let schema = Schema::from_value(json!({
            "url": "https://shop.test/new",
            "options": { "typingDelayMs": 90, "clickDraft": true },
            "fields": [
                { "name": "Title", "label": "Title", "value": "title" },
                { "name": "Colors", "action": "click_each_text", "scope": "#colors", "value": "colors" }
            ],
            "draft": { "name": "Draft", "text": "Save as draft", "action": "click" },
            "submit": { "selector": "button[type=submit]" }
        }))
        .unwrap();
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.options.typing_delay_ms, 90);
        assert!(matches!(schema.fields[0].action, FieldAction::Fill { clear: true, .. }));
        assert!(schema.draft.is_some());
        assert_eq!(schema.submit.unwrap().selector, "button[type=submit]");
    }

    #[test]
    fn strategies_follow_fallback_order() {
        let f = field(json!({ "text": "Brand", "label": "Brand name", "exact": true })).unwrap();
        let strategies = f.target.strategies();
        assert_eq!(strategies[0], Locator::label("Brand name", true));
        assert_eq!(strategies[1], Locator::text("Brand", true));
    }

    #[test]
    fn rejects_conflicting_tag_entry() {
        let err = field(json!({
            "name": "Tags", "action": "type_each_tag", "selector": "#tags",
            "useKeyboard": true, "usePaste": true
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingEntry { .. }));
    }

    #[test]
    fn entry_and_matching_flag_agree() {
        let f = field(json!({
            "action": "type_each_tag", "selector": "#tags", "entry": "paste", "usePaste": true
        }))
        .unwrap();
        match f.action {
            FieldAction::TypeEachTag(opts) => assert_eq!(opts.entry, TagEntry::Paste),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_flags_for_other_actions() {
        let err = field(json!({ "name": "Price", "selector": "#p", "clickElementCenter": true }))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::FlagNotApplicable {
                field: "Price".into(),
                flag: "clickElementCenter",
                action: "fill",
            }
        );

        let misplaced = [
            (json!({ "selector": "#p", "tagSettleMs": 100 }), "tagSettleMs", "fill"),
            (json!({ "selector": "#p", "clickToFocus": false }), "clickToFocus", "fill"),
            (json!({ "selector": "#p", "detectTagInput": false }), "detectTagInput", "fill"),
            (
                json!({ "selector": "#p", "action": "click", "noTypingDelay": true }),
                "noTypingDelay",
                "click",
            ),
            (
                json!({ "selector": "#p", "action": "click", "enterDelayMs": 300 }),
                "enterDelayMs",
                "click",
            ),
        ];
        for (definition, flag, action) in misplaced {
            assert_eq!(
                field(definition).unwrap_err(),
                SchemaError::FlagNotApplicable {
                    field: "#p".into(),
                    flag,
                    action,
                }
            );
        }
    }

    #[test]
    fn enter_delay_requires_press_enter() {
        assert_eq!(
            field(json!({ "selector": "#p", "enterDelayMs": 300 })).unwrap_err(),
            SchemaError::FlagRequires {
                field: "#p".into(),
                flag: "enterDelayMs",
                requires: "pressEnter",
            }
        );
        assert!(field(json!({ "selector": "#p", "pressEnter": true, "enterDelayMs": 300 })).is_ok());
        assert!(field(json!({
            "selector": "#t", "action": "type_each_tag", "tagSettleMs": 100,
            "clickToFocus": false, "detectTagInput": false, "noTypingDelay": true
        }))
        .is_ok());
    }

    #[test]
    fn rejects_unknown_action_and_transform() {
        assert!(matches!(
            field(json!({ "selector": "#a", "action": "hover" })).unwrap_err(),
            SchemaError::UnknownAction { .. }
        ));
        assert!(matches!(
            field(json!({ "selector": "#a", "transform": "upper" })).unwrap_err(),
            SchemaError::UnknownTransform { .. }
        ));
    }

    #[test]
    fn inert_fields() {
        assert!(field(json!({ "name": "Nothing", "value": "title" })).unwrap().is_inert());
        assert!(!field(json!({ "action": "click_each_text", "value": "colors" }))
            .unwrap()
            .is_inert());
    }

    #[test]
    fn auto_sku_alias() {
        let f = field(json!({ "selector": "#sku", "autoSku": true })).unwrap();
        assert!(f.value.auto_identifier);
    }
}
