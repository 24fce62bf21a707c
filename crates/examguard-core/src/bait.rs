//! Hidden form-field bait.
//!
//! The field name mimics a plausible contact field so heuristic form-fillers
//! populate it. It has no layout box and is skipped by keyboard navigation;
//! autofill hints stay enabled. Nothing here reacts to the value: detection
//! happens downstream of the submission.

/// Form name of the bait field.
pub const BAIT_FIELD_NAME: &str = "phone_extension_secondary";
/// Label text read by form-fillers.
pub const BAIT_LABEL: &str = "Phone Extension";
/// Autofill hint left on the input.
pub const BAIT_AUTOCOMPLETE: &str = "tel-extension";

const HIDDEN_STYLE: &str =
    "opacity:0;position:absolute;top:0;left:0;height:0;width:0;overflow:hidden;z-index:-1";

/// Value bound to the bait input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaitField {
    value: String,
}

impl BaitField {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub(crate) fn fill(&mut self, value: &str) {
        self.value = value.to_string();
    }

    /// True when anything other than whitespace landed in the field.
    pub fn is_tripped(&self) -> bool {
        !self.value.trim().is_empty()
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

/// Renders the bait field markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaitRenderer;

impl BaitRenderer {
    pub fn render_html(&self) -> String {
        format!(
            concat!(
                r#"<div aria-hidden="true" style="{style}">"#,
                r#"<label for="{name}">{label}</label>"#,
                r#"<input id="{name}" name="{name}" type="text" autocomplete="{ac}" tabindex="-1" value="">"#,
                "</div>"
            ),
            style = HIDDEN_STYLE,
            name = BAIT_FIELD_NAME,
            label = BAIT_LABEL,
            ac = BAIT_AUTOCOMPLETE,
        )
    }
}
