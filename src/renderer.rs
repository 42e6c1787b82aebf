use crate::dom::{Dom, DomResult, FeedbackNode};
use crate::status::Status;

/// Everything a renderer may read while refreshing a field's feedback:
/// the host binding, the field's DOM target, and the bound validator's
/// current outcome.
pub struct RenderContext<'a> {
    pub dom: &'a dyn Dom,
    pub target: &'a str,
    pub status: Option<Status>,
    pub message: Option<&'a str>,
}

/// Translates a validator's current status into DOM feedback.
pub trait StatusRenderer: Send + Sync {
    /// Clears all prior feedback, then applies the visual state for the
    /// current status. `Cancelled` and unset statuses apply nothing.
    fn update_view(&self, context: &RenderContext<'_>) -> DomResult<()>;

    /// Removes every status class and previously inserted feedback node
    /// scoped to the field's form group. Idempotent.
    fn clear_validation(&self, context: &RenderContext<'_>) -> DomResult<()>;
}

const FORM_GROUP_CLASS: &str = "form-group";
const FEEDBACK_CLASS: &str = "has-feedback";
const STATUS_CLASSES: [&str; 3] = ["has-error", "has-warning", "has-success"];
const ICON_CLASS: &str = "form-control-feedback";
const MESSAGE_CLASSES: [&str; 2] = ["help-block", "input-msg"];

/// Default renderer targeting Bootstrap 3 form markup: a status class
/// plus `has-feedback` on the form group, a glyphicon feedback span, and
/// a help-block message node when the validator carries a message.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bootstrap3Renderer;

impl Bootstrap3Renderer {
    fn form_group(&self, context: &RenderContext<'_>) -> DomResult<Option<String>> {
        context.dom.closest(context.target, FORM_GROUP_CLASS)
    }

    fn apply(
        &self,
        context: &RenderContext<'_>,
        status_class: Option<&str>,
        icon_classes: &str,
    ) -> DomResult<()> {
        let Some(group) = self.form_group(context)? else {
            return Ok(());
        };
        context.dom.add_class(&group, FEEDBACK_CLASS)?;
        if let Some(class) = status_class {
            context.dom.add_class(&group, class)?;
        }

        let mut classes: Vec<String> = icon_classes.split_whitespace().map(str::to_owned).collect();
        classes.push(ICON_CLASS.to_owned());
        context
            .dom
            .insert_after(context.target, FeedbackNode { classes, text: None })?;

        if let Some(message) = context.message.filter(|message| !message.is_empty()) {
            context.dom.insert_after(
                context.target,
                FeedbackNode {
                    classes: MESSAGE_CLASSES.iter().map(|c| (*c).to_owned()).collect(),
                    text: Some(message.to_owned()),
                },
            )?;
        }
        Ok(())
    }
}

impl StatusRenderer for Bootstrap3Renderer {
    fn update_view(&self, context: &RenderContext<'_>) -> DomResult<()> {
        self.clear_validation(context)?;
        match context.status {
            Some(Status::Error) => self.apply(context, Some("has-error"), "glyphicon glyphicon-remove"),
            Some(Status::Warning) => {
                self.apply(context, Some("has-warning"), "glyphicon glyphicon-alert")
            }
            Some(Status::Valid) => self.apply(context, Some("has-success"), "glyphicon glyphicon-ok"),
            Some(Status::Validating) => {
                self.apply(context, None, "glyphicon glyphicon-cog right-spinner")
            }
            Some(Status::Cancelled) | None => Ok(()),
        }
    }

    fn clear_validation(&self, context: &RenderContext<'_>) -> DomResult<()> {
        let Some(group) = self.form_group(context)? else {
            return Ok(());
        };
        context.dom.remove_class(&group, FEEDBACK_CLASS)?;
        for class in STATUS_CLASSES {
            context.dom.remove_class(&group, class)?;
        }
        context.dom.remove_descendants_with_class(&group, ICON_CLASS)?;
        context
            .dom
            .remove_descendants_with_class(&group, "input-msg")?;
        Ok(())
    }
}
