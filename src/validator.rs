use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::registry::ElementId;
use crate::renderer::StatusRenderer;
use crate::status::{Status, ValidationResult};

/// Inputs available to a check function: the bound element's current
/// value and its resolved DOM target.
#[derive(Clone, Debug)]
pub struct CheckContext {
    pub value: Value,
    pub target: String,
}

pub type PreCheckFn = Arc<dyn Fn(&CheckContext) -> bool + Send + Sync>;
pub type CoreCheckFn = Arc<dyn Fn(&CheckContext) -> ValidationResult + Send + Sync>;
pub type PostCheckFn = Arc<dyn Fn(&CheckContext) + Send + Sync>;

pub type BoxedCheckFuture = Pin<Box<dyn Future<Output = ValidationResult> + Send>>;
pub type AsyncCheckFn = Arc<dyn Fn(CheckContext) -> BoxedCheckFuture + Send + Sync>;

#[derive(Clone)]
pub(crate) struct AsyncCheck {
    pub(crate) debounce: Duration,
    pub(crate) check: AsyncCheckFn,
}

/// A three-phase validator: optional pre-check (returning true cancels
/// the run), the core check (the only producer of a
/// [`ValidationResult`]), and an optional post-check that observes but
/// never mutates the outcome.
///
/// A validator is built as a free-standing template and bound to exactly
/// one element at registration time; the element back-reference and the
/// renderer are set once there and never change afterwards.
#[derive(Clone)]
pub struct Validator {
    pub(crate) status: Option<Status>,
    pub(crate) message: Option<String>,
    pub(crate) events: Vec<String>,
    pub(crate) element: Option<ElementId>,
    pub(crate) renderer: Option<Arc<dyn StatusRenderer>>,
    pub(crate) pre_check: Option<PreCheckFn>,
    pub(crate) core_check: CoreCheckFn,
    pub(crate) post_check: Option<PostCheckFn>,
    pub(crate) async_check: Option<AsyncCheck>,
}

impl Validator {
    pub fn new(
        core_check: impl Fn(&CheckContext) -> ValidationResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            status: None,
            message: None,
            events: Vec::new(),
            element: None,
            renderer: None,
            pre_check: None,
            core_check: Arc::new(core_check),
            post_check: None,
            async_check: None,
        }
    }

    /// Adds a DOM event that triggers this validator once bound.
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }

    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events.extend(events.into_iter().map(Into::into));
        self
    }

    /// Returning true from the pre-check cancels the run: status becomes
    /// [`Status::Cancelled`], the core check is skipped, and the view is
    /// still refreshed once.
    pub fn pre_check(mut self, check: impl Fn(&CheckContext) -> bool + Send + Sync + 'static) -> Self {
        self.pre_check = Some(Arc::new(check));
        self
    }

    pub fn post_check(mut self, check: impl Fn(&CheckContext) + Send + Sync + 'static) -> Self {
        self.post_check = Some(Arc::new(check));
        self
    }

    /// Attaches a debounced asynchronous check, driven through
    /// `validate_async` only; event-driven bindings stay synchronous.
    pub fn async_check<F, Fut>(mut self, debounce_ms: u64, check: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ValidationResult> + Send + 'static,
    {
        let wrapped: AsyncCheckFn = Arc::new(move |context| Box::pin(check(context)));
        self.async_check = Some(AsyncCheck {
            debounce: Duration::from_millis(debounce_ms),
            check: wrapped,
        });
        self
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The element this validator was bound to at registration, if any.
    pub fn element(&self) -> Option<ElementId> {
        self.element
    }

    /// The single result-assignment primitive; outside model
    /// synchronization, every status mutation goes through here,
    /// [`Validator::cancel`] or [`Validator::begin_validating`].
    pub(crate) fn apply(&mut self, result: &ValidationResult) {
        self.status = Some(result.status());
        self.message = result.message().map(str::to_owned);
    }

    pub(crate) fn cancel(&mut self) {
        self.status = Some(Status::Cancelled);
    }

    pub(crate) fn begin_validating(&mut self) {
        self.status = Some(Status::Validating);
        self.message = None;
    }

    /// Copies a stored status from the page model, bypassing validation.
    pub(crate) fn set_stored(&mut self, status: Option<Status>, message: Option<String>) {
        self.status = status;
        self.message = message;
    }
}

/// Explicit missing-value predicate of the required validator: JSON
/// null, the empty string and numeric zero count as missing. `"0"` (the
/// string) and `false` are present values; a checkbox left unticked is
/// not a missing field.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Number(number) => number.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Default error message of the required validator.
pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// A validator that checks the element has a value, bound to `focusout`
/// by default. The boundary policy lives in [`is_missing`].
pub fn required() -> Validator {
    required_with_message(REQUIRED_MESSAGE)
}

pub fn required_with_message(message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |context| {
        if is_missing(&context.value) {
            ValidationResult::error(message.clone())
        } else {
            ValidationResult::valid()
        }
    })
    .event("focusout")
}
