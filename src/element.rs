use std::sync::Arc;

use serde_json::Value;

use crate::dom::{Dom, DomError, DomHandler, ENTER_KEY, EventContext};
use crate::registry::{ElementId, PageRegistry, RegistryResult};
use crate::renderer::StatusRenderer;
use crate::status::Status;
use crate::validator::Validator;

/// Synthetic event name: binds to the keypress stream and fires only
/// when the pressed key is Enter.
pub const ENTERKEY_EVENT: &str = "enterkey";

pub type ListenerFn = Arc<dyn Fn(&ElementHandle, &EventContext) + Send + Sync>;
pub type InitFn = Arc<dyn Fn(&ElementHandle) + Send + Sync>;

/// A generic event subscription carried by an element. The callback
/// receives the element's handle as context, plus the DOM event.
#[derive(Clone)]
pub struct Listener {
    pub(crate) events: Vec<String>,
    pub(crate) callback: ListenerFn,
}

impl Listener {
    pub fn new(callback: impl Fn(&ElementHandle, &EventContext) + Send + Sync + 'static) -> Self {
        Self {
            events: Vec::new(),
            callback: Arc::new(callback),
        }
    }

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
}

/// Declarative configuration for one page element: identity, field type
/// tag, listeners, and an optional validator with its renderer override.
/// Consumed by [`PageRegistry::register_element`].
#[derive(Clone)]
pub struct ElementSpec {
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) kind: String,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) validator: Option<Validator>,
    pub(crate) renderer: Option<Arc<dyn StatusRenderer>>,
    pub(crate) on_init: Option<InitFn>,
}

impl ElementSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            kind: kind.into(),
            listeners: Vec::new(),
            validator: None,
            renderer: None,
            on_init: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Per-element renderer; overrides the page default.
    pub fn renderer(mut self, renderer: impl StatusRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Custom initialization, run once after registration and model
    /// reconciliation complete.
    pub fn on_init(mut self, init: impl Fn(&ElementHandle) + Send + Sync + 'static) -> Self {
        self.on_init = Some(Arc::new(init));
        self
    }
}

/// Live record of a registered element. Owned exclusively by the
/// registry that created it; external code holds an [`ElementHandle`].
pub(crate) struct FormElement {
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) kind: String,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) validator: Option<Validator>,
}

impl FormElement {
    /// Identity resolution: prefer `id` when present, else `name`.
    pub(crate) fn target(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }
}

/// Translates configured event names into real DOM subscriptions. The
/// synthetic [`ENTERKEY_EVENT`] subscribes to keypress and filters for
/// the Enter key code before invoking the action.
pub(crate) fn bind_to_events(
    dom: &dyn Dom,
    target: &str,
    events: &[String],
    action: DomHandler,
) -> Result<(), DomError> {
    for event in events {
        if event == ENTERKEY_EVENT {
            let inner = action.clone();
            dom.on(
                target,
                "keypress",
                Arc::new(move |context: &EventContext| {
                    if context.key == Some(ENTER_KEY) {
                        inner(context);
                    }
                }),
            )?;
        } else {
            dom.on(target, event, action.clone())?;
        }
    }
    Ok(())
}

/// External handle to a registered element. Cheap to clone; every method
/// delegates to the owning registry.
#[derive(Clone)]
pub struct ElementHandle {
    pub(crate) registry: PageRegistry,
    pub(crate) index: ElementId,
}

impl ElementHandle {
    pub fn id(&self) -> ElementId {
        self.index
    }

    /// Resolved DOM target (`id` preferred over `name`).
    pub fn target(&self) -> RegistryResult<String> {
        self.registry.element_target(self.index)
    }

    pub fn name(&self) -> RegistryResult<Option<String>> {
        self.registry.element_name(self.index)
    }

    /// Current control value. Never triggers validation or events.
    pub fn value(&self) -> RegistryResult<Value> {
        self.registry.element_value(self.index)
    }

    /// Writes the control value. Never triggers validation or events.
    pub fn set_value(&self, value: &Value) -> RegistryResult<()> {
        self.registry.set_element_value(self.index, value)
    }

    /// Runs the attached validator's three-phase protocol and refreshes
    /// the view. Fails with `MissingValidator` when none is attached.
    pub fn validate(&self) -> RegistryResult<bool> {
        self.registry.validate_element(self.index)
    }

    /// Drives the attached asynchronous check, if any; `None` means a
    /// later call superseded this one and its outcome was discarded.
    pub async fn validate_async(&self) -> RegistryResult<Option<bool>> {
        self.registry.validate_element_async(self.index).await
    }

    /// Clears the rendered feedback for this element.
    pub fn clear_validation(&self) -> RegistryResult<()> {
        self.registry.clear_element_validation(self.index)
    }

    /// The validator's current status; `None` before the first run or
    /// when no validator is attached.
    pub fn status(&self) -> RegistryResult<Option<Status>> {
        self.registry.element_status(self.index)
    }

    fn status_is(&self, status: Status) -> bool {
        matches!(self.status(), Ok(Some(current)) if current == status)
    }

    pub fn is_valid(&self) -> bool {
        self.status_is(Status::Valid)
    }

    pub fn is_error(&self) -> bool {
        self.status_is(Status::Error)
    }

    pub fn is_warning(&self) -> bool {
        self.status_is(Status::Warning)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status_is(Status::Cancelled)
    }

    pub fn is_validating(&self) -> bool {
        self.status_is(Status::Validating)
    }
}
