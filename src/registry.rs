use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_timer::Delay;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dom::{Dom, DomError, DomHandler};
use crate::element::{ElementHandle, ElementSpec, FormElement, bind_to_events};
use crate::model::{self, ModelEntry};
use crate::renderer::{Bootstrap3Renderer, RenderContext, StatusRenderer};
use crate::status::Status;
use crate::validator::CheckContext;

/// Index of an element in the registry's registration-ordered table.
/// Doubles as the one-way back-reference a validator keeps to its
/// element: set once at registration, never mutated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ElementId(pub(crate) usize);

/// Monotonic per-element marker for in-flight asynchronous validation.
/// The latest ticket wins; results arriving under a stale ticket are
/// discarded without rendering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// Page-level configuration.
#[derive(Clone)]
pub struct RegistryOptions {
    /// Id of the container holding the hidden model field.
    pub form_container_id: String,
    /// Name of the hidden field carrying the serialized model.
    pub model_field_name: String,
    /// Renderer used when an element declares none; the built-in
    /// Bootstrap 3 renderer is the final fallback.
    pub default_renderer: Option<Arc<dyn StatusRenderer>>,
    /// When set, model-to-element synchronization re-runs the validator
    /// after applying the stored value instead of copying the stored
    /// status.
    pub revalidate_on_import: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            form_container_id: "interstellar-form".to_owned(),
            model_field_name: "interstellar-model".to_owned(),
            default_renderer: None,
            revalidate_on_import: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RegistryError {
    /// A state lock was poisoned by a panicking callback.
    StatePoisoned(&'static str),
    /// The element declares neither an id nor a name but a DOM lookup
    /// was attempted.
    MissingIdentity { kind: String },
    /// The resolved target has no matching DOM node.
    ElementNotFound { target: String },
    /// `validate()` was called on an element with no validator attached.
    MissingValidator { target: String },
    /// The serialized model blob is not valid JSON.
    ModelParse { detail: String },
    /// No element is registered at this index.
    UnknownElement { index: usize },
    /// A DOM operation failed mid-flight.
    Dom(DomError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StatePoisoned(context) => {
                write!(f, "registry state lock poisoned while {context}")
            }
            RegistryError::MissingIdentity { kind } => {
                write!(f, "element of kind {kind:?} declares neither an id nor a name")
            }
            RegistryError::ElementNotFound { target } => {
                write!(f, "no DOM node found for #{target}")
            }
            RegistryError::MissingValidator { target } => {
                write!(f, "element #{target} has no validator attached")
            }
            RegistryError::ModelParse { detail } => {
                write!(f, "failed to parse page model: {detail}")
            }
            RegistryError::UnknownElement { index } => {
                write!(f, "no element registered at index {index}")
            }
            RegistryError::Dom(error) => write!(f, "DOM operation failed: {error}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<DomError> for RegistryError {
    fn from(error: DomError) -> Self {
        RegistryError::Dom(error)
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

struct RegistryState {
    options: RegistryOptions,
    elements: Vec<FormElement>,
    model: Vec<ModelEntry>,
    tickets: BTreeMap<ElementId, ValidationTicket>,
}

/// The page-scoped owner of all elements and the data model. Clones
/// share the same state; handlers bound into the DOM carry one.
///
/// Lifecycle: create, `configure`, `register_element` for each field,
/// then `validate_all` / `export_model` on demand. Configure before
/// registering so the default renderer and the pre-loaded model apply.
#[derive(Clone)]
pub struct PageRegistry {
    dom: Arc<dyn Dom>,
    state: Arc<RwLock<RegistryState>>,
}

impl PageRegistry {
    pub fn new(dom: Arc<dyn Dom>) -> Self {
        Self::with_options(dom, RegistryOptions::default())
    }

    pub fn with_options(dom: Arc<dyn Dom>, options: RegistryOptions) -> Self {
        Self {
            dom,
            state: Arc::new(RwLock::new(RegistryState {
                options,
                elements: Vec::new(),
                model: Vec::new(),
                tickets: BTreeMap::new(),
            })),
        }
    }

    /// Applies page-level options, then loads the serialized model from
    /// the configured hidden field if one is present. Malformed model
    /// JSON fails here, loudly.
    pub fn configure(&self, options: RegistryOptions) -> RegistryResult<()> {
        let container = options.form_container_id.clone();
        let field = options.model_field_name.clone();
        {
            let mut state = write_lock(&self.state, "applying configuration")?;
            state.options = options;
        }

        if let Some(text) = self.dom.field_value(&container, &field) {
            let entries = model::parse_model(&text).map_err(|error| RegistryError::ModelParse {
                detail: error.to_string(),
            })?;
            debug!(count = entries.len(), "loaded page model");
            let mut state = write_lock(&self.state, "storing loaded model")?;
            state.model = entries;
        }
        Ok(())
    }

    /// Constructs a live element from its configuration: appends it to
    /// the element table (append-only, duplicate names allowed), binds
    /// its listeners and validator to DOM events, reconciles it against
    /// a pre-loaded model entry with a matching name, and runs its init
    /// hook. Returns the element's handle.
    pub fn register_element(&self, config: ElementSpec) -> RegistryResult<ElementHandle> {
        let ElementSpec {
            id,
            name,
            kind,
            listeners,
            validator,
            renderer,
            on_init,
        } = config;

        let target = id.as_deref().or(name.as_deref()).map(str::to_owned);
        let needs_dom = !listeners.is_empty() || validator.is_some();
        if needs_dom {
            let Some(target) = target.as_deref() else {
                return Err(RegistryError::MissingIdentity { kind });
            };
            if !self.dom.contains(target) {
                return Err(RegistryError::ElementNotFound {
                    target: target.to_owned(),
                });
            }
        }

        // Renderer precedence: element override, then the page default,
        // then the built-in Bootstrap 3 renderer.
        let resolved_renderer = match renderer {
            Some(renderer) => renderer,
            None => {
                let default = read_lock(&self.state, "reading default renderer")?
                    .options
                    .default_renderer
                    .clone();
                default.unwrap_or_else(|| Arc::new(Bootstrap3Renderer))
            }
        };

        let (index, bound_listeners, validator_events) = {
            let mut state = write_lock(&self.state, "registering element")?;
            let index = ElementId(state.elements.len());
            let mut validator = validator;
            if let Some(validator) = validator.as_mut() {
                validator.element = Some(index);
                validator.renderer = Some(resolved_renderer);
            }
            state.elements.push(FormElement {
                id,
                name,
                kind,
                listeners,
                validator,
            });
            let element = state
                .elements
                .last()
                .ok_or(RegistryError::UnknownElement { index: index.0 })?;
            (
                index,
                element.listeners.clone(),
                element.validator.as_ref().map(|v| v.events.clone()),
            )
        };
        let handle = ElementHandle {
            registry: self.clone(),
            index,
        };

        // DOM subscriptions happen outside the state lock; handlers
        // re-enter through the handle they capture.
        if let Some(target) = target.as_deref() {
            for listener in &bound_listeners {
                let callback = listener.callback.clone();
                let listener_handle = handle.clone();
                let action: DomHandler =
                    Arc::new(move |context| callback(&listener_handle, context));
                bind_to_events(self.dom.as_ref(), target, &listener.events, action)?;
            }
            if let Some(events) = validator_events.as_deref() {
                let validate_handle = handle.clone();
                // The event path runs the validator and ignores its
                // boolean outcome; rendering is the validator's own
                // responsibility.
                let action: DomHandler = Arc::new(move |_context| {
                    if let Err(error) = validate_handle.validate() {
                        warn!(%error, "event-driven validation failed");
                    }
                });
                bind_to_events(self.dom.as_ref(), target, events, action)?;
            }
        }

        self.reconcile_with_model(index)?;

        if let Some(init) = on_init {
            init(&handle);
        }
        debug!(element = ?target, "registered element");
        Ok(handle)
    }

    /// Runs `validate()` on every element that owns a validator, in
    /// registration order, without short-circuiting, so every field
    /// refreshes its feedback even after the first failure.
    pub fn validate_all(&self) -> RegistryResult<bool> {
        let count = read_lock(&self.state, "counting elements")?.elements.len();
        let mut all_valid = true;
        for index in 0..count {
            let has_validator = read_lock(&self.state, "checking for a validator")?
                .elements
                .get(index)
                .is_some_and(|element| element.validator.is_some());
            if has_validator {
                all_valid &= self.validate_element(ElementId(index))?;
            }
        }
        Ok(all_valid)
    }

    /// The three-phase validation protocol: pre-check (may cancel),
    /// core check (sole producer of the result), post-check (observes
    /// only), then exactly one renderer refresh. Returns whether the
    /// final status is `Valid`.
    pub fn validate_element(&self, index: ElementId) -> RegistryResult<bool> {
        let parts = self.validation_parts(index)?;
        let context = CheckContext {
            value: Value::String(self.dom.value(&parts.target)?),
            target: parts.target.clone(),
        };

        if let Some(pre) = parts.pre_check.as_ref() {
            if pre(&context) {
                return self.finish_cancelled(index, &parts);
            }
        }

        let result = (parts.core_check)(&context);
        if let Some(post) = parts.post_check.as_ref() {
            post(&context);
        }

        let (status, message) = {
            let mut state = write_lock(&self.state, "storing validation result")?;
            let validator = mutable_validator(&mut state, index)?;
            validator.apply(&result);
            (validator.status, validator.message.clone())
        };
        self.render(&parts, status, message.as_deref())?;
        Ok(status == Some(Status::Valid))
    }

    /// Drives the element's asynchronous check, if it carries one;
    /// falls back to the synchronous protocol otherwise.
    ///
    /// The contract for the asynchronous path: status transitions to
    /// `Validating` and the view refreshes immediately; a second refresh
    /// happens when the result resolves; if another call starts for the
    /// same element before this one resolves, this outcome is discarded
    /// (last call wins) and `None` is returned.
    pub async fn validate_element_async(&self, index: ElementId) -> RegistryResult<Option<bool>> {
        let parts = self.validation_parts(index)?;
        let Some(async_check) = parts.async_check.clone() else {
            return self.validate_element(index).map(Some);
        };

        let context = CheckContext {
            value: Value::String(self.dom.value(&parts.target)?),
            target: parts.target.clone(),
        };

        if let Some(pre) = parts.pre_check.as_ref() {
            if pre(&context) {
                return self.finish_cancelled(index, &parts).map(Some);
            }
        }

        let ticket = {
            let mut state = write_lock(&self.state, "starting async validation")?;
            let next = ValidationTicket(state.tickets.get(&index).map_or(0, |ticket| ticket.0) + 1);
            state.tickets.insert(index, next);
            mutable_validator(&mut state, index)?.begin_validating();
            next
        };
        self.render(&parts, Some(Status::Validating), None)?;

        if !async_check.debounce.is_zero() {
            Delay::new(async_check.debounce).await;
            if !self.is_latest_ticket(index, ticket)? {
                return Ok(None);
            }
        }

        let result = (async_check.check)(context.clone()).await;
        {
            let mut state = write_lock(&self.state, "finishing async validation")?;
            if state.tickets.get(&index).copied() != Some(ticket) {
                return Ok(None);
            }
            mutable_validator(&mut state, index)?.apply(&result);
        }
        if let Some(post) = parts.post_check.as_ref() {
            post(&context);
        }
        self.render(&parts, Some(result.status()), result.message())?;
        Ok(Some(result.status() == Status::Valid))
    }

    /// Synchronizes the model from live element state (named elements
    /// only, registration order) and returns the serialized projection.
    pub fn export_model(&self) -> RegistryResult<Vec<ModelEntry>> {
        let snapshot: Vec<(String, String, String, Option<Status>, Option<String>)> = {
            let state = read_lock(&self.state, "reading elements for export")?;
            state
                .elements
                .iter()
                .filter_map(|element| {
                    let name = element.name.clone()?;
                    let target = element.target()?.to_owned();
                    let status = element.validator.as_ref().and_then(|v| v.status);
                    let message = element.validator.as_ref().and_then(|v| v.message.clone());
                    Some((name, element.kind.clone(), target, status, message))
                })
                .collect()
        };

        let mut entries = Vec::with_capacity(snapshot.len());
        for (name, kind, target, status, message) in snapshot {
            let value = if self.dom.contains(&target) {
                Value::String(self.dom.value(&target)?)
            } else {
                warn!(element = %target, "exporting null for unresolved element");
                Value::Null
            };
            entries.push(ModelEntry {
                name,
                value,
                kind,
                status,
                message,
            });
        }

        let mut state = write_lock(&self.state, "storing exported model")?;
        state.model = entries.clone();
        Ok(entries)
    }

    /// Applies entries onto matching live elements by name; the first
    /// registered element with the name wins, unmatched entries are
    /// ignored. Values and stored statuses are copied directly unless
    /// `revalidate_on_import` is configured.
    pub fn import_model(&self, entries: &[ModelEntry]) -> RegistryResult<()> {
        let revalidate =
            read_lock(&self.state, "reading import policy")?.options.revalidate_on_import;
        for entry in entries {
            let position = read_lock(&self.state, "matching import entry")?
                .elements
                .iter()
                .position(|element| element.name.as_deref() == Some(entry.name.as_str()));
            let Some(position) = position else {
                warn!(name = %entry.name, "import entry has no matching element");
                continue;
            };
            self.apply_entry(ElementId(position), entry, revalidate)?;
        }
        Ok(())
    }

    fn reconcile_with_model(&self, index: ElementId) -> RegistryResult<()> {
        let (name, revalidate) = {
            let state = read_lock(&self.state, "reading element for reconcile")?;
            let element = state
                .elements
                .get(index.0)
                .ok_or(RegistryError::UnknownElement { index: index.0 })?;
            (element.name.clone(), state.options.revalidate_on_import)
        };
        let Some(name) = name else {
            return Ok(());
        };
        let entry = read_lock(&self.state, "matching model entry")?
            .model
            .iter()
            .find(|entry| entry.name == name)
            .cloned();
        match entry {
            Some(entry) => self.apply_entry(index, &entry, revalidate),
            None => Ok(()),
        }
    }

    /// Model-to-element synchronization for one entry: writes the stored
    /// value into the DOM and either copies the stored validation state
    /// (bypassing validation, no render) or re-runs the validator.
    fn apply_entry(
        &self,
        index: ElementId,
        entry: &ModelEntry,
        revalidate: bool,
    ) -> RegistryResult<()> {
        let (target, has_validator) = {
            let state = read_lock(&self.state, "reading element for model sync")?;
            let element = state
                .elements
                .get(index.0)
                .ok_or(RegistryError::UnknownElement { index: index.0 })?;
            (
                element.target().map(str::to_owned),
                element.validator.is_some(),
            )
        };

        if let Some(target) = target.as_deref() {
            if self.dom.contains(target) {
                self.dom
                    .set_value(target, &model::value_to_dom_string(&entry.value))?;
            } else {
                warn!(element = %target, "skipping value write for unresolved element");
            }
        }

        if has_validator {
            if revalidate {
                self.validate_element(index)?;
            } else {
                let mut state = write_lock(&self.state, "copying stored validation state")?;
                mutable_validator(&mut state, index)?.set_stored(entry.status, entry.message.clone());
            }
        }
        Ok(())
    }

    pub(crate) fn element_target(&self, index: ElementId) -> RegistryResult<String> {
        let state = read_lock(&self.state, "reading element target")?;
        let element = state
            .elements
            .get(index.0)
            .ok_or(RegistryError::UnknownElement { index: index.0 })?;
        element
            .target()
            .map(str::to_owned)
            .ok_or_else(|| RegistryError::MissingIdentity {
                kind: element.kind.clone(),
            })
    }

    pub(crate) fn element_name(&self, index: ElementId) -> RegistryResult<Option<String>> {
        let state = read_lock(&self.state, "reading element name")?;
        Ok(state
            .elements
            .get(index.0)
            .ok_or(RegistryError::UnknownElement { index: index.0 })?
            .name
            .clone())
    }

    pub(crate) fn element_value(&self, index: ElementId) -> RegistryResult<Value> {
        let target = self.element_target(index)?;
        Ok(Value::String(self.dom.value(&target)?))
    }

    pub(crate) fn set_element_value(&self, index: ElementId, value: &Value) -> RegistryResult<()> {
        let target = self.element_target(index)?;
        self.dom
            .set_value(&target, &model::value_to_dom_string(value))?;
        Ok(())
    }

    pub(crate) fn element_status(&self, index: ElementId) -> RegistryResult<Option<Status>> {
        let state = read_lock(&self.state, "reading element status")?;
        Ok(state
            .elements
            .get(index.0)
            .ok_or(RegistryError::UnknownElement { index: index.0 })?
            .validator
            .as_ref()
            .and_then(|validator| validator.status))
    }

    pub(crate) fn clear_element_validation(&self, index: ElementId) -> RegistryResult<()> {
        let parts = self.validation_parts(index)?;
        let (status, message) = {
            let state = read_lock(&self.state, "reading status for clear")?;
            let validator = state
                .elements
                .get(index.0)
                .and_then(|element| element.validator.as_ref());
            (
                validator.and_then(|v| v.status),
                validator.and_then(|v| v.message.clone()),
            )
        };
        if let Some(renderer) = parts.renderer.as_ref() {
            renderer.clear_validation(&RenderContext {
                dom: self.dom.as_ref(),
                target: &parts.target,
                status,
                message: message.as_deref(),
            })?;
        }
        Ok(())
    }

    fn validation_parts(&self, index: ElementId) -> RegistryResult<ValidationParts> {
        let state = read_lock(&self.state, "reading validator for run")?;
        let element = state
            .elements
            .get(index.0)
            .ok_or(RegistryError::UnknownElement { index: index.0 })?;
        let target = element
            .target()
            .ok_or_else(|| RegistryError::MissingIdentity {
                kind: element.kind.clone(),
            })?
            .to_owned();
        let Some(validator) = element.validator.as_ref() else {
            return Err(RegistryError::MissingValidator { target });
        };
        Ok(ValidationParts {
            target,
            pre_check: validator.pre_check.clone(),
            core_check: validator.core_check.clone(),
            post_check: validator.post_check.clone(),
            async_check: validator.async_check.clone(),
            renderer: validator.renderer.clone(),
        })
    }

    fn finish_cancelled(&self, index: ElementId, parts: &ValidationParts) -> RegistryResult<bool> {
        let message = {
            let mut state = write_lock(&self.state, "cancelling validation")?;
            let validator = mutable_validator(&mut state, index)?;
            validator.cancel();
            validator.message.clone()
        };
        self.render(parts, Some(Status::Cancelled), message.as_deref())?;
        Ok(false)
    }

    fn render(
        &self,
        parts: &ValidationParts,
        status: Option<Status>,
        message: Option<&str>,
    ) -> RegistryResult<()> {
        let Some(renderer) = parts.renderer.as_ref() else {
            return Ok(());
        };
        renderer.update_view(&RenderContext {
            dom: self.dom.as_ref(),
            target: &parts.target,
            status,
            message,
        })?;
        Ok(())
    }

    fn is_latest_ticket(&self, index: ElementId, ticket: ValidationTicket) -> RegistryResult<bool> {
        Ok(read_lock(&self.state, "checking latest validation ticket")?
            .tickets
            .get(&index)
            .copied()
            == Some(ticket))
    }
}

/// Everything a validation run needs outside the state lock, so user
/// check functions are free to call back into the registry.
struct ValidationParts {
    target: String,
    pre_check: Option<crate::validator::PreCheckFn>,
    core_check: crate::validator::CoreCheckFn,
    post_check: Option<crate::validator::PostCheckFn>,
    async_check: Option<crate::validator::AsyncCheck>,
    renderer: Option<Arc<dyn StatusRenderer>>,
}

fn mutable_validator<'a>(
    state: &'a mut RegistryState,
    index: ElementId,
) -> RegistryResult<&'a mut crate::validator::Validator> {
    let element = state
        .elements
        .get_mut(index.0)
        .ok_or(RegistryError::UnknownElement { index: index.0 })?;
    let target = element.target().unwrap_or_default().to_owned();
    element
        .validator
        .as_mut()
        .ok_or(RegistryError::MissingValidator { target })
}

fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> RegistryResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| RegistryError::StatePoisoned(context))
}

fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> RegistryResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| RegistryError::StatePoisoned(context))
}
