use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Key code reported for the Enter key on keypress events.
pub const ENTER_KEY: u32 = 13;

/// Context delivered to every event handler.
#[derive(Clone, Debug)]
pub struct EventContext {
    /// Id of the node the event fired on.
    pub target: String,
    /// DOM event name.
    pub event: String,
    /// Key code, present for keyboard events.
    pub key: Option<u32>,
}

pub type DomHandler = Arc<dyn Fn(&EventContext) + Send + Sync>;

/// A sibling node inserted next to a field to carry validation feedback:
/// a classed icon span or a classed message block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeedbackNode {
    pub classes: Vec<String>,
    pub text: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DomError {
    UnknownNode(String),
}

impl Display for DomError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DomError::UnknownNode(id) => write!(f, "no DOM node with id #{id}"),
        }
    }
}

impl std::error::Error for DomError {}

pub type DomResult<T> = Result<T, DomError>;

/// The host-binding seam. The browser (or any equivalent host) is reached
/// exclusively through this trait; nodes are addressed by id. The shipped
/// [`MemoryDom`] implements it over an in-memory node tree.
pub trait Dom: Send + Sync {
    /// True if a node with this id exists.
    fn contains(&self, id: &str) -> bool;

    /// Current control value, as `val()` would report it.
    fn value(&self, id: &str) -> DomResult<String>;

    fn set_value(&self, id: &str, value: &str) -> DomResult<()>;

    /// Subscribes a handler to a DOM event on the node.
    fn on(&self, id: &str, event: &str, handler: DomHandler) -> DomResult<()>;

    /// Nearest ancestor carrying the class, the node itself included.
    fn closest(&self, id: &str, class: &str) -> DomResult<Option<String>>;

    fn add_class(&self, id: &str, class: &str) -> DomResult<()>;

    fn remove_class(&self, id: &str, class: &str) -> DomResult<()>;

    /// Inserts a feedback node as the next sibling of the node.
    fn insert_after(&self, id: &str, node: FeedbackNode) -> DomResult<()>;

    /// Removes every descendant of the node that carries the class,
    /// together with its subtree.
    fn remove_descendants_with_class(&self, id: &str, class: &str) -> DomResult<()>;

    /// Value of the control named `name` inside the container, if any.
    /// Used to locate the hidden page-model field.
    fn field_value(&self, container_id: &str, name: &str) -> Option<String>;
}

#[derive(Default)]
struct Node {
    parent: Option<String>,
    children: Vec<String>,
    classes: Vec<String>,
    name: Option<String>,
    value: String,
    text: Option<String>,
}

#[derive(Default)]
struct DomState {
    nodes: BTreeMap<String, Node>,
    roots: Vec<String>,
    handlers: BTreeMap<(String, String), Vec<DomHandler>>,
    next_auto_id: u64,
}

impl DomState {
    fn descendants(&self, id: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut stack = self
            .nodes
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        while let Some(node_id) = stack.pop() {
            if let Some(node) = self.nodes.get(&node_id) {
                stack.extend(node.children.iter().cloned());
            }
            found.push(node_id);
        }
        found
    }

    fn detach(&mut self, id: &str) {
        for child in self.descendants(id) {
            self.nodes.remove(&child);
            self.handlers.retain(|(node, _), _| node != &child);
        }
        if let Some(node) = self.nodes.remove(id) {
            match node.parent {
                Some(parent) => {
                    if let Some(parent_node) = self.nodes.get_mut(&parent) {
                        parent_node.children.retain(|child| child != id);
                    }
                }
                None => self.roots.retain(|root| root != id),
            }
        }
        self.handlers.retain(|(node, _), _| node != id);
    }
}

/// In-memory DOM: an id-addressed node tree with classes, values and
/// per-(node, event) handler lists. Doubles as the test double and as a
/// reference host. Events are dispatched like the browser loop: handlers
/// are collected under the lock, then run outside it, so a handler is
/// free to call back into the tree.
#[derive(Clone, Default)]
pub struct MemoryDom {
    state: Arc<RwLock<DomState>>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, DomState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, DomState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Inserts a node; `parent` of `None` makes it a root.
    pub fn insert(&self, id: &str, parent: Option<&str>) {
        self.insert_with_classes(id, parent, &[]);
    }

    pub fn insert_with_classes(&self, id: &str, parent: Option<&str>, classes: &[&str]) {
        let mut state = self.write();
        state.nodes.insert(
            id.to_owned(),
            Node {
                parent: parent.map(str::to_owned),
                classes: classes.iter().map(|class| (*class).to_owned()).collect(),
                ..Node::default()
            },
        );
        match parent {
            Some(parent_id) => {
                if let Some(parent_node) = state.nodes.get_mut(parent_id) {
                    parent_node.children.push(id.to_owned());
                }
            }
            None => state.roots.push(id.to_owned()),
        }
    }

    /// Sets the `name` attribute used by [`Dom::field_value`] lookups.
    pub fn set_name(&self, id: &str, name: &str) {
        if let Some(node) = self.write().nodes.get_mut(id) {
            node.name = Some(name.to_owned());
        }
    }

    /// Dispatches an event to every handler bound to the node.
    pub fn fire(&self, id: &str, event: &str) {
        self.dispatch(id, event, None);
    }

    /// Dispatches a keyboard event carrying a key code.
    pub fn fire_key(&self, id: &str, event: &str, key: u32) {
        self.dispatch(id, event, Some(key));
    }

    fn dispatch(&self, id: &str, event: &str, key: Option<u32>) {
        let handlers = self
            .read()
            .handlers
            .get(&(id.to_owned(), event.to_owned()))
            .cloned()
            .unwrap_or_default();
        let context = EventContext {
            target: id.to_owned(),
            event: event.to_owned(),
            key,
        };
        for handler in handlers {
            handler(&context);
        }
    }

    pub fn classes(&self, id: &str) -> Vec<String> {
        self.read()
            .nodes
            .get(id)
            .map(|node| node.classes.clone())
            .unwrap_or_default()
    }

    pub fn children(&self, id: &str) -> Vec<String> {
        self.read()
            .nodes
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn text(&self, id: &str) -> Option<String> {
        self.read().nodes.get(id).and_then(|node| node.text.clone())
    }

    pub fn descendants_with_class(&self, id: &str, class: &str) -> Vec<String> {
        let state = self.read();
        state
            .descendants(id)
            .into_iter()
            .filter(|node_id| {
                state
                    .nodes
                    .get(node_id)
                    .is_some_and(|node| node.classes.iter().any(|c| c == class))
            })
            .collect()
    }
}

impl Dom for MemoryDom {
    fn contains(&self, id: &str) -> bool {
        self.read().nodes.contains_key(id)
    }

    fn value(&self, id: &str) -> DomResult<String> {
        self.read()
            .nodes
            .get(id)
            .map(|node| node.value.clone())
            .ok_or_else(|| DomError::UnknownNode(id.to_owned()))
    }

    fn set_value(&self, id: &str, value: &str) -> DomResult<()> {
        let mut state = self.write();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| DomError::UnknownNode(id.to_owned()))?;
        node.value = value.to_owned();
        Ok(())
    }

    fn on(&self, id: &str, event: &str, handler: DomHandler) -> DomResult<()> {
        let mut state = self.write();
        if !state.nodes.contains_key(id) {
            return Err(DomError::UnknownNode(id.to_owned()));
        }
        state
            .handlers
            .entry((id.to_owned(), event.to_owned()))
            .or_default()
            .push(handler);
        Ok(())
    }

    fn closest(&self, id: &str, class: &str) -> DomResult<Option<String>> {
        let state = self.read();
        if !state.nodes.contains_key(id) {
            return Err(DomError::UnknownNode(id.to_owned()));
        }
        let mut current = Some(id.to_owned());
        while let Some(node_id) = current {
            let Some(node) = state.nodes.get(&node_id) else {
                break;
            };
            if node.classes.iter().any(|c| c == class) {
                return Ok(Some(node_id));
            }
            current = node.parent.clone();
        }
        Ok(None)
    }

    fn add_class(&self, id: &str, class: &str) -> DomResult<()> {
        let mut state = self.write();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| DomError::UnknownNode(id.to_owned()))?;
        if !node.classes.iter().any(|c| c == class) {
            node.classes.push(class.to_owned());
        }
        Ok(())
    }

    fn remove_class(&self, id: &str, class: &str) -> DomResult<()> {
        let mut state = self.write();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| DomError::UnknownNode(id.to_owned()))?;
        node.classes.retain(|c| c != class);
        Ok(())
    }

    fn insert_after(&self, id: &str, feedback: FeedbackNode) -> DomResult<()> {
        let mut state = self.write();
        let parent = state
            .nodes
            .get(id)
            .ok_or_else(|| DomError::UnknownNode(id.to_owned()))?
            .parent
            .clone();
        state.next_auto_id += 1;
        let new_id = format!("feedback-{}", state.next_auto_id);
        state.nodes.insert(
            new_id.clone(),
            Node {
                parent: parent.clone(),
                classes: feedback.classes,
                text: feedback.text,
                ..Node::default()
            },
        );
        let siblings = match parent {
            Some(parent_id) => match state.nodes.get_mut(&parent_id) {
                Some(parent_node) => &mut parent_node.children,
                None => return Ok(()),
            },
            None => &mut state.roots,
        };
        let position = siblings
            .iter()
            .position(|sibling| sibling == id)
            .map(|index| index + 1)
            .unwrap_or(siblings.len());
        siblings.insert(position, new_id);
        Ok(())
    }

    fn remove_descendants_with_class(&self, id: &str, class: &str) -> DomResult<()> {
        let mut state = self.write();
        if !state.nodes.contains_key(id) {
            return Err(DomError::UnknownNode(id.to_owned()));
        }
        let doomed: Vec<String> = state
            .descendants(id)
            .into_iter()
            .filter(|node_id| {
                state
                    .nodes
                    .get(node_id)
                    .is_some_and(|node| node.classes.iter().any(|c| c == class))
            })
            .collect();
        for node_id in doomed {
            state.detach(&node_id);
        }
        Ok(())
    }

    fn field_value(&self, container_id: &str, name: &str) -> Option<String> {
        let state = self.read();
        state.descendants(container_id).into_iter().find_map(|id| {
            let node = state.nodes.get(&id)?;
            (node.name.as_deref() == Some(name)).then(|| node.value.clone())
        })
    }
}
