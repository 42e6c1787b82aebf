pub mod dom;
pub mod element;
pub mod model;
pub mod registry;
pub mod renderer;
pub mod status;
pub mod validator;


pub use dom::{Dom, DomError, DomResult, ENTER_KEY, EventContext, FeedbackNode, MemoryDom};
pub use element::{ENTERKEY_EVENT, ElementHandle, ElementSpec, Listener};
pub use model::{ModelEntry, parse_model, serialize_model};
pub use registry::{
    ElementId, PageRegistry, RegistryError, RegistryOptions, RegistryResult, ValidationTicket,
};
pub use renderer::{Bootstrap3Renderer, RenderContext, StatusRenderer};
pub use status::{Status, ValidationResult};
pub use validator::{
    CheckContext, REQUIRED_MESSAGE, Validator, is_missing, required, required_with_message,
};
