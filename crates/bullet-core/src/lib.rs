pub mod error;
pub mod event;

pub use error::{ConfigError, DeliveryError, ParseError, TemplateError};
pub use event::{Event, EventBuilder, DEFAULT_EVENT_TYPE};
