pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod factory;
pub mod providers;
pub mod template;

mod http;

pub use channel::{Channel, ChannelKind, RenderedMessage};
pub use config::ChannelConfig;
pub use dispatcher::{ChannelError, DispatchOutcome, DispatchPolicy, DispatchTarget, Dispatcher};
pub use factory::{ChannelDefaults, ChannelFactory};
pub use template::TemplateRenderer;
