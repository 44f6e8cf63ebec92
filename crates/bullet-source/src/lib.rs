pub mod alertmanager;
pub mod generic;
pub mod grafana;
pub mod parser;
pub mod registry;

mod alert_group;

pub use alertmanager::AlertmanagerParser;
pub use generic::GenericParser;
pub use grafana::GrafanaParser;
pub use parser::{decode_body, SourceParser};
pub use registry::ParserRegistry;
