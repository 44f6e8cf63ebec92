pub mod model;
pub mod provider;
pub mod reload;
pub mod router;
pub mod table;

pub use model::{RouteMatch, RouteRule, RoutesConfig};
pub use provider::{FileRoutesProvider, RoutesProvider};
pub use reload::{load_table, ReloadOutcome, RouteReloader};
pub use router::Router;
pub use table::{CompiledRoute, RouteTable};
