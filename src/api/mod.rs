//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod routes;
mod search;
mod template;

pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use search::{search_templates, SearchItem, SearchParams, SearchResponse};
pub use template::{
    create_template, delete_template, get_template, record_use, record_view, update_template,
};
