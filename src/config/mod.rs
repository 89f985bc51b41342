pub mod schema;

pub use schema::{BackendConfig, ChatConfig, Config};
