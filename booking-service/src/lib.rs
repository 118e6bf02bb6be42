pub mod api;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod notifier;
pub mod postgres;
pub mod schema;
pub mod seed;
pub mod store;
