pub mod alert;
pub mod api;
pub mod config;
pub mod confirm;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod lifecycle;
pub mod mailings;
pub mod model;
pub mod poller;
pub mod router;
pub mod session;
pub mod settings;
pub mod table;
