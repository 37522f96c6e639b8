pub mod factory;
pub mod notify;
pub mod runner;
pub mod services;
pub mod store;
