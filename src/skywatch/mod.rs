pub mod audit;
pub mod config;
pub mod normalize;
pub mod paths;
pub mod policy;
pub mod reconcile;
pub mod record;
pub mod service;
pub mod store;
pub mod util;
pub mod warn;
