pub mod audit;
pub mod background;
pub mod config;
pub mod db;
pub mod error;
pub mod metadata;
pub mod routes;
pub mod runtime;
pub mod state;
pub mod tenant;
