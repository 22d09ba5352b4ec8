// SSO relay - library root

pub mod config;
pub mod db;
pub mod error;
pub mod relay;
pub mod routes;
pub mod tokens;
