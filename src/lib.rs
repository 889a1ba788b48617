// Library exports for Agora
// This allows integration tests and external code to use Agora modules

pub mod auth;
pub mod authz;
pub mod blobs;
pub mod config;
pub mod content;
pub mod db;
pub mod engagement;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod routes;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
