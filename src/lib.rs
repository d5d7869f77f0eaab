//! Folio: cached retrieval and compilation of documentation pages whose
//! sources live in a remote repository.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
