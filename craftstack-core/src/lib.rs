//! craftstack Core
//!
//! Core library for declaring a cloud stack as a graph of resources and
//! reconciling it against providers.

pub mod differ;
pub mod effect;
pub mod error;
pub mod graph;
pub mod interpreter;
pub mod kubeconfig;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod stack;
