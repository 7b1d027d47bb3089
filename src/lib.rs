pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod integrations;
pub mod payments;
pub mod repository;
pub mod service;
