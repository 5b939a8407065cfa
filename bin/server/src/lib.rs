//! guildhall HTTP server.
//!
//! This crate provides the axum surface over the guildhall identity,
//! session and RBAC core: role-gated routing, password and Discord logins,
//! logout, API token minting and configuration loading.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
