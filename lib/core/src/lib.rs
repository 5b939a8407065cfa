//! Core types and utilities for the guildhall access layer.
//!
//! This crate provides the foundational error handling and the opaque
//! random token types shared by the session store, the OAuth state
//! exchange and the HTTP surface.

pub mod error;
pub mod token;

pub use error::Result;
pub use token::{
    OAuthSecret, OAuthStateToken, RandomSourceError, SessionToken, TOKEN_BYTES, constant_time_eq,
};
