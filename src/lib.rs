//! Supplementary billing engine - transaction reconciliation and invoice reissue
//! for water abstraction charging.
//!
//! The crate is a library invoked by an outer batch runner. It owns the
//! supplementary billing core: matching newly calculated charge transactions
//! against previously billed ones, and reissuing (cancel + rebill) invoices
//! through the external Charging Module.

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod services;
