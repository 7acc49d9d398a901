//! Fortidash Throttle - client-side request throttling for the Fortinet
//! inventory dashboard.
//!
//! This crate implements a per-key fixed-window rate limiter with a blocking
//! wait-for-slot helper, three independently configured limiter instances
//! (general API, search, bulk), and an HTTP client for the inventory REST
//! API that routes every request through them.

pub mod client;
pub mod config;
pub mod error;
pub mod loadtest;
pub mod ratelimit;
