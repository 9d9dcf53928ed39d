//! tradebill - Invoicing for plumbing, electrical and HVAC contractors
//!
//! The invoice core (totals, the line-item editor, status rules and the client-side
//! repository) plus the HTTP server that stores invoices and sends them.

pub mod api;
pub mod calculator;
pub mod client;
pub mod config;
pub mod db;
pub mod delivery;
pub mod editor;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod service;
