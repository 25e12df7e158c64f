//! Hypo Insurance API Library
//!
//! Back end for the health-insurance shopping front end: county lookup and
//! plan search proxies in front of the area-data service and the marketplace
//! API, a hospital search pass-through, consultation checkout through the payment provider, and the signed
//! webhook that records paid consultations.
//!
//! # Modules
//!
//! - `area_data_client`: County/FIPS area-data client with retry.
//! - `circuit_breaker`: Circuit breaker for the consultation store.
//! - `config`: Configuration management.
//! - `consultation_store`: Consultation persistence (PostgreSQL and in-memory).
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and shared state.
//! - `hospital_client`: Hospital search gateway client.
//! - `marketplace_client`: Marketplace plan-search client.
//! - `metadata_chunks`: Splitting answers across payment metadata entries.
//! - `models`: Request, response and record models.
//! - `payment_client`: Payment provider client (Stripe SDK).
//! - `plan_filter`: Plan filtering, sorting and filter options.
//! - `routes`: Router assembly and OpenAPI document.
//! - `signature`: Webhook signature verification.
//! - `validation`: Input validation rules.
//! - `webhook_handler`: Payment provider webhook handler.
//! - `webhook_models`: Webhook payload models.

pub mod area_data_client;
pub mod circuit_breaker;
pub mod config;
pub mod consultation_store;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod hospital_client;
pub mod marketplace_client;
pub mod metadata_chunks;
pub mod models;
pub mod payment_client;
pub mod plan_filter;
pub mod routes;
pub mod signature;
pub mod validation;
pub mod webhook_handler;
pub mod webhook_models;
