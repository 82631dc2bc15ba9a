//! Terminal client for the orchid shop API: session gate, route table and
//! REST client.

pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod forms;
pub mod gate;
pub mod images;
pub mod models;
pub mod routes;
pub mod store;
pub mod token;
pub mod views;
