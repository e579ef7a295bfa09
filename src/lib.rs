pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod db;
pub mod docs;
pub mod error;
pub mod model;
pub mod qr;
pub mod routes;
pub mod service;
pub mod store;
