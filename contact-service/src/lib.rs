//! Personal-mode contacts: sealed usernames, one-way contacts with an
//! approval flow for personal profiles, and refreshable avatar tokens.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;
