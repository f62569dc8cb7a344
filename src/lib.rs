pub mod analyzer;
pub mod cache;
pub mod config;
pub mod controllers;
pub mod dlq;
pub mod hasher;
pub mod models;
pub mod repositories;
pub mod reviews;
pub mod services;
pub mod workers;
