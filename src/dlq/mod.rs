pub mod dlq_controller;
pub mod dlq_repository;
pub mod dlq_service;
