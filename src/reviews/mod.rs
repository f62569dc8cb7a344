pub mod job;
pub mod job_repository;
pub mod review_controller;
pub mod review_service;
