pub mod capture_controller;
pub mod domain;
pub mod infrastructure;
