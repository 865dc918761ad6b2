pub mod entries;
pub mod repository;
pub mod service;
