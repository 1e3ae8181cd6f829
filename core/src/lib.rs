pub mod db;
pub mod meal_csv;
pub mod models;
pub mod service;
pub mod trends;
