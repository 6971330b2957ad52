pub mod config;
pub mod quotation;
