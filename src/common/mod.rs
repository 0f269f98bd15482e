pub mod canvas;
pub mod command;
pub mod config;
pub mod geometry;
pub mod history;
pub mod observer;
pub mod project_serde;
pub mod uuid;
