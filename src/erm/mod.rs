pub mod chen_notation;
pub mod erm_controllers;
pub mod erm_lines;
pub mod erm_models;
pub mod erm_serde;
pub mod gui_models;
