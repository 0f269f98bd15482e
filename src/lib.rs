//! Editing core for entity-relationship diagrams in Chen notation.
//!
//! [`erm::erm_models`] holds the semantic graph, [`erm::gui_models`] the
//! placement of that graph on the board, and [`erm::erm_controllers::GuiModel`]
//! ties both together behind reversible editing operations.

pub mod common;
pub mod erm;

pub use common::config::EditorSettings;
pub use erm::chen_notation::{ChenNotation, NotationStyle};
pub use erm::erm_controllers::{DiagramHistory, GuiModel, Phantom};
pub use erm::gui_models::DiagramCommand;
