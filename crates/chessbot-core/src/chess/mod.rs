pub mod game;
pub mod render;

pub use game::{ChessGame, PlayedMove};
pub use render::{BoardRenderer, RenderError, RenderedDiagram, PngBoardRenderer};
