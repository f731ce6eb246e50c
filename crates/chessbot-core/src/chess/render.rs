//! Board diagram rendering.

use std::fmt::Write as _;
use std::sync::Arc;

use resvg::{tiny_skia, usvg};
use shakmaty::{Board, Color, File, Rank, Role, Square};
use thiserror::Error;

/// An encoded board image ready for upload.
#[derive(Debug, Clone)]
pub struct RenderedDiagram {
    pub bytes: Vec<u8>,
    pub mimetype: &'static str,
    pub file_name: &'static str,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to encode diagram: {0}")]
    Encode(String),
}

/// Draws a board, optionally highlighting squares (the last move).
pub trait BoardRenderer: Send + Sync {
    fn render(&self, board: &Board, highlight: &[Square]) -> Result<RenderedDiagram, RenderError>;
}

/// Lays the board out as SVG (Unicode piece glyphs, rank/file labels) and
/// rasterises it to PNG.
#[derive(Clone)]
pub struct PngBoardRenderer {
    square_size: u32,
    margin: u32,
    fontdb: Arc<usvg::fontdb::Database>,
}

const LIGHT: &str = "#f0d9b5";
const DARK: &str = "#b58863";
const HIGHLIGHT: &str = "#f6f669";

const FONT_FAMILY: &str = "DejaVu Sans, Noto Sans Symbols 2, sans-serif";

impl Default for PngBoardRenderer {
    fn default() -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        Self {
            square_size: 45,
            margin: 20,
            fontdb: Arc::new(fontdb),
        }
    }
}

impl PngBoardRenderer {
    pub fn new(square_size: u32) -> Self {
        Self {
            square_size,
            ..Self::default()
        }
    }

    fn side(&self) -> u32 {
        self.square_size * 8 + self.margin * 2
    }

    fn svg(&self, board: &Board, highlight: &[Square]) -> Result<String, RenderError> {
        let mut svg = String::new();
        write_svg(&mut svg, board, highlight, self.side(), self.square_size, self.margin)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(svg)
    }
}

impl BoardRenderer for PngBoardRenderer {
    fn render(&self, board: &Board, highlight: &[Square]) -> Result<RenderedDiagram, RenderError> {
        let side = self.side();
        let svg = self.svg(board, highlight)?;

        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..usvg::Options::default()
        };
        let tree = usvg::Tree::from_str(&svg, &options)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        let mut pixmap = tiny_skia::Pixmap::new(side, side)
            .ok_or_else(|| RenderError::Encode(format!("invalid image size {side}")))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
        let bytes = pixmap
            .encode_png()
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        Ok(RenderedDiagram {
            bytes,
            mimetype: "image/png",
            file_name: "chessboard.png",
            width: side,
            height: side,
        })
    }
}

fn write_svg(
    out: &mut String,
    board: &Board,
    highlight: &[Square],
    side: u32,
    sq: u32,
    m: u32,
) -> std::fmt::Result {
    writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{side}" height="{side}" viewBox="0 0 {side} {side}">"#
    )?;
    writeln!(out, r##"<rect width="{side}" height="{side}" fill="#312e2b"/>"##)?;

    for row in 0..8u32 {
        let rank = Rank::new(7 - row);
        for col in 0..8u32 {
            let file = File::new(col);
            let square = Square::from_coords(file, rank);
            let x = m + col * sq;
            let y = m + row * sq;
            let fill = if highlight.contains(&square) {
                HIGHLIGHT
            } else if (col + (7 - row)) % 2 == 0 {
                DARK
            } else {
                LIGHT
            };
            writeln!(out, r#"<rect x="{x}" y="{y}" width="{sq}" height="{sq}" fill="{fill}"/>"#)?;

            if let Some(piece) = board.piece_at(square) {
                let cx = x + sq / 2;
                let cy = y + sq * 4 / 5;
                writeln!(
                    out,
                    r#"<text x="{cx}" y="{cy}" font-family="{FONT_FAMILY}" font-size="{}" text-anchor="middle">{}</text>"#,
                    sq * 4 / 5,
                    glyph(piece.color, piece.role)
                )?;
            }
        }
    }

    let label_size = m * 3 / 5;
    for i in 0..8u32 {
        let file_char = File::new(i).char();
        let rank_char = Rank::new(7 - i).char();
        let center = m + i * sq + sq / 2;
        writeln!(
            out,
            r##"<text x="{center}" y="{}" font-family="{FONT_FAMILY}" font-size="{label_size}" fill="#ffffff" text-anchor="middle">{file_char}</text>"##,
            side - m / 3
        )?;
        writeln!(
            out,
            r##"<text x="{}" y="{}" font-family="{FONT_FAMILY}" font-size="{label_size}" fill="#ffffff" text-anchor="middle">{rank_char}</text>"##,
            m / 2,
            center + label_size / 3
        )?;
    }

    writeln!(out, "</svg>")
}

fn glyph(color: Color, role: Role) -> char {
    match (color, role) {
        (Color::White, Role::King) => '♔',
        (Color::White, Role::Queen) => '♕',
        (Color::White, Role::Rook) => '♖',
        (Color::White, Role::Bishop) => '♗',
        (Color::White, Role::Knight) => '♘',
        (Color::White, Role::Pawn) => '♙',
        (Color::Black, Role::King) => '♚',
        (Color::Black, Role::Queen) => '♛',
        (Color::Black, Role::Rook) => '♜',
        (Color::Black, Role::Bishop) => '♝',
        (Color::Black, Role::Knight) => '♞',
        (Color::Black, Role::Pawn) => '♟',
    }
}
