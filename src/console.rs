use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use std::fmt;
use std::io::{self, Write};

use crate::settings::ConsoleColor;
use crate::watch::HighlightStyle;

impl From<ConsoleColor> for Color {
    fn from(color: ConsoleColor) -> Self {
        match color {
            ConsoleColor::Black => Color::Black,
            ConsoleColor::DarkBlue => Color::DarkBlue,
            ConsoleColor::DarkGreen => Color::DarkGreen,
            ConsoleColor::DarkCyan => Color::DarkCyan,
            ConsoleColor::DarkRed => Color::DarkRed,
            ConsoleColor::DarkMagenta => Color::DarkMagenta,
            ConsoleColor::DarkYellow => Color::DarkYellow,
            ConsoleColor::Gray => Color::Grey,
            ConsoleColor::DarkGray => Color::DarkGrey,
            ConsoleColor::Blue => Color::Blue,
            ConsoleColor::Green => Color::Green,
            ConsoleColor::Cyan => Color::Cyan,
            ConsoleColor::Red => Color::Red,
            ConsoleColor::Magenta => Color::Magenta,
            ConsoleColor::Yellow => Color::Yellow,
            ConsoleColor::White => Color::White,
        }
    }
}

/// Packet output sink.
pub struct Console<W: Write> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Print one segment, painted with `style` when a watch rule matched.
    ///
    /// The whole sequence goes out in a single write so lines printed from the
    /// command loop cannot land in the middle of it.
    pub fn print_segment(&mut self, style: Option<HighlightStyle>, text: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(text.len() + 32);
        match style {
            Some(style) => {
                if let Some(fg) = style.foreground {
                    queue!(buf, SetForegroundColor(fg.into()))?;
                }
                if let Some(bg) = style.background {
                    queue!(buf, SetBackgroundColor(bg.into()))?;
                }
                queue!(buf, Print(text), ResetColor, Print("\n"))?;
            }
            None => queue!(buf, ResetColor, Print(text), Print("\n"))?,
        }
        self.out.write_all(&buf)?;
        self.out.flush()
    }

    /// Report a failure that ended packet output.
    pub fn print_error(&mut self, error: &dyn fmt::Display) -> io::Result<()> {
        self.print_segment(None, &format!("Error: {error}"))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
