//! Output of printer and console text to the host terminal.
use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::{event, Level};

fn get_colour_choice() -> ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// A terminal writer which shows all its output in one colour, so
/// that the output of different devices can be told apart.
pub struct TerminalWriter {
    stream: StandardStream,
    colour: ColorSpec,
}

impl TerminalWriter {
    pub fn new(foreground: Color) -> TerminalWriter {
        let mut colour = ColorSpec::new();
        colour.set_fg(Some(foreground));
        TerminalWriter {
            stream: StandardStream::stdout(get_colour_choice()),
            colour,
        }
    }

    pub fn write_line(&mut self, prefix: &str, text: &str) -> Result<(), std::io::Error> {
        if let Err(e) = self.stream.set_color(&self.colour) {
            event!(
                Level::ERROR,
                "Failed to select colour {:?}: {}",
                self.colour,
                e
            );
        }
        let result = writeln!(self.stream, "{prefix}{text}");
        if let Err(e) = self.stream.reset() {
            event!(Level::ERROR, "Failed to reset terminal colour: {}", e);
        }
        result.and_then(|()| self.stream.flush())
    }
}
