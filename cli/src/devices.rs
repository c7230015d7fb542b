//! The devices the command-line emulator can attach.
//!
//! All of them finish their operations immediately; the I/O unit
//! timing comes from the emulator, not from the devices.
use std::collections::VecDeque;

use termcolor::Color;
use tracing::{event, Level};

use base::charset::{bic_to_string, string_to_bic};
use base::prelude::*;
use cpu::{Completion, Device, DeviceRequest, StatusLine, NOT_READY_MASK};

use super::terminal::TerminalWriter;

pub const CARD_COLUMNS: usize = 80;

/// Lines of a card deck which start with this character hold 6-bit
/// codes written as pairs of octal digits, for bootstrap programs
/// which cannot be typed as text.
pub const OCTAL_CARD_MARKER: char = '~';

#[derive(Debug, PartialEq, Eq)]
pub struct BadCard {
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for BadCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "card {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for BadCard {}

/// One card of a deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Card {
    /// Host text, one character per column.
    Text(String),
    /// Raw 6-bit codes.
    Codes(Vec<u8>),
}

impl Card {
    fn parse(line_number: usize, line: &str) -> Result<Card, BadCard> {
        let Some(octal) = line.strip_prefix(OCTAL_CARD_MARKER) else {
            return Ok(Card::Text(line.to_ascii_uppercase()));
        };
        let digits: Vec<u32> = octal
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| {
                ch.to_digit(8).ok_or_else(|| BadCard {
                    line: line_number,
                    reason: format!("{ch:?} is not an octal digit"),
                })
            })
            .collect::<Result<_, _>>()?;
        if digits.len() % 2 != 0 {
            return Err(BadCard {
                line: line_number,
                reason: "octal codes need two digits each".to_string(),
            });
        }
        Ok(Card::Codes(
            digits
                .chunks(2)
                .map(|pair| (pair[0] * 8 + pair[1]) as u8)
                .collect(),
        ))
    }

    /// The characters the reader delivers for this card, in host
    /// (alpha) or 6-bit (binary) form.
    pub fn image(&self, mode: TransferMode) -> Vec<u8> {
        match self {
            Card::Codes(codes) => match mode {
                TransferMode::Binary => codes.clone(),
                TransferMode::Alpha => bic_to_string(codes).into_bytes(),
            },
            Card::Text(s) => {
                let text: String = s
                    .chars()
                    .chain(std::iter::repeat(' '))
                    .take(CARD_COLUMNS)
                    .collect();
                match mode {
                    TransferMode::Alpha => text.into_bytes(),
                    TransferMode::Binary => string_to_bic(&text),
                }
            }
        }
    }
}

pub fn parse_deck(text: &str) -> Result<VecDeque<Card>, BadCard> {
    text.lines()
        .enumerate()
        .map(|(i, line)| Card::parse(i + 1, line))
        .collect()
}

/// A card reader.  It is ready for as long as there are cards in the
/// hopper.
pub struct CardReader {
    hopper: VecDeque<Card>,
    line: Option<StatusLine>,
}

impl CardReader {
    pub fn new(hopper: VecDeque<Card>) -> CardReader {
        CardReader { hopper, line: None }
    }
}

impl Device for CardReader {
    fn name(&self) -> String {
        "card reader".to_string()
    }

    fn attach(&mut self, line: StatusLine) {
        line.status_change(!self.hopper.is_empty());
        self.line = Some(line);
    }

    fn read(&mut self, req: DeviceRequest, done: Completion) {
        let Some(card) = self.hopper.pop_front() else {
            done.finish(NOT_READY_MASK, 0, Vec::new());
            return;
        };
        let mut image = card.image(req.mode);
        image.truncate(req.length);
        if self.hopper.is_empty() {
            event!(Level::INFO, "card reader hopper is empty");
            if let Some(line) = &self.line {
                line.status_change(false);
            }
        }
        let length = image.len();
        done.finish(0, length, image);
    }

    fn write(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }
}

/// The text carried by a write request.
fn request_text(req: &DeviceRequest) -> String {
    match req.mode {
        TransferMode::Alpha => String::from_utf8_lossy(&req.buffer).into_owned(),
        TransferMode::Binary => bic_to_string(&req.buffer),
    }
}

/// A line printer, which prints on the terminal and signals "printer
/// finished" after each line.
pub struct LinePrinter {
    out: TerminalWriter,
    line: Option<StatusLine>,
}

impl LinePrinter {
    pub fn new() -> LinePrinter {
        LinePrinter {
            out: TerminalWriter::new(Color::Cyan),
            line: None,
        }
    }
}

impl Device for LinePrinter {
    fn name(&self) -> String {
        "line printer".to_string()
    }

    fn attach(&mut self, line: StatusLine) {
        line.status_change(true);
        self.line = Some(line);
    }

    fn read(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }

    fn write(&mut self, req: DeviceRequest, done: Completion) {
        let text = request_text(&req);
        if let Err(e) = self.out.write_line("LP: ", text.trim_end()) {
            event!(Level::WARN, "line printer output failed: {}", e);
        }
        let length = req.buffer.len();
        done.finish(0, length, Vec::new());
        if let Some(line) = &self.line {
            line.signal();
        }
    }

    fn space(&mut self, _req: DeviceRequest, done: Completion) {
        if let Err(e) = self.out.write_line("LP: ", "") {
            event!(Level::WARN, "line printer output failed: {}", e);
        }
        done.finish(0, 0, Vec::new());
    }
}

/// The operator's console typewriter.  It only types; there is no
/// keyboard, so reads deliver an empty message.
pub struct Spo {
    out: TerminalWriter,
}

impl Spo {
    pub fn new() -> Spo {
        Spo {
            out: TerminalWriter::new(Color::Green),
        }
    }
}

impl Device for Spo {
    fn name(&self) -> String {
        "console typewriter".to_string()
    }

    fn attach(&mut self, line: StatusLine) {
        line.status_change(true);
    }

    fn read(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(0, 0, Vec::new());
    }

    fn write(&mut self, req: DeviceRequest, done: Completion) {
        let text = request_text(&req);
        if let Err(e) = self.out.write_line("SPO: ", text.trim_end()) {
            event!(Level::WARN, "console output failed: {}", e);
        }
        let length = req.buffer.len();
        done.finish(0, length, Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_card_is_padded_to_80_columns() {
        let deck = parse_deck("?run hello\n").expect("valid deck");
        assert_eq!(deck.len(), 1);
        let image = deck[0].image(TransferMode::Alpha);
        assert_eq!(image.len(), CARD_COLUMNS);
        assert_eq!(&image[..10], b"?RUN HELLO");
        assert_eq!(image[79], b' ');
    }

    #[test]
    fn test_text_card_in_binary_mode() {
        let card = Card::Text("A1".to_string());
        let image = card.image(TransferMode::Binary);
        assert_eq!(image.len(), CARD_COLUMNS);
        assert_eq!(&image[..2], &[0o21, 0o01]);
        assert_eq!(image[2], 0o60);
    }

    #[test]
    fn test_octal_card() {
        let deck = parse_deck("~ 00 01 77\nPLAIN").expect("valid deck");
        assert_eq!(deck[0], Card::Codes(vec![0, 1, 0o77]));
        assert_eq!(deck[0].image(TransferMode::Binary), vec![0, 1, 0o77]);
        assert_eq!(deck[1], Card::Text("PLAIN".to_string()));
    }

    #[test]
    fn test_bad_octal_card() {
        assert_eq!(
            parse_deck("OK\n~0181"),
            Err(BadCard {
                line: 2,
                reason: "'8' is not an octal digit".to_string()
            })
        );
        assert!(parse_deck("~012").is_err());
    }
}
