//! G-code line codec
//!
//! Parses one physical line of G-code text into a structured [`Line`] record
//! and serializes a record back to canonical text. Unknown tokens survive
//! verbatim through the retained raw text: a line that no filter ever touches
//! is rendered back byte-for-byte.

use serde::{Deserialize, Serialize};

/// Relative extrusion distances
pub const GCODE_RELATIVE_EXTRUSION: &str = "M83";

/// A single G-code line with parsed fields and resolved modal state
///
/// The `current_*` fields carry the cumulative machine state *after* this
/// line's explicit overrides have been applied; they are populated by
/// [`Document::parse`](crate::Document::parse) and stay `None` until the
/// corresponding modal value has been established by the program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Original (or re-encoded) text of the line, without the newline
    pub raw: String,
    /// Command mnemonic as written (e.g. "G1", "M107"); `None` for comments
    /// and blank lines
    pub command: Option<String>,
    /// Trailing comment, including the leading `;`
    pub comment: Option<String>,

    /// X coordinate field
    pub x: Option<f64>,
    /// Y coordinate field
    pub y: Option<f64>,
    /// Z coordinate field
    pub z: Option<f64>,
    /// Extrusion field
    pub e: Option<f64>,
    /// Feed rate field
    pub f: Option<f64>,
    /// Arc center X offset field
    pub i: Option<f64>,
    /// Arc center Y offset field
    pub j: Option<f64>,
    /// Parameter field (spindle speed, temperature, ...)
    pub s: Option<f64>,
    /// Parameter field (dwell time, ...)
    pub p: Option<f64>,

    /// Resolved absolute X position after this line
    pub current_x: Option<f64>,
    /// Resolved absolute Y position after this line
    pub current_y: Option<f64>,
    /// Resolved absolute Z position after this line
    pub current_z: Option<f64>,
    /// Resolved cumulative extrusion position after this line
    pub current_e: Option<f64>,
    /// Resolved feed rate after this line
    pub current_f: Option<f64>,

    /// Whether the extrusion field of this line is a relative amount
    pub relative_e: bool,
}

impl Line {
    /// Parse one physical line of G-code text.
    ///
    /// Fields may be written with or without separating whitespace
    /// (`G1 X10 Y2` and `G1X10Y2` are equivalent). Everything after the
    /// first `;` is kept as a comment, everything after a `*` checksum
    /// marker is ignored, and `N` line numbers are skipped.
    pub fn parse(text: &str) -> std::result::Result<Line, String> {
        let raw = text.trim_end_matches(['\r', '\n']).to_string();

        let mut line = Line {
            raw,
            ..Line::default()
        };

        let code = match line.raw.find(';') {
            Some(pos) => {
                line.comment = Some(line.raw[pos..].to_string());
                line.raw[..pos].to_string()
            }
            None => line.raw.clone(),
        };

        let mut chars = code.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch.is_whitespace() {
                continue;
            }
            if ch == '*' {
                // checksum marker, nothing of interest follows
                break;
            }
            if ch == '(' {
                // parenthesized comment, consume to the closing brace
                for inner in chars.by_ref() {
                    if inner == ')' {
                        break;
                    }
                }
                continue;
            }
            if !ch.is_ascii_alphabetic() {
                // controller syntax such as a leading % or $ command:
                // opaque to us, keep the whole line verbatim
                return Ok(Line {
                    raw: line.raw,
                    comment: line.comment,
                    ..Line::default()
                });
            }

            let letter = ch.to_ascii_uppercase();
            let mut value = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() || next == '.' || next == '-' || next == '+' {
                    value.push(next);
                    chars.next();
                } else {
                    break;
                }
            }

            match letter {
                'G' | 'M' | 'T' => {
                    if value.is_empty() {
                        return Err(format!("missing code number after '{}'", letter));
                    }
                    if line.command.is_none() {
                        line.command = Some(format!("{}{}", letter, value));
                    }
                }
                'N' => {} // program line number, irrelevant to processing
                'X' | 'Y' | 'Z' | 'E' | 'F' | 'I' | 'J' | 'S' | 'P' => {
                    let parsed: f64 = value
                        .parse()
                        .map_err(|_| format!("invalid number '{}' after '{}'", value, letter))?;
                    let slot = match letter {
                        'X' => &mut line.x,
                        'Y' => &mut line.y,
                        'Z' => &mut line.z,
                        'E' => &mut line.e,
                        'F' => &mut line.f,
                        'I' => &mut line.i,
                        'J' => &mut line.j,
                        'S' => &mut line.s,
                        _ => &mut line.p,
                    };
                    *slot = Some(parsed);
                }
                _ => {} // unknown word, rides along in raw
            }
        }

        Ok(line)
    }

    /// Build a line from trusted text (synthesized commands).
    ///
    /// Falls back to a raw-only record if the text does not tokenize, so
    /// opaque content still passes through verbatim.
    pub fn from_raw(text: &str) -> Line {
        Line::parse(text).unwrap_or_else(|_| Line {
            raw: text.trim_end_matches(['\r', '\n']).to_string(),
            ..Line::default()
        })
    }

    /// Command letter and integer code, e.g. `('G', 1)` for "G1" or "G01"
    pub fn command_code(&self) -> Option<(char, u32)> {
        let cmd = self.command.as_deref()?;
        let mut chars = cmd.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let digits: String = chars.take_while(|c| c.is_ascii_digit()).collect();
        let number = digits.parse().ok()?;
        Some((letter, number))
    }

    /// Whether this line is a motion command (G0/G1/G2/G3)
    pub fn is_move(&self) -> bool {
        matches!(self.command_code(), Some(('G', 0..=3)))
    }

    /// Whether this line carries an explicit X or Y field
    pub fn has_xy(&self) -> bool {
        self.x.is_some() || self.y.is_some()
    }

    /// Resolved XY position, once established
    pub fn xy(&self) -> Option<(f64, f64)> {
        match (self.current_x, self.current_y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }

    /// Re-encode mutated fields into canonical text.
    ///
    /// Field order is fixed (command, then X Y Z E F I J S P, then the
    /// comment); numbers are trimmed of trailing zeros.
    pub fn rebuild(&mut self) {
        self.raw = self.render();
    }

    /// Canonical text for this line's current fields
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(cmd) = &self.command {
            out.push_str(cmd);
        }
        for (letter, value) in [
            ("X", self.x),
            ("Y", self.y),
            ("Z", self.z),
            ("E", self.e),
            ("F", self.f),
            ("I", self.i),
            ("J", self.j),
            ("S", self.s),
            ("P", self.p),
        ] {
            if let Some(v) = value {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(letter);
                out.push_str(&format_number(v));
            }
        }
        if let Some(comment) = &self.comment {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(comment);
        }
        out
    }

    /// Numeric-field equality within `epsilon`; commands compared by code.
    pub fn approx_eq(&self, other: &Line, epsilon: f64) -> bool {
        if self.command_code() != other.command_code() {
            return false;
        }
        let pairs = [
            (self.x, other.x),
            (self.y, other.y),
            (self.z, other.z),
            (self.e, other.e),
            (self.f, other.f),
            (self.i, other.i),
            (self.j, other.j),
            (self.s, other.s),
            (self.p, other.p),
        ];
        pairs.iter().all(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => (a - b).abs() <= epsilon,
            (None, None) => true,
            _ => false,
        })
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Format a numeric field with up to five decimals, trailing zeros trimmed
pub fn format_number(value: f64) -> String {
    let mut s = format!("{:.5}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Round a value to the given number of decimal places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_move() {
        let line = Line::parse("G1 X10.5 Y-2 E0.42 F1800").unwrap();
        assert_eq!(line.command.as_deref(), Some("G1"));
        assert_eq!(line.x, Some(10.5));
        assert_eq!(line.y, Some(-2.0));
        assert_eq!(line.e, Some(0.42));
        assert_eq!(line.f, Some(1800.0));
        assert!(line.is_move());
    }

    #[test]
    fn test_parse_compact_form() {
        let line = Line::parse("G1X1.0Y2.0Z0.3").unwrap();
        assert_eq!(line.command.as_deref(), Some("G1"));
        assert_eq!(line.x, Some(1.0));
        assert_eq!(line.y, Some(2.0));
        assert_eq!(line.z, Some(0.3));
    }

    #[test]
    fn test_parse_zero_padded_command() {
        let line = Line::parse("G01 X1").unwrap();
        assert_eq!(line.command_code(), Some(('G', 1)));
        assert!(line.is_move());
    }

    #[test]
    fn test_parse_comment_only() {
        let line = Line::parse("; perimeter").unwrap();
        assert_eq!(line.command, None);
        assert_eq!(line.comment.as_deref(), Some("; perimeter"));
        assert!(!line.is_move());
    }

    #[test]
    fn test_parse_trailing_comment() {
        let line = Line::parse("G1 X4 ; outer wall").unwrap();
        assert_eq!(line.x, Some(4.0));
        assert_eq!(line.comment.as_deref(), Some("; outer wall"));
    }

    #[test]
    fn test_parse_line_number_and_checksum() {
        let line = Line::parse("N42 G1 X1 *71").unwrap();
        assert_eq!(line.command.as_deref(), Some("G1"));
        assert_eq!(line.x, Some(1.0));
    }

    #[test]
    fn test_parse_bad_number_is_error() {
        assert!(Line::parse("G1 X1..2").is_err());
    }

    #[test]
    fn test_program_marker_is_opaque() {
        let line = Line::parse("%").unwrap();
        assert_eq!(line.command, None);
        assert_eq!(line.raw, "%");
        assert!(!line.is_move());

        let line = Line::parse("$H ; grbl homing").unwrap();
        assert_eq!(line.command, None);
        assert_eq!(line.raw, "$H ; grbl homing");
    }

    #[test]
    fn test_render_round_trip() {
        let mut line = Line::parse("G1 X10.5 Y-2 E0.42").unwrap();
        line.rebuild();
        assert_eq!(line.raw, "G1 X10.5 Y-2 E0.42");
    }

    #[test]
    fn test_render_trims_zeros() {
        assert_eq!(format_number(1.5000), "1.5");
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-0.000001), "0");
        assert_eq!(format_number(0.125), "0.125");
    }

    #[test]
    fn test_approx_eq() {
        let a = Line::parse("G1 X1.0001 Y2").unwrap();
        let b = Line::parse("G1 X1.0002 Y2").unwrap();
        assert!(a.approx_eq(&b, 1e-3));
        assert!(!a.approx_eq(&b, 1e-6));
    }
}
