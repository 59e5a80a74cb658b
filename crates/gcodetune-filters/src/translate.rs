//! XY translation
//!
//! Moves a whole program in the X/Y plane. Absolute moves are patched in
//! place; relative programs are shifted with one rapid move right after
//! homing. G92 redefinitions of the reference point absorb the pending
//! translation so later moves stay untouched.

use gcodetune_core::{FilterAction, Line, LineFilter, Result};
use tracing::warn;

/// Filter shifting every XY position by a fixed offset
pub struct TranslateFilter {
    translate_x: f64,
    translate_y: f64,
    first_move_after_home: bool,
    /// `None` until the program selects G90 or G91
    absolute_mode: Option<bool>,
}

impl TranslateFilter {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            translate_x: x,
            translate_y: y,
            first_move_after_home: false,
            absolute_mode: None,
        }
    }

    fn translation_move(&self) -> Line {
        Line::from_raw(&format!(
            "G0 X{:.4} Y{:.4}",
            self.translate_x, self.translate_y
        ))
    }
}

impl LineFilter for TranslateFilter {
    fn name(&self) -> &str {
        "translate"
    }

    fn process(&mut self, line: &Line) -> Result<FilterAction> {
        if line.is_move() {
            let Some(absolute) = self.absolute_mode else {
                warn!(line = %line.raw, "move before G90/G91, left untouched");
                return Ok(FilterAction::Unchanged);
            };

            if !absolute {
                // relative programs only need one shift, right after homing
                if self.first_move_after_home {
                    self.first_move_after_home = false;
                    return Ok(FilterAction::Replace(vec![
                        self.translation_move(),
                        line.clone(),
                    ]));
                }
                return Ok(FilterAction::Unchanged);
            }

            let mut patched = line.clone();
            let mut dirty = false;
            if patched.x.is_some() && self.translate_x != 0.0 {
                patched.x = patched.x.map(|x| x + self.translate_x);
                dirty = true;
            }
            if patched.y.is_some() && self.translate_y != 0.0 {
                patched.y = patched.y.map(|y| y + self.translate_y);
                dirty = true;
            }
            if dirty {
                patched.rebuild();
                return Ok(FilterAction::Replace(vec![patched]));
            }
            return Ok(FilterAction::Unchanged);
        }

        match line.command_code() {
            Some(('G', 90)) => {
                self.absolute_mode = Some(true);
            }
            Some(('G', 91)) => {
                self.absolute_mode = Some(false);
            }
            Some(('G', 28)) => {
                self.first_move_after_home = true;
            }
            Some(('G', 92)) => {
                let mut patched = line.clone();
                if patched.x.is_none() && patched.y.is_none() && patched.z.is_none() {
                    // bare G92 means all axes zero; shift the new reference
                    // instead of every following move
                    patched.x = Some(-self.translate_x);
                    patched.y = Some(-self.translate_y);
                    self.translate_x = 0.0;
                    self.translate_y = 0.0;
                    patched.rebuild();
                    return Ok(FilterAction::Replace(vec![patched]));
                }
                let mut dirty = false;
                if patched.x.is_some() {
                    patched.x = patched.x.map(|x| x - self.translate_x);
                    self.translate_x = 0.0;
                    dirty = true;
                }
                if patched.y.is_some() {
                    patched.y = patched.y.map(|y| y - self.translate_y);
                    self.translate_y = 0.0;
                    dirty = true;
                }
                if dirty {
                    patched.rebuild();
                    return Ok(FilterAction::Replace(vec![patched]));
                }
            }
            _ => {}
        }
        Ok(FilterAction::Unchanged)
    }
}
