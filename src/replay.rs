//! Headless host: replay a touch script into a view backed by `MemorySurface`
//! and read the final frame back as text.
//!
//! Script format, one step per line:
//!
//! ```text
//! # comment
//! 0 25 45 0.8 3; 1 200 300      one touch batch: id x y [pressure [size]], ';' between pointers
//! up 1                          pointer 1 lifted
//! resize 800 480                surface size changed
//! ```

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::color::{Color, ColorTable};
use crate::input::TouchSample;
use crate::surface::{Canvas, MemoryCanvas, MemorySurface, PIXEL_FORMAT_RGBA_8888};
use crate::view::TouchGridView;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Batch(Vec<TouchSample>),
    Release(i32),
    Resize(u32, u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ScriptError {}

fn field<T: std::str::FromStr>(token: Option<&str>, name: &str, line: usize) -> Result<T, ScriptError> {
    let token = token.ok_or_else(|| ScriptError {
        line,
        message: format!("missing {}", name),
    })?;
    token.parse().map_err(|_| ScriptError {
        line,
        message: format!("invalid {} '{}'", name, token),
    })
}

fn parse_sample(text: &str, line: usize) -> Result<TouchSample, ScriptError> {
    let mut tokens = text.split_whitespace();
    let id: i32 = field(tokens.next(), "pointer id", line)?;
    let x: f32 = field(tokens.next(), "x", line)?;
    let y: f32 = field(tokens.next(), "y", line)?;
    let mut sample = TouchSample::new(id, x, y);
    if let Some(token) = tokens.next() {
        sample = sample.with_pressure(field(Some(token), "pressure", line)?);
    }
    if let Some(token) = tokens.next() {
        sample = sample.with_size(field(Some(token), "size", line)?);
    }
    if let Some(extra) = tokens.next() {
        return Err(ScriptError {
            line,
            message: format!("unexpected '{}'", extra),
        });
    }
    Ok(sample)
}

pub fn parse_script(script: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    for (i, raw) in script.lines().enumerate() {
        let line = i + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }

        let mut tokens = text.split_whitespace();
        match tokens.next() {
            Some("up") => {
                steps.push(ScriptStep::Release(field(tokens.next(), "pointer id", line)?));
            }
            Some("resize") => {
                let width = field(tokens.next(), "width", line)?;
                let height = field(tokens.next(), "height", line)?;
                steps.push(ScriptStep::Resize(width, height));
            }
            _ => {
                let batch = text
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_sample(s, line))
                    .collect::<Result<Vec<_>, _>>()?;
                steps.push(ScriptStep::Batch(batch));
            }
        }
    }
    Ok(steps)
}

/// Drive `view` through `steps`, pausing `settle` after each one so the render
/// thread posts the result.
pub fn run(view: &mut TouchGridView<MemorySurface>, steps: &[ScriptStep], settle: Duration) {
    for step in steps {
        match step {
            ScriptStep::Batch(samples) => {
                let report = view.on_touch_batch(samples);
                if report.out_of_bounds > 0 || report.truncated > 0 {
                    log::info!(
                        "Batch: {} applied, {} out of bounds, {} truncated",
                        report.applied,
                        report.out_of_bounds,
                        report.truncated
                    );
                }
            }
            ScriptStep::Release(id) => {
                view.on_pointer_released(*id);
            }
            ScriptStep::Resize(width, height) => {
                view.host().resize(*width, *height);
                view.on_surface_size_changed(*width, *height, PIXEL_FORMAT_RGBA_8888);
            }
        }
        thread::sleep(settle);
    }
}

/// Render a frame as one character per block: `.` for background, the pointer
/// slot digit for a table color, `?` for anything else. Rows follow the screen.
pub fn frame_to_text(frame: &MemoryCanvas, block_size: u32, colors: &ColorTable, background: Color) -> String {
    let (width, height) = frame.size();
    let mut out = String::new();
    if block_size == 0 {
        return out;
    }
    for top in (0..height).step_by(block_size as usize) {
        for left in (0..width).step_by(block_size as usize) {
            let x = (left + block_size / 2).min(width - 1);
            let y = (top + block_size / 2).min(height - 1);
            let ch = match frame.pixel(x, y) {
                Some(c) if c == background => '.',
                Some(c) => colors
                    .slot_of(c)
                    .and_then(|slot| char::from_digit(slot as u32, 10))
                    .unwrap_or('?'),
                None => '?',
            };
            out.push(ch);
        }
        out.push('\n');
    }
    out
}
