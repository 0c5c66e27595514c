// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Status screens. There is no font: every message is a fixed bitmap of
//! `O` (white) and ` ` (black) cells, scaled up and painted straight into
//! the framebuffer.

use consts::{FB_HEIGHT, FB_STRIDE, FB_WIDTH};

/// What the loader can put on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Screen {
    NoSd,
    NoBin,
    BigBin,
    UpdateDone,
    UpdateFailed,
}

pub trait Display {
    /// Brings the panel up if needed, clears it and draws `screen`.
    fn show(&mut self, screen: Screen);

    /// Draws the update progress bar at `percent` (0..=100).
    fn show_progress(&mut self, percent: u8);

    /// Takes effect once the panel is up, if it is not already.
    fn set_backlight(&mut self, on: bool);

    /// Powers the panel down.
    fn shutdown(&mut self);
}

/// Panel bring-up and teardown, provided by the board.
pub trait Panel {
    /// Makes the memory behind the framebuffer usable. Runs before the
    /// buffer is first touched.
    fn prepare(&mut self) {}

    /// Starts scanning out the framebuffer.
    fn init(&mut self);

    fn set_backlight(&mut self, on: bool);

    fn end(&mut self);
}

/// A bitmap message with its placement.
pub struct Glyph {
    pub rows: &'static str,
    pub x: i32,
    pub y: i32,
    pub scale: i32,
}

pub const NO_SD: Glyph = Glyph {
    rows: "O   O OOOOO  OOOOO OOOO \n\
           OO  O O   O  O     O   O\n\
           O O O O   O  OOOOO O   O\n\
           O  OO O   O      O O   O\n\
           O   O OOOOO  OOOOO OOOO \n",
    x: 50,
    y: 50,
    scale: 50,
};

pub const BIG_BIN: Glyph = Glyph {
    rows: "OOOO  OOO OOOOO  OOOO  OOO O   O\n\
           O   O  O  O      O   O  O  OO  O\n\
           OOOO   O  O  OO  OOOO   O  O O O\n\
           O   O  O  O   O  O   O  O  O  OO\n\
           OOOO  OOO OOOOO  OOOO  OOO O   O\n",
    x: 48,
    y: 48,
    scale: 37,
};

pub const NO_BIN: Glyph = Glyph {
    rows: "O   O OOOOO  OOOO  OOO O   O\n\
           OO  O O   O  O   O  O  OO  O\n\
           O O O O   O  OOOO   O  O O O\n\
           O  OO O   O  O   O  O  O  OO\n\
           O   O OOOOO  OOOO  OOO O   O\n",
    x: 52,
    y: 52,
    scale: 42,
};

pub const DONE: Glyph = Glyph {
    rows: "OOOO   OOO  O   O OOOOO\n\
           O   O O   O OO  O O    \n\
           O   O O   O O O O OOOO \n\
           O   O O   O O  OO O    \n\
           OOOO   OOO  O   O OOOOO\n",
    x: 50,
    y: 50,
    scale: 45,
};

pub const FAIL: Glyph = Glyph {
    rows: "OOOOO  OOO  OOO O    \n\
           O     O   O  O  O    \n\
           OOOO  OOOOO  O  O    \n\
           O     O   O  O  O    \n\
           O     O   O OOO OOOOO\n",
    x: 50,
    y: 50,
    scale: 50,
};

impl Screen {
    pub fn glyph(&self) -> &'static Glyph {
        match self {
            Self::NoSd => &NO_SD,
            Self::NoBin => &NO_BIN,
            Self::BigBin => &BIG_BIN,
            Self::UpdateDone => &DONE,
            Self::UpdateFailed => &FAIL,
        }
    }
}

pub const WHITE: u32 = 0x00FF_FFFF;
pub const BLACK: u32 = 0x0000_0000;

/// Progress bar placement, in screen pixels.
const BAR_X: i32 = 140;
const BAR_Y: i32 = 500;
const BAR_HEIGHT: i32 = 40;
const BAR_CELL: i32 = 10;

/// The framebuffer seen in screen coordinates: `x` runs along the 1280-pixel
/// edge, `y` along the 720-pixel one.
pub struct Canvas<'a> {
    fb: &'a mut [u32],
}

impl<'a> Canvas<'a> {
    pub const LEN: usize = FB_WIDTH * FB_STRIDE;

    pub fn new(fb: &'a mut [u32]) -> Self {
        Self { fb }
    }

    pub fn clear(&mut self) {
        self.fb.fill(BLACK);
    }

    /// Framebuffer index of a screen pixel, or `None` when it is off screen.
    pub fn index(x: i32, y: i32) -> Option<usize> {
        if y <= 0 || y >= FB_HEIGHT as i32 {
            return None;
        }
        let column = usize::try_from(FB_WIDTH as i32 - x).ok()?;
        if column >= FB_WIDTH {
            return None;
        }
        Some(y as usize + column * FB_STRIDE)
    }

    pub fn put(&mut self, x: i32, y: i32, color: u32) {
        if let Some(pixel) = Self::index(x, y).and_then(|i| self.fb.get_mut(i)) {
            *pixel = color;
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: i32, height: i32, color: u32) {
        for i in 0..width {
            for j in 0..height {
                self.put(x + i, y + j, color);
            }
        }
    }

    /// Paints `glyph`. Cells marked `*` are left untouched.
    pub fn draw(&mut self, glyph: &Glyph) {
        let mut x = 0;
        let mut y = 0;

        for cell in glyph.rows.chars() {
            if cell == '\n' {
                x = 0;
                y += 1;
                continue;
            }

            if cell != '*' {
                let color = if cell == ' ' { BLACK } else { WHITE };
                self.fill_rect(glyph.x + x * glyph.scale, glyph.y + y * glyph.scale, glyph.scale, glyph.scale, color);
            }

            x += 1;
        }
    }

    /// One cell per percent; the outline is the full 100 cells.
    pub fn draw_progress(&mut self, percent: u8) {
        let percent = i32::from(percent.min(100));
        self.fill_rect(BAR_X - 2, BAR_Y - 2, 100 * BAR_CELL + 4, BAR_HEIGHT + 4, WHITE);
        self.fill_rect(BAR_X, BAR_Y, 100 * BAR_CELL, BAR_HEIGHT, BLACK);
        self.fill_rect(BAR_X, BAR_Y, percent * BAR_CELL, BAR_HEIGHT, WHITE);
    }
}

/// [`Display`] over a memory framebuffer and a board panel.
pub struct FramebufferDisplay<'a, P> {
    fb: &'a mut [u32],
    panel: P,
    up: bool,
    /// Backlight state to apply once the panel is up.
    backlight: bool,
}

impl<'a, P: Panel> FramebufferDisplay<'a, P> {
    pub fn new(fb: &'a mut [u32], panel: P) -> Self {
        Self {
            fb,
            panel,
            up: false,
            backlight: false,
        }
    }

    fn canvas(&mut self) -> Canvas<'_> {
        Canvas::new(&mut *self.fb)
    }

    fn bring_up(&mut self) {
        if !self.up {
            self.panel.prepare();
            // Clear before the panel scans out the buffer.
            self.canvas().clear();
            self.panel.init();
            self.up = true;
            if self.backlight {
                self.panel.set_backlight(true);
            }
        }
    }
}

impl<P: Panel> Display for FramebufferDisplay<'_, P> {
    fn show(&mut self, screen: Screen) {
        self.bring_up();
        let mut canvas = self.canvas();
        canvas.clear();
        canvas.draw(screen.glyph());
    }

    fn show_progress(&mut self, percent: u8) {
        self.bring_up();
        self.canvas().draw_progress(percent);
    }

    fn set_backlight(&mut self, on: bool) {
        self.backlight = on;
        if self.up {
            self.panel.set_backlight(on);
        }
    }

    fn shutdown(&mut self) {
        if self.up {
            self.panel.end();
            self.up = false;
            self.backlight = false;
        }
    }
}
