// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Small geometry types shared by the DOM-sync and recorder subsystems.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in CSS pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Minimum size for an element to count as visibly rendered: a
    /// `getBoundingClientRect()` of less than 2x2 is treated as collapsed.
    #[must_use]
    pub fn is_visibly_sized(&self) -> bool {
        self.w >= 2.0 && self.h >= 2.0
    }
}
