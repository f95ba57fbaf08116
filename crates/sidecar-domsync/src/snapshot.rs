// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The DOM position snapshot shape broadcast to subscribers.

use serde::{Deserialize, Serialize};
use sidecar_core::Rect;

/// The five node categories the injected observer walks the document for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Input,
    Button,
    Link,
    Image,
    Media,
    /// Synthesized by the host, not reported by the observer script.
    Addressbar,
}

impl Category {
    fn from_wire(tag: &str, type_attr: Option<&str>) -> Self {
        match tag {
            "input" | "textarea" | "select" => Self::Input,
            "button" => Self::Button,
            "a" => Self::Link,
            "img" | "svg" | "canvas" => Self::Image,
            "video" | "audio" => Self::Media,
            _ if type_attr == Some("button") => Self::Button,
            _ => Self::Input,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomElement {
    pub id: String,
    pub tag: String,
    pub category: Category,
    pub rect: Rect,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Viewport {
    pub w: f64,
    pub h: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WindowBounds {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub chrome_top: f64,
    pub chrome_left: f64,
    pub fullscreen: bool,
}

/// A fully assembled, broadcastable DOM position snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DomSnapshot {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub viewport: Viewport,
    pub window: WindowBounds,
    pub url: String,
    pub elements: Vec<DomElement>,
}

// --- compact wire payload, as produced by the injected observer script ---

#[derive(Debug, Deserialize)]
pub(crate) struct CompactRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompactElement {
    pub id: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub type_attr: Option<String>,
    pub rect: CompactRect,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompactViewport {
    pub w: f64,
    pub h: f64,
    #[serde(default)]
    pub sx: f64,
    #[serde(default)]
    pub sy: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompactBounds {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub ct: f64,
    pub cl: f64,
    pub fs: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompactPayload {
    pub e: Vec<CompactElement>,
    pub v: CompactViewport,
    pub b: CompactBounds,
    pub u: String,
}

/// Hard-coded pixel offsets for the synthetic "addressbar" element, tuned for
/// the container's default browser chrome.
const ADDRESSBAR_LEFT_MARGIN: f64 = 140.0;
const ADDRESSBAR_RIGHT_RESERVE: f64 = 350.0;
const ADDRESSBAR_HEIGHT: f64 = 35.0;
const CHROME_HEIGHT_THRESHOLD: f64 = 50.0;

fn addressbar_element(bounds: &CompactBounds) -> Option<DomElement> {
    if bounds.fs || bounds.ct <= CHROME_HEIGHT_THRESHOLD {
        return None;
    }
    let w = (bounds.w - ADDRESSBAR_LEFT_MARGIN - ADDRESSBAR_RIGHT_RESERVE).max(0.0);
    Some(DomElement {
        id: "__addressbar__".to_string(),
        tag: "addressbar".to_string(),
        category: Category::Addressbar,
        rect: Rect::new(bounds.x + ADDRESSBAR_LEFT_MARGIN, bounds.y, w, ADDRESSBAR_HEIGHT),
        z: i32::MAX,
    })
}

/// Converts a parsed compact payload plus a host-assigned `seq` into a full
/// snapshot, synthesizing the addressbar element when applicable.
pub(crate) fn build_snapshot(payload: CompactPayload, seq: u64, timestamp_ms: u64) -> DomSnapshot {
    let mut elements: Vec<DomElement> = payload
        .e
        .iter()
        .enumerate()
        .map(|(z, el)| DomElement {
            id: el.id.clone(),
            tag: el.tag.clone(),
            category: Category::from_wire(&el.tag, el.type_attr.as_deref()),
            rect: Rect::new(el.rect.x, el.rect.y, el.rect.w, el.rect.h),
            z: i32::try_from(z).unwrap_or(i32::MAX),
        })
        .collect();

    if let Some(addressbar) = addressbar_element(&payload.b) {
        elements.push(addressbar);
    }

    DomSnapshot {
        seq,
        timestamp_ms,
        viewport: Viewport { w: payload.v.w, h: payload.v.h, scroll_x: payload.v.sx, scroll_y: payload.v.sy },
        window: WindowBounds {
            x: payload.b.x,
            y: payload.b.y,
            w: payload.b.w,
            h: payload.b.h,
            chrome_top: payload.b.ct,
            chrome_left: payload.b.cl,
            fullscreen: payload.b.fs,
        },
        url: payload.u,
        elements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload(chrome_top: f64, fullscreen: bool) -> CompactPayload {
        CompactPayload {
            e: vec![CompactElement {
                id: "el-1".to_string(),
                tag: "button".to_string(),
                type_attr: None,
                rect: CompactRect { x: 10.0, y: 20.0, w: 30.0, h: 40.0 },
            }],
            v: CompactViewport { w: 1280.0, h: 720.0, sx: 0.0, sy: 0.0 },
            b: CompactBounds { x: 0.0, y: 0.0, w: 1280.0, h: 800.0, ct: chrome_top, cl: 0.0, fs: fullscreen },
            u: "https://example.com".to_string(),
        }
    }

    #[test]
    fn addressbar_synthesized_when_chrome_tall_enough() {
        let snapshot = build_snapshot(sample_payload(80.0, false), 1, 0);
        assert!(snapshot.elements.iter().any(|e| e.category == Category::Addressbar));
    }

    #[test]
    fn addressbar_omitted_when_fullscreen() {
        let snapshot = build_snapshot(sample_payload(80.0, true), 1, 0);
        assert!(!snapshot.elements.iter().any(|e| e.category == Category::Addressbar));
    }

    #[test]
    fn addressbar_omitted_when_chrome_too_short() {
        let snapshot = build_snapshot(sample_payload(20.0, false), 1, 0);
        assert!(!snapshot.elements.iter().any(|e| e.category == Category::Addressbar));
    }
}
