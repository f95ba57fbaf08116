// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The in-page observer script, evaluated in the attached page and
//! re-registered to survive navigations.

/// Walks the document (and shadow roots) for visible interactive elements,
/// dedupes by JSON equality, and calls back through `__domSyncCallback__`
/// with the compact payload described in [`crate::snapshot`].
pub const OBSERVER_SCRIPT: &str = r#"
(() => {
  if (window.__domSyncInstalled__) return;
  window.__domSyncInstalled__ = true;

  const SELECTORS = {
    input: 'input, textarea, select',
    button: 'button, [role="button"]',
    link: 'a[href]',
    image: 'img, svg, canvas',
    media: 'video, audio',
  };
  const ALL_SELECTOR = Object.values(SELECTORS).join(', ');

  let nextId = 1;
  let lastPayloadJson = null;
  let pendingTimer = null;

  function isVisible(el) {
    const rect = el.getBoundingClientRect();
    if (rect.width < 2 || rect.height < 2) return false;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
    if (el.tagName === 'INPUT' && el.type === 'hidden') return false;
    return true;
  }

  function stableId(el) {
    if (!el.dataset.domSyncId) {
      el.dataset.domSyncId = 'ds-' + (nextId++);
    }
    return el.dataset.domSyncId;
  }

  function walkRoot(root, out) {
    root.querySelectorAll(ALL_SELECTOR).forEach((el) => {
      if (!isVisible(el)) return;
      out.push({
        id: stableId(el),
        tag: el.tagName.toLowerCase(),
        type: el.getAttribute('type') || undefined,
        rect: (() => {
          const r = el.getBoundingClientRect();
          return { x: r.x, y: r.y, w: r.width, h: r.height };
        })(),
      });
      if (el.shadowRoot) walkRoot(el.shadowRoot, out);
    });
  }

  function collect() {
    const elements = [];
    walkRoot(document, elements);
    return {
      e: elements,
      v: { w: window.innerWidth, h: window.innerHeight, sx: window.scrollX, sy: window.scrollY },
      b: {
        x: window.screenX, y: window.screenY,
        w: window.outerWidth, h: window.outerHeight,
        ct: window.outerHeight - window.innerHeight,
        cl: window.outerWidth - window.innerWidth,
        fs: document.fullscreenElement != null,
      },
      u: location.href,
    };
  }

  function emit() {
    const payload = collect();
    const json = JSON.stringify(payload);
    if (json === lastPayloadJson) return;
    lastPayloadJson = json;
    if (window.__domSyncCallback__) window.__domSyncCallback__(json);
  }

  function scheduleThrottled() {
    if (pendingTimer) return;
    pendingTimer = setTimeout(() => {
      pendingTimer = null;
      emit();
    }, 150);
  }

  const observer = new MutationObserver(() => scheduleThrottled());
  observer.observe(document.body || document.documentElement, {
    childList: true, subtree: true,
    attributeFilter: ['style', 'class', 'hidden', 'disabled', 'type'],
  });

  window.addEventListener('scroll', scheduleThrottled, { passive: true });
  window.addEventListener('resize', scheduleThrottled, { passive: true });
  window.addEventListener('focusin', scheduleThrottled, { passive: true });

  setInterval(emit, 500);
  [0, 50, 150, 300, 600, 1200].forEach((delay) => setTimeout(emit, delay));
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_script_is_self_invoking_and_guards_reinstall() {
        assert!(OBSERVER_SCRIPT.contains("__domSyncInstalled__"));
        assert!(OBSERVER_SCRIPT.trim_start().starts_with('('));
    }
}
