//! Auto-scroll decisions for the message list.

use crate::timeline::OrderKey;

/// Distance from the bottom, in viewport units, that still counts as pinned.
pub const DEFAULT_BOTTOM_THRESHOLD: f64 = 20.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollAction {
    None,
    ScrollToBottom,
    ShowIndicator,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScrollController {
    threshold: f64,
    pinned_to_bottom: bool,
    pending_indicator_visible: bool,
    /// Set when the next render must end at the bottom regardless of pin state.
    scroll_requested: bool,
    /// A scroll the view has not carried out yet.
    should_scroll_to_bottom: bool,
    seen_len: usize,
    /// Newest confirmed message already shown. A fetch window at its limit
    /// keeps the same length while sliding forward, so arrival checks both.
    seen_newest: Option<OrderKey>,
    rendered_any: bool,
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(DEFAULT_BOTTOM_THRESHOLD)
    }
}

impl ScrollController {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            pinned_to_bottom: true,
            pending_indicator_visible: false,
            scroll_requested: false,
            should_scroll_to_bottom: false,
            seen_len: 0,
            seen_newest: None,
            rendered_any: false,
        }
    }

    pub fn pinned_to_bottom(&self) -> bool {
        self.pinned_to_bottom
    }

    pub fn pending_indicator_visible(&self) -> bool {
        self.pending_indicator_visible
    }

    pub fn should_scroll_to_bottom(&self) -> bool {
        self.should_scroll_to_bottom
    }

    /// Forces the next change to scroll, e.g. after the user sends.
    pub fn request_scroll(&mut self) {
        self.scroll_requested = true;
    }

    /// Drops a forced scroll whose fetch never delivered.
    pub fn cancel_request(&mut self) {
        self.scroll_requested = false;
    }

    /// Called whenever the visible messages may have changed. `newest` is the
    /// order key of the latest confirmed message, if any.
    pub fn on_messages_changed(&mut self, len: usize, newest: Option<OrderKey>) -> ScrollAction {
        let previous = self.seen_len;
        self.seen_len = len;
        let slid_forward = newest.is_some() && newest > self.seen_newest;
        if newest.is_some() {
            self.seen_newest = newest;
        }
        if len == 0 {
            return ScrollAction::None;
        }

        let first_render = !self.rendered_any;
        self.rendered_any = true;

        if first_render || self.scroll_requested {
            self.scroll_requested = false;
            return self.scroll_to_bottom();
        }

        if len <= previous && !slid_forward {
            return ScrollAction::None;
        }

        if self.pinned_to_bottom {
            self.scroll_to_bottom()
        } else {
            self.pending_indicator_visible = true;
            ScrollAction::ShowIndicator
        }
    }

    /// Records a user scroll. Returns whether the viewport is now pinned.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        let at_bottom = metrics.distance_from_bottom() <= self.threshold;
        self.pinned_to_bottom = at_bottom;
        if at_bottom {
            self.pending_indicator_visible = false;
        }
        at_bottom
    }

    /// The "jump to latest" affordance.
    pub fn jump_to_latest(&mut self) -> ScrollAction {
        self.scroll_to_bottom()
    }

    /// The view finished scrolling.
    pub fn scroll_completed(&mut self) {
        self.should_scroll_to_bottom = false;
    }

    /// Forget message counts after the list was emptied locally.
    pub fn reset_count(&mut self) {
        self.seen_len = 0;
        self.seen_newest = None;
    }

    fn scroll_to_bottom(&mut self) -> ScrollAction {
        self.pinned_to_bottom = true;
        self.pending_indicator_visible = false;
        self.should_scroll_to_bottom = true;
        ScrollAction::ScrollToBottom
    }
}
