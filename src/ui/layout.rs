/// Width at which the inbox switches from a single pane to side-by-side panes.
pub const WIDE_BREAKPOINT: u32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewport {
    Narrow,
    Wide,
}

impl Viewport {
    pub fn from_width(width: u32) -> Self {
        if width >= WIDE_BREAKPOINT { Viewport::Wide } else { Viewport::Narrow }
    }
}

/// Which panes of the inbox are visible.
///
/// Narrow viewports show either the list or the detail; wide ones always show
/// both, and the toggles only matter for the profile overlay. Selection lives
/// elsewhere so collapsing to the list never forgets the open record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneLayout {
    viewport: Viewport,
    show_list: bool,
    show_detail: bool,
    show_profile: bool,
}

impl PaneLayout {
    pub fn new(width: u32) -> Self {
        Self {
            viewport: Viewport::from_width(width),
            show_list: true,
            show_detail: false,
            show_profile: false,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn list_visible(&self) -> bool {
        self.viewport == Viewport::Wide || self.show_list
    }

    pub fn detail_visible(&self) -> bool {
        self.viewport == Viewport::Wide || self.show_detail
    }

    pub fn profile_visible(&self) -> bool {
        self.show_profile
    }

    /// A record was picked from the list.
    pub fn on_select(&mut self) {
        if self.viewport == Viewport::Narrow {
            self.show_list = false;
            self.show_detail = true;
        }
    }

    /// The "back" action from the detail pane.
    pub fn back(&mut self) {
        self.show_list = true;
        self.show_detail = false;
        self.show_profile = false;
    }

    /// Re-open the detail pane for the already selected record.
    pub fn show_detail(&mut self) {
        if self.viewport == Viewport::Narrow {
            self.show_list = false;
        }
        self.show_detail = true;
    }

    pub fn toggle_profile(&mut self) {
        self.show_profile = !self.show_profile;
    }

    /// Resizing onto a wide viewport always brings the list back; detail
    /// visibility is left as it was.
    pub fn resize(&mut self, width: u32) {
        self.viewport = Viewport::from_width(width);
        if self.viewport == Viewport::Wide {
            self.show_list = true;
        }
    }
}

/// The record currently open, independent of pane visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    id: Option<String>,
}

impl Selection {
    pub fn get(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the previously selected id if it changed.
    pub fn set(&mut self, id: &str) -> Option<String> {
        if self.id.as_deref() == Some(id) {
            return None;
        }
        self.id.replace(id.to_string())
    }

    pub fn clear(&mut self) -> Option<String> {
        self.id.take()
    }
}
