use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use url::Url;

/// Serialization of an opaque origin.
const OPAQUE_ORIGIN: &str = "null";

/// A frame's location: the full href plus its serialized origin
/// (`scheme://host[:port]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLocation {
    pub href: String,
    pub origin: String,
}

impl FrameLocation {
    /// Parse an href into a location. Returns `None` when the href is not an
    /// absolute URL.
    pub fn parse(href: &str) -> Option<Self> {
        let url = Url::parse(href).ok()?;
        Some(Self {
            href: url.to_string(),
            origin: url.origin().ascii_serialization(),
        })
    }

    pub fn is_https(&self) -> bool {
        self.href.starts_with("https:")
    }
}

/// What reading `window.parent.location` yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentAccess {
    /// The parent is the frame itself.
    TopLevel,
    /// The parent location is readable, so the frame is embedded by a page
    /// whose origin can be compared.
    Readable(FrameLocation),
    /// Reading the parent location raised a cross-origin security error.
    Denied,
    /// No window is available to ask (headless or non-browser host).
    Unavailable,
}

/// Source of frame information. In a browser this wraps `window`; hosts and
/// tests supply their own.
pub trait FrameView: Send + Sync {
    /// Location of the current frame.
    fn location(&self) -> FrameLocation;

    /// Result of reading the parent frame's location.
    fn parent(&self) -> ParentAccess;

    fn is_https(&self) -> bool {
        self.location().is_https()
    }
}

/// A frame view with fixed answers, changeable at runtime.
#[derive(Debug)]
pub struct StaticFrame {
    location: FrameLocation,
    parent: Mutex<ParentAccess>,
}

impl StaticFrame {
    pub fn new(location: FrameLocation, parent: ParentAccess) -> Self {
        Self {
            location,
            parent: Mutex::new(parent),
        }
    }

    /// A top-level page at `href`. Falls back to an opaque location if the
    /// href does not parse.
    pub fn top_level(href: &str) -> Self {
        Self::new(location_or_opaque(href), ParentAccess::TopLevel)
    }

    /// A frame at `href` embedded by a page at `parent_href`. The parent is
    /// readable when both share an origin and denied otherwise, the way a
    /// browser answers. Opaque origins never match, not even each other.
    pub fn framed(href: &str, parent_href: &str) -> Self {
        let location = location_or_opaque(href);
        let parent = location_or_opaque(parent_href);
        let opaque = parent.origin == OPAQUE_ORIGIN || location.origin == OPAQUE_ORIGIN;
        let access = if !opaque && parent.origin == location.origin {
            ParentAccess::Readable(parent)
        } else {
            ParentAccess::Denied
        };
        Self::new(location, access)
    }

    pub fn set_parent(&self, parent: ParentAccess) {
        if let Ok(mut guard) = self.parent.lock() {
            *guard = parent;
        }
    }
}

impl FrameView for StaticFrame {
    fn location(&self) -> FrameLocation {
        self.location.clone()
    }

    fn parent(&self) -> ParentAccess {
        self.parent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(ParentAccess::Unavailable)
    }
}

fn location_or_opaque(href: &str) -> FrameLocation {
    FrameLocation::parse(href).unwrap_or_else(|| FrameLocation {
        href: href.to_string(),
        origin: OPAQUE_ORIGIN.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_drops_path_and_default_port() {
        let loc = FrameLocation::parse("https://app.example.com:443/patients?id=1").unwrap();
        assert_eq!(loc.origin, "https://app.example.com");
        assert!(loc.is_https());

        let loc = FrameLocation::parse("http://localhost:5173/").unwrap();
        assert_eq!(loc.origin, "http://localhost:5173");
        assert!(!loc.is_https());
    }

    #[test]
    fn test_parse_rejects_relative() {
        assert!(FrameLocation::parse("/login").is_none());
    }

    #[test]
    fn test_framed_same_origin_is_readable() {
        let view = StaticFrame::framed(
            "https://app.example.com/embed",
            "https://app.example.com/dashboard",
        );
        assert!(matches!(view.parent(), ParentAccess::Readable(_)));
    }

    #[test]
    fn test_framed_cross_origin_is_denied() {
        let view = StaticFrame::framed("https://app.example.com/", "https://partner.example.org/");
        assert_eq!(view.parent(), ParentAccess::Denied);

        view.set_parent(ParentAccess::TopLevel);
        assert_eq!(view.parent(), ParentAccess::TopLevel);
    }

    #[test]
    fn test_framed_opaque_origins_are_denied() {
        let view = StaticFrame::framed("about:blank-ish", "not a url");
        assert_eq!(view.location().origin, "null");
        assert_eq!(view.parent(), ParentAccess::Denied);

        let view = StaticFrame::framed("garbage", "https://app.example.com/");
        assert_eq!(view.parent(), ParentAccess::Denied);
    }

    #[test]
    fn test_set_parent_overrides() {
        let view = StaticFrame::top_level("https://app.example.com/");
        view.set_parent(ParentAccess::Denied);
        assert_eq!(view.parent(), ParentAccess::Denied);
        view.set_parent(ParentAccess::TopLevel);
        assert_eq!(view.parent(), ParentAccess::TopLevel);
    }
}
