use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::frame::{FrameView, ParentAccess};

/// Outcome of comparing the current frame's origin with its parent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum OriginCheck {
    SameOrigin,
    CrossOrigin,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingContext {
    TopLevel,
    SameOriginFrame,
    CrossOriginFrame,
}

impl EmbeddingContext {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-level" | "top" => Some(Self::TopLevel),
            "same-origin" | "same-origin-frame" => Some(Self::SameOriginFrame),
            "cross-origin" | "cross-origin-frame" => Some(Self::CrossOriginFrame),
            _ => None,
        }
    }
}

impl fmt::Display for EmbeddingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TopLevel => "top-level",
            Self::SameOriginFrame => "same-origin frame",
            Self::CrossOriginFrame => "cross-origin frame",
        };
        f.write_str(s)
    }
}

/// Cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lax => "lax",
            Self::Strict => "strict",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lax" => Some(Self::Lax),
            "strict" => Some(Self::Strict),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// Attributes to write on session cookies for the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: SameSite,
}

/// Classifies the current frame. Cheap to clone; safe to call on every read.
#[derive(Clone)]
pub struct EmbeddingDetector {
    view: Arc<dyn FrameView>,
    forced: Option<EmbeddingContext>,
}

impl EmbeddingDetector {
    pub fn new(view: Arc<dyn FrameView>) -> Self {
        Self { view, forced: None }
    }

    /// Pin the detector to a context regardless of what the view reports.
    /// The view still answers the HTTPS question.
    pub fn forced(view: Arc<dyn FrameView>, context: EmbeddingContext) -> Self {
        Self {
            view,
            forced: Some(context),
        }
    }

    pub fn check_origin(&self) -> OriginCheck {
        if let Some(context) = self.forced {
            return match context {
                EmbeddingContext::CrossOriginFrame => OriginCheck::CrossOrigin,
                _ => OriginCheck::SameOrigin,
            };
        }

        match self.view.parent() {
            ParentAccess::TopLevel => OriginCheck::SameOrigin,
            ParentAccess::Readable(parent) => {
                if parent.origin == self.view.location().origin {
                    OriginCheck::SameOrigin
                } else {
                    OriginCheck::CrossOrigin
                }
            }
            ParentAccess::Denied => OriginCheck::CrossOrigin,
            ParentAccess::Unavailable => OriginCheck::Indeterminate,
        }
    }

    /// True unless the frame is positively known to be the top-level page.
    pub fn is_in_iframe(&self) -> bool {
        if let Some(context) = self.forced {
            return context != EmbeddingContext::TopLevel;
        }
        !matches!(self.view.parent(), ParentAccess::TopLevel)
    }

    /// True when the parent has a different origin, or when that cannot be
    /// established.
    pub fn is_in_cross_origin_iframe(&self) -> bool {
        match self.check_origin() {
            OriginCheck::SameOrigin => false,
            OriginCheck::CrossOrigin | OriginCheck::Indeterminate => true,
        }
    }

    pub fn context(&self) -> EmbeddingContext {
        if let Some(context) = self.forced {
            return context;
        }
        if self.is_in_cross_origin_iframe() {
            EmbeddingContext::CrossOriginFrame
        } else if self.is_in_iframe() {
            EmbeddingContext::SameOriginFrame
        } else {
            EmbeddingContext::TopLevel
        }
    }

    pub fn is_https(&self) -> bool {
        self.view.is_https()
    }

    pub fn cookie_settings(&self) -> CookieSettings {
        let settings = if self.is_in_cross_origin_iframe() {
            // Browsers reject SameSite=None without Secure, whatever the protocol.
            CookieSettings {
                secure: true,
                same_site: SameSite::None,
            }
        } else {
            CookieSettings {
                secure: self.is_https(),
                same_site: SameSite::Lax,
            }
        };
        debug!(?settings, "Resolved cookie settings");
        settings
    }
}

impl fmt::Debug for EmbeddingDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingDetector")
            .field("location", &self.view.location().href)
            .field("forced", &self.forced)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::frame::{FrameLocation, StaticFrame};

    fn detector(view: StaticFrame) -> EmbeddingDetector {
        EmbeddingDetector::new(Arc::new(view))
    }

    #[test]
    fn test_top_level_https() {
        let d = detector(StaticFrame::top_level("https://app.example.com/"));
        assert!(!d.is_in_iframe());
        assert!(!d.is_in_cross_origin_iframe());
        assert_eq!(d.context(), EmbeddingContext::TopLevel);
        assert_eq!(
            d.cookie_settings(),
            CookieSettings { secure: true, same_site: SameSite::Lax }
        );
    }

    #[test]
    fn test_top_level_http_is_not_secure() {
        let d = detector(StaticFrame::top_level("http://localhost:5173/"));
        assert_eq!(
            d.cookie_settings(),
            CookieSettings { secure: false, same_site: SameSite::Lax }
        );
    }

    #[test]
    fn test_same_origin_frame() {
        let d = detector(StaticFrame::framed(
            "https://app.example.com/embed",
            "https://app.example.com/",
        ));
        assert!(d.is_in_iframe());
        assert!(!d.is_in_cross_origin_iframe());
        assert_eq!(d.context(), EmbeddingContext::SameOriginFrame);
        assert_eq!(d.cookie_settings().same_site, SameSite::Lax);
    }

    #[test]
    fn test_denied_parent_is_cross_origin() {
        let d = detector(StaticFrame::framed("http://app.example.com/", "https://partner.example.org/"));
        assert!(d.is_in_iframe());
        assert!(d.is_in_cross_origin_iframe());
        assert_eq!(d.check_origin(), OriginCheck::CrossOrigin);
        // Secure is required even over plain HTTP.
        assert_eq!(
            d.cookie_settings(),
            CookieSettings { secure: true, same_site: SameSite::None }
        );
    }

    #[test]
    fn test_readable_parent_with_other_origin() {
        let location = FrameLocation::parse("https://app.example.com/").unwrap();
        let parent = FrameLocation::parse("https://other.example.com/").unwrap();
        let d = detector(StaticFrame::new(location, ParentAccess::Readable(parent)));
        assert_eq!(d.check_origin(), OriginCheck::CrossOrigin);
        assert_eq!(d.context(), EmbeddingContext::CrossOriginFrame);
    }

    #[test]
    fn test_unavailable_parent_is_conservative() {
        let location = FrameLocation::parse("https://app.example.com/").unwrap();
        let d = detector(StaticFrame::new(location, ParentAccess::Unavailable));
        assert_eq!(d.check_origin(), OriginCheck::Indeterminate);
        assert!(d.is_in_iframe());
        assert!(d.is_in_cross_origin_iframe());
    }

    #[test]
    fn test_forced_cross_origin_policy() {
        let view = Arc::new(StaticFrame::top_level("http://localhost/"));
        let d = EmbeddingDetector::forced(view, EmbeddingContext::CrossOriginFrame);
        assert!(d.is_in_cross_origin_iframe());
        assert_eq!(
            d.cookie_settings(),
            CookieSettings { secure: true, same_site: SameSite::None }
        );
    }

    #[test]
    fn test_embedding_context_parse() {
        assert_eq!(EmbeddingContext::parse("top-level"), Some(EmbeddingContext::TopLevel));
        assert_eq!(EmbeddingContext::parse("same_origin"), Some(EmbeddingContext::SameOriginFrame));
        assert_eq!(EmbeddingContext::parse("Cross-Origin"), Some(EmbeddingContext::CrossOriginFrame));
        assert_eq!(EmbeddingContext::parse("sideways"), None);
    }
}
