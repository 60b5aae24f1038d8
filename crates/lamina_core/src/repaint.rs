//! Repaint requests and their coalescing rules
//!
//! Requests are lossy: merging keeps the final state only. A later
//! request subsumes an earlier one when it covers it, dirty rectangles
//! otherwise grow to their union, and `must_recomposite` is sticky.

use crate::geometry::ScreenRect;

/// Which part of the viewport must be redrawn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepaintRegion {
    WholeView,
    Dirty(ScreenRect),
}

impl RepaintRegion {
    /// Union of two regions
    pub fn union(self, other: RepaintRegion) -> RepaintRegion {
        match (self, other) {
            (RepaintRegion::WholeView, _) | (_, RepaintRegion::WholeView) => {
                RepaintRegion::WholeView
            }
            (RepaintRegion::Dirty(a), RepaintRegion::Dirty(b)) => {
                if b.contains(&a) {
                    RepaintRegion::Dirty(b)
                } else {
                    RepaintRegion::Dirty(a.union(&b))
                }
            }
        }
    }

    /// Whether this region covers `other` entirely
    pub fn covers(&self, other: &RepaintRegion) -> bool {
        match (self, other) {
            (RepaintRegion::WholeView, _) => true,
            (RepaintRegion::Dirty(_), RepaintRegion::WholeView) => false,
            (RepaintRegion::Dirty(a), RepaintRegion::Dirty(b)) => b.is_empty() || a.contains(b),
        }
    }

    /// The clip rectangle, `None` meaning the whole viewport
    pub fn clip(&self) -> Option<ScreenRect> {
        match self {
            RepaintRegion::WholeView => None,
            RepaintRegion::Dirty(rect) => Some(*rect),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepaintRequest {
    pub region: RepaintRegion,
    /// Bypass the screenshot cache and rebuild the raster
    pub must_recomposite: bool,
}

impl RepaintRequest {
    pub const fn whole_view(must_recomposite: bool) -> Self {
        Self {
            region: RepaintRegion::WholeView,
            must_recomposite,
        }
    }

    pub const fn dirty(rect: ScreenRect, must_recomposite: bool) -> Self {
        Self {
            region: RepaintRegion::Dirty(rect),
            must_recomposite,
        }
    }

    /// Merge a newer request into this pending one
    pub fn coalesce(self, newer: RepaintRequest) -> RepaintRequest {
        RepaintRequest {
            region: self.region.union(newer.region),
            must_recomposite: self.must_recomposite || newer.must_recomposite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_view_subsumes_dirty() {
        let a = RepaintRequest::dirty(ScreenRect::new(0, 0, 10, 10), false);
        let merged = a.coalesce(RepaintRequest::whole_view(false));
        assert_eq!(merged.region, RepaintRegion::WholeView);
        let merged = RepaintRequest::whole_view(false).coalesce(a);
        assert_eq!(merged.region, RepaintRegion::WholeView);
    }

    #[test]
    fn test_dirty_rects_union() {
        let a = RepaintRequest::dirty(ScreenRect::new(0, 0, 10, 10), false);
        let b = RepaintRequest::dirty(ScreenRect::new(20, 20, 10, 10), true);
        let merged = a.coalesce(b);
        assert_eq!(merged.region, RepaintRegion::Dirty(ScreenRect::new(0, 0, 30, 30)));
        assert!(merged.must_recomposite);
    }

    #[test]
    fn test_containing_request_replaces_contained() {
        let small = RepaintRequest::dirty(ScreenRect::new(5, 5, 2, 2), false);
        let big = RepaintRequest::dirty(ScreenRect::new(0, 0, 10, 10), false);
        assert_eq!(small.coalesce(big).region, big.region);
        assert!(big.region.covers(&small.region));
        assert!(!small.region.covers(&big.region));
    }
}
