//! Identifiers handed out by the data collaborator
//!
//! The pipeline never allocates these; it only compares and hashes them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

external_id!(
    /// One page of the paginated image space
    LayerId,
    "layer"
);

external_id!(
    /// The ordered stack of layers a canvas is browsing
    LayerSetId,
    "layer-set"
);

external_id!(
    /// A drawable object (tile, vector shape or label)
    ObjectId,
    "object"
);

/// Class of a drawable object, used to pick what ghost layers may show
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Image patch positioned within a layer
    Tile,
    Vector,
    Label,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [ObjectKind::Tile, ObjectKind::Vector, ObjectKind::Label];
}
