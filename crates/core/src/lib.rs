//! `geofuse-core` - shared data model for the fusion workspace.
//!
//! Typed cell values, header+rows tables, polygon geometry and the fused
//! entity record. No IO.

pub mod geometry;
pub mod record;
pub mod table;
pub mod value;

pub use geometry::{Geometry, GeometryError, Polygon, Ring};
pub use record::{EntityRecord, FusedDataset, MatchAnnotation, MatchMethod, Source};
pub use table::{GeoTable, Table};
pub use value::Value;
