//! Hexatlas: hex-grid world maps.
//!
//! `engine` holds the grid math, paint tools and the SQLite map store;
//! `protocol` holds the serde model they exchange.
//!
//! ```
//! use hexatlas::engine::{grid, paint};
//! use hexatlas::protocol::{BrushState, Hex, ShapeParams};
//!
//! let tiles = grid::generate(&ShapeParams::Radial { radius: 2 }).unwrap();
//! let filled = paint::bucket_fill(&tiles, Hex::ORIGIN, &BrushState::default());
//! assert_eq!(paint::changed_count(&tiles, &filled), 19);
//! ```

pub use hexatlas_engine as engine;
pub use hexatlas_protocol as protocol;
