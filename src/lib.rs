//! Voronoi diagrams of point sites via Fortune's sweep-line algorithm.
//!
//! The sweep processes sites in descending y order (screen coordinates,
//! y grows downward) while maintaining the *beachline*, a sequence of
//! parabolic arcs stored in a balanced tree. Site events insert arcs
//! and start new edges along perpendicular bisectors; circle events
//! collapse arcs into Voronoi vertices. After the sweep, edges are
//! clipped to a bounding box and every cell is closed into a polygon.
//!
//! The overall cost is `O(n log n)` for `n` sites.
//!
//! # Usage
//!
//! Construct a [`Voronoi`] engine and call [`Voronoi::compute`] with
//! the sites and a bounding box. The engine can be reused across
//! computations, and a previous [`Diagram`] can be handed back via
//! [`Voronoi::recycle`] so its allocations are reclaimed.
//!
//! ```rust
//! use geo::{Coordinate, Rect};
//! use voronoi_fortune::Voronoi;
//!
//! let sites = vec![
//!     Coordinate { x: 25., y: 50. },
//!     Coordinate { x: 75., y: 50. },
//! ];
//! let bbox = Rect::new(
//!     Coordinate { x: 0., y: 0. },
//!     Coordinate { x: 100., y: 100. },
//! );
//! let diagram = Voronoi::new().compute(&sites, bbox).unwrap();
//! // One cell per site, split by the vertical bisector x = 50.
//! assert_eq!(diagram.cells.len(), 2);
//! ```
//!
//! [`Coordinate`]: geo::Coordinate
//! [`Rect`]: geo::Rect

/// Tolerance used for all coordinate comparisons. Two coordinates
/// closer than this are considered equal.
pub const EPSILON: f64 = 1e-9;

mod rbtree;

mod diagram;
pub use diagram::{quantize_sites, Cell, Diagram, Edge, Halfedge, PointPosition, Site};

mod error;
pub use error::Error;

mod sweep;
pub use sweep::Voronoi;

mod clip;

#[cfg(test)]
#[path = "../benches/utils/random.rs"]
pub mod random;
