use std::time::Duration;

use geo::{Coordinate, Rect};

use crate::EPSILON;

/// An input point promoted to a diagram seed.
///
/// `id` is assigned in the order sites are first encountered by the
/// sweep and indexes into [`Diagram::cells`].
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub x: f64,
    pub y: f64,
    pub id: usize,
}

impl Site {
    pub fn coord(&self) -> Coordinate<f64> {
        Coordinate {
            x: self.x,
            y: self.y,
        }
    }
}

/// Sites are identified by their `id`; coordinates are immutable once
/// assigned.
impl PartialEq for Site {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Site {}

/// The perpendicular-bisector segment separating two sites.
///
/// `r_site` is `None` for synthetic border edges lying on the bounding
/// box. During the sweep an edge may exist with only one endpoint set;
/// in a finished [`Diagram`] both `va` and `vb` index into
/// [`Diagram::vertices`].
#[derive(Debug, Clone)]
pub struct Edge {
    pub l_site: Site,
    pub r_site: Option<Site>,
    pub va: Option<usize>,
    pub vb: Option<usize>,
}

/// A directed reference to an [`Edge`] from the perspective of one
/// bounding cell.
///
/// `angle` is the polar angle used to sort halfedges clockwise around
/// a cell (descending angle), so the boundary can be walked as a
/// polygon.
#[derive(Debug, Clone, Copy)]
pub struct Halfedge {
    pub site: Site,
    pub edge: usize,
    pub angle: f64,
}

impl Halfedge {
    /// Halfedge of an edge separating `site` from `neighbor`.
    pub(crate) fn new(edge: usize, site: Site, neighbor: Site) -> Self {
        Halfedge {
            site,
            edge,
            angle: (neighbor.y - site.y).atan2(neighbor.x - site.x),
        }
    }

    /// Halfedge of a border edge. There is no neighbor site, so the
    /// angle is derived from the edge's own endpoints instead.
    pub(crate) fn border(
        edge_key: usize,
        site: Site,
        edges: &[Edge],
        vertices: &[Coordinate<f64>],
    ) -> Self {
        let edge = &edges[edge_key];
        let va = vertices[edge.va.expect("border edge has both endpoints")];
        let vb = vertices[edge.vb.expect("border edge has both endpoints")];
        let angle = if edge.l_site == site {
            (vb.x - va.x).atan2(va.y - vb.y)
        } else {
            (va.x - vb.x).atan2(vb.y - va.y)
        };
        Halfedge { site, edge: edge_key, angle }
    }

    /// Vertex index where this halfedge starts, walking the cell
    /// boundary clockwise.
    pub fn start_vertex(&self, edges: &[Edge]) -> Option<usize> {
        let edge = &edges[self.edge];
        if edge.l_site == self.site {
            edge.va
        } else {
            edge.vb
        }
    }

    /// Vertex index where this halfedge ends.
    pub fn end_vertex(&self, edges: &[Edge]) -> Option<usize> {
        let edge = &edges[self.edge];
        if edge.l_site == self.site {
            edge.vb
        } else {
            edge.va
        }
    }

    pub fn start_point(
        &self,
        edges: &[Edge],
        vertices: &[Coordinate<f64>],
    ) -> Option<Coordinate<f64>> {
        self.start_vertex(edges).map(|v| vertices[v])
    }

    pub fn end_point(
        &self,
        edges: &[Edge],
        vertices: &[Coordinate<f64>],
    ) -> Option<Coordinate<f64>> {
        self.end_vertex(edges).map(|v| vertices[v])
    }
}

/// Position of a query point relative to a cell polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointPosition {
    Inside,
    OnBoundary,
    Outside,
}

/// The polygonal region owned by one site.
#[derive(Debug, Clone)]
pub struct Cell {
    pub site: Site,
    pub halfedges: Vec<Halfedge>,
    pub(crate) close_me: bool,
}

impl Cell {
    pub(crate) fn new(site: Site) -> Self {
        Cell {
            site,
            halfedges: Vec::new(),
            close_me: false,
        }
    }

    /// Drop halfedges whose edge never got both endpoints (clipped
    /// away), then sort the rest clockwise. Returns the number of
    /// surviving halfedges.
    pub(crate) fn prepare_halfedges(&mut self, edges: &[Edge]) -> usize {
        self.halfedges.retain(|he| {
            let edge = &edges[he.edge];
            edge.va.is_some() && edge.vb.is_some()
        });
        self.halfedges
            .sort_unstable_by(|a, b| b.angle.partial_cmp(&a.angle).unwrap());
        self.halfedges.len()
    }

    /// Ids of the cells sharing a full edge with this one. Border
    /// edges contribute nothing.
    pub fn neighbor_ids(&self, edges: &[Edge]) -> Vec<usize> {
        let mut neighbors = Vec::new();
        for he in self.halfedges.iter().rev() {
            let edge = &edges[he.edge];
            if edge.l_site.id != self.site.id {
                neighbors.push(edge.l_site.id);
            } else if let Some(r_site) = edge.r_site {
                if r_site.id != self.site.id {
                    neighbors.push(r_site.id);
                }
            }
        }
        neighbors
    }

    /// Axis-aligned bounds of the cell polygon.
    pub fn bbox(&self, edges: &[Edge], vertices: &[Coordinate<f64>]) -> Rect<f64> {
        let mut xmin = f64::INFINITY;
        let mut ymin = f64::INFINITY;
        let mut xmax = f64::NEG_INFINITY;
        let mut ymax = f64::NEG_INFINITY;
        for he in self.halfedges.iter() {
            let v = he
                .start_point(edges, vertices)
                .expect("prepared halfedge has endpoints");
            xmin = xmin.min(v.x);
            ymin = ymin.min(v.y);
            xmax = xmax.max(v.x);
            ymax = ymax.max(v.y);
        }
        Rect::new((xmin, ymin), (xmax, ymax))
    }

    /// Locate a point against the cell polygon.
    ///
    /// The halfedges must be prepared (sorted clockwise), which holds
    /// for any cell of a finished [`Diagram`].
    pub fn point_intersection(
        &self,
        pt: Coordinate<f64>,
        edges: &[Edge],
        vertices: &[Coordinate<f64>],
    ) -> PointPosition {
        for he in self.halfedges.iter().rev() {
            let p0 = he
                .start_point(edges, vertices)
                .expect("prepared halfedge has endpoints");
            let p1 = he
                .end_point(edges, vertices)
                .expect("prepared halfedge has endpoints");
            let r = (pt.y - p0.y) * (p1.x - p0.x) - (pt.x - p0.x) * (p1.y - p0.y);
            if r == 0. {
                return PointPosition::OnBoundary;
            }
            if r > 0. {
                return PointPosition::Outside;
            }
        }
        PointPosition::Inside
    }
}

/// The output of one [`compute`] call.
///
/// `cells` is indexed by [`Site::id`]; every cell's halfedges form a
/// closed clockwise polygon. All edges have both endpoints resolved,
/// and `vertices` holds exactly the vertices referenced by some edge.
///
/// [`compute`]: crate::Voronoi::compute
#[derive(Debug, Default)]
pub struct Diagram {
    pub cells: Vec<Cell>,
    pub edges: Vec<Edge>,
    pub vertices: Vec<Coordinate<f64>>,
    /// Wall-clock time spent inside `compute`. Diagnostic only.
    pub exec_time: Duration,
}

impl Diagram {
    /// Id of the cell whose polygon strictly contains `pt`, if any.
    pub fn cell_containing(&self, pt: Coordinate<f64>) -> Option<usize> {
        self.cells
            .iter()
            .position(|c| c.point_intersection(pt, &self.edges, &self.vertices) == PointPosition::Inside)
    }
}

/// Snap coordinates to the epsilon grid used by the engine's
/// comparisons, guaranteeing no two distinct sites are closer than
/// [`EPSILON`] on either axis.
///
/// Callers feeding in floating-point-sensitive coordinates (drag
/// interactions, accumulated transforms) should apply this before
/// [`compute`](crate::Voronoi::compute).
pub fn quantize_sites(sites: &mut [Coordinate<f64>]) {
    for site in sites {
        site.x = (site.x / EPSILON).floor() * EPSILON;
        site.y = (site.y / EPSILON).floor() * EPSILON;
    }
}
