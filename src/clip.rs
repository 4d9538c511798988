//! Post-sweep stage: connect unbounded edges to the bounding box, clip
//! every edge against it, and stitch border segments so each cell is a
//! closed polygon.

use geo::{Coordinate, Rect};
use log::trace;

use crate::diagram::{Cell, Halfedge};
use crate::sweep::Voronoi;
use crate::{Error, EPSILON};

/// Bounding-box sides in the clockwise order the closing walk visits
/// them (screen coordinates, y down).
#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    Left,
    Bottom,
    Right,
    Top,
}

impl Side {
    fn next(self) -> Side {
        match self {
            Side::Left => Side::Bottom,
            Side::Bottom => Side::Right,
            Side::Right => Side::Top,
            Side::Top => Side::Left,
        }
    }

    /// Most border segments a walk starting on this side can insert
    /// before the cell must have closed.
    fn max_border_segments(self) -> usize {
        match self {
            Side::Left => 7,
            Side::Bottom => 6,
            Side::Right => 5,
            Side::Top => 4,
        }
    }
}

impl Voronoi {
    /// Resolve the missing endpoint of a half-infinite edge to a point
    /// on the bounding box.
    ///
    /// The edge is a ray along the perpendicular bisector of its two
    /// sites; the direction follows from which site is left of the
    /// other along the sweep. Vertical and steep bisectors get their
    /// own branches so the line equation is evaluated against the more
    /// stable axis. Returns `false` when the ray misses the box
    /// entirely.
    fn connect_edge(&mut self, edge_key: usize, xl: f64, xr: f64, yt: f64, yb: f64) -> bool {
        let (va_opt, l_site, r_site) = {
            let edge = &self.edges[edge_key];
            if edge.vb.is_some() {
                return true;
            }
            (
                edge.va,
                edge.l_site,
                edge.r_site.expect("unconnected edge separates two sites"),
            )
        };
        self.cells[l_site.id].close_me = true;
        self.cells[r_site.id].close_me = true;

        let lx = l_site.x;
        let ly = l_site.y;
        let rx = r_site.x;
        let ry = r_site.y;
        let fx = (lx + rx) / 2.;
        let fy = (ly + ry) / 2.;

        let va;
        let vb;
        if ry == ly {
            // Vertical bisector.
            if fx < xl || fx >= xr {
                return false;
            }
            if lx > rx {
                va = match va_opt {
                    None => self.create_vertex(fx, yt),
                    Some(v) => {
                        if self.vertices[v].y >= yb {
                            return false;
                        }
                        v
                    }
                };
                vb = self.create_vertex(fx, yb);
            } else {
                va = match va_opt {
                    None => self.create_vertex(fx, yb),
                    Some(v) => {
                        if self.vertices[v].y < yt {
                            return false;
                        }
                        v
                    }
                };
                vb = self.create_vertex(fx, yt);
            }
        } else {
            let fm = (lx - rx) / (ry - ly);
            let fb = fy - fm * fx;
            if fm < -1. || fm > 1. {
                // Steep slope: solve for x at the horizontal box sides.
                if lx > rx {
                    va = match va_opt {
                        None => self.create_vertex((yt - fb) / fm, yt),
                        Some(v) => {
                            if self.vertices[v].y >= yb {
                                return false;
                            }
                            v
                        }
                    };
                    vb = self.create_vertex((yb - fb) / fm, yb);
                } else {
                    va = match va_opt {
                        None => self.create_vertex((yb - fb) / fm, yb),
                        Some(v) => {
                            if self.vertices[v].y < yt {
                                return false;
                            }
                            v
                        }
                    };
                    vb = self.create_vertex((yt - fb) / fm, yt);
                }
            } else {
                // Shallow slope: solve for y at the vertical box sides.
                if ly < ry {
                    va = match va_opt {
                        None => self.create_vertex(xl, fm * xl + fb),
                        Some(v) => {
                            if self.vertices[v].x >= xr {
                                return false;
                            }
                            v
                        }
                    };
                    vb = self.create_vertex(xr, fm * xr + fb);
                } else {
                    va = match va_opt {
                        None => self.create_vertex(xr, fm * xr + fb),
                        Some(v) => {
                            if self.vertices[v].x < xl {
                                return false;
                            }
                            v
                        }
                    };
                    vb = self.create_vertex(xl, fm * xl + fb);
                }
            }
        }
        let edge = &mut self.edges[edge_key];
        edge.va = Some(va);
        edge.vb = Some(vb);
        true
    }

    /// Liang-Barsky clip of a finite edge against the bounding box.
    ///
    /// New vertices are created only when an endpoint is actually
    /// truncated. Returns `false` when the segment lies entirely
    /// outside the box.
    fn clip_edge(&mut self, edge_key: usize, xl: f64, xr: f64, yt: f64, yb: f64) -> bool {
        let (ax, ay, bx, by) = {
            let edge = &self.edges[edge_key];
            let va = self.vertices[edge.va.expect("connected edge has a start")];
            let vb = self.vertices[edge.vb.expect("connected edge has an end")];
            (va.x, va.y, vb.x, vb.y)
        };
        let mut t0 = 0.;
        let mut t1 = 1.;
        let dx = bx - ax;
        let dy = by - ay;

        // Left side.
        let q = ax - xl;
        if dx == 0. && q < 0. {
            return false;
        }
        let r = -q / dx;
        if dx < 0. {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        } else if dx > 0. {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        }

        // Right side.
        let q = xr - ax;
        if dx == 0. && q < 0. {
            return false;
        }
        let r = q / dx;
        if dx < 0. {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        } else if dx > 0. {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        }

        // Top side.
        let q = ay - yt;
        if dy == 0. && q < 0. {
            return false;
        }
        let r = -q / dy;
        if dy < 0. {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        } else if dy > 0. {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        }

        // Bottom side.
        let q = yb - ay;
        if dy == 0. && q < 0. {
            return false;
        }
        let r = q / dy;
        if dy < 0. {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        } else if dy > 0. {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        }

        if t0 > 0. {
            let v = self.create_vertex(ax + t0 * dx, ay + t0 * dy);
            self.edges[edge_key].va = Some(v);
        }
        if t1 < 1. {
            let v = self.create_vertex(ax + t1 * dx, ay + t1 * dy);
            self.edges[edge_key].vb = Some(v);
        }
        if t0 > 0. || t1 < 1. {
            let (l_site, r_site) = {
                let edge = &self.edges[edge_key];
                (edge.l_site, edge.r_site)
            };
            self.cells[l_site.id].close_me = true;
            if let Some(r_site) = r_site {
                self.cells[r_site.id].close_me = true;
            }
        }
        true
    }

    /// Connect and clip every edge; edges that miss the box or
    /// collapse to a point are voided in place and compacted away when
    /// the diagram is collected.
    pub(crate) fn clip_edges(&mut self, bbox: &Rect<f64>) {
        let xl = bbox.min().x;
        let xr = bbox.max().x;
        let yt = bbox.min().y;
        let yb = bbox.max().y;
        for key in (0..self.edges.len()).rev() {
            let kept = self.connect_edge(key, xl, xr, yt, yb)
                && self.clip_edge(key, xl, xr, yt, yb)
                && {
                    let edge = &self.edges[key];
                    let va = self.vertices[edge.va.expect("clipped edge has a start")];
                    let vb = self.vertices[edge.vb.expect("clipped edge has an end")];
                    (va.x - vb.x).abs() >= EPSILON || (va.y - vb.y).abs() >= EPSILON
                };
            if !kept {
                trace!("discarding edge {} after clipping", key);
                let edge = &mut self.edges[key];
                edge.va = None;
                edge.vb = None;
            }
        }
    }

    /// Close every touched cell by walking the bounding-box perimeter
    /// clockwise across the gap in its boundary, inserting synthetic
    /// border edges.
    pub(crate) fn close_cells(&mut self, bbox: &Rect<f64>) -> Result<(), Error> {
        let xl = bbox.min().x;
        let xr = bbox.max().x;
        let yt = bbox.min().y;
        let yb = bbox.max().y;
        let mut cells = std::mem::take(&mut self.cells);
        let result = self.close_cells_inner(&mut cells, xl, xr, yt, yb);
        self.cells = cells;
        result
    }

    fn close_cells_inner(
        &mut self,
        cells: &mut [Cell],
        xl: f64,
        xr: f64,
        yt: f64,
        yb: f64,
    ) -> Result<(), Error> {
        let eq = |a: f64, b: f64| (a - b).abs() < EPSILON;
        let lt = |a: f64, b: f64| b - a > EPSILON;
        let gt = |a: f64, b: f64| a - b > EPSILON;
        let single_cell = cells.len() == 1;

        for cell in cells.iter_mut().rev() {
            if cell.prepare_halfedges(&self.edges) == 0 {
                // A lone site has no bisectors at all; its cell is the
                // whole bounding box.
                if single_cell {
                    self.close_whole_box(cell, xl, xr, yt, yb);
                }
                continue;
            }
            if !cell.close_me {
                continue;
            }

            // Scan for gaps between consecutive halfedges; a clipped
            // cell can leave the box boundary and return to it more
            // than once. Newly inserted border halfedges take part in
            // the scan.
            let mut i_left = 0;
            while i_left < cell.halfedges.len() {
                let n_halfedges = cell.halfedges.len();
                let va = cell.halfedges[i_left]
                    .end_point(&self.edges, &self.vertices)
                    .expect("prepared halfedge has endpoints");
                let vz = cell.halfedges[(i_left + 1) % n_halfedges]
                    .start_point(&self.edges, &self.vertices)
                    .expect("prepared halfedge has endpoints");
                if (va.x - vz.x).abs() < EPSILON && (va.y - vz.y).abs() < EPSILON {
                    i_left += 1;
                    continue;
                }

                let mut side = if eq(va.x, xl) && lt(va.y, yb) {
                    Side::Left
                } else if eq(va.y, yb) && lt(va.x, xr) {
                    Side::Bottom
                } else if eq(va.x, xr) && gt(va.y, yt) {
                    Side::Right
                } else if eq(va.y, yt) && gt(va.x, xl) {
                    Side::Top
                } else {
                    // The open endpoint sits on no box side: the cell
                    // geometry is inconsistent (site on/outside the
                    // box, or an unresolved degeneracy upstream).
                    return Err(Error::InconsistentCell { cell: cell.site.id });
                };

                let mut va_id = cell.halfedges[i_left]
                    .end_vertex(&self.edges)
                    .expect("prepared halfedge has endpoints");
                let mut last_vb = va;
                for _ in 0..side.max_border_segments() {
                    let (last_border_segment, vb_coord) = match side {
                        Side::Left => {
                            let last = eq(vz.x, xl);
                            (last, Coordinate { x: xl, y: if last { vz.y } else { yb } })
                        }
                        Side::Bottom => {
                            let last = eq(vz.y, yb);
                            (last, Coordinate { x: if last { vz.x } else { xr }, y: yb })
                        }
                        Side::Right => {
                            let last = eq(vz.x, xr);
                            (last, Coordinate { x: xr, y: if last { vz.y } else { yt } })
                        }
                        Side::Top => {
                            let last = eq(vz.y, yt);
                            (last, Coordinate { x: if last { vz.x } else { xl }, y: yt })
                        }
                    };
                    let vb_id = self.create_vertex(vb_coord.x, vb_coord.y);
                    let edge = self.create_border_edge(cell.site, va_id, vb_id);
                    i_left += 1;
                    cell.halfedges.insert(
                        i_left,
                        Halfedge::border(edge, cell.site, &self.edges, &self.vertices),
                    );
                    last_vb = vb_coord;
                    if last_border_segment {
                        break;
                    }
                    va_id = vb_id;
                    side = side.next();
                }

                if (last_vb.x - vz.x).abs() >= EPSILON || (last_vb.y - vz.y).abs() >= EPSILON {
                    return Err(Error::UnclosedCell { cell: cell.site.id });
                }
                i_left += 1;
            }
        }
        Ok(())
    }

    /// Give a cell the whole bounding box as its polygon: four border
    /// edges walked clockwise from the top-left corner (their angles
    /// come out already descending, so no re-sort is needed).
    fn close_whole_box(&mut self, cell: &mut Cell, xl: f64, xr: f64, yt: f64, yb: f64) {
        let v0 = self.create_vertex(xl, yt);
        let v1 = self.create_vertex(xl, yb);
        let v2 = self.create_vertex(xr, yb);
        let v3 = self.create_vertex(xr, yt);
        for &(va, vb) in [(v0, v1), (v1, v2), (v2, v3), (v3, v0)].iter() {
            let edge = self.create_border_edge(cell.site, va, vb);
            cell.halfedges
                .push(Halfedge::border(edge, cell.site, &self.edges, &self.vertices));
        }
    }
}
