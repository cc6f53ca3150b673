// src/processing/polygons.rs
use std::collections::HashMap;

use geo_types::{LineString, Polygon};
use itertools::Itertools;
use log::debug;
use uuid::Uuid;

use crate::model::{ConfidenceTier, LossPolygon};
use crate::processing::stats::round_dp;
use crate::raster::{GridSpec, Raster};

/// Vectorizes the loss mask into discrete polygons.
///
/// Contiguous true pixels are grouped with 8-connectivity (diagonal
/// neighbors join a component). Each component becomes one polygon traced
/// along its pixel boundary in lon/lat, with holes preserved as interior
/// rings; its area is the component's cell count times the pixel area, and
/// its confidence tier follows from that area. An all-false mask yields an
/// empty vec, not an error.
pub fn extract_polygons(loss: &Raster<bool>, grid: &GridSpec) -> Vec<LossPolygon> {
    let labels = label_components(loss);
    let component_count = labels.count;
    if component_count == 0 {
        return Vec::new();
    }
    debug!("vectorizing {component_count} loss component(s)");

    let mut cells_per_label: Vec<Vec<(usize, usize)>> = vec![Vec::new(); component_count];
    for y in 0..loss.height() {
        for x in 0..loss.width() {
            let label = labels.grid[y * loss.width() + x];
            if label > 0 {
                cells_per_label[label as usize - 1].push((x, y));
            }
        }
    }

    cells_per_label
        .into_iter()
        .enumerate()
        .map(|(idx, cells)| {
            let label = idx as u32 + 1;
            let area_ha = round_dp(cells.len() as f64 * grid.pixel_area_ha(), 2);
            let geometry = trace_component(&labels, label, &cells, loss.width(), grid);
            LossPolygon {
                id: Uuid::new_v4(),
                area_ha,
                confidence: ConfidenceTier::for_area_ha(area_ha),
                geometry,
            }
        })
        .collect()
}

struct Labels {
    grid: Vec<u32>,
    count: usize,
}

impl Labels {
    fn at(&self, x: i64, y: i64, width: usize, height: usize) -> u32 {
        if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
            0
        } else {
            self.grid[y as usize * width + x as usize]
        }
    }
}

/// Breadth-first connected-component labeling, 8-connectivity.
fn label_components(loss: &Raster<bool>) -> Labels {
    let (width, height) = loss.shape();
    let mask = loss.data();
    let mut grid = vec![0u32; width * height];
    let mut next = 0u32;
    let mut queue = std::collections::VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || grid[start] != 0 {
            continue;
        }
        next += 1;
        grid[start] = next;
        queue.push_back(start);
        while let Some(i) = queue.pop_front() {
            let (x, y) = ((i % width) as i64, (i / width) as i64);
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                        continue;
                    }
                    let ni = ny as usize * width + nx as usize;
                    if mask[ni] && grid[ni] == 0 {
                        grid[ni] = next;
                        queue.push_back(ni);
                    }
                }
            }
        }
    }

    Labels {
        grid,
        count: next as usize,
    }
}

type Corner = (i64, i64);

/// Traces the boundary of one labeled component into a polygon.
///
/// Boundary edges are emitted per cell against 4-neighbors outside the
/// component, oriented so each cell is walked clockwise in pixel coordinates.
/// Chained into closed rings, the exterior comes out with positive signed
/// area and holes negative; diagonal-only joins pinch into a single exterior
/// ring through the shared corner.
fn trace_component(
    labels: &Labels,
    label: u32,
    cells: &[(usize, usize)],
    width: usize,
    grid: &GridSpec,
) -> Polygon<f64> {
    let height = labels.grid.len() / width;
    let mut edges: HashMap<Corner, Vec<Corner>> = HashMap::new();
    let mut push_edge = |from: Corner, to: Corner| edges.entry(from).or_default().push(to);

    for &(x, y) in cells {
        let (xi, yi) = (x as i64, y as i64);
        if labels.at(xi, yi - 1, width, height) != label {
            push_edge((xi, yi), (xi + 1, yi));
        }
        if labels.at(xi + 1, yi, width, height) != label {
            push_edge((xi + 1, yi), (xi + 1, yi + 1));
        }
        if labels.at(xi, yi + 1, width, height) != label {
            push_edge((xi + 1, yi + 1), (xi, yi + 1));
        }
        if labels.at(xi - 1, yi, width, height) != label {
            push_edge((xi, yi + 1), (xi, yi));
        }
    }

    let mut rings: Vec<Vec<Corner>> = Vec::new();
    while !edges.is_empty() {
        // Start each walk at a corner with a single outgoing edge so pinch
        // corners are passed through, not closed at.
        let start = *edges
            .iter()
            .find(|(_, outs)| outs.len() == 1)
            .map(|(corner, _)| corner)
            .unwrap_or_else(|| edges.keys().next().expect("edges checked non-empty"));
        let mut ring = vec![start];
        let mut current = take_edge(&mut edges, start, None);
        let mut incoming = direction(start, current);
        while current != start {
            ring.push(current);
            let next = take_edge(&mut edges, current, Some(incoming));
            incoming = direction(current, next);
            current = next;
        }
        ring.push(start);
        rings.push(ring);
    }

    let exterior_idx = rings
        .iter()
        .position_max_by(|a, b| {
            signed_area(a)
                .partial_cmp(&signed_area(b))
                .expect("ring areas are finite")
        })
        .expect("component has at least one ring");

    let to_line_string = |ring: &[Corner]| {
        LineString::from(
            ring.iter()
                .map(|&(cx, cy)| grid.corner(cx as usize, cy as usize))
                .collect::<Vec<_>>(),
        )
    };

    let exterior = to_line_string(&rings[exterior_idx]);
    let interiors = rings
        .iter()
        .enumerate()
        .filter(|(i, ring)| *i != exterior_idx && signed_area(ring) < 0.0)
        .map(|(_, ring)| to_line_string(ring))
        .collect();
    Polygon::new(exterior, interiors)
}

/// Removes and returns one outgoing edge at `from`. With an incoming
/// direction, prefers the turn that keeps merged pinch loops on one ring:
/// left turn first, then straight, then right.
fn take_edge(
    edges: &mut HashMap<Corner, Vec<Corner>>,
    from: Corner,
    incoming: Option<(i64, i64)>,
) -> Corner {
    let outs = edges.get_mut(&from).expect("walk reached a dead-end corner");
    let pick = match (incoming, outs.len()) {
        (Some((dx, dy)), n) if n > 1 => {
            let preference = [(dy, -dx), (dx, dy), (-dy, dx)];
            preference
                .iter()
                .find_map(|want| outs.iter().position(|&to| direction(from, to) == *want))
                .unwrap_or(0)
        }
        _ => 0,
    };
    let to = outs.swap_remove(pick);
    if outs.is_empty() {
        edges.remove(&from);
    }
    to
}

fn direction(from: Corner, to: Corner) -> (i64, i64) {
    ((to.0 - from.0).signum(), (to.1 - from.1).signum())
}

/// Shoelace area of a closed ring in pixel corner coordinates. Positive for
/// exterior rings under the clockwise emission above, negative for holes.
fn signed_area(ring: &[Corner]) -> f64 {
    let mut sum = 0i64;
    for pair in ring.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        sum += x0 * y1 - x1 * y0;
    }
    sum as f64 / 2.0
}
