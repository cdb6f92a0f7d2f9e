use std::fmt;

use crate::Mesh;

/// Axis-aligned bounds of a summarized mesh.
///
/// Values keep full precision; rounding happens only when the summary is
/// rendered as text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryBounds {
    pub center: [f64; 3],
    pub size: [f64; 3],
}

/// Compact description of one scan, sized to fit on a single prompt line.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSummary {
    pub name: String,
    pub vertex_count: usize,
    pub bounds: Option<SummaryBounds>,
}

impl MeshSummary {
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }
}

/// Summarizes a named mesh: vertex count plus bounding-box center and size.
///
/// A mesh without vertices yields the empty sentinel (`bounds: None`) rather
/// than fabricated zero bounds, so downstream text never shows a fake box.
pub fn summarize(name: impl Into<String>, mesh: &Mesh) -> MeshSummary {
    let name = name.into();
    if mesh.vertices.is_empty() {
        return MeshSummary {
            name,
            vertex_count: 0,
            bounds: None,
        };
    }

    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for vertex in &mesh.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(vertex[axis]);
            max[axis] = max[axis].max(vertex[axis]);
        }
    }

    let center = [
        (min[0] + max[0]) / 2.0,
        (min[1] + max[1]) / 2.0,
        (min[2] + max[2]) / 2.0,
    ];
    let size = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
    MeshSummary {
        name,
        vertex_count: mesh.vertices.len(),
        bounds: Some(SummaryBounds { center, size }),
    }
}

/// Rounds a value to two decimals for display.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn write_triplet(f: &mut fmt::Formatter<'_>, values: [f64; 3]) -> fmt::Result {
    write!(
        f,
        "[{:.2}, {:.2}, {:.2}]",
        round2(values[0]),
        round2(values[1]),
        round2(values[2])
    )
}

impl fmt::Display for MeshSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bounds {
            None => write!(f, "Mesh Summary ({}): Empty", self.name),
            Some(bounds) => {
                write!(
                    f,
                    "Mesh Summary ({}): Verts={}, Center=",
                    self.name, self.vertex_count
                )?;
                write_triplet(f, bounds.center)?;
                write!(f, ", Size=")?;
                write_triplet(f, bounds.size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_with(vertices: Vec<[f64; 3]>) -> Mesh {
        Mesh {
            vertices,
            triangles: Vec::new(),
        }
    }

    #[test]
    fn empty_mesh_yields_the_empty_sentinel() {
        let summary = summarize("upper_arch", &Mesh::empty());
        assert_eq!(summary.vertex_count, 0);
        assert!(summary.is_empty());
        assert_eq!(summary.to_string(), "Mesh Summary (upper_arch): Empty");
    }

    #[test]
    fn center_and_size_come_from_the_bounding_box() {
        let mesh = mesh_with(vec![[1.0, 2.0, 3.0], [-1.0, 0.0, 5.0], [0.0, 4.0, -2.0]]);
        let summary = summarize("prep", &mesh);
        assert_eq!(summary.vertex_count, 3);
        let bounds = summary.bounds.expect("non-empty bounds");
        assert_eq!(bounds.center, [0.0, 2.0, 1.5]);
        assert_eq!(bounds.size, [2.0, 4.0, 7.0]);
    }

    #[test]
    fn single_vertex_mesh_has_zero_size() {
        let mesh = mesh_with(vec![[3.25, -1.5, 0.75]]);
        let summary = summarize("point", &mesh);
        let bounds = summary.bounds.expect("non-empty bounds");
        assert_eq!(bounds.center, [3.25, -1.5, 0.75]);
        assert_eq!(bounds.size, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn stored_bounds_keep_full_precision() {
        let mesh = mesh_with(vec![[0.0, 0.0, 0.0], [0.333, 0.0, 0.0]]);
        let summary = summarize("fine", &mesh);
        let bounds = summary.bounds.expect("non-empty bounds");
        assert_eq!(bounds.size[0], 0.333);
        assert_eq!(bounds.center[0], 0.1665);
    }

    #[test]
    fn display_rounds_to_two_decimals() {
        let mesh = mesh_with(vec![[0.0, 0.0, 0.0], [3.14159, 2.0, 1.0]]);
        let summary = summarize("molar", &mesh);
        let line = summary.to_string();
        assert_eq!(
            line,
            "Mesh Summary (molar): Verts=2, Center=[1.57, 1.00, 0.50], Size=[3.14, 2.00, 1.00]"
        );
    }

    #[test]
    fn round2_is_idempotent() {
        for value in [0.0, 1.0, -2.5, 3.14159, 2.675, 1234.5678, -0.004] {
            let once = round2(value);
            assert_eq!(round2(once), once);
        }
    }

    #[test]
    fn summarizing_is_deterministic() {
        let mesh = mesh_with(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let first = summarize("scan", &mesh);
        let second = summarize("scan", &mesh);
        assert_eq!(first, second);
    }
}
