use std::fmt;

use denta_mesh::{Mesh, MeshSummary, summarize};

/// Display color for scans whose name marks them as a lower arch.
const LOWER_ARCH_COLOR: [f32; 4] = [0.3, 0.5, 1.0, 1.0];
/// Display color for every other scan.
const NEUTRAL_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

const MAX_TRANSPARENCY: u8 = 100;
const FALLBACK_SCAN_NAME: &str = "scan";

/// One imported scan with its viewer state.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    name: String,
    mesh: Mesh,
    transparency: u8,
}

impl Scan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Opacity reduction in percent: 0 is fully opaque, 100 fully transparent.
    pub fn transparency(&self) -> u8 {
        self.transparency
    }

    /// RGBA shading color, bluish when the name contains `lower`.
    pub fn display_color(&self) -> [f32; 4] {
        if self.name.to_lowercase().contains("lower") {
            LOWER_ARCH_COLOR
        } else {
            NEUTRAL_COLOR
        }
    }

    pub fn summary(&self) -> MeshSummary {
        summarize(&self.name, &self.mesh)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseError {
    UnknownScan(String),
    InvalidTransparency(u8),
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseError::UnknownScan(name) => write!(f, "no scan named '{name}' is loaded"),
            CaseError::InvalidTransparency(value) => write!(
                f,
                "transparency must be between 0 and {MAX_TRANSPARENCY}, got {value}"
            ),
        }
    }
}

impl std::error::Error for CaseError {}

/// In-memory dental case: the scans of one patient in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Case {
    scans: Vec<Scan>,
}

impl Case {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scan under `name`, suffixing with `.001`, `.002`, ... when the
    /// name is already taken. Returns the scan with its assigned name.
    pub fn insert_scan(&mut self, name: impl Into<String>, mesh: Mesh) -> &Scan {
        let base = name.into();
        let base = if base.trim().is_empty() {
            FALLBACK_SCAN_NAME.to_string()
        } else {
            base
        };
        let name = self.unique_name(base);
        self.scans.push(Scan {
            name,
            mesh,
            transparency: 0,
        });
        &self.scans[self.scans.len() - 1]
    }

    fn unique_name(&self, base: String) -> String {
        if self.scan(&base).is_none() {
            return base;
        }
        let mut counter = 1usize;
        loop {
            let candidate = format!("{base}.{counter:03}");
            if self.scan(&candidate).is_none() {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn scans(&self) -> &[Scan] {
        &self.scans
    }

    pub fn scan(&self, name: &str) -> Option<&Scan> {
        self.scans.iter().find(|scan| scan.name == name)
    }

    /// Sets the viewer transparency of a scan, refusing values over
    /// `MAX_TRANSPARENCY` before touching any state.
    pub fn set_transparency(&mut self, name: &str, value: u8) -> Result<&Scan, CaseError> {
        if value > MAX_TRANSPARENCY {
            return Err(CaseError::InvalidTransparency(value));
        }
        let scan = self
            .scans
            .iter_mut()
            .find(|scan| scan.name == name)
            .ok_or_else(|| CaseError::UnknownScan(name.to_string()))?;
        scan.transparency = value;
        Ok(scan)
    }

    /// Summaries of every scan, in insertion order.
    pub fn summaries(&self) -> Vec<MeshSummary> {
        self.scans.iter().map(Scan::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_mesh() -> Mesh {
        Mesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn scans_keep_insertion_order() {
        let mut case = Case::new();
        case.insert_scan("upper", triangle_mesh());
        case.insert_scan("lower", triangle_mesh());
        case.insert_scan("prep", Mesh::empty());
        let names: Vec<_> = case.scans().iter().map(Scan::name).collect();
        assert_eq!(names, ["upper", "lower", "prep"]);
        assert_eq!(case.len(), 3);
    }

    #[test]
    fn duplicate_names_get_numeric_suffixes() {
        let mut case = Case::new();
        assert_eq!(case.insert_scan("prep", triangle_mesh()).name(), "prep");
        assert_eq!(case.insert_scan("prep", triangle_mesh()).name(), "prep.001");
        assert_eq!(case.insert_scan("prep", triangle_mesh()).name(), "prep.002");
    }

    #[test]
    fn blank_names_fall_back_to_a_default() {
        let mut case = Case::new();
        assert_eq!(case.insert_scan("  ", triangle_mesh()).name(), "scan");
        assert_eq!(case.insert_scan("", triangle_mesh()).name(), "scan.001");
    }

    #[test]
    fn transparency_is_validated_before_lookup() {
        let mut case = Case::new();
        case.insert_scan("upper", triangle_mesh());
        let err = case.set_transparency("upper", 101).expect_err("over limit");
        assert_eq!(err, CaseError::InvalidTransparency(101));
        assert_eq!(
            case.scan("upper").map(Scan::transparency),
            Some(0),
            "failed update must not change state"
        );
    }

    #[test]
    fn transparency_updates_the_named_scan() {
        let mut case = Case::new();
        case.insert_scan("upper", triangle_mesh());
        case.insert_scan("lower", triangle_mesh());
        let scan = case.set_transparency("lower", 40).expect("valid update");
        assert_eq!(scan.transparency(), 40);
        assert_eq!(case.scan("upper").map(Scan::transparency), Some(0));
    }

    #[test]
    fn unknown_scan_is_reported_by_name() {
        let mut case = Case::new();
        let err = case.set_transparency("ghost", 10).expect_err("no scans");
        assert_eq!(err.to_string(), "no scan named 'ghost' is loaded");
    }

    #[test]
    fn lower_arch_names_shade_bluish() {
        let mut case = Case::new();
        case.insert_scan("LowerJawScan", triangle_mesh());
        case.insert_scan("upper", triangle_mesh());
        let lower = case.scan("LowerJawScan").expect("inserted");
        let upper = case.scan("upper").expect("inserted");
        assert_eq!(lower.display_color(), [0.3, 0.5, 1.0, 1.0]);
        assert_eq!(upper.display_color(), [0.8, 0.8, 0.8, 1.0]);
    }

    #[test]
    fn summaries_match_the_scan_meshes() {
        let mut case = Case::new();
        case.insert_scan("upper", triangle_mesh());
        case.insert_scan("void", Mesh::empty());
        let summaries = case.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "upper");
        assert_eq!(summaries[0].vertex_count, 3);
        assert!(summaries[1].is_empty());
    }
}
