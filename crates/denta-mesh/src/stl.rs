use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::Mesh;

const BINARY_HEADER_LEN: usize = 80;
const BINARY_COUNT_LEN: usize = 4;
const BINARY_RECORD_LEN: usize = 50;

/// Failure while decoding STL data.
///
/// Carries the source line for ASCII input so malformed scans can be
/// reported back to the user precisely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StlError {
    message: String,
    line: Option<usize>,
}

impl StlError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    fn at_line(line: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }
}

impl fmt::Display for StlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StlError {}

/// Reads an STL file from disk, accepting both binary and ASCII layouts.
pub fn read_stl_file(path: impl AsRef<Path>) -> Result<Mesh, StlError> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|err| StlError::new(format!("failed to read {}: {err}", path.display())))?;
    read_stl(&bytes)
}

/// Decodes STL data, accepting both binary and ASCII layouts.
///
/// Binary files are recognized by their exact size (80-byte header, little
/// endian triangle count, 50 bytes per triangle), which also covers binary
/// exports whose header happens to start with the word `solid`. Shared
/// vertices are welded by exact coordinate match.
pub fn read_stl(bytes: &[u8]) -> Result<Mesh, StlError> {
    if bytes.is_empty() {
        return Err(StlError::new("STL data is empty"));
    }
    if let Ok(text) = std::str::from_utf8(bytes)
        && text.trim_start().starts_with("solid")
        && !binary_length_matches(bytes)
    {
        return parse_ascii(text);
    }
    parse_binary(bytes)
}

fn binary_length_matches(bytes: &[u8]) -> bool {
    if bytes.len() < BINARY_HEADER_LEN + BINARY_COUNT_LEN {
        return false;
    }
    let count = declared_triangle_count(bytes) as usize;
    bytes.len() == BINARY_HEADER_LEN + BINARY_COUNT_LEN + count * BINARY_RECORD_LEN
}

fn declared_triangle_count(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([
        bytes[BINARY_HEADER_LEN],
        bytes[BINARY_HEADER_LEN + 1],
        bytes[BINARY_HEADER_LEN + 2],
        bytes[BINARY_HEADER_LEN + 3],
    ])
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn parse_binary(bytes: &[u8]) -> Result<Mesh, StlError> {
    if bytes.len() < BINARY_HEADER_LEN + BINARY_COUNT_LEN {
        return Err(StlError::new(format!(
            "{} bytes is too short for an STL file",
            bytes.len()
        )));
    }
    let count = declared_triangle_count(bytes) as usize;
    let expected = BINARY_HEADER_LEN + BINARY_COUNT_LEN + count * BINARY_RECORD_LEN;
    if bytes.len() != expected {
        return Err(StlError::new(format!(
            "binary STL declares {count} triangles ({expected} bytes) but the data is {} bytes",
            bytes.len()
        )));
    }

    let mut builder = MeshBuilder::default();
    let mut offset = BINARY_HEADER_LEN + BINARY_COUNT_LEN;
    for index in 0..count {
        // The stored facet normal is ignored; geometry comes from the vertices.
        offset += 12;
        let mut corners = [0u32; 3];
        for corner in &mut corners {
            let vertex = [
                read_f32(bytes, offset) as f64,
                read_f32(bytes, offset + 4) as f64,
                read_f32(bytes, offset + 8) as f64,
            ];
            offset += 12;
            if !vertex.iter().all(|value| value.is_finite()) {
                return Err(StlError::new(format!(
                    "triangle {index} has a non-finite vertex coordinate"
                )));
            }
            *corner = builder.intern(vertex);
        }
        offset += 2;
        builder.push_triangle(corners);
    }
    Ok(builder.finish())
}

fn parse_ascii(text: &str) -> Result<Mesh, StlError> {
    let mut builder = MeshBuilder::default();
    let mut pending: Vec<[f64; 3]> = Vec::with_capacity(3);
    let mut saw_solid = false;
    let mut saw_endsolid = false;
    let mut in_facet = false;
    let mut in_loop = false;
    let mut loop_closed = false;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let mut tokens = raw.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        if saw_endsolid {
            return Err(StlError::at_line(line, "content after endsolid"));
        }
        match keyword {
            "solid" => {
                if saw_solid {
                    return Err(StlError::at_line(line, "multiple solids are not supported"));
                }
                saw_solid = true;
            }
            "facet" => {
                if !saw_solid || in_facet {
                    return Err(StlError::at_line(line, "unexpected 'facet'"));
                }
                if tokens.next() != Some("normal") {
                    return Err(StlError::at_line(line, "expected 'facet normal'"));
                }
                // Normal components must parse but their values are ignored.
                for _ in 0..3 {
                    expect_number(&mut tokens, line)?;
                }
                expect_end_of_line(&mut tokens, line)?;
                in_facet = true;
                loop_closed = false;
            }
            "outer" => {
                if !in_facet || in_loop || loop_closed {
                    return Err(StlError::at_line(line, "unexpected 'outer loop'"));
                }
                if tokens.next() != Some("loop") {
                    return Err(StlError::at_line(line, "expected 'outer loop'"));
                }
                expect_end_of_line(&mut tokens, line)?;
                in_loop = true;
                pending.clear();
            }
            "vertex" => {
                if !in_loop {
                    return Err(StlError::at_line(line, "vertex outside of a facet loop"));
                }
                if pending.len() == 3 {
                    return Err(StlError::at_line(
                        line,
                        "facet loop has more than 3 vertices",
                    ));
                }
                let vertex = [
                    expect_number(&mut tokens, line)?,
                    expect_number(&mut tokens, line)?,
                    expect_number(&mut tokens, line)?,
                ];
                expect_end_of_line(&mut tokens, line)?;
                if !vertex.iter().all(|value| value.is_finite()) {
                    return Err(StlError::at_line(line, "non-finite vertex coordinate"));
                }
                pending.push(vertex);
            }
            "endloop" => {
                if !in_loop {
                    return Err(StlError::at_line(line, "unexpected 'endloop'"));
                }
                expect_end_of_line(&mut tokens, line)?;
                if pending.len() != 3 {
                    return Err(StlError::at_line(
                        line,
                        format!(
                            "facet loop must contain exactly 3 vertices, found {}",
                            pending.len()
                        ),
                    ));
                }
                in_loop = false;
                loop_closed = true;
            }
            "endfacet" => {
                if !in_facet || !loop_closed {
                    return Err(StlError::at_line(line, "unexpected 'endfacet'"));
                }
                expect_end_of_line(&mut tokens, line)?;
                let corners = [
                    builder.intern(pending[0]),
                    builder.intern(pending[1]),
                    builder.intern(pending[2]),
                ];
                builder.push_triangle(corners);
                pending.clear();
                in_facet = false;
            }
            "endsolid" => {
                if !saw_solid || in_facet {
                    return Err(StlError::at_line(line, "unexpected 'endsolid'"));
                }
                saw_endsolid = true;
            }
            other => {
                return Err(StlError::at_line(line, format!("unexpected token '{other}'")));
            }
        }
    }

    if !saw_solid {
        return Err(StlError::new("ASCII STL is missing its 'solid' header"));
    }
    if !saw_endsolid {
        return Err(StlError::new("ASCII STL is missing its 'endsolid' terminator"));
    }
    Ok(builder.finish())
}

fn expect_number<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<f64, StlError> {
    let Some(token) = tokens.next() else {
        return Err(StlError::at_line(line, "expected a number"));
    };
    token
        .parse::<f64>()
        .map_err(|_| StlError::at_line(line, format!("invalid number '{token}'")))
}

fn expect_end_of_line<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<(), StlError> {
    match tokens.next() {
        Some(token) => Err(StlError::at_line(
            line,
            format!("unexpected trailing token '{token}'"),
        )),
        None => Ok(()),
    }
}

/// Accumulates triangles while welding vertices on exact coordinate match.
#[derive(Default)]
struct MeshBuilder {
    vertices: Vec<[f64; 3]>,
    triangles: Vec<[u32; 3]>,
    index_of: HashMap<[u64; 3], u32>,
}

impl MeshBuilder {
    fn intern(&mut self, vertex: [f64; 3]) -> u32 {
        let key = [
            vertex[0].to_bits(),
            vertex[1].to_bits(),
            vertex[2].to_bits(),
        ];
        if let Some(&index) = self.index_of.get(&key) {
            return index;
        }
        let index = self.vertices.len() as u32;
        self.vertices.push(vertex);
        self.index_of.insert(key, index);
        index
    }

    fn push_triangle(&mut self, corners: [u32; 3]) {
        self.triangles.push(corners);
    }

    fn finish(self) -> Mesh {
        Mesh {
            vertices: self.vertices,
            triangles: self.triangles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
        let mut bytes = vec![0u8; BINARY_HEADER_LEN];
        bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
        for triangle in triangles {
            bytes.extend_from_slice(&[0u8; 12]);
            for vertex in triangle {
                for component in vertex {
                    bytes.extend_from_slice(&component.to_le_bytes());
                }
            }
            bytes.extend_from_slice(&0u16.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn reads_binary_stl_and_welds_shared_vertices() {
        let bytes = binary_stl(&[
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        ]);
        let mesh = read_stl(&bytes).expect("valid binary STL");
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangles[0], [0, 1, 2]);
        assert_eq!(mesh.triangles[1], [1, 3, 2]);
    }

    #[test]
    fn binary_with_zero_triangles_gives_empty_mesh() {
        let bytes = binary_stl(&[]);
        let mesh = read_stl(&bytes).expect("valid empty STL");
        assert!(mesh.is_empty());
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn binary_length_mismatch_is_reported() {
        let mut bytes = binary_stl(&[[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
        bytes.truncate(bytes.len() - 10);
        let err = read_stl(&bytes).expect_err("truncated binary STL");
        assert!(err.to_string().contains("declares 1 triangles"));
    }

    #[test]
    fn binary_rejects_non_finite_vertices() {
        let bytes = binary_stl(&[[[f32::NAN, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
        let err = read_stl(&bytes).expect_err("NaN vertex");
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn binary_with_solid_prefixed_header_parses_as_binary() {
        let mut bytes = binary_stl(&[[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
        bytes[..6].copy_from_slice(b"solid ");
        let mesh = read_stl(&bytes).expect("binary despite solid header");
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = read_stl(&[]).expect_err("empty input");
        assert_eq!(err.to_string(), "STL data is empty");
    }

    #[test]
    fn short_input_is_rejected() {
        let err = read_stl(b"\x00\x01\x02").expect_err("short input");
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn reads_ascii_stl() {
        let text = "solid crown\n\
                    facet normal 0 0 1\n\
                    outer loop\n\
                    vertex 0 0 0\n\
                    vertex 1 0 0\n\
                    vertex 0 1 0\n\
                    endloop\n\
                    endfacet\n\
                    endsolid crown\n";
        let mesh = read_stl(text.as_bytes()).expect("valid ASCII STL");
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.vertices[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn ascii_welds_shared_vertices_across_facets() {
        let text = "solid pair\n\
                    facet normal 0 0 1\n\
                    outer loop\n\
                    vertex 0 0 0\n\
                    vertex 1 0 0\n\
                    vertex 0 1 0\n\
                    endloop\n\
                    endfacet\n\
                    facet normal 0 0 1\n\
                    outer loop\n\
                    vertex 1 0 0\n\
                    vertex 1 1 0\n\
                    vertex 0 1 0\n\
                    endloop\n\
                    endfacet\n\
                    endsolid pair\n";
        let mesh = read_stl(text.as_bytes()).expect("valid ASCII STL");
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn ascii_reports_the_failing_line() {
        let text = "solid bad\n\
                    facet normal 0 0 1\n\
                    outer loop\n\
                    vertex 0 zero 0\n\
                    endloop\n\
                    endfacet\n\
                    endsolid bad\n";
        let err = read_stl(text.as_bytes()).expect_err("bad number");
        assert_eq!(err.line(), Some(4));
        assert!(err.to_string().contains("invalid number 'zero'"));
    }

    #[test]
    fn ascii_requires_exactly_three_vertices() {
        let text = "solid bad\n\
                    facet normal 0 0 1\n\
                    outer loop\n\
                    vertex 0 0 0\n\
                    vertex 1 0 0\n\
                    endloop\n\
                    endfacet\n\
                    endsolid bad\n";
        let err = read_stl(text.as_bytes()).expect_err("two-vertex loop");
        assert!(err.to_string().contains("exactly 3 vertices"));
        assert_eq!(err.line(), Some(6));
    }

    #[test]
    fn ascii_missing_endsolid_is_rejected() {
        let text = "solid bad\n";
        let err = read_stl(text.as_bytes()).expect_err("unterminated solid");
        assert!(err.to_string().contains("endsolid"));
    }

    #[test]
    fn ascii_rejects_non_finite_vertices() {
        let text = "solid bad\n\
                    facet normal 0 0 1\n\
                    outer loop\n\
                    vertex inf 0 0\n\
                    vertex 1 0 0\n\
                    vertex 0 1 0\n\
                    endloop\n\
                    endfacet\n\
                    endsolid bad\n";
        let err = read_stl(text.as_bytes()).expect_err("infinite coordinate");
        assert_eq!(err.line(), Some(4));
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn read_stl_file_round_trips_through_disk() {
        let bytes = binary_stl(&[[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]]]);
        let path = std::env::temp_dir().join("denta_mesh_stl_read_test.stl");
        fs::write(&path, &bytes).expect("write temp STL");
        let mesh = read_stl_file(&path).expect("read temp STL");
        fs::remove_file(&path).ok();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertices[1], [2.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = read_stl_file("/nonexistent/denta-mesh-test.stl").expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/denta-mesh-test.stl"));
    }
}
