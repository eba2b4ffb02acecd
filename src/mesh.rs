//! Wavefront OBJ vertex loading.
//!
//! Driving meshes are consumed one file per frame, and only vertex positions
//! matter to the synthesis model; topology, normals, and texture coordinates
//! are ignored.

use std::path::Path;

use ndarray::Array2;

use crate::{Error, Result};

/// Reads the vertex positions of an OBJ file into an `(N, 3)` array.
pub fn load_verts<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::MeshParse {
        path: path.to_owned(),
        message: e.to_string(),
    })?;
    parse_verts(&text).map_err(|message| Error::MeshParse {
        path: path.to_owned(),
        message,
    })
}

fn parse_verts(text: &str) -> Result<Array2<f32>, String> {
    let mut verts = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let mut fields = line.split_whitespace();
        // Vertex position statements only; `vt`, `vn`, `f` and friends are
        // different keywords and fall through.
        if fields.next() != Some("v") {
            continue;
        }

        let mut coords = [0.0f32; 3];
        for coord in &mut coords {
            let field = fields
                .next()
                .ok_or_else(|| format!("vertex on line {} has fewer than 3 coordinates", index + 1))?;
            *coord = field
                .parse()
                .map_err(|_| format!("invalid coordinate `{}` on line {}", field, index + 1))?;
        }
        verts.push(coords);
    }

    if verts.is_empty() {
        return Err("file contains no vertices".into());
    }

    let mut array = Array2::zeros((verts.len(), 3));
    for (mut row, vert) in array.outer_iter_mut().zip(&verts) {
        row[0] = vert[0];
        row[1] = vert[1];
        row[2] = vert[2];
    }
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positions_and_skips_other_statements() {
        let obj = "\
# comment
v 0.5 -0.25 1.0
vt 0.0 0.0
vn 0.0 1.0 0.0
v 1.5 2.5 3.5 1.0
f 1 2 3
";
        let verts = parse_verts(obj).unwrap();
        assert_eq!(verts.shape(), &[2, 3]);
        assert_eq!(verts[[0, 0]], 0.5);
        assert_eq!(verts[[0, 1]], -0.25);
        assert_eq!(verts[[1, 2]], 3.5);
    }

    #[test]
    fn short_vertex_line_is_rejected() {
        let err = parse_verts("v 1.0 2.0\n").unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn non_numeric_coordinate_is_rejected() {
        let err = parse_verts("v 1.0 2.0 banana\n").unwrap_err();
        assert!(err.contains("banana"));
    }

    #[test]
    fn vertex_free_file_is_rejected() {
        assert!(parse_verts("# nothing here\n").is_err());
    }

    #[test]
    fn missing_file_reports_mesh_parse_error() {
        let err = load_verts("does-not-exist.obj").unwrap_err();
        assert!(matches!(err, Error::MeshParse { .. }));
    }
}
