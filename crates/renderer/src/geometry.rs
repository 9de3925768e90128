//! Static full-screen quad fed to the filter program.
//!
//! The quad is two triangles in normalized device coordinates. Texture
//! coordinates are derived from the positions rather than stored separately:
//! the quad only ever uses the corners -1 and 1, so mapping -1 to 0 and keeping
//! 1 yields the matching [0,1] sampling square with the same winding.

use std::sync::LazyLock;

/// Components per vertex (x, y).
pub const COMPONENTS_PER_VERTEX: u32 = 2;

/// Two triangles covering [-1,1]x[-1,1], flattened as x,y pairs.
pub const QUAD_VERTICES: [f32; 12] = [
    -1.0, -1.0, //
    1.0, -1.0, //
    -1.0, 1.0, //
    -1.0, 1.0, //
    1.0, 1.0, //
    1.0, -1.0, //
];

static TEXTURE_COORDINATES: LazyLock<[f32; 12]> =
    LazyLock::new(|| QUAD_VERTICES.map(|v| if v == -1.0 { 0.0 } else { v }));

/// Sampling coordinates aligned with [`QUAD_VERTICES`], computed once.
pub fn texture_coordinates() -> &'static [f32; 12] {
    &TEXTURE_COORDINATES
}

/// Number of vertices the draw call covers. This is the vertex count, not the
/// float count or byte count of the buffer.
pub const fn vertex_count() -> u32 {
    QUAD_VERTICES.len() as u32 / COMPONENTS_PER_VERTEX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_spans_the_ndc_square() {
        assert_eq!(vertex_count(), 6);
        for value in QUAD_VERTICES {
            assert!(value == -1.0 || value == 1.0);
        }
    }

    #[test]
    fn texture_coordinates_follow_the_quad() {
        let coords = texture_coordinates();
        assert_eq!(coords.len(), QUAD_VERTICES.len());
        for (position, coord) in QUAD_VERTICES.iter().zip(coords.iter()) {
            let expected = if *position < 0.0 { 0.0 } else { 1.0 };
            assert_eq!(*coord, expected);
        }
        // Cached: repeated calls hand out the same storage.
        assert!(std::ptr::eq(coords, texture_coordinates()));
    }
}
