// AOgmaNeo host - projection windows and receptive field extraction
//
// `Field` is the one place that maps a hidden column onto a visible grid. Every engine
// column loop iterates through it, and so does `extract`.

use crate::desc::VisibleLayerDesc;
use crate::error::{Result, ShapeMismatchError};
use crate::helpers::*;

/// Window of visible columns seen by one hidden column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    /// Projected center on the visible grid.
    pub center: Int2,
    /// Unclamped lower corner; offsets are measured from here.
    pub lower: Int2,
    pub iter_lower: Int2,
    /// Inclusive.
    pub iter_upper: Int2,
    pub diam: i32,
}

impl Field {
    pub fn new(column_pos: Int2, hidden_size: Int3, visible_size: Int3, radius: i32) -> Self {
        let center = project(column_pos, scalars(hidden_size, visible_size));
        let lower = Int2::new(center.x - radius, center.y - radius);

        Self {
            center,
            lower,
            iter_lower: Int2::new(lower.x.max(0), lower.y.max(0)),
            iter_upper: Int2::new(
                (center.x + radius).min(visible_size.x - 1),
                (center.y + radius).min(visible_size.y - 1),
            ),
            diam: radius * 2 + 1,
        }
    }

    /// Shorthand for a visible layer descriptor.
    pub fn of(column_pos: Int2, hidden_size: Int3, vld: &VisibleLayerDesc) -> Self {
        Self::new(column_pos, hidden_size, vld.size, vld.radius)
    }

    /// Number of in-grid visible columns.
    pub fn count(&self) -> usize {
        ((self.iter_upper.x - self.iter_lower.x + 1) * (self.iter_upper.y - self.iter_lower.y + 1))
            as usize
    }

    /// `(visible column, offset within the window)` pairs, x outer, y inner.
    pub fn positions(&self) -> impl Iterator<Item = (Int2, Int2)> + '_ {
        (self.iter_lower.x..=self.iter_upper.x).flat_map(move |ix| {
            (self.iter_lower.y..=self.iter_upper.y).map(move |iy| {
                (
                    Int2::new(ix, iy),
                    Int2::new(ix - self.lower.x, iy - self.lower.y),
                )
            })
        })
    }

    /// Whether `visible_pos` lies inside the full (unclamped) window.
    pub fn covers(&self, visible_pos: Int2) -> bool {
        in_bounds(
            visible_pos,
            self.lower,
            Int2::new(self.lower.x + self.diam, self.lower.y + self.diam),
        )
    }

    /// Offset of `visible_pos` inside the window. Only meaningful when `covers` holds.
    pub fn offset(&self, visible_pos: Int2) -> Int2 {
        Int2::new(visible_pos.x - self.lower.x, visible_pos.y - self.lower.y)
    }
}

/// Hidden columns whose forward window may cover a given visible column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReverseField {
    pub iter_lower: Int2,
    pub iter_upper: Int2,
}

impl ReverseField {
    pub fn new(visible_pos: Int2, hidden_size: Int3, visible_size: Int3, radius: i32) -> Self {
        let v_to_h = scalars(visible_size, hidden_size);
        let diam = (radius * 2 + 1) as f32;

        let reverse_radii = Int2::new(
            ceilf_to_i32(v_to_h.x * diam * 0.5),
            ceilf_to_i32(v_to_h.y * diam * 0.5),
        );

        let hidden_center = project(visible_pos, v_to_h);

        Self {
            iter_lower: Int2::new(
                (hidden_center.x - reverse_radii.x).max(0),
                (hidden_center.y - reverse_radii.y).max(0),
            ),
            iter_upper: Int2::new(
                (hidden_center.x + reverse_radii.x).min(hidden_size.x - 1),
                (hidden_center.y + reverse_radii.y).min(hidden_size.y - 1),
            ),
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = Int2> + '_ {
        (self.iter_lower.x..=self.iter_upper.x)
            .flat_map(move |ix| (self.iter_lower.y..=self.iter_upper.y).map(move |iy| Int2::new(ix, iy)))
    }
}

/// Engine component whose forward weights can be viewed per hidden cell.
pub trait FieldSource {
    fn hidden_size(&self) -> Int3;

    fn num_visible_layers(&self) -> usize;

    fn visible_layer_desc(&self, vli: usize) -> &VisibleLayerDesc;

    /// Weight from visible cell `vc` at window `offset` into cell `hc` of `hidden_column`,
    /// scaled to a byte.
    fn field_weight(&self, vli: usize, hidden_column: usize, hc: usize, offset: Int2, vc: usize)
        -> u8;
}

/// Dense `(diam, diam, visible_z)` byte tensor, row-major with `vc` fastest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceptiveField {
    pub weights: Vec<u8>,
    pub shape: (usize, usize, usize),
}

impl ReceptiveField {
    /// Weight at window row `oy`, column `ox`, visible cell `vc`; `None` outside the shape.
    pub fn get(&self, oy: usize, ox: usize, vc: usize) -> Option<u8> {
        let (rows, diam, vz) = self.shape;
        if oy >= rows || ox >= diam || vc >= vz {
            return None;
        }
        self.weights.get(vc + vz * (ox + diam * oy)).copied()
    }
}

/// Gather the weights that hidden cell `pos` holds over visible layer `vli`.
///
/// Entries whose window position falls outside the visible grid stay zero.
pub fn extract<S: FieldSource + ?Sized>(source: &S, vli: usize, pos: Int3) -> Result<ReceptiveField> {
    let num_visible_layers = source.num_visible_layers();
    if vli >= num_visible_layers {
        return Err(ShapeMismatchError::IndexOutOfRange {
            what: "visible layer",
            index: vli,
            len: num_visible_layers,
        }
        .into());
    }

    let hidden_size = source.hidden_size();
    if pos.x < 0
        || pos.y < 0
        || pos.z < 0
        || pos.x >= hidden_size.x
        || pos.y >= hidden_size.y
        || pos.z >= hidden_size.z
    {
        return Err(ShapeMismatchError::CoordinateOutOfBounds {
            pos,
            size: hidden_size,
        }
        .into());
    }

    let vld = *source.visible_layer_desc(vli);
    let diam = vld.diam() as usize;
    let vz = vld.size.z as usize;

    let column_pos = Int2::new(pos.x, pos.y);
    let hidden_column = address2(column_pos, hidden_size.xy());
    let field = Field::of(column_pos, hidden_size, &vld);

    let mut weights = vec![0u8; diam * diam * vz];

    for (_, offset) in field.positions() {
        for vc in 0..vz {
            weights[vc + vz * (offset.x as usize + diam * offset.y as usize)] =
                source.field_weight(vli, hidden_column, pos.z as usize, offset, vc);
        }
    }

    Ok(ReceptiveField {
        weights,
        shape: (diam, diam, vz),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Weight encodes the absolute visible column it came from.
    struct GridSource {
        hidden_size: Int3,
        descs: Vec<VisibleLayerDesc>,
    }

    impl FieldSource for GridSource {
        fn hidden_size(&self) -> Int3 {
            self.hidden_size
        }

        fn num_visible_layers(&self) -> usize {
            self.descs.len()
        }

        fn visible_layer_desc(&self, vli: usize) -> &VisibleLayerDesc {
            &self.descs[vli]
        }

        fn field_weight(&self, vli: usize, hidden_column: usize, _hc: usize, offset: Int2, vc: usize) -> u8 {
            let field = Field::of(
                column_pos(hidden_column, self.hidden_size),
                self.hidden_size,
                &self.descs[vli],
            );
            let v = Int2::new(field.lower.x + offset.x, field.lower.y + offset.y);
            (1 + v.x * 10 + v.y + vc as i32 * 100) as u8
        }
    }

    fn grid_source(hidden: Int3, visible: Int3, radius: i32) -> GridSource {
        GridSource {
            hidden_size: hidden,
            descs: vec![VisibleLayerDesc {
                size: visible,
                radius,
            }],
        }
    }

    #[test]
    fn test_field_clamps_to_grid() {
        let f = Field::new(Int2::new(0, 0), Int3::new(4, 4, 1), Int3::new(4, 4, 1), 2);
        assert_eq!(f.center, Int2::new(0, 0));
        assert_eq!(f.lower, Int2::new(-2, -2));
        assert_eq!(f.iter_lower, Int2::new(0, 0));
        assert_eq!(f.iter_upper, Int2::new(2, 2));
        assert_eq!(f.count(), 9);

        let offsets: Vec<Int2> = f.positions().map(|(_, o)| o).collect();
        assert_eq!(offsets.first(), Some(&Int2::new(2, 2)));
        assert_eq!(offsets.last(), Some(&Int2::new(4, 4)));
    }

    #[test]
    fn test_field_covers_matches_positions() {
        let f = Field::new(Int2::new(1, 2), Int3::new(3, 3, 1), Int3::new(9, 9, 1), 1);
        for (v, o) in f.positions() {
            assert!(f.covers(v));
            assert_eq!(f.offset(v), o);
        }
        assert!(!f.covers(Int2::new(f.lower.x - 1, f.center.y)));
    }

    #[test]
    fn test_reverse_field_contains_forward_owner() {
        let hidden = Int3::new(3, 3, 1);
        let visible = Int3::new(9, 9, 1);
        for hi in 0..hidden.num_columns() {
            let hp = column_pos(hi, hidden);
            let f = Field::new(hp, hidden, visible, 1);
            for (v, _) in f.positions() {
                let r = ReverseField::new(v, hidden, visible, 1);
                assert!(r.positions().any(|p| p == hp));
            }
        }
    }

    #[test]
    fn test_extract_shape_and_zero_fill() {
        let p = grid_source(Int3::new(4, 4, 2), Int3::new(4, 4, 3), 2);
        let rf = extract(&p, 0, Int3::new(0, 0, 1)).unwrap();
        assert_eq!(rf.shape, (5, 5, 3));
        assert_eq!(rf.weights.len(), 75);

        // window rows/cols 0 and 1 are off-grid
        for oy in 0..5 {
            for ox in 0..5 {
                for vc in 0..3 {
                    let off_grid = ox < 2 || oy < 2;
                    assert_eq!(rf.get(oy, ox, vc) == Some(0), off_grid, "oy={oy} ox={ox}");
                }
            }
        }
        assert_eq!(rf.get(5, 0, 0), None);
        assert_eq!(rf.get(0, 5, 0), None);
        assert_eq!(rf.get(0, 0, 3), None);
    }

    #[test]
    fn test_extract_unit_ratio_centers_on_coordinate() {
        let p = grid_source(Int3::new(5, 5, 1), Int3::new(5, 5, 1), 1);
        let rf = extract(&p, 0, Int3::new(2, 3, 0)).unwrap();
        // window center holds the weight from visible column (2, 3)
        assert_eq!(rf.get(1, 1, 0), Some(1 + 2 * 10 + 3));
        // offset (ox=2, oy=0) is visible column (3, 2)
        assert_eq!(rf.get(0, 2, 0), Some(1 + 3 * 10 + 2));
    }

    #[test]
    fn test_extract_rejects_bad_indices() {
        let p = grid_source(Int3::new(4, 4, 2), Int3::new(4, 4, 3), 1);
        assert!(matches!(
            extract(&p, 1, Int3::new(0, 0, 0)),
            Err(Error::ShapeMismatch(ShapeMismatchError::IndexOutOfRange { index: 1, len: 1, .. }))
        ));
        assert!(matches!(
            extract(&p, 0, Int3::new(0, 4, 0)),
            Err(Error::ShapeMismatch(ShapeMismatchError::CoordinateOutOfBounds { .. }))
        ));
        assert!(extract(&p, 0, Int3::new(0, 0, 2)).is_err());
        assert!(extract(&p, 0, Int3::new(-1, 0, 0)).is_err());
    }
}
