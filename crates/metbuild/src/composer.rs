//! Domain-stack resolution.
//!
//! For each output time step, domains stack in ascending level order. The
//! base layer (lowest level) must end the pass fully populated; higher
//! layers fill their missing cells from the layer below when backfill is
//! on, or with the format's null value when it is off.

use tracing::debug;

use metget_common::{GridSpec, VariableKind};

use crate::field::GriddedField;

/// One domain's contribution to a time step: its grid and, unless the
/// selection left a hole, its regridded field.
pub struct Layer {
    pub grid: GridSpec,
    pub field: Option<GriddedField>,
}

/// Resolves the domain stack for each time step.
pub struct StackComposer {
    pub variables: VariableKind,
    pub backfill: bool,
    pub null_value: f32,
    pub background_pressure: f32,
}

impl StackComposer {
    /// Resolve one time step. `layers` arrive in stacking order
    /// (ascending level); the result has the same order and no NaN cells.
    pub fn compose(&self, layers: Vec<Layer>) -> Vec<GriddedField> {
        let mut resolved: Vec<GriddedField> = Vec::with_capacity(layers.len());

        for (idx, layer) in layers.into_iter().enumerate() {
            let mut field = match layer.field {
                Some(field) => field,
                None => GriddedField::missing(layer.grid.clone(), self.variables),
            };

            let below = if idx > 0 { resolved.last() } else { None };
            let filled = self.fill_missing(&mut field, below);
            if filled > 0 {
                debug!(layer = idx, cells = filled, "Filled missing cells");
            }

            resolved.push(field);
        }

        resolved
    }

    /// Replace NaN cells, sampling the resolved layer below when backfill
    /// is enabled. Returns the number of cells touched.
    fn fill_missing(&self, field: &mut GriddedField, below: Option<&GriddedField>) -> usize {
        let ni = field.grid.ni;
        let nj = field.grid.nj;
        let mut filled = 0usize;

        for p in 0..field.num_planes() {
            for j in 0..nj {
                for i in 0..ni {
                    if !field.get(p, i, j).is_nan() {
                        continue;
                    }
                    let replacement = if self.backfill {
                        let (x, y) = field.grid.point(i, j);
                        below
                            .and_then(|b| b.sample(p, x, y))
                            .unwrap_or_else(|| self.constant_for(p))
                    } else {
                        self.null_value
                    };
                    field.set(p, i, j, replacement);
                    filled += 1;
                }
            }
        }

        filled
    }

    /// Constant fill for cells nothing below can cover: ambient pressure
    /// for the pressure plane, zero otherwise.
    fn constant_for(&self, plane: usize) -> f32 {
        if self.variables == VariableKind::WindPressure && plane == 2 {
            self.background_pressure
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer(backfill: bool) -> StackComposer {
        StackComposer {
            variables: VariableKind::WindPressure,
            backfill,
            null_value: -999.0,
            background_pressure: 1013.0,
        }
    }

    fn coarse_grid() -> GridSpec {
        GridSpec::from_corners(-100.0, 20.0, -80.0, 30.0, 1.0, 1.0).unwrap()
    }

    fn fine_grid() -> GridSpec {
        GridSpec::from_corners(-95.0, 22.0, -90.0, 27.0, 0.5, 0.5).unwrap()
    }

    #[test]
    fn test_base_hole_fills_with_constants_under_backfill() {
        let resolved = composer(true).compose(vec![Layer {
            grid: coarse_grid(),
            field: None,
        }]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].get(0, 0, 0), 0.0);
        assert_eq!(resolved[0].get(2, 0, 0), 1013.0);
    }

    #[test]
    fn test_base_hole_fills_with_null_without_backfill() {
        let resolved = composer(false).compose(vec![Layer {
            grid: coarse_grid(),
            field: None,
        }]);
        assert_eq!(resolved[0].get(0, 3, 3), -999.0);
        assert_eq!(resolved[0].get(2, 3, 3), -999.0);
    }

    #[test]
    fn test_fine_hole_backfills_from_coarse() {
        let coarse = GriddedField::filled(coarse_grid(), VariableKind::WindPressure, 5.0);
        let resolved = composer(true).compose(vec![
            Layer {
                grid: coarse_grid(),
                field: Some(coarse),
            },
            Layer {
                grid: fine_grid(),
                field: None,
            },
        ]);

        // The fine layer sits inside the coarse one; every cell samples 5.0
        let fine = &resolved[1];
        for j in 0..fine.grid.nj {
            for i in 0..fine.grid.ni {
                assert_eq!(fine.get(0, i, j), 5.0);
            }
        }
    }

    #[test]
    fn test_partial_missing_cells_backfill() {
        let coarse = GriddedField::filled(coarse_grid(), VariableKind::WindPressure, 7.0);
        let mut fine = GriddedField::filled(fine_grid(), VariableKind::WindPressure, 1.0);
        fine.set(1, 2, 2, f32::NAN);

        let resolved = composer(true).compose(vec![
            Layer {
                grid: coarse_grid(),
                field: Some(coarse),
            },
            Layer {
                grid: fine_grid(),
                field: Some(fine),
            },
        ]);

        assert_eq!(resolved[1].get(1, 2, 2), 7.0);
        assert_eq!(resolved[1].get(1, 0, 0), 1.0);
    }

    #[test]
    fn test_missing_cells_get_null_without_backfill() {
        let mut fine = GriddedField::filled(fine_grid(), VariableKind::WindPressure, 1.0);
        fine.set(0, 1, 1, f32::NAN);

        let resolved = composer(false).compose(vec![Layer {
            grid: fine_grid(),
            field: Some(fine),
        }]);
        assert_eq!(resolved[0].get(0, 1, 1), -999.0);
    }
}
