//! Output grid geometry.

use serde::{Deserialize, Serialize};

use crate::error::{MetGetError, MetGetResult};

/// A regular output grid in geographic coordinates.
///
/// Grids are stored as an origin, cell sizes, counts, and an optional
/// rotation about the origin (degrees counter-clockwise). Points run
/// west-to-east within a row, south-to-north across rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub x_init: f64,
    pub y_init: f64,
    pub di: f64,
    pub dj: f64,
    pub ni: usize,
    pub nj: usize,
    pub rotation: f64,
}

impl GridSpec {
    /// Build a grid from corner coordinates and cell sizes.
    pub fn from_corners(
        x_init: f64,
        y_init: f64,
        x_end: f64,
        y_end: f64,
        di: f64,
        dj: f64,
    ) -> MetGetResult<Self> {
        if di <= 0.0 || dj <= 0.0 {
            return Err(MetGetError::Validation(
                "Grid cell sizes must be positive".to_string(),
            ));
        }
        if x_end <= x_init || y_end <= y_init {
            return Err(MetGetError::Validation(
                "Grid corners are not ordered southwest to northeast".to_string(),
            ));
        }

        let ni = ((x_end - x_init) / di).round() as usize + 1;
        let nj = ((y_end - y_init) / dj).round() as usize + 1;

        Ok(Self {
            x_init,
            y_init,
            di,
            dj,
            ni,
            nj,
            rotation: 0.0,
        })
    }

    /// Build a grid from an origin, cell sizes, counts, and rotation.
    pub fn from_origin(
        x_init: f64,
        y_init: f64,
        di: f64,
        dj: f64,
        ni: usize,
        nj: usize,
        rotation: f64,
    ) -> MetGetResult<Self> {
        if di <= 0.0 || dj <= 0.0 {
            return Err(MetGetError::Validation(
                "Grid cell sizes must be positive".to_string(),
            ));
        }
        if ni < 2 || nj < 2 {
            return Err(MetGetError::Validation(
                "Grid must be at least 2x2".to_string(),
            ));
        }

        Ok(Self {
            x_init,
            y_init,
            di,
            dj,
            ni,
            nj,
            rotation,
        })
    }

    /// Look up a named preset grid.
    pub fn predefined(name: &str) -> Option<Self> {
        let (x0, y0, x1, y1, d) = match name {
            "gulf-of-mexico" => (-98.0, 18.0, -80.0, 31.0, 0.1),
            "us-east-coast" => (-82.0, 24.0, -65.0, 45.0, 0.1),
            "us-gulf-east" => (-98.0, 18.0, -65.0, 45.0, 0.1),
            "caribbean" => (-90.0, 8.0, -58.0, 24.0, 0.1),
            _ => return None,
        };
        GridSpec::from_corners(x0, y0, x1, y1, d, d).ok()
    }

    /// Total number of grid cells.
    pub fn n(&self) -> usize {
        self.ni * self.nj
    }

    pub fn x_end(&self) -> f64 {
        self.x_init + self.di * (self.ni - 1) as f64
    }

    pub fn y_end(&self) -> f64 {
        self.y_init + self.dj * (self.nj - 1) as f64
    }

    /// Coordinates of grid point (i, j), honoring rotation about the origin.
    pub fn point(&self, i: usize, j: usize) -> (f64, f64) {
        let dx = self.di * i as f64;
        let dy = self.dj * j as f64;
        if self.rotation == 0.0 {
            return (self.x_init + dx, self.y_init + dy);
        }
        let theta = self.rotation.to_radians();
        let (sin, cos) = theta.sin_cos();
        (
            self.x_init + dx * cos - dy * sin,
            self.y_init + dx * sin + dy * cos,
        )
    }

    /// Fractional grid index of a geographic point, if it lies on the grid.
    ///
    /// Only meaningful for unrotated grids; rotated grids invert the
    /// rotation first.
    pub fn locate(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (dx, dy) = if self.rotation == 0.0 {
            (x - self.x_init, y - self.y_init)
        } else {
            let theta = (-self.rotation).to_radians();
            let (sin, cos) = theta.sin_cos();
            let rx = x - self.x_init;
            let ry = y - self.y_init;
            (rx * cos - ry * sin, rx * sin + ry * cos)
        };

        let fi = dx / self.di;
        let fj = dy / self.dj;
        if fi < 0.0 || fj < 0.0 || fi > (self.ni - 1) as f64 || fj > (self.nj - 1) as f64 {
            return None;
        }
        Some((fi, fj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners() {
        let g = GridSpec::from_corners(-100.0, 20.0, -80.0, 30.0, 0.25, 0.25).unwrap();
        assert_eq!(g.ni, 81);
        assert_eq!(g.nj, 41);
        assert_eq!(g.n(), 81 * 41);
        assert!((g.x_end() - -80.0).abs() < 1e-9);
        assert!((g.y_end() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_corners_rejected() {
        assert!(GridSpec::from_corners(-80.0, 20.0, -100.0, 30.0, 0.25, 0.25).is_err());
        assert!(GridSpec::from_corners(-100.0, 20.0, -80.0, 30.0, 0.0, 0.25).is_err());
    }

    #[test]
    fn test_point_unrotated() {
        let g = GridSpec::from_corners(-100.0, 20.0, -80.0, 30.0, 0.5, 0.5).unwrap();
        assert_eq!(g.point(0, 0), (-100.0, 20.0));
        let (x, y) = g.point(2, 4);
        assert!((x - -99.0).abs() < 1e-9);
        assert!((y - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_locate_inside_and_outside() {
        let g = GridSpec::from_corners(-100.0, 20.0, -80.0, 30.0, 0.5, 0.5).unwrap();
        let (fi, fj) = g.locate(-99.75, 20.25).unwrap();
        assert!((fi - 0.5).abs() < 1e-9);
        assert!((fj - 0.5).abs() < 1e-9);
        assert!(g.locate(-120.0, 25.0).is_none());
    }

    #[test]
    fn test_rotation_round_trip() {
        let g = GridSpec::from_origin(-90.0, 25.0, 0.1, 0.1, 50, 40, 30.0).unwrap();
        let (x, y) = g.point(10, 20);
        let (fi, fj) = g.locate(x, y).unwrap();
        assert!((fi - 10.0).abs() < 1e-6);
        assert!((fj - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_predefined() {
        assert!(GridSpec::predefined("gulf-of-mexico").is_some());
        assert!(GridSpec::predefined("atlantis").is_none());
    }
}
