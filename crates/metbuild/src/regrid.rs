//! The re-gridding seam.
//!
//! Decoding meteorological payloads and interpolating them onto an output
//! grid is the job of an external collaborator. The worker talks to it
//! through [`Regridder`]; the production implementation shells out to the
//! configured kernel command, streaming the raw payload in and packed
//! float planes out.

use std::io::Write;
use std::process::{Command, Stdio};

use byteorder::{LittleEndian, ReadBytesExt};
use serde_json::json;
use tracing::debug;

use metget_common::{GridSpec, MetGetError, MetGetResult, Service, VariableKind};

use crate::field::GriddedField;

/// Interpolates a raw forecast payload onto a target grid.
pub trait Regridder: Send + Sync {
    fn regrid(
        &self,
        payload: &[u8],
        source: Service,
        variables: VariableKind,
        target: &GridSpec,
    ) -> MetGetResult<GriddedField>;
}

/// Regridder that invokes an external kernel process.
///
/// The kernel receives a JSON job description as its single argument and
/// the payload on stdin; it writes `planes * ni * nj` little-endian f32
/// values to stdout, NaN marking cells outside the source coverage.
pub struct ExternalRegridder {
    command: String,
}

impl ExternalRegridder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Build from the `METGET_REGRID_CMD` environment variable.
    pub fn from_env() -> MetGetResult<Self> {
        let command = std::env::var("METGET_REGRID_CMD").map_err(|_| {
            MetGetError::Internal("METGET_REGRID_CMD is not configured".to_string())
        })?;
        Ok(Self::new(command))
    }
}

impl Regridder for ExternalRegridder {
    fn regrid(
        &self,
        payload: &[u8],
        source: Service,
        variables: VariableKind,
        target: &GridSpec,
    ) -> MetGetResult<GriddedField> {
        let job = json!({
            "service": source.name(),
            "variables": variables.name(),
            "grid": {
                "x_init": target.x_init,
                "y_init": target.y_init,
                "di": target.di,
                "dj": target.dj,
                "ni": target.ni,
                "nj": target.nj,
                "rotation": target.rotation,
            },
        });

        debug!(command = %self.command, service = %source, "Invoking regrid kernel");

        let mut child = Command::new(&self.command)
            .arg(job.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MetGetError::Internal(format!("Failed to spawn regrid kernel: {}", e))
            })?;

        child
            .stdin
            .take()
            .ok_or_else(|| MetGetError::Internal("Kernel stdin unavailable".to_string()))?
            .write_all(payload)
            .map_err(|e| MetGetError::Upstream(format!("Kernel stdin write failed: {}", e)))?;

        let output = child
            .wait_with_output()
            .map_err(|e| MetGetError::Upstream(format!("Kernel wait failed: {}", e)))?;

        if !output.status.success() {
            return Err(MetGetError::Upstream(format!(
                "Regrid kernel exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        decode_planes(&output.stdout, variables, target)
    }
}

/// Decode packed little-endian f32 planes into a field.
fn decode_planes(
    data: &[u8],
    variables: VariableKind,
    target: &GridSpec,
) -> MetGetResult<GriddedField> {
    let n = target.n();
    let planes = variables.planes();
    let expected = planes * n * 4;
    if data.len() != expected {
        return Err(MetGetError::Upstream(format!(
            "Kernel produced {} bytes, expected {}",
            data.len(),
            expected
        )));
    }

    let mut cursor = std::io::Cursor::new(data);
    let mut out = Vec::with_capacity(planes);
    for _ in 0..planes {
        let mut plane = vec![0.0f32; n];
        cursor
            .read_f32_into::<LittleEndian>(&mut plane)
            .map_err(|e| MetGetError::Upstream(format!("Kernel output truncated: {}", e)))?;
        out.push(plane);
    }

    GriddedField::from_planes(target.clone(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn grid() -> GridSpec {
        GridSpec::from_corners(0.0, 0.0, 1.0, 1.0, 0.5, 0.5).unwrap()
    }

    #[test]
    fn test_decode_planes_round_trip() {
        let g = grid();
        let n = g.n();
        let mut bytes = Vec::new();
        for p in 0..3 {
            for c in 0..n {
                bytes
                    .write_f32::<LittleEndian>(p as f32 * 100.0 + c as f32)
                    .unwrap();
            }
        }

        let field = decode_planes(&bytes, VariableKind::WindPressure, &g).unwrap();
        assert_eq!(field.num_planes(), 3);
        assert_eq!(field.plane(0)[0], 0.0);
        assert_eq!(field.plane(2)[n - 1], 200.0 + (n - 1) as f32);
    }

    #[test]
    fn test_decode_planes_length_checked() {
        let g = grid();
        let bytes = vec![0u8; 7];
        let err = decode_planes(&bytes, VariableKind::Rain, &g).unwrap_err();
        assert!(matches!(err, MetGetError::Upstream(_)));
    }
}
