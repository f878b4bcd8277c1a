//! OWI WIN/PRE ASCII output.
//!
//! One file pair per domain for wind/pressure (.pre holds pressure, .wnd
//! holds u then v), a single file for scalar variables. Records are
//! fixed-width, eight values per line.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use metget_common::{GridSpec, MetGetError, MetGetResult, VariableKind};

use crate::field::GriddedField;
use crate::output::OutputFile;

/// Streams one domain of an OWI ASCII product.
pub struct OwiAsciiDomain {
    variables: VariableKind,
    filenames: Vec<String>,
    buffers: Vec<String>,
}

impl OwiAsciiDomain {
    pub fn new(
        variables: VariableKind,
        base_filename: &str,
        domain_index: usize,
        level: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let stem = format!("{}_{:02}_{:02}", base_filename, domain_index, level);
        let filenames = match variables {
            VariableKind::WindPressure => vec![format!("{}.pre", stem), format!("{}.wnd", stem)],
            VariableKind::Rain => vec![format!("{}.precip", stem)],
            VariableKind::Humidity => vec![format!("{}.humid", stem)],
            VariableKind::Ice => vec![format!("{}.ice", stem)],
            VariableKind::Temperature => vec![format!("{}.temp", stem)],
        };

        let header = format!(
            "Oceanweather WIN/PRE Format                            {}     {}\n",
            start.format("%Y%m%d%H"),
            end.format("%Y%m%d%H"),
        );
        let buffers = vec![header; filenames.len()];

        Self {
            variables,
            filenames,
            buffers,
        }
    }

    /// Append one time step.
    pub fn write_snap(&mut self, time: DateTime<Utc>, field: &GriddedField) -> MetGetResult<()> {
        if field.num_planes() != self.variables.planes() {
            return Err(MetGetError::Internal(format!(
                "expected {} planes, got {}",
                self.variables.planes(),
                field.num_planes()
            )));
        }

        let header = record_header(&field.grid, time);
        match self.variables {
            VariableKind::WindPressure => {
                // Plane order is u, v, pressure; .pre gets pressure and
                // .wnd gets u then v under a single record header.
                self.buffers[0].push_str(&header);
                write_record(&mut self.buffers[0], field.plane(2));
                self.buffers[1].push_str(&header);
                write_record(&mut self.buffers[1], field.plane(0));
                write_record(&mut self.buffers[1], field.plane(1));
            }
            _ => {
                self.buffers[0].push_str(&header);
                write_record(&mut self.buffers[0], field.plane(0));
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<OutputFile> {
        self.filenames
            .into_iter()
            .zip(self.buffers)
            .map(|(filename, buffer)| OutputFile {
                filename,
                data: Bytes::from(buffer.into_bytes()),
            })
            .collect()
    }
}

/// Header coordinates narrow their precision as magnitude grows so the
/// field stays eight characters wide.
fn format_header_coordinate(value: f64) -> String {
    if value <= -100.0 {
        format!("{:8.3}", value)
    } else if value < 0.0 || value >= 100.0 {
        format!("{:8.4}", value)
    } else {
        format!("{:8.5}", value)
    }
}

fn record_header(grid: &GridSpec, time: DateTime<Utc>) -> String {
    format!(
        "iLat={:4}iLong={:4}DX={:6.4}DY={:6.4}SWLat={}SWLon={}DT={}\n",
        grid.nj,
        grid.ni,
        grid.dj,
        grid.di,
        format_header_coordinate(grid.y_init),
        format_header_coordinate(grid.x_init),
        time.format("%Y%m%d%H%M"),
    )
}

/// Fixed-width values, eight per line.
fn write_record(buffer: &mut String, values: &[f32]) {
    for (count, value) in values.iter().enumerate() {
        buffer.push_str(&format!("{:10.4}", value));
        if (count + 1) % 8 == 0 {
            buffer.push('\n');
        }
    }
    if values.len() % 8 != 0 {
        buffer.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grid() -> GridSpec {
        GridSpec::from_corners(-100.0, 20.0, -96.0, 22.0, 1.0, 1.0).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_file_header() {
        let domain = OwiAsciiDomain::new(
            VariableKind::WindPressure,
            "forcing",
            0,
            0,
            t0(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        );
        let files = domain.finish();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename, "forcing_00_00.pre");
        assert_eq!(files[1].filename, "forcing_00_00.wnd");

        let text = String::from_utf8(files[0].data.to_vec()).unwrap();
        assert!(text.starts_with("Oceanweather WIN/PRE Format"));
        assert!(text.contains("2024010100     2024010200"));
    }

    #[test]
    fn test_record_header_layout() {
        let header = record_header(&grid(), t0());
        assert!(header.starts_with("iLat=   3iLong=   5"));
        assert!(header.contains("DX=1.0000DY=1.0000"));
        assert!(header.contains("SWLat=20.00000"));
        assert!(header.contains("SWLon=-100.000"));
        assert!(header.trim_end().ends_with("DT=202401010000"));
    }

    #[test]
    fn test_header_coordinate_widths() {
        assert_eq!(format_header_coordinate(20.0), "20.00000");
        assert_eq!(format_header_coordinate(-100.0), "-100.000");
        assert_eq!(format_header_coordinate(-99.5), "-99.5000");
        assert_eq!(format_header_coordinate(150.25), "150.2500");
    }

    #[test]
    fn test_record_wraps_at_eight_values() {
        let mut buffer = String::new();
        write_record(&mut buffer, &[1.0; 15]);
        let lines: Vec<&str> = buffer.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 80);
        assert_eq!(lines[1].len(), 70);
        assert!(lines[0].contains("    1.0000"));
    }

    #[test]
    fn test_wind_pressure_snap_split() {
        let mut domain = OwiAsciiDomain::new(
            VariableKind::WindPressure,
            "forcing",
            1,
            2,
            t0(),
            Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
        );
        let g = grid();
        let mut field = GriddedField::filled(g, VariableKind::WindPressure, 0.0);
        for c in field.plane_mut(2) {
            *c = 1013.0;
        }
        for c in field.plane_mut(0) {
            *c = 5.0;
        }
        domain.write_snap(t0(), &field).unwrap();

        let files = domain.finish();
        let pre = String::from_utf8(files[0].data.to_vec()).unwrap();
        let wnd = String::from_utf8(files[1].data.to_vec()).unwrap();

        assert!(pre.contains(" 1013.0000"));
        assert!(!pre.contains("    5.0000"));
        assert!(wnd.contains("    5.0000"));
        // wnd carries two records (u and v) per snap
        assert_eq!(wnd.matches("DT=").count(), 1);
        assert_eq!(pre.matches("DT=").count(), 1);
    }

    #[test]
    fn test_scalar_variable_single_file() {
        let mut domain = OwiAsciiDomain::new(
            VariableKind::Rain,
            "rainfall",
            0,
            0,
            t0(),
            Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
        );
        let field = GriddedField::filled(grid(), VariableKind::Rain, 0.25);
        domain.write_snap(t0(), &field).unwrap();
        let files = domain.finish();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "rainfall_00_00.precip");
    }
}
