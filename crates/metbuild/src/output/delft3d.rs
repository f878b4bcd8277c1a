//! Delft3D meteo-on-equidistant-grid output (.amu/.amv/.amp).
//!
//! Delft3D forcing has no domain stacking; the base domain alone is
//! written. Rows run north to south as the format expects.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use metget_common::{GridSpec, MetGetResult, VariableKind};

use crate::field::GriddedField;
use crate::output::{EncoderContext, OutputFile, Snap};

pub fn encode(ctx: &EncoderContext<'_>, snaps: &[Snap]) -> MetGetResult<Vec<OutputFile>> {
    let grid = snaps[0].domains[0].grid.clone();

    let quantities: Vec<(String, &'static str, &'static str, usize)> = match ctx.variables {
        VariableKind::WindPressure => vec![
            (format!("{}.amu", ctx.filename), "x_wind", "m s-1", 0),
            (format!("{}.amv", ctx.filename), "y_wind", "m s-1", 1),
            (format!("{}.amp", ctx.filename), "air_pressure", "mbar", 2),
        ],
        VariableKind::Rain => vec![(
            format!("{}.ampr", ctx.filename),
            "precipitation",
            "mm/h",
            0,
        )],
        VariableKind::Humidity => vec![(
            format!("{}.amr", ctx.filename),
            "relative_humidity",
            "%",
            0,
        )],
        VariableKind::Ice | VariableKind::Temperature => vec![(
            format!("{}.amt", ctx.filename),
            "air_temperature",
            "Celsius",
            0,
        )],
    };

    let mut files = Vec::with_capacity(quantities.len());
    for (filename, quantity, unit, plane) in quantities {
        let mut buffer = header(&grid, quantity, unit, ctx.null_value);
        for snap in snaps {
            write_block(&mut buffer, ctx.start, snap.time, &snap.domains[0], plane);
        }
        files.push(OutputFile {
            filename,
            data: Bytes::from(buffer.into_bytes()),
        });
    }
    Ok(files)
}

fn header(grid: &GridSpec, quantity: &str, unit: &str, null_value: f32) -> String {
    let mut out = String::new();
    out.push_str("FileVersion = 1.03\n");
    out.push_str("filetype = meteo_on_equidistant_grid\n");
    out.push_str(&format!("NODATA_value = {:.1}\n", null_value));
    out.push_str(&format!("n_cols = {}\n", grid.ni));
    out.push_str(&format!("n_rows = {}\n", grid.nj));
    out.push_str("grid_unit = degree\n");
    out.push_str(&format!("x_llcenter = {:.6}\n", grid.x_init));
    out.push_str(&format!("y_llcenter = {:.6}\n", grid.y_init));
    out.push_str(&format!("dx = {:.6}\n", grid.di));
    out.push_str(&format!("dy = {:.6}\n", grid.dj));
    out.push_str("n_quantity = 1\n");
    out.push_str(&format!("quantity1 = {}\n", quantity));
    out.push_str(&format!("unit1 = {}\n", unit));
    out
}

fn write_block(
    buffer: &mut String,
    start: DateTime<Utc>,
    time: DateTime<Utc>,
    field: &GriddedField,
    plane: usize,
) {
    let hours = (time - start).num_seconds() as f64 / 3600.0;
    buffer.push_str(&format!(
        "TIME = {:.2} hours since {} +00:00\n",
        hours,
        start.format("%Y-%m-%d %H:%M:%S"),
    ));

    for j in (0..field.grid.nj).rev() {
        for i in 0..field.grid.ni {
            if i > 0 {
                buffer.push(' ');
            }
            buffer.push_str(&format!("{:.3}", field.get(plane, i, j)));
        }
        buffer.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use metget_common::OutputFormat;

    fn sample() -> (EncoderContext<'static>, Vec<Snap>) {
        let grid = GridSpec::from_corners(-100.0, 20.0, -98.0, 21.0, 1.0, 1.0).unwrap();
        let mut field = GriddedField::filled(grid.clone(), VariableKind::WindPressure, 0.0);
        // Distinguish south row from north row on the pressure plane
        field.set(2, 0, 0, 1000.0);
        field.set(2, 0, 1, 990.0);

        let snaps = vec![Snap {
            time: Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
            domains: vec![field],
        }];
        let ctx = EncoderContext {
            format: OutputFormat::Delft3d,
            variables: VariableKind::WindPressure,
            filename: "forcing",
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
            null_value: -999.0,
            epsg: 4326,
            compression: false,
            levels: &[0],
        };
        (ctx, snaps)
    }

    #[test]
    fn test_three_files_for_wind_pressure() {
        let (ctx, snaps) = sample();
        let files = encode(&ctx, &snaps).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["forcing.amu", "forcing.amv", "forcing.amp"]);
    }

    #[test]
    fn test_header_fields() {
        let (ctx, snaps) = sample();
        let files = encode(&ctx, &snaps).unwrap();
        let text = String::from_utf8(files[0].data.to_vec()).unwrap();
        assert!(text.contains("FileVersion = 1.03"));
        assert!(text.contains("filetype = meteo_on_equidistant_grid"));
        assert!(text.contains("n_cols = 3"));
        assert!(text.contains("n_rows = 2"));
        assert!(text.contains("quantity1 = x_wind"));
        assert!(text.contains("TIME = 6.00 hours since 2024-01-01 00:00:00 +00:00"));
    }

    #[test]
    fn test_rows_run_north_to_south() {
        let (ctx, snaps) = sample();
        let files = encode(&ctx, &snaps).unwrap();
        let text = String::from_utf8(files[2].data.to_vec()).unwrap();
        let north = text.find("990.000").unwrap();
        let south = text.find("1000.000").unwrap();
        assert!(north < south);
    }
}
