//! NetCDF output flavors built on the classic-format writer.
//!
//! Both flavors share a layout: a time axis plus per-domain coordinate
//! and field variables, domain-suffixed when the request stacks more
//! than one domain. The OWI flavor uses NWS13-style variable names; the
//! RAS flavor is CF-flavored for HEC-RAS ingestion.

use bytes::Bytes;

use metget_common::{MetGetResult, VariableKind};

use crate::output::netcdf3::{AttValue, Netcdf3Writer, VarData};
use crate::output::{EncoderContext, OutputFile, Snap};

struct VarNames {
    wind_u: &'static str,
    wind_v: &'static str,
    pressure: &'static str,
    scalar: &'static str,
}

const OWI_NAMES: VarNames = VarNames {
    wind_u: "U10",
    wind_v: "V10",
    pressure: "PSFC",
    scalar: "PRATE",
};

const RAS_NAMES: VarNames = VarNames {
    wind_u: "wind_u",
    wind_v: "wind_v",
    pressure: "pressure",
    scalar: "precipitation",
};

pub fn encode_owi(
    ctx: &EncoderContext<'_>,
    snaps: &[Snap],
    num_domains: usize,
) -> MetGetResult<Vec<OutputFile>> {
    encode_netcdf(ctx, snaps, num_domains, &OWI_NAMES, "OWI-NWS13")
}

pub fn encode_ras(
    ctx: &EncoderContext<'_>,
    snaps: &[Snap],
    num_domains: usize,
) -> MetGetResult<Vec<OutputFile>> {
    encode_netcdf(ctx, snaps, num_domains, &RAS_NAMES, "CF-1.6")
}

fn encode_netcdf(
    ctx: &EncoderContext<'_>,
    snaps: &[Snap],
    num_domains: usize,
    names: &VarNames,
    conventions: &str,
) -> MetGetResult<Vec<OutputFile>> {
    let mut writer = Netcdf3Writer::new();

    let time_dim = writer.add_dim("time", snaps.len());
    writer.add_global_att("Conventions", AttValue::Text(conventions.to_string()));
    writer.add_global_att(
        "source",
        AttValue::Text("MetGet forcing assembly".to_string()),
    );
    writer.add_global_att("crs_epsg", AttValue::Int(vec![ctx.epsg as i32]));

    let time_units = format!("minutes since {}", ctx.start.format("%Y-%m-%d %H:%M:%S"));
    let time_values: Vec<f64> = snaps
        .iter()
        .map(|s| (s.time - ctx.start).num_seconds() as f64 / 60.0)
        .collect();
    writer.add_var(
        "time",
        &[time_dim],
        vec![
            ("units".to_string(), AttValue::Text(time_units)),
            ("standard_name".to_string(), AttValue::Text("time".into())),
        ],
        VarData::Double(time_values),
    )?;

    for d in 0..num_domains {
        let grid = &snaps[0].domains[d].grid;
        let suffix = if num_domains > 1 {
            format!("_{:02}", d)
        } else {
            String::new()
        };

        let lat_dim = writer.add_dim(&format!("lat{}", suffix), grid.nj);
        let lon_dim = writer.add_dim(&format!("lon{}", suffix), grid.ni);

        let lats: Vec<f64> = (0..grid.nj).map(|j| grid.point(0, j).1).collect();
        let lons: Vec<f64> = (0..grid.ni).map(|i| grid.point(i, 0).0).collect();

        writer.add_var(
            &format!("lat{}", suffix),
            &[lat_dim],
            vec![(
                "units".to_string(),
                AttValue::Text("degrees_north".to_string()),
            )],
            VarData::Double(lats),
        )?;
        writer.add_var(
            &format!("lon{}", suffix),
            &[lon_dim],
            vec![(
                "units".to_string(),
                AttValue::Text("degrees_east".to_string()),
            )],
            VarData::Double(lons),
        )?;

        let field_dims = [time_dim, lat_dim, lon_dim];
        match ctx.variables {
            VariableKind::WindPressure => {
                writer.add_var(
                    &format!("{}{}", names.wind_u, suffix),
                    &field_dims,
                    field_atts("m s-1", ctx.null_value),
                    VarData::Float(gather_plane(snaps, d, 0)),
                )?;
                writer.add_var(
                    &format!("{}{}", names.wind_v, suffix),
                    &field_dims,
                    field_atts("m s-1", ctx.null_value),
                    VarData::Float(gather_plane(snaps, d, 1)),
                )?;
                writer.add_var(
                    &format!("{}{}", names.pressure, suffix),
                    &field_dims,
                    field_atts("mb", ctx.null_value),
                    VarData::Float(gather_plane(snaps, d, 2)),
                )?;
            }
            _ => {
                writer.add_var(
                    &format!("{}{}", names.scalar, suffix),
                    &field_dims,
                    field_atts(scalar_units(ctx.variables), ctx.null_value),
                    VarData::Float(gather_plane(snaps, d, 0)),
                )?;
            }
        }
    }

    Ok(vec![OutputFile {
        filename: ctx.filename.to_string(),
        data: Bytes::from(writer.build()),
    }])
}

fn field_atts(units: &str, null_value: f32) -> Vec<(String, AttValue)> {
    vec![
        ("units".to_string(), AttValue::Text(units.to_string())),
        ("_FillValue".to_string(), AttValue::Float(vec![null_value])),
    ]
}

fn scalar_units(variables: VariableKind) -> &'static str {
    match variables {
        VariableKind::Rain => "mm hr-1",
        VariableKind::Humidity => "percent",
        VariableKind::Ice => "fraction",
        VariableKind::Temperature => "degC",
        VariableKind::WindPressure => "m s-1",
    }
}

/// Flatten one plane across all time steps, time-major.
fn gather_plane(snaps: &[Snap], domain: usize, plane: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(snaps.len() * snaps[0].domains[domain].plane(plane).len());
    for snap in snaps {
        out.extend_from_slice(snap.domains[domain].plane(plane));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GriddedField;
    use chrono::{TimeZone, Utc};
    use metget_common::{GridSpec, OutputFormat};

    fn sample_snaps() -> Vec<Snap> {
        let grid = GridSpec::from_corners(-100.0, 20.0, -98.0, 22.0, 1.0, 1.0).unwrap();
        (0..3)
            .map(|h| Snap {
                time: Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap(),
                domains: vec![
                    GriddedField::filled(grid.clone(), VariableKind::WindPressure, h as f32),
                    GriddedField::filled(grid.clone(), VariableKind::WindPressure, 10.0),
                ],
            })
            .collect()
    }

    #[test]
    fn test_multi_domain_netcdf_builds() {
        let ctx = EncoderContext {
            format: OutputFormat::OwiNetcdf,
            variables: VariableKind::WindPressure,
            filename: "forcing.nc",
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(),
            null_value: -999.0,
            epsg: 4326,
            compression: false,
            levels: &[0, 1],
        };
        let files = encode_owi(&ctx, &sample_snaps(), 2).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "forcing.nc");
        assert_eq!(&files[0].data[0..3], b"CDF");
        // NWS13 names are present in the header bytes
        let haystack = files[0].data.as_ref();
        assert!(contains(haystack, b"U10_00"));
        assert!(contains(haystack, b"PSFC_01"));
    }

    #[test]
    fn test_single_domain_has_no_suffix() {
        let grid = GridSpec::from_corners(-100.0, 20.0, -98.0, 22.0, 1.0, 1.0).unwrap();
        let snaps: Vec<Snap> = (0..2)
            .map(|h| Snap {
                time: Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap(),
                domains: vec![GriddedField::filled(grid.clone(), VariableKind::Rain, 0.1)],
            })
            .collect();
        let ctx = EncoderContext {
            format: OutputFormat::RasNetcdf,
            variables: VariableKind::Rain,
            filename: "rain.nc",
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            null_value: -999.0,
            epsg: 4326,
            compression: false,
            levels: &[0],
        };
        let files = encode_ras(&ctx, &snaps, 1).unwrap();
        let haystack = files[0].data.as_ref();
        assert!(contains(haystack, b"precipitation"));
        assert!(contains(haystack, b"CF-1.6"));
        assert!(!contains(haystack, b"precipitation_00"));
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }
}
