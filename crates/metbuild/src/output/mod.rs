//! Output encoders for the supported product formats.

pub mod delft3d;
pub mod netcdf;
pub mod netcdf3;
pub mod owi_ascii;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use metget_common::{MetGetError, MetGetResult, OutputFormat, VariableKind};

use crate::field::GriddedField;

/// One encoded file ready for upload.
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub filename: String,
    pub data: Bytes,
}

/// One resolved time step: fields per domain in stacking order.
pub struct Snap {
    pub time: DateTime<Utc>,
    pub domains: Vec<GriddedField>,
}

/// Everything an encoder needs beyond the fields themselves.
pub struct EncoderContext<'a> {
    pub format: OutputFormat,
    pub variables: VariableKind,
    pub filename: &'a str,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub null_value: f32,
    pub epsg: u32,
    /// Gzip ASCII outputs.
    pub compression: bool,
    /// Stacking level per domain, in the same order as `Snap::domains`.
    pub levels: &'a [u32],
}

/// Encode all time steps into the requested format.
pub fn encode(ctx: &EncoderContext<'_>, snaps: &[Snap]) -> MetGetResult<Vec<OutputFile>> {
    if snaps.is_empty() {
        return Err(MetGetError::Internal("no time steps to encode".to_string()));
    }
    let num_domains = snaps[0].domains.len();
    if num_domains == 0 || ctx.levels.len() != num_domains {
        return Err(MetGetError::Internal(
            "domain count does not match levels".to_string(),
        ));
    }

    match ctx.format {
        OutputFormat::OwiAscii => encode_owi_ascii(ctx, snaps, num_domains),
        OutputFormat::OwiNetcdf => netcdf::encode_owi(ctx, snaps, num_domains),
        OutputFormat::RasNetcdf => netcdf::encode_ras(ctx, snaps, num_domains),
        OutputFormat::Delft3d => delft3d::encode(ctx, snaps),
    }
}

fn encode_owi_ascii(
    ctx: &EncoderContext<'_>,
    snaps: &[Snap],
    num_domains: usize,
) -> MetGetResult<Vec<OutputFile>> {
    let mut files = Vec::new();
    for d in 0..num_domains {
        let mut domain = owi_ascii::OwiAsciiDomain::new(
            ctx.variables,
            ctx.filename,
            d,
            ctx.levels[d],
            ctx.start,
            ctx.end,
        );
        for snap in snaps {
            domain.write_snap(snap.time, &snap.domains[d])?;
        }
        files.extend(domain.finish());
    }

    if ctx.compression {
        files = files
            .into_iter()
            .map(gzip_file)
            .collect::<MetGetResult<Vec<_>>>()?;
    }
    Ok(files)
}

fn gzip_file(file: OutputFile) -> MetGetResult<OutputFile> {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&file.data)
        .and_then(|_| encoder.finish())
        .map(|compressed| OutputFile {
            filename: format!("{}.gz", file.filename),
            data: Bytes::from(compressed),
        })
        .map_err(|e| MetGetError::Internal(format!("gzip failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use metget_common::GridSpec;

    fn snaps(n: usize) -> Vec<Snap> {
        let grid = GridSpec::from_corners(-100.0, 20.0, -98.0, 22.0, 1.0, 1.0).unwrap();
        (0..n)
            .map(|h| Snap {
                time: Utc.with_ymd_and_hms(2024, 1, 1, h as u32, 0, 0).unwrap(),
                domains: vec![GriddedField::filled(
                    grid.clone(),
                    VariableKind::WindPressure,
                    1.0,
                )],
            })
            .collect()
    }

    fn ctx(format: OutputFormat) -> EncoderContext<'static> {
        EncoderContext {
            format,
            variables: VariableKind::WindPressure,
            filename: "forcing",
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap(),
            null_value: -999.0,
            epsg: 4326,
            compression: false,
            levels: &[0],
        }
    }

    #[test]
    fn test_dispatch_produces_files_per_format() {
        let snaps = snaps(4);
        assert_eq!(encode(&ctx(OutputFormat::OwiAscii), &snaps).unwrap().len(), 2);
        assert_eq!(encode(&ctx(OutputFormat::OwiNetcdf), &snaps).unwrap().len(), 1);
        assert_eq!(encode(&ctx(OutputFormat::RasNetcdf), &snaps).unwrap().len(), 1);
        assert_eq!(encode(&ctx(OutputFormat::Delft3d), &snaps).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_snaps_rejected() {
        assert!(encode(&ctx(OutputFormat::OwiAscii), &[]).is_err());
    }

    #[test]
    fn test_compressed_ascii_outputs() {
        let mut context = ctx(OutputFormat::OwiAscii);
        context.compression = true;
        let files = encode(&context, &snaps(2)).unwrap();
        assert!(files.iter().all(|f| f.filename.ends_with(".gz")));
        // gzip magic
        assert_eq!(&files[0].data[0..2], &[0x1f, 0x8b]);
    }
}
