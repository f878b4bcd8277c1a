//! Minimal NetCDF classic (CDF-1) writer.
//!
//! Output files are classic-format byte streams built fully in memory:
//! fixed dimensions only, so the record count is zero and every variable
//! lives in the fixed data section. Offsets are computed in a dry pass
//! over the header, then the header is serialized with real values.

use byteorder::{BigEndian, WriteBytesExt};

use metget_common::{MetGetError, MetGetResult};

const NC_MAGIC: &[u8; 3] = b"CDF";
const NC_VERSION_CLASSIC: u8 = 1;

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;
const NC_ABSENT: [u32; 2] = [0, 0];

const NC_CHAR: u32 = 2;
const NC_INT: u32 = 4;
const NC_FLOAT: u32 = 5;
const NC_DOUBLE: u32 = 6;

/// An attribute value.
#[derive(Debug, Clone)]
pub enum AttValue {
    Text(String),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int(Vec<i32>),
}

/// Variable payload.
#[derive(Debug, Clone)]
pub enum VarData {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int(Vec<i32>),
}

impl VarData {
    fn nc_type(&self) -> u32 {
        match self {
            VarData::Float(_) => NC_FLOAT,
            VarData::Double(_) => NC_DOUBLE,
            VarData::Int(_) => NC_INT,
        }
    }

    fn elem_size(&self) -> usize {
        match self {
            VarData::Float(_) | VarData::Int(_) => 4,
            VarData::Double(_) => 8,
        }
    }

    fn len(&self) -> usize {
        match self {
            VarData::Float(v) => v.len(),
            VarData::Double(v) => v.len(),
            VarData::Int(v) => v.len(),
        }
    }
}

struct Var {
    name: String,
    dim_ids: Vec<usize>,
    atts: Vec<(String, AttValue)>,
    data: VarData,
}

/// Builder for a classic-format file.
#[derive(Default)]
pub struct Netcdf3Writer {
    dims: Vec<(String, usize)>,
    global_atts: Vec<(String, AttValue)>,
    vars: Vec<Var>,
}

impl Netcdf3Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a dimension; returns its id.
    pub fn add_dim(&mut self, name: &str, len: usize) -> usize {
        self.dims.push((name.to_string(), len));
        self.dims.len() - 1
    }

    pub fn add_global_att(&mut self, name: &str, value: AttValue) {
        self.global_atts.push((name.to_string(), value));
    }

    /// Define a variable with its full payload.
    pub fn add_var(
        &mut self,
        name: &str,
        dim_ids: &[usize],
        atts: Vec<(String, AttValue)>,
        data: VarData,
    ) -> MetGetResult<()> {
        let expected: usize = dim_ids
            .iter()
            .map(|&id| self.dims.get(id).map(|d| d.1).unwrap_or(0))
            .product();
        if expected != data.len() {
            return Err(MetGetError::Internal(format!(
                "variable '{}': data has {} elements, dimensions give {}",
                name,
                data.len(),
                expected
            )));
        }
        self.vars.push(Var {
            name: name.to_string(),
            dim_ids: dim_ids.to_vec(),
            atts,
            data,
        });
        Ok(())
    }

    /// Serialize the file.
    pub fn build(self) -> Vec<u8> {
        // Dry pass with zero offsets gives the header length.
        let header_len = self.serialize_header(&vec![0u32; self.vars.len()]).len();

        let mut begins = Vec::with_capacity(self.vars.len());
        let mut offset = header_len;
        for var in &self.vars {
            begins.push(offset as u32);
            offset += padded(var.data.len() * var.data.elem_size());
        }

        let mut out = self.serialize_header(&begins);
        for var in &self.vars {
            write_var_data(&mut out, &var.data);
        }
        out
    }

    fn serialize_header(&self, begins: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(NC_MAGIC);
        out.push(NC_VERSION_CLASSIC);
        out.write_u32::<BigEndian>(0).unwrap(); // numrecs: no record vars

        // dim_list
        if self.dims.is_empty() {
            for tag in NC_ABSENT {
                out.write_u32::<BigEndian>(tag).unwrap();
            }
        } else {
            out.write_u32::<BigEndian>(NC_DIMENSION).unwrap();
            out.write_u32::<BigEndian>(self.dims.len() as u32).unwrap();
            for (name, len) in &self.dims {
                write_name(&mut out, name);
                out.write_u32::<BigEndian>(*len as u32).unwrap();
            }
        }

        write_att_list(&mut out, &self.global_atts);

        // var_list
        if self.vars.is_empty() {
            for tag in NC_ABSENT {
                out.write_u32::<BigEndian>(tag).unwrap();
            }
        } else {
            out.write_u32::<BigEndian>(NC_VARIABLE).unwrap();
            out.write_u32::<BigEndian>(self.vars.len() as u32).unwrap();
            for (var, begin) in self.vars.iter().zip(begins) {
                write_name(&mut out, &var.name);
                out.write_u32::<BigEndian>(var.dim_ids.len() as u32).unwrap();
                for &id in &var.dim_ids {
                    out.write_u32::<BigEndian>(id as u32).unwrap();
                }
                write_att_list(&mut out, &var.atts);
                out.write_u32::<BigEndian>(var.data.nc_type()).unwrap();
                out.write_u32::<BigEndian>(
                    padded(var.data.len() * var.data.elem_size()) as u32
                )
                .unwrap();
                out.write_u32::<BigEndian>(*begin).unwrap();
            }
        }

        out
    }
}

fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.write_u32::<BigEndian>(name.len() as u32).unwrap();
    out.extend_from_slice(name.as_bytes());
    for _ in name.len()..padded(name.len()) {
        out.push(0);
    }
}

fn write_att_list(out: &mut Vec<u8>, atts: &[(String, AttValue)]) {
    if atts.is_empty() {
        for tag in NC_ABSENT {
            out.write_u32::<BigEndian>(tag).unwrap();
        }
        return;
    }
    out.write_u32::<BigEndian>(NC_ATTRIBUTE).unwrap();
    out.write_u32::<BigEndian>(atts.len() as u32).unwrap();
    for (name, value) in atts {
        write_name(out, name);
        match value {
            AttValue::Text(text) => {
                out.write_u32::<BigEndian>(NC_CHAR).unwrap();
                out.write_u32::<BigEndian>(text.len() as u32).unwrap();
                out.extend_from_slice(text.as_bytes());
                for _ in text.len()..padded(text.len()) {
                    out.push(0);
                }
            }
            AttValue::Float(values) => {
                out.write_u32::<BigEndian>(NC_FLOAT).unwrap();
                out.write_u32::<BigEndian>(values.len() as u32).unwrap();
                for v in values {
                    out.write_f32::<BigEndian>(*v).unwrap();
                }
            }
            AttValue::Double(values) => {
                out.write_u32::<BigEndian>(NC_DOUBLE).unwrap();
                out.write_u32::<BigEndian>(values.len() as u32).unwrap();
                for v in values {
                    out.write_f64::<BigEndian>(*v).unwrap();
                }
            }
            AttValue::Int(values) => {
                out.write_u32::<BigEndian>(NC_INT).unwrap();
                out.write_u32::<BigEndian>(values.len() as u32).unwrap();
                for v in values {
                    out.write_i32::<BigEndian>(*v).unwrap();
                }
            }
        }
    }
}

fn write_var_data(out: &mut Vec<u8>, data: &VarData) {
    let start = out.len();
    match data {
        VarData::Float(values) => {
            for v in values {
                out.write_f32::<BigEndian>(*v).unwrap();
            }
        }
        VarData::Double(values) => {
            for v in values {
                out.write_f64::<BigEndian>(*v).unwrap();
            }
        }
        VarData::Int(values) => {
            for v in values {
                out.write_i32::<BigEndian>(*v).unwrap();
            }
        }
    }
    let written = out.len() - start;
    for _ in written..padded(written) {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    fn build_sample() -> Vec<u8> {
        let mut writer = Netcdf3Writer::new();
        let time = writer.add_dim("time", 2);
        let lat = writer.add_dim("lat", 3);
        writer.add_global_att("source", AttValue::Text("metget".to_string()));
        writer
            .add_var(
                "lat",
                &[lat],
                vec![("units".to_string(), AttValue::Text("degrees_north".into()))],
                VarData::Double(vec![20.0, 20.5, 21.0]),
            )
            .unwrap();
        writer
            .add_var(
                "press",
                &[time, lat],
                vec![("_FillValue".to_string(), AttValue::Float(vec![-999.0]))],
                VarData::Float(vec![1013.0, 1012.0, 1011.0, 1010.0, 1009.0, 1008.0]),
            )
            .unwrap();
        writer.build()
    }

    #[test]
    fn test_magic_and_numrecs() {
        let bytes = build_sample();
        assert_eq!(&bytes[0..3], b"CDF");
        assert_eq!(bytes[3], 1);
        let mut cursor = Cursor::new(&bytes[4..8]);
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), 0);
    }

    #[test]
    fn test_dim_list_tag_and_count() {
        let bytes = build_sample();
        let mut cursor = Cursor::new(&bytes[8..16]);
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), NC_DIMENSION);
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), 2);
    }

    #[test]
    fn test_begin_offsets_point_at_data() {
        let bytes = build_sample();

        // Walk the header to the var list and collect (vsize, begin).
        // Rather than re-implement the parser, rely on the writer's own
        // invariant: the first variable's data begins at the header length
        // and contains the first latitude (20.0 as big-endian f64).
        let lat0 = 20.0f64.to_be_bytes();
        let pos = bytes
            .windows(8)
            .position(|w| w == lat0)
            .expect("first latitude value present");
        // The three doubles and six floats must run to the end of file.
        assert_eq!(bytes.len(), pos + 3 * 8 + 6 * 4);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut writer = Netcdf3Writer::new();
        let lat = writer.add_dim("lat", 3);
        let err = writer
            .add_var("bad", &[lat], vec![], VarData::Float(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(err.to_string().contains("data has 2 elements"));
    }

    #[test]
    fn test_name_padding() {
        // "lat" is 3 bytes, padded to 4; file must stay 4-byte aligned
        let bytes = build_sample();
        assert_eq!(bytes.len() % 4, 0);
    }
}
