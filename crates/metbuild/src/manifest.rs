//! The filelist manifest uploaded next to every build's outputs.

use serde_json::{json, Value};

/// Builds `filelist.json`: the input spec, the catalog files consumed per
/// domain, and the produced output files.
pub struct Manifest {
    input: Value,
    input_files: Vec<Value>,
    output_files: Vec<String>,
}

impl Manifest {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            input_files: Vec::new(),
            output_files: Vec::new(),
        }
    }

    pub fn add_domain_inputs(&mut self, domain_index: usize, storage_keys: &[&str]) {
        self.input_files.push(json!({
            "domain": domain_index,
            "files": storage_keys,
        }));
    }

    pub fn add_output(&mut self, filename: &str) {
        self.output_files.push(filename.to_string());
    }

    pub fn to_json(&self) -> Value {
        json!({
            "input": self.input,
            "input_files": self.input_files,
            "output_files": self.output_files,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(&self.to_json()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_shape() {
        let mut manifest = Manifest::new(json!({"format": "owi-ascii"}));
        manifest.add_domain_inputs(0, &["gfs_ncep/2024-01-01/00/202401010000.bin"]);
        manifest.add_output("forcing_00_00.pre");
        manifest.add_output("forcing_00_00.wnd");

        let value = manifest.to_json();
        assert_eq!(value["input"]["format"], "owi-ascii");
        assert_eq!(value["input_files"][0]["domain"], 0);
        assert_eq!(value["output_files"].as_array().unwrap().len(), 2);

        let bytes = manifest.to_bytes();
        assert!(!bytes.is_empty());
    }
}
