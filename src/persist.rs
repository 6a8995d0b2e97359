//! Parameter persistence
//!
//! Parameters are written as an ordered list of records, one per layer in
//! network order. Each record carries the layer-type tag and every parameter
//! tensor the layer owns as `{shape, data}` with row-major data.
//!
//! ```json
//! [
//!   { "layer_type": "fully_connected",
//!     "tensors": [ { "shape": [2, 2], "data": [1.0, 0.0, 0.0, 1.0] },
//!                  { "shape": [2], "data": [0.0, 0.0] } ] }
//! ]
//! ```

use crate::error::{EngineError, Result};
use crate::layers::LayerKind;
use crate::network::Network;
use crate::tensor::Tensor;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Parameters of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub layer_type: LayerKind,
    pub tensors: Vec<Tensor>,
}

impl Network {
    /// Snapshot every layer's parameters in network order.
    pub fn export_parameters(&self) -> Vec<ParameterRecord> {
        self.layers()
            .iter()
            .map(|layer| ParameterRecord {
                layer_type: layer.kind(),
                tensors: layer.params().iter().map(|p| p.value().clone()).collect(),
            })
            .collect()
    }

    /// Replace every layer's parameters from `records`.
    ///
    /// All records are validated before anything is written, so on error the
    /// network is left unchanged. Layer count and tag mismatches are
    /// configuration errors; tensor shape mismatches are shape errors.
    pub fn import_parameters(&mut self, records: &[ParameterRecord]) -> Result<()> {
        if records.len() != self.len() {
            return Err(EngineError::config(format!(
                "parameter file has {} layer records, network has {} layers",
                records.len(),
                self.len()
            )));
        }
        for (index, (layer, record)) in self.layers().iter().zip(records.iter()).enumerate() {
            if layer.kind() != record.layer_type {
                return Err(EngineError::config(format!(
                    "Layer {}: parameter record is '{}' but layer is '{}'",
                    index,
                    record.layer_type,
                    layer.kind()
                )));
            }
            let params = layer.params();
            if params.len() != record.tensors.len() {
                return Err(EngineError::config(format!(
                    "Layer {}: expected {} parameter tensors, found {}",
                    index,
                    params.len(),
                    record.tensors.len()
                )));
            }
            for (param, tensor) in params.iter().zip(record.tensors.iter()) {
                if param.value().shape() != tensor.shape() {
                    return Err(EngineError::shape(
                        param.value().shape(),
                        tensor.shape(),
                        &format!("parameter import (layer {})", index),
                    ));
                }
            }
        }

        for (layer, record) in self.layers_mut().iter_mut().zip(records.iter()) {
            layer.zero_gradients();
            for (param, tensor) in layer.params_mut().into_iter().zip(record.tensors.iter()) {
                param.set_value(tensor.clone())?;
            }
        }
        Ok(())
    }

    /// Write all parameters to a JSON file.
    pub fn save_parameters<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let records = self.export_parameters();
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, &records)?;
        writer.flush()?;
        debug!(
            "Network: saved {} layer records to {}",
            records.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Read parameters written by [`Network::save_parameters`].
    pub fn load_parameters<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let contents = fs::read_to_string(path.as_ref())?;
        let records: Vec<ParameterRecord> = serde_json::from_str(&contents)?;
        self.import_parameters(&records)?;
        debug!(
            "Network: loaded {} layer records from {}",
            records.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::FullyConnectedLayer;
    use crate::utils::{Activation, SimpleRng};

    fn small_network(seed: u64) -> Network {
        let mut rng = SimpleRng::new(seed);
        let mut network = Network::new(0.1);
        network
            .push(FullyConnectedLayer::new(3, 2, Activation::Tanh, &mut rng).unwrap())
            .unwrap();
        network
    }

    #[test]
    fn test_record_tag_serializes_snake_case() {
        let records = small_network(1).export_parameters();
        let json = serde_json::to_string(&records).unwrap();
        assert!(json.contains("\"layer_type\":\"fully_connected\""));
        assert!(json.contains("\"shape\":[3,2]"));
    }

    #[test]
    fn test_import_rejects_wrong_shape_without_writing() {
        let mut network = small_network(1);
        let before = network.export_parameters();

        let mut records = small_network(2).export_parameters();
        records[0].tensors[1] = Tensor::from_vec(vec![0.0; 5]);

        let err = network.import_parameters(&records).unwrap_err();
        assert!(matches!(err, EngineError::Shape { .. }));
        assert_eq!(network.export_parameters(), before);
    }

    #[test]
    fn test_import_rejects_wrong_tag() {
        let mut network = small_network(1);
        let mut records = network.export_parameters();
        records[0].layer_type = LayerKind::Recurrent;
        assert!(matches!(
            network.import_parameters(&records),
            Err(EngineError::Config(_))
        ));
    }
}
