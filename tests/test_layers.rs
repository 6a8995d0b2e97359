//! Forward-pass tests for every layer type
//!
//! This file tests:
//! - Known input/output pairs for each layer
//! - Output shapes against the documented formulas
//! - Shape and index errors at layer entry
//! - Determinism of seeded construction and repeated forward calls
//! - Cache discipline between forward and backward

use approx::assert_relative_eq;
use neural_layers::layers::{
    ConvolutionalLayer, EmbeddingLayer, FullyConnectedLayer, Layer, LayerKind, RecurrentLayer,
};
use neural_layers::optimizers::SGD;
use neural_layers::utils::{Activation, SimpleRng};
use neural_layers::{EngineError, Tensor};

// ============================================================================
// Fully Connected Layer Tests
// ============================================================================

mod fully_connected_tests {
    use super::*;

    #[test]
    fn test_identity_weights_softmax_splits_evenly() {
        let weights = Tensor::new(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let biases = Tensor::from_vec(vec![0.0, 0.0]);
        let mut layer =
            FullyConnectedLayer::from_parameters(weights, biases, Activation::Softmax).unwrap();

        let output = layer.forward(&Tensor::from_vec(vec![1.0, 1.0])).unwrap();

        assert_eq!(output.shape(), &[2]);
        assert_relative_eq!(output.data()[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(output.data()[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_affine_transform_uses_transposed_weights() {
        // weights (3 x 2): output_j = sum_i x_i * w_ij + b_j
        let weights = Tensor::new(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let biases = Tensor::from_vec(vec![0.5, -0.5]);
        let layer =
            FullyConnectedLayer::from_parameters(weights, biases, Activation::Identity).unwrap();

        let output = layer.infer(&Tensor::from_vec(vec![1.0, 0.0, -1.0])).unwrap();

        assert_eq!(output.data(), &[1.0 - 5.0 + 0.5, 2.0 - 6.0 - 0.5]);
    }

    #[test]
    fn test_wrong_input_length_is_shape_error() {
        let mut rng = SimpleRng::new(42);
        let layer = FullyConnectedLayer::new(4, 2, Activation::Relu, &mut rng).unwrap();
        assert!(matches!(
            layer.infer(&Tensor::from_vec(vec![1.0, 2.0, 3.0])),
            Err(EngineError::Shape { .. })
        ));
    }

    #[test]
    fn test_zero_size_is_config_error() {
        let mut rng = SimpleRng::new(42);
        assert!(matches!(
            FullyConnectedLayer::new(0, 2, Activation::Relu, &mut rng),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_xavier_bounds_and_zero_biases() {
        let mut rng = SimpleRng::new(42);
        let layer = FullyConnectedLayer::new(10, 6, Activation::Tanh, &mut rng).unwrap();
        let limit = (6.0f32 / 16.0).sqrt();
        assert!(layer.weights().data().iter().all(|w| w.abs() <= limit));
        assert!(layer.biases().data().iter().all(|&b| b == 0.0));
        assert_eq!(layer.parameter_count(), 10 * 6 + 6);
    }
}

// ============================================================================
// Convolutional Layer Tests
// ============================================================================

mod convolutional_tests {
    use super::*;

    fn ones_kernel_layer() -> ConvolutionalLayer {
        ConvolutionalLayer::from_parameters(
            2,
            1,
            1,
            Activation::Relu,
            Tensor::new(vec![4, 1], vec![1.0; 4]).unwrap(),
            Tensor::from_vec(vec![0.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_ones_kernel_over_ones_image() {
        let mut layer = ones_kernel_layer();
        let output = layer.forward(&Tensor::new(vec![3, 3, 1], vec![1.0; 9]).unwrap()).unwrap();

        assert_eq!(output.shape(), &[2, 2, 1]);
        assert_eq!(output.data(), &[4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_rank_two_input_for_single_channel() {
        let layer = ones_kernel_layer();
        let output = layer.infer(&Tensor::new(vec![3, 3], vec![1.0; 9]).unwrap()).unwrap();
        assert_eq!(output.data(), &[4.0; 4]);
    }

    #[test]
    fn test_output_shape_formula() {
        let mut rng = SimpleRng::new(42);
        for &(h, w, k, s) in &[(28, 28, 3, 1), (26, 26, 3, 2), (7, 9, 3, 2), (5, 5, 5, 1), (10, 4, 2, 3)] {
            let layer = ConvolutionalLayer::new(k, 2, 3, s, Activation::Identity, &mut rng).unwrap();
            let output = layer.infer(&Tensor::zeros(&[h, w, 2])).unwrap();
            assert_eq!(
                output.shape(),
                &[(h - k) / s + 1, (w - k) / s + 1, 3],
                "h={} w={} k={} s={}",
                h,
                w,
                k,
                s
            );
        }
    }

    #[test]
    fn test_input_smaller_than_kernel_is_shape_error() {
        let mut rng = SimpleRng::new(42);
        let layer = ConvolutionalLayer::new(3, 1, 1, 1, Activation::Relu, &mut rng).unwrap();
        assert!(matches!(
            layer.infer(&Tensor::zeros(&[2, 5, 1])),
            Err(EngineError::Shape { .. })
        ));
    }

    #[test]
    fn test_channel_mismatch_is_shape_error() {
        let mut rng = SimpleRng::new(42);
        let layer = ConvolutionalLayer::new(3, 2, 1, 1, Activation::Relu, &mut rng).unwrap();
        assert!(layer.infer(&Tensor::zeros(&[4, 4, 3])).is_err());
    }

    #[test]
    fn test_patch_order_is_channel_row_column() {
        // Kernel row c*k*k + m*k + n picks input (m, n, c); a one-hot kernel
        // row therefore reads a single input element.
        let k = 2;
        let mut kernels = Tensor::zeros(&[k * k * 2, 1]);
        kernels.data_mut()[k * k + 1] = 1.0; // channel 1, row 0, column 1
        let layer = ConvolutionalLayer::from_parameters(
            k,
            2,
            1,
            Activation::Identity,
            kernels,
            Tensor::from_vec(vec![0.0]),
        )
        .unwrap();

        let mut input = Tensor::zeros(&[2, 2, 2]);
        input.data_mut()[3] = 7.0; // (y=0, x=1, c=1)
        let output = layer.infer(&input).unwrap();
        assert_eq!(output.data(), &[7.0]);
    }

    #[test]
    fn test_fixed_geometry_reports_sizes() {
        let mut rng = SimpleRng::new(42);
        let layer = ConvolutionalLayer::new(3, 8, 16, 2, Activation::Relu, &mut rng)
            .unwrap()
            .with_input_geometry(26, 26)
            .unwrap();
        assert_eq!(layer.input_size(), Some(26 * 26 * 8));
        assert_eq!(layer.output_size(), Some(12 * 12 * 16));

        let flat = layer.infer(&Tensor::zeros(&[26 * 26 * 8])).unwrap();
        assert_eq!(flat.shape(), &[12, 12, 16]);
    }
}

// ============================================================================
// Recurrent Layer Tests
// ============================================================================

mod recurrent_tests {
    use super::*;

    #[test]
    fn test_single_step_formula() {
        let wx = Tensor::new(vec![2, 1], vec![0.5, -1.0]).unwrap();
        let wh = Tensor::new(vec![1, 1], vec![2.0]).unwrap();
        let b = Tensor::from_vec(vec![0.1]);
        let layer = RecurrentLayer::from_parameters(wx, wh, b).unwrap();

        let step = layer
            .step(&Tensor::from_vec(vec![1.0, 0.5]), &Tensor::from_vec(vec![0.25]))
            .unwrap();

        let expected = (0.5 - 0.5 + 0.5 + 0.1f32).tanh();
        assert_relative_eq!(step.hidden.data()[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_hidden_size_mismatch_is_shape_error() {
        let mut rng = SimpleRng::new(42);
        let layer = RecurrentLayer::new(3, 4, &mut rng).unwrap();
        assert!(matches!(
            layer.step(&Tensor::zeros(&[3]), &Tensor::zeros(&[5])),
            Err(EngineError::Shape { .. })
        ));
        assert!(layer.step(&Tensor::zeros(&[2]), &Tensor::zeros(&[4])).is_err());
    }

    #[test]
    fn test_layer_output_concatenates_timesteps() {
        let mut rng = SimpleRng::new(42);
        let layer = RecurrentLayer::new(2, 3, &mut rng)
            .unwrap()
            .with_sequence_length(4)
            .unwrap();
        assert_eq!(layer.input_size(), Some(8));
        assert_eq!(layer.output_size(), Some(12));

        let input = Tensor::random_uniform(&[8], -1.0, 1.0, &mut rng);
        let output = layer.infer(&input).unwrap();
        assert_eq!(output.len(), 12);
        assert!(output.data().iter().all(|h| h.abs() < 1.0));
    }
}

// ============================================================================
// Embedding Layer Tests
// ============================================================================

mod embedding_tests {
    use super::*;

    #[test]
    fn test_token_outside_vocabulary_is_index_error() {
        let mut rng = SimpleRng::new(42);
        let mut layer = EmbeddingLayer::new(5, 3, &mut rng).unwrap();
        assert!(matches!(
            layer.forward(&Tensor::from_vec(vec![7.0])),
            Err(EngineError::Index { index: 7, bound: 5, .. })
        ));
    }

    #[test]
    fn test_backward_changes_exactly_one_row() {
        let mut rng = SimpleRng::new(42);
        let mut layer = EmbeddingLayer::new(6, 4, &mut rng).unwrap();
        let before = layer.table().clone();

        layer.forward(&Tensor::from_vec(vec![2.0])).unwrap();
        layer.backward(&Tensor::from_vec(vec![1.0, -1.0, 0.5, 2.0])).unwrap();
        layer.apply_gradients(&mut SGD::new(0.1));

        let after = layer.table();
        for row in 0..6 {
            let unchanged = before.row(row).unwrap() == after.row(row).unwrap();
            assert_eq!(unchanged, row != 2, "row {}", row);
        }
        assert_relative_eq!(
            after.row(2).unwrap()[3],
            before.row(2).unwrap()[3] - 0.2,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_entries_within_unit_range() {
        let mut rng = SimpleRng::new(9);
        let layer = EmbeddingLayer::new(50, 8, &mut rng).unwrap();
        assert!(layer.table().data().iter().all(|v| (-1.0..1.0).contains(v)));
    }
}

// ============================================================================
// Determinism and Cache Tests
// ============================================================================

mod determinism_tests {
    use super::*;

    #[test]
    fn test_same_seed_same_parameters() {
        let a = ConvolutionalLayer::new(3, 2, 4, 1, Activation::Tanh, &mut SimpleRng::new(5)).unwrap();
        let b = ConvolutionalLayer::new(3, 2, 4, 1, Activation::Tanh, &mut SimpleRng::new(5)).unwrap();
        assert_eq!(a.kernels(), b.kernels());
    }

    #[test]
    fn test_repeated_forward_is_identical() {
        let mut rng = SimpleRng::new(11);
        let mut layer = FullyConnectedLayer::new(5, 3, Activation::Sigmoid, &mut rng).unwrap();
        let input = Tensor::random_uniform(&[5], -1.0, 1.0, &mut rng);
        let first = layer.forward(&input).unwrap();
        let second = layer.forward(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, layer.infer(&input).unwrap());
    }

    #[test]
    fn test_backward_twice_is_missing_cache() {
        let mut rng = SimpleRng::new(11);
        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(FullyConnectedLayer::new(4, 4, Activation::Tanh, &mut rng).unwrap()),
            Box::new(
                ConvolutionalLayer::new(2, 1, 1, 1, Activation::Tanh, &mut rng)
                    .unwrap()
                    .with_input_geometry(2, 2)
                    .unwrap(),
            ),
            Box::new(RecurrentLayer::new(4, 1, &mut rng).unwrap()),
        ];
        for mut layer in layers {
            let output = layer.forward(&Tensor::zeros(&[4])).unwrap();
            assert!(layer.backward(&output).is_ok());
            assert!(
                matches!(layer.backward(&output), Err(EngineError::MissingCache { .. })),
                "{}",
                layer.kind()
            );
        }
    }

    #[test]
    fn test_layer_kind_tags() {
        assert_eq!(LayerKind::FullyConnected.tag(), "fully_connected");
        assert_eq!(LayerKind::Convolutional.to_string(), "convolutional");
    }
}
