//! Tests for caller-driven backpropagation through time
//!
//! The caller owns the per-step records and the hidden state; these tests
//! drive `step`, `forward_sequence` and `backward_sequence` directly.

use approx::assert_relative_eq;
use neural_layers::layers::{Layer, RecurrentLayer, RecurrentStep};
use neural_layers::utils::SimpleRng;
use neural_layers::{EngineError, Tensor};

const H: f32 = 1e-2;

fn layer_and_inputs(seed: u64, steps: usize) -> (RecurrentLayer, Vec<Tensor>, Tensor) {
    let mut rng = SimpleRng::new(seed);
    let layer = RecurrentLayer::new(2, 3, &mut rng).unwrap();
    let inputs = (0..steps)
        .map(|_| Tensor::random_uniform(&[2], -1.0, 1.0, &mut rng))
        .collect();
    let initial = Tensor::random_uniform(&[3], -0.5, 0.5, &mut rng);
    (layer, inputs, initial)
}

/// Loss reading only the final hidden state: L = sum(h_T).
fn final_sum(layer: &RecurrentLayer, inputs: &[Tensor], initial: &Tensor) -> f32 {
    let steps = layer.forward_sequence(inputs, initial).unwrap();
    steps.last().unwrap().hidden.sum()
}

// ============================================================================
// Unrolling Tests
// ============================================================================

mod unrolling_tests {
    use super::*;

    #[test]
    fn test_steps_chain_hidden_state() {
        let (layer, inputs, initial) = layer_and_inputs(1, 3);
        let steps = layer.forward_sequence(&inputs, &initial).unwrap();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].previous_hidden, initial);
        assert_eq!(steps[1].previous_hidden, steps[0].hidden);
        assert_eq!(steps[2].previous_hidden, steps[1].hidden);

        // Manual stepping with caller-held state gives the same records.
        let mut hidden = initial.clone();
        for (input, record) in inputs.iter().zip(steps.iter()) {
            let step: RecurrentStep = layer.step(input, &hidden).unwrap();
            assert_eq!(&step, record);
            hidden = step.hidden;
        }
    }

    #[test]
    fn test_empty_sequence() {
        let (layer, _, initial) = layer_and_inputs(1, 0);
        assert!(layer.forward_sequence(&[], &initial).unwrap().is_empty());
    }
}

// ============================================================================
// Backward Through Time Tests
// ============================================================================

mod bptt_tests {
    use super::*;

    #[test]
    fn test_gradient_reaches_every_input_and_initial_state() {
        let (mut layer, inputs, initial) = layer_and_inputs(2, 4);
        let steps = layer.forward_sequence(&inputs, &initial).unwrap();

        // Only the last step feeds the loss.
        let mut output_grads = vec![Tensor::zeros(&[3]); 4];
        output_grads[3] = Tensor::from_vec(vec![1.0; 3]);
        let grads = layer.backward_sequence(&steps, &output_grads).unwrap();

        assert_eq!(grads.inputs.len(), 4);
        for (t, analytical) in grads.inputs.iter().enumerate() {
            for i in 0..2 {
                let mut plus = inputs.clone();
                plus[t].data_mut()[i] += H;
                let mut minus = inputs.clone();
                minus[t].data_mut()[i] -= H;
                let numerical = (final_sum(&layer, &plus, &initial)
                    - final_sum(&layer, &minus, &initial))
                    / (2.0 * H);
                assert_relative_eq!(numerical, analytical.data()[i], epsilon = 1e-3, max_relative = 0.05);
            }
        }

        for i in 0..3 {
            let mut plus = initial.clone();
            plus.data_mut()[i] += H;
            let mut minus = initial.clone();
            minus.data_mut()[i] -= H;
            let numerical = (final_sum(&layer, &inputs, &plus)
                - final_sum(&layer, &inputs, &minus))
                / (2.0 * H);
            assert_relative_eq!(
                numerical,
                grads.initial_hidden.data()[i],
                epsilon = 1e-3,
                max_relative = 0.05
            );
        }
    }

    #[test]
    fn test_weight_gradients_sum_over_timesteps() {
        let (mut layer, inputs, initial) = layer_and_inputs(3, 2);
        let steps = layer.forward_sequence(&inputs, &initial).unwrap();
        let grads = vec![Tensor::from_vec(vec![0.5, -1.0, 0.25]); 2];
        layer.backward_sequence(&steps, &grads).unwrap();
        let total = layer.bias_gradients().clone();

        // Bias gradient equals the sum of the per-step local gradients.
        let (mut fresh, _, _) = layer_and_inputs(3, 0);
        let carry_free = fresh.backward_step(&steps[1], &grads[1]).unwrap();
        let carried = grads[0].add(&carry_free.previous_hidden).unwrap();
        fresh.backward_step(&steps[0], &carried).unwrap();

        for (a, b) in total.data().iter().zip(fresh.bias_gradients().data().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_parameters_untouched_until_applied() {
        let (mut layer, inputs, initial) = layer_and_inputs(4, 3);
        let before = layer.hidden_weights().clone();
        let steps = layer.forward_sequence(&inputs, &initial).unwrap();
        layer
            .backward_sequence(&steps, &vec![Tensor::from_vec(vec![1.0; 3]); 3])
            .unwrap();
        assert_eq!(layer.hidden_weights(), &before);
        assert!(layer.hidden_weight_gradients().data().iter().any(|&g| g != 0.0));
    }

    #[test]
    fn test_gradient_count_mismatch_is_shape_error() {
        let (mut layer, inputs, initial) = layer_and_inputs(5, 3);
        let steps = layer.forward_sequence(&inputs, &initial).unwrap();
        let err = layer
            .backward_sequence(&steps, &[Tensor::zeros(&[3])])
            .unwrap_err();
        assert!(matches!(err, EngineError::Shape { .. }));
    }

    #[test]
    fn test_layer_interface_starts_from_zero_state() {
        let (layer, inputs, _) = layer_and_inputs(6, 3);
        let layer = layer.with_sequence_length(3).unwrap();
        let parts: Vec<&Tensor> = inputs.iter().collect();
        let flat = Tensor::concat(&parts);

        let via_layer = layer.infer(&flat).unwrap();
        let steps = layer.forward_sequence(&inputs, &layer.initial_hidden()).unwrap();
        let hidden: Vec<&Tensor> = steps.iter().map(|s| &s.hidden).collect();
        assert_eq!(via_layer, Tensor::concat(&hidden));
    }
}
