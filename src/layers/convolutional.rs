//! Convolutional layer implementation
//!
//! Slides a square kernel over an (height × width × channels) input and
//! produces an (out_height × out_width × out_channels) feature map. The
//! operation is an un-flipped cross-correlation without padding.
//!
//! Receptive fields and kernel rows share one flattening order: row-major over
//! (channel, kernel row, kernel column), i.e. patch element
//! `c * k * k + m * k + n` pairs with kernel row `c * k * k + m * k + n`.

use crate::error::{EngineError, Result};
use crate::layers::{ActivationCache, Layer, LayerKind, Param};
use crate::tensor::Tensor;
use crate::utils::{Activation, SimpleRng};
use log::debug;

/// Convolutional layer with a (k·k·in_channels × out_channels) kernel matrix
/// and one bias per output channel.
///
/// The activation is applied per output position across the channel vector,
/// which only differs from elementwise application for softmax.
///
/// # Example
///
/// ```
/// use neural_layers::layers::{ConvolutionalLayer, Layer};
/// use neural_layers::utils::{Activation, SimpleRng};
/// use neural_layers::Tensor;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = ConvolutionalLayer::new(3, 1, 8, 1, Activation::Relu, &mut rng).unwrap();
/// let output = layer.infer(&Tensor::zeros(&[28, 28, 1])).unwrap();
/// assert_eq!(output.shape(), &[26, 26, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct ConvolutionalLayer {
    kernel_size: usize,
    input_channels: usize,
    output_channels: usize,
    stride: usize,
    activation: Activation,
    input_geometry: Option<(usize, usize)>,
    kernels: Param,
    biases: Param,
    cache: Option<ActivationCache>,
}

impl ConvolutionalLayer {
    /// Create a layer with Xavier-uniform kernels and zero biases.
    ///
    /// fan_in = input_channels × k², fan_out = output_channels × k².
    ///
    /// # Arguments
    ///
    /// * `kernel_size` - Side length k of the square kernel
    /// * `input_channels` - Channels per input position
    /// * `output_channels` - Number of feature maps produced
    /// * `stride` - Step between receptive fields along both axes
    /// * `activation` - Nonlinearity applied per output position
    /// * `rng` - Random number generator for kernel initialization
    ///
    /// # Returns
    ///
    /// A layer without a fixed input geometry, or a configuration error when
    /// any size or the stride is zero. Use [`with_input_geometry`] before
    /// placing it after a fully connected layer in a `Network`.
    ///
    /// [`with_input_geometry`]: ConvolutionalLayer::with_input_geometry
    pub fn new(
        kernel_size: usize,
        input_channels: usize,
        output_channels: usize,
        stride: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        if kernel_size == 0 || input_channels == 0 || output_channels == 0 || stride == 0 {
            return Err(EngineError::config(format!(
                "convolution requires positive kernel_size, channels and stride, got k={} in={} out={} stride={}",
                kernel_size, input_channels, output_channels, stride
            )));
        }
        let area = kernel_size * kernel_size;
        let fan_in = (input_channels * area) as f32;
        let fan_out = (output_channels * area) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();
        let kernels =
            Tensor::random_uniform(&[area * input_channels, output_channels], -limit, limit, rng);

        debug!(
            "ConvolutionalLayer: {}x{} kernel, {} -> {} channels, stride {} ({})",
            kernel_size, kernel_size, input_channels, output_channels, stride, activation
        );
        Self::from_parameters(
            kernel_size,
            input_channels,
            stride,
            activation,
            kernels,
            Tensor::zeros(&[output_channels]),
        )
    }

    /// Build a layer from an explicit kernel matrix and bias vector.
    pub fn from_parameters(
        kernel_size: usize,
        input_channels: usize,
        stride: usize,
        activation: Activation,
        kernels: Tensor,
        biases: Tensor,
    ) -> Result<Self> {
        if kernel_size == 0 || input_channels == 0 || stride == 0 {
            return Err(EngineError::config(
                "convolution requires positive kernel_size, input_channels and stride",
            ));
        }
        let rows = kernel_size * kernel_size * input_channels;
        let output_channels = match kernels.shape() {
            &[r, cols] if r == rows => cols,
            other => {
                return Err(EngineError::shape(&[rows, biases.len()], other, "convolution kernels"))
            }
        };
        if biases.len() != output_channels {
            return Err(EngineError::shape(&[output_channels], biases.shape(), "convolution biases"));
        }
        let biases = biases.reshape(&[output_channels])?;

        Ok(Self {
            kernel_size,
            input_channels,
            output_channels,
            stride,
            activation,
            input_geometry: None,
            kernels: Param::new(kernels),
            biases: Param::new(biases),
            cache: None,
        })
    }

    /// Fix the input height and width, so the layer reports fixed input and
    /// output sizes and accepts flat inputs of matching length.
    pub fn with_input_geometry(mut self, height: usize, width: usize) -> Result<Self> {
        if height < self.kernel_size || width < self.kernel_size {
            return Err(EngineError::config(format!(
                "input geometry {}x{} is smaller than the {}x{} kernel",
                height, width, self.kernel_size, self.kernel_size
            )));
        }
        self.input_geometry = Some((height, width));
        Ok(self)
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn input_geometry(&self) -> Option<(usize, usize)> {
        self.input_geometry
    }

    pub fn kernels(&self) -> &Tensor {
        self.kernels.value()
    }

    pub fn biases(&self) -> &Tensor {
        self.biases.value()
    }

    pub fn kernel_gradients(&self) -> &Tensor {
        self.kernels.grad()
    }

    pub fn bias_gradients(&self) -> &Tensor {
        self.biases.grad()
    }

    /// Output spatial size: floor((H − k) / stride) + 1 per axis.
    pub fn output_dims(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        if height < self.kernel_size || width < self.kernel_size {
            return Err(EngineError::shape(
                &[self.kernel_size, self.kernel_size, self.input_channels],
                &[height, width, self.input_channels],
                "convolution input smaller than kernel",
            ));
        }
        Ok((
            (height - self.kernel_size) / self.stride + 1,
            (width - self.kernel_size) / self.stride + 1,
        ))
    }

    /// Resolve (height, width) of an input tensor.
    ///
    /// Accepts (H, W, C) tensors, (H, W) tensors for single-channel layers and,
    /// when a geometry is fixed, flat tensors of H·W·C elements.
    fn input_dims(&self, input: &Tensor) -> Result<(usize, usize)> {
        match (input.shape(), self.input_geometry) {
            (&[h, w, c], _) if c == self.input_channels => self.check_geometry(h, w, input),
            (&[h, w], _) if self.input_channels == 1 => self.check_geometry(h, w, input),
            (&[n], Some((h, w))) if n == h * w * self.input_channels => Ok((h, w)),
            (actual, geometry) => {
                let (h, w) = geometry.unwrap_or((0, 0));
                Err(EngineError::shape(
                    &[h, w, self.input_channels],
                    actual,
                    "convolution forward",
                ))
            }
        }
    }

    fn check_geometry(&self, h: usize, w: usize, input: &Tensor) -> Result<(usize, usize)> {
        match self.input_geometry {
            Some(expected) if expected != (h, w) => Err(EngineError::shape(
                &[expected.0, expected.1, self.input_channels],
                input.shape(),
                "convolution forward",
            )),
            _ => Ok((h, w)),
        }
    }

    /// Flat input offsets of the receptive field at output (row, col), in
    /// (channel, kernel row, kernel column) order.
    fn receptive_field(&self, row: usize, col: usize, width: usize, field: &mut Vec<usize>) {
        field.clear();
        let k = self.kernel_size;
        for c in 0..self.input_channels {
            for m in 0..k {
                for n in 0..k {
                    let y = row * self.stride + m;
                    let x = col * self.stride + n;
                    field.push((y * width + x) * self.input_channels + c);
                }
            }
        }
    }

    /// Forward pass returning the full trace without storing it.
    pub fn forward_traced(&self, input: &Tensor) -> Result<ActivationCache> {
        let (height, width) = self.input_dims(input)?;
        let (out_h, out_w) = self.output_dims(height, width)?;
        let oc = self.output_channels;
        let kernels = self.kernels.value().data();
        let biases = self.biases.value().data();
        let data = input.data();

        let mut pre = vec![0.0f32; out_h * out_w * oc];
        let mut field = Vec::with_capacity(self.kernel_size * self.kernel_size * self.input_channels);

        for i in 0..out_h {
            for j in 0..out_w {
                self.receptive_field(i, j, width, &mut field);
                let out = &mut pre[(i * out_w + j) * oc..(i * out_w + j + 1) * oc];
                out.copy_from_slice(biases);
                for (r, &offset) in field.iter().enumerate() {
                    let value = data[offset];
                    let kernel_row = &kernels[r * oc..(r + 1) * oc];
                    for (o, &w) in out.iter_mut().zip(kernel_row.iter()) {
                        *o += value * w;
                    }
                }
            }
        }

        let mut output = pre.clone();
        for position in output.chunks_exact_mut(oc) {
            self.activation.apply(position);
        }

        Ok(ActivationCache {
            input: input.clone(),
            pre_activation: Tensor::new(vec![out_h, out_w, oc], pre)?,
            output: Tensor::new(vec![out_h, out_w, oc], output)?,
        })
    }

    /// Backward pass against an explicit trace from [`forward_traced`].
    ///
    /// [`forward_traced`]: ConvolutionalLayer::forward_traced
    pub fn backward_traced(&mut self, trace: &ActivationCache, grad_output: &Tensor) -> Result<Tensor> {
        if grad_output.len() != trace.output.len() {
            return Err(EngineError::shape(
                trace.output.shape(),
                grad_output.shape(),
                "convolution backward",
            ));
        }
        let (height, width) = self.input_dims(&trace.input)?;
        let (out_h, out_w) = self.output_dims(height, width)?;
        let oc = self.output_channels;

        let mut local = Vec::with_capacity(grad_output.len());
        for ((pre, out), grad) in trace
            .pre_activation
            .data()
            .chunks_exact(oc)
            .zip(trace.output.data().chunks_exact(oc))
            .zip(grad_output.data().chunks_exact(oc))
        {
            local.extend(self.activation.backward(pre, out, grad));
        }

        let input = trace.input.data();
        let kernels = self.kernels.value().data();
        let mut grad_kernels = Tensor::zeros(self.kernels.value().shape());
        let mut grad_biases = Tensor::zeros(&[oc]);
        let mut grad_input = vec![0.0f32; input.len()];
        let mut field = Vec::with_capacity(self.kernel_size * self.kernel_size * self.input_channels);

        for i in 0..out_h {
            for j in 0..out_w {
                let g = &local[(i * out_w + j) * oc..(i * out_w + j + 1) * oc];
                for (b, &d) in grad_biases.data_mut().iter_mut().zip(g.iter()) {
                    *b += d;
                }

                self.receptive_field(i, j, width, &mut field);
                let gk = grad_kernels.data_mut();
                for (r, &offset) in field.iter().enumerate() {
                    let value = input[offset];
                    let kernel_row = &kernels[r * oc..(r + 1) * oc];
                    let grad_row = &mut gk[r * oc..(r + 1) * oc];
                    let mut scattered = 0.0f32;
                    for ((gw, &w), &d) in grad_row.iter_mut().zip(kernel_row.iter()).zip(g.iter()) {
                        *gw += value * d;
                        scattered += w * d;
                    }
                    grad_input[offset] += scattered;
                }
            }
        }

        self.kernels.accumulate(&grad_kernels)?;
        self.biases.accumulate(&grad_biases)?;
        Tensor::new(trace.input.shape().to_vec(), grad_input)
    }
}

impl Layer for ConvolutionalLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Convolutional
    }

    fn input_size(&self) -> Option<usize> {
        self.input_geometry
            .map(|(h, w)| h * w * self.input_channels)
    }

    fn output_size(&self) -> Option<usize> {
        let (h, w) = self.input_geometry?;
        let (out_h, out_w) = self.output_dims(h, w).ok()?;
        Some(out_h * out_w * self.output_channels)
    }

    fn channels(&self) -> Option<(usize, usize)> {
        Some((self.input_channels, self.output_channels))
    }

    fn infer(&self, input: &Tensor) -> Result<Tensor> {
        Ok(self.forward_traced(input)?.output)
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let trace = self.forward_traced(input)?;
        let output = trace.output.clone();
        self.cache = Some(trace);
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let trace = self.cache.take().ok_or(EngineError::MissingCache {
            layer: "convolutional",
        })?;
        self.backward_traced(&trace, grad_output)
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.kernels, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.kernels, &mut self.biases]
    }
}
