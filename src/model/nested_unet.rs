//! Nested U-Net (UNet++) for plume segmentation
//!
//! Four encoder stages feed three nested decoder levels through dense skip
//! pathways. Every concatenation resizes one operand to the exact spatial
//! size of the other, so inputs whose sides are not divisible by 8 still come
//! back at the input resolution.
//!
//! ```text
//! enc1 ── dec1_1 ───────────────────────────┐
//! enc2 ── dec2_1 ── dec2_2 ─────────────────┤
//! enc3 ── dec3_1 ── dec3_2 ── dec3_3 ── final 1×1 ── resize to H×W
//! enc4 (dropout)
//! ```

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Distribution, Int, Tensor, TensorData},
};

/// Whether a forward pass trains or infers
///
/// Only the bottleneck dropout reads this; batch norm statistics follow the
/// autodiff backend as usual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    Train,
    Eval,
}

/// Configuration for the nested U-Net
#[derive(Config, Debug)]
pub struct NestedUNetConfig {
    /// Number of input bands
    #[config(default = "9")]
    pub in_channels: usize,

    /// Number of output classes (background, plume)
    #[config(default = "2")]
    pub num_classes: usize,

    /// Width of the first encoder stage; deeper stages use 2x, 4x and 8x
    #[config(default = "64")]
    pub base_channels: usize,

    /// Channel dropout rate at the bottleneck
    #[config(default = "0.1")]
    pub dropout: f64,
}

impl NestedUNetConfig {
    /// Initialize the network on a device
    pub fn init<B: Backend>(&self, device: &B::Device) -> NestedUNet<B> {
        NestedUNet::new(self, device)
    }
}

/// Two rounds of 3x3 convolution, batch norm and ReLU
#[derive(Module, Debug)]
pub struct NestedConvBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub relu: Relu,
}

impl<B: Backend> NestedConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        Self {
            conv1,
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2,
            bn2: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        self.relu.forward(self.bn2.forward(self.conv2.forward(x)))
    }
}

/// Nested U-Net segmentation network
#[derive(Module, Debug)]
pub struct NestedUNet<B: Backend> {
    // Encoder
    pub enc1: NestedConvBlock<B>,
    pub enc2: NestedConvBlock<B>,
    pub enc3: NestedConvBlock<B>,
    pub enc4: NestedConvBlock<B>,
    pub pool: MaxPool2d,

    // Nesting level 1
    pub dec3_1: NestedConvBlock<B>,
    pub dec2_1: NestedConvBlock<B>,
    pub dec1_1: NestedConvBlock<B>,

    // Nesting level 2
    pub dec3_2: NestedConvBlock<B>,
    pub dec2_2: NestedConvBlock<B>,

    // Nesting level 3
    pub dec3_3: NestedConvBlock<B>,

    pub final_conv: Conv2d<B>,

    dropout: f64,
    num_classes: usize,
}

impl<B: Backend> NestedUNet<B> {
    pub fn new(config: &NestedUNetConfig, device: &B::Device) -> Self {
        let c0 = config.base_channels;
        let c1 = c0 * 2;
        let c2 = c0 * 4;
        let c3 = c0 * 8;

        Self {
            enc1: NestedConvBlock::new(config.in_channels, c0, device), // H
            enc2: NestedConvBlock::new(c0, c1, device),                 // H/2
            enc3: NestedConvBlock::new(c1, c2, device),                 // H/4
            enc4: NestedConvBlock::new(c2, c3, device),                 // H/8
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            dec3_1: NestedConvBlock::new(c2 + c3, c2, device),
            dec2_1: NestedConvBlock::new(c1 + c2, c1, device),
            dec1_1: NestedConvBlock::new(c0 + c1, c0, device),

            dec3_2: NestedConvBlock::new(c2 + c1, c1, device),
            dec2_2: NestedConvBlock::new(c1 + c0, c0, device),

            dec3_3: NestedConvBlock::new(c1 + c0, c0, device),

            final_conv: Conv2dConfig::new([c0, config.num_classes], [1, 1]).init(device),

            dropout: config.dropout,
            num_classes: config.num_classes,
        }
    }

    /// Logits [B, num_classes, H, W] for input [B, C, H, W]
    pub fn forward_with_mode(&self, input: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();

        // Encoder
        let x1_0 = self.enc1.forward(input);
        let x2_0 = self.enc2.forward(self.pool.forward(x1_0.clone()));
        let x3_0 = self.enc3.forward(self.pool.forward(x2_0.clone()));
        let x4_0 = self.enc4.forward(self.pool.forward(x3_0.clone()));

        let x4_0 = self.spatial_dropout(x4_0, mode);

        // Level 1: deeper encoder output brought up to the same-depth encoder output
        let x3_1 = self.dec3_1.forward(concat_resized(x3_0.clone(), x4_0));
        let x2_1 = self.dec2_1.forward(concat_resized(x2_0.clone(), x3_0));
        let x1_1 = self.dec1_1.forward(concat_resized(x1_0, x2_0));

        // Level 2
        let x3_2 = self.dec3_2.forward(concat_resized(x3_1, x2_1.clone()));
        let x2_2 = self.dec2_2.forward(concat_resized(x2_1, x1_1));

        // Level 3
        let x3_3 = self.dec3_3.forward(concat_resized(x3_2, x2_2));

        let out = self.final_conv.forward(x3_3);
        resize_to(out, [height, width])
    }

    /// Inference forward pass (dropout disabled)
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward_with_mode(input, ForwardMode::Eval)
    }

    /// Predicted class id per pixel, shape [B, H, W]
    pub fn predict_mask(&self, input: Tensor<B, 4>) -> Tensor<B, 3, Int> {
        let logits = self.forward(input);
        let [batch, _, height, width] = logits.dims();
        logits.argmax(1).reshape([batch, height, width])
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Zero whole channels with probability `dropout` and rescale the rest
    fn spatial_dropout(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        if mode == ForwardMode::Eval || self.dropout <= 0.0 {
            return x;
        }

        let dims = x.dims();
        let keep = 1.0 - self.dropout;
        let mask = Tensor::<B, 4>::random(
            [dims[0], dims[1], 1, 1],
            Distribution::Bernoulli(keep),
            &x.device(),
        )
        .div_scalar(keep);

        x * mask
    }
}

/// Bilinear, corner-aligned resize to an exact spatial size
///
/// Written as `Wy · x · Wxᵀ` with fixed interpolation weights so the backward
/// pass only needs matmul, which every backend differentiates.
pub fn resize_to<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [batch, channels, height, width] = x.dims();
    let [out_height, out_width] = size;
    if [height, width] == size {
        return x;
    }

    let device = x.device();
    let planes = batch * channels;

    let rows = interpolation_weights::<B>(height, out_height, &device)
        .unsqueeze::<3>()
        .repeat_dim(0, planes);
    let cols = interpolation_weights::<B>(width, out_width, &device)
        .transpose()
        .unsqueeze::<3>()
        .repeat_dim(0, planes);

    let x = x.reshape([planes, height, width]);
    rows.matmul(x)
        .matmul(cols)
        .reshape([batch, channels, out_height, out_width])
}

/// Row-stochastic [output, input] matrix for 1-D linear interpolation with
/// aligned corners: output `i` samples input position `i·(input−1)/(output−1)`
fn interpolation_weights<B: Backend>(input: usize, output: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut weights = vec![0.0f32; output * input];
    let scale = if output > 1 {
        (input - 1) as f64 / (output - 1) as f64
    } else {
        0.0
    };

    for i in 0..output {
        let src = i as f64 * scale;
        let lo = (src.floor() as usize).min(input - 1);
        let hi = (lo + 1).min(input - 1);
        let frac = (src - lo as f64) as f32;
        weights[i * input + lo] += 1.0 - frac;
        weights[i * input + hi] += frac;
    }

    Tensor::from_data(TensorData::new(weights, [output, input]), device)
}

/// Resize `other` to the spatial size of `base`, then stack [base, other] on channels
fn concat_resized<B: Backend>(base: Tensor<B, 4>, other: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, height, width] = base.dims();
    let other = resize_to(other, [height, width]);
    Tensor::cat(vec![base, other], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> NestedUNetConfig {
        NestedUNetConfig::new().with_base_channels(4)
    }

    #[test]
    fn test_default_config() {
        let config = NestedUNetConfig::new();
        assert_eq!(config.in_channels, 9);
        assert_eq!(config.num_classes, 2);
        assert_eq!(config.base_channels, 64);
        assert!((config.dropout - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_output_matches_input_size() {
        let device = Default::default();
        let model: NestedUNet<TestBackend> = small_config().init(&device);

        for (height, width) in [(32, 32), (48, 40), (65, 65)] {
            let input = Tensor::<TestBackend, 4>::random(
                [1, 9, height, width],
                Distribution::Default,
                &device,
            );
            let output = model.forward(input);
            assert_eq!(output.dims(), [1, 2, height, width]);
        }
    }

    #[test]
    fn test_train_mode_keeps_shape() {
        let device = Default::default();
        let model: NestedUNet<TestBackend> = small_config().with_dropout(0.5).init(&device);
        let input = Tensor::<TestBackend, 4>::random([2, 9, 17, 23], Distribution::Default, &device);

        let output = model.forward_with_mode(input, ForwardMode::Train);
        assert_eq!(output.dims(), [2, 2, 17, 23]);
    }

    #[test]
    fn test_eval_mode_is_deterministic() {
        let device = Default::default();
        let model: NestedUNet<TestBackend> = small_config().with_dropout(0.5).init(&device);
        let input = Tensor::<TestBackend, 4>::random([1, 9, 16, 16], Distribution::Default, &device);

        let a = model.forward(input.clone());
        let b = model.forward(input);
        let diff: f32 = (a - b).abs().max().into_scalar().elem();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_predict_mask_is_binary() {
        let device = Default::default();
        let model: NestedUNet<TestBackend> = small_config().init(&device);
        let input = Tensor::<TestBackend, 4>::random([2, 9, 12, 12], Distribution::Default, &device);

        let mask = model.predict_mask(input);
        assert_eq!(mask.dims(), [2, 12, 12]);
        let max: i64 = mask.max().into_scalar().elem();
        assert!(max <= 1);
    }

    #[test]
    fn test_train_mode_dropout_is_stochastic() {
        let device = Default::default();
        let model: NestedUNet<TestBackend> = small_config().with_dropout(0.5).init(&device);
        let input = Tensor::<TestBackend, 4>::random([1, 9, 16, 16], Distribution::Default, &device);

        let a = model.forward_with_mode(input.clone(), ForwardMode::Train);
        let b = model.forward_with_mode(input, ForwardMode::Train);
        let diff: f32 = (a - b).abs().max().into_scalar().elem();
        assert!(diff > 0.0);
    }

    #[test]
    fn test_spatial_dropout_drops_whole_channels() {
        let device = Default::default();
        let model: NestedUNet<TestBackend> = small_config().with_dropout(0.5).init(&device);
        let x = Tensor::<TestBackend, 4>::ones([2, 16, 3, 3], &device);

        let dropped = model.spatial_dropout(x.clone(), ForwardMode::Train);
        let values: Vec<f32> = dropped.into_data().iter::<f32>().collect();
        for plane in values.chunks(9) {
            let first = plane[0];
            assert!(first == 0.0 || (first - 2.0).abs() < 1e-6, "value {}", first);
            assert!(plane.iter().all(|&v| v == first));
        }

        let kept = model.spatial_dropout(x, ForwardMode::Eval);
        let max: f32 = kept.max().into_scalar().elem();
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_backward_through_train_forward() {
        use burn::backend::Autodiff;
        type AdBackend = Autodiff<NdArray>;

        let device = Default::default();
        let model: NestedUNet<AdBackend> = small_config().init(&device);
        let input = Tensor::<AdBackend, 4>::random([2, 9, 13, 13], Distribution::Default, &device);

        let loss = model.forward_with_mode(input, ForwardMode::Train).sum();
        let grads = loss.backward();

        assert!(model.enc1.conv1.weight.val().grad(&grads).is_some());
        assert!(model.final_conv.weight.val().grad(&grads).is_some());
    }

    #[test]
    fn test_resize_is_corner_aligned() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.0f32, 1.0], [1, 1, 1, 2]),
            &device,
        );
        let values: Vec<f32> = resize_to(x, [1, 4]).into_data().iter::<f32>().collect();
        let expected = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6, "{:?}", values);
        }
    }

    #[test]
    fn test_resize_upsamples_both_axes() {
        let device = Default::default();
        // 2x2 ramp: value = row + 2 * col
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.0f32, 2.0, 1.0, 3.0], [1, 1, 2, 2]),
            &device,
        );
        let values: Vec<f32> = resize_to(x, [3, 3]).into_data().iter::<f32>().collect();
        let expected = [0.0, 1.0, 2.0, 0.5, 1.5, 2.5, 1.0, 2.0, 3.0];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6, "{:?}", values);
        }
    }

    #[test]
    fn test_resize_to_exact_size() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let y = resize_to(x, [17, 9]);
        assert_eq!(y.dims(), [1, 3, 17, 9]);
    }
}
