//! Segmentation losses
//!
//! Soft Dice loss on the plume-class probability, pixel-wise cross entropy,
//! and their weighted sum used by the training driver.

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
};

/// Smoothing term of the soft Dice ratio
pub const DICE_EPS: f64 = 1e-6;

/// Soft Dice loss, `1 - mean over the batch of (2·I + ε) / (U + ε)`
#[derive(Debug, Clone)]
pub struct DiceLoss {
    eps: f64,
}

impl Default for DiceLoss {
    fn default() -> Self {
        Self { eps: DICE_EPS }
    }
}

impl DiceLoss {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }

    /// `logits`: [B, classes, H, W], `targets`: [B, H, W] class ids
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 4>, targets: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        let [batch, _, height, width] = logits.dims();
        let pixels = height * width;

        let probs = softmax(logits, 1);
        let plume = probs
            .slice([0..batch, 1..2, 0..height, 0..width])
            .reshape([batch, pixels]);
        let truth = targets.float().reshape([batch, pixels]);

        let intersection = (plume.clone() * truth.clone()).sum_dim(1);
        let union = plume.sum_dim(1) + truth.sum_dim(1);

        let dice = intersection
            .mul_scalar(2.0)
            .add_scalar(self.eps)
            .div(union.add_scalar(self.eps));

        dice.mean().neg().add_scalar(1.0)
    }
}

/// Pixel-wise cross entropy over the class axis
pub fn pixel_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    targets: Tensor<B, 3, Int>,
) -> Tensor<B, 1> {
    let [batch, classes, height, width] = logits.dims();
    let n = batch * height * width;

    let flat_logits = logits.permute([0, 2, 3, 1]).reshape([n, classes]);
    let flat_targets = targets.reshape([n]);

    CrossEntropyLossConfig::new()
        .init(&flat_logits.device())
        .forward(flat_logits, flat_targets)
}

/// `weight_dice · Dice + weight_ce · CrossEntropy`
#[derive(Debug, Clone)]
pub struct CombinedLoss {
    pub weight_dice: f64,
    pub weight_ce: f64,
    dice: DiceLoss,
}

impl Default for CombinedLoss {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl CombinedLoss {
    pub fn new(weight_dice: f64, weight_ce: f64) -> Self {
        Self {
            weight_dice,
            weight_ce,
            dice: DiceLoss::default(),
        }
    }

    pub fn forward<B: Backend>(&self, logits: Tensor<B, 4>, targets: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        let dice = self.dice.forward(logits.clone(), targets.clone());

        // A zero weight drops the term instead of scaling it, so the result
        // equals the remaining loss bit for bit.
        if self.weight_ce == 0.0 {
            return dice.mul_scalar(self.weight_dice);
        }

        let ce = pixel_cross_entropy(logits, targets);
        if self.weight_dice == 0.0 {
            return ce.mul_scalar(self.weight_ce);
        }

        dice.mul_scalar(self.weight_dice) + ce.mul_scalar(self.weight_ce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, ElementConversion, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    /// Logits that put almost all probability on the given class map
    fn confident_logits(mask: &[i64], height: usize, width: usize) -> Tensor<TestBackend, 4> {
        let mut data = Vec::with_capacity(2 * mask.len());
        data.extend(mask.iter().map(|&m| if m == 0 { 20.0f32 } else { -20.0 }));
        data.extend(mask.iter().map(|&m| if m == 1 { 20.0f32 } else { -20.0 }));
        Tensor::from_data(TensorData::new(data, [1, 2, height, width]), &Default::default())
    }

    fn targets(mask: &[i64], height: usize, width: usize) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(TensorData::new(mask.to_vec(), [1, height, width]), &Default::default())
    }

    #[test]
    fn test_perfect_prediction_has_near_zero_dice_loss() {
        let mask = vec![0, 1, 1, 0, 1, 1, 0, 0, 0];
        let loss = DiceLoss::default().forward(confident_logits(&mask, 3, 3), targets(&mask, 3, 3));
        assert!(scalar(loss) < 1e-4);
    }

    #[test]
    fn test_inverted_prediction_has_near_one_dice_loss() {
        let mask = vec![0, 1, 1, 0];
        let inverted: Vec<i64> = mask.iter().map(|m| 1 - m).collect();
        let loss = DiceLoss::default().forward(confident_logits(&inverted, 2, 2), targets(&mask, 2, 2));
        assert!(scalar(loss) > 0.99);
    }

    #[test]
    fn test_combined_without_ce_equals_dice() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::random([2, 2, 5, 7], Distribution::Default, &device);
        let mask: Vec<i64> = (0..70).map(|i| i64::from(i % 3 == 0)).collect();
        let target = Tensor::<TestBackend, 3, Int>::from_data(TensorData::new(mask, [2, 5, 7]), &device);

        let dice = scalar(DiceLoss::default().forward(logits.clone(), target.clone()));
        let combined = scalar(CombinedLoss::new(1.0, 0.0).forward(logits, target));
        assert_eq!(dice, combined);
    }

    #[test]
    fn test_combined_is_weighted_sum() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::random([1, 2, 4, 4], Distribution::Default, &device);
        let mask: Vec<i64> = (0..16).map(|i| i64::from(i < 5)).collect();
        let target = Tensor::<TestBackend, 3, Int>::from_data(TensorData::new(mask, [1, 4, 4]), &device);

        let dice = scalar(DiceLoss::default().forward(logits.clone(), target.clone()));
        let ce = scalar(pixel_cross_entropy(logits.clone(), target.clone()));
        let combined = scalar(CombinedLoss::new(0.5, 2.0).forward(logits, target));
        assert!((combined - (0.5 * dice + 2.0 * ce)).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_is_low_for_confident_correct_logits() {
        let mask = vec![1, 0, 0, 1];
        let ce = pixel_cross_entropy(confident_logits(&mask, 2, 2), targets(&mask, 2, 2));
        assert!(scalar(ce) < 1e-3);
    }
}
