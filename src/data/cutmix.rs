use anyhow::{anyhow, Result};
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution};

/// A CutMix-blended batch. `lam` is the fraction of each image kept from the
/// original sample; `1 - lam` came from the paired sample.
pub struct MixedBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels_a: Tensor<B, 1, Int>,
    pub labels_b: Tensor<B, 1, Int>,
    pub lam: f32,
}

/// CutMix activation gate: a fresh uniform draw against `cutmix_prob`, only
/// meaningful when `beta > 0`.
pub fn should_mix<R: Rng>(beta: f32, cutmix_prob: f32, rng: &mut R) -> bool {
    beta > 0.0 && rng.gen::<f32>() < cutmix_prob
}

/// Blends every image in the batch with a randomly paired one: a box whose
/// area ratio is 1 - lam (lam ~ Beta(beta, beta)) is cut from the paired image
/// and pasted in place, and lam is re-adjusted to the exact pasted area.
pub fn generate_mixed_sample<B: Backend, R: Rng>(
    beta: f32,
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    rng: &mut R,
) -> Result<MixedBatch<B>> {
    let beta_dist =
        Beta::new(beta as f64, beta as f64).map_err(|e| anyhow!("invalid cutmix beta: {e}"))?;
    let lam = beta_dist.sample(rng) as f32;

    let [batch, channels, height, width] = images.dims();
    let device = images.device();

    let mut perm: Vec<i32> = (0..batch as i32).collect();
    perm.shuffle(rng);
    let perm_t = Tensor::<B, 1, Int>::from_ints(perm.as_slice(), &device);

    let labels_a = labels.clone();
    let labels_b = labels.select(0, perm_t.clone());

    let (x1, y1, x2, y2) = rand_bbox(width, height, lam, rng);
    if x2 <= x1 || y2 <= y1 {
        // Degenerate cut: nothing pasted, the batch is unchanged.
        return Ok(MixedBatch {
            images,
            labels_a,
            labels_b,
            lam: 1.0,
        });
    }

    let shuffled = images.clone().select(0, perm_t);
    let patch = shuffled.slice([0..batch, 0..channels, y1..y2, x1..x2]);
    let mixed = images.slice_assign([0..batch, 0..channels, y1..y2, x1..x2], patch);

    // Exact area ratio, since clamping may have shrunk the box.
    let cut_area = ((x2 - x1) * (y2 - y1)) as f32;
    let lam = 1.0 - cut_area / (width * height) as f32;

    Ok(MixedBatch {
        images: mixed,
        labels_a,
        labels_b,
        lam,
    })
}

/// Random box with area ratio ~ (1 - lam), center uniform over the image,
/// clamped to the image bounds.
pub fn rand_bbox<R: Rng>(
    width: usize,
    height: usize,
    lam: f32,
    rng: &mut R,
) -> (usize, usize, usize, usize) {
    let cut_ratio = (1.0 - lam).max(0.0).sqrt();
    let cut_w = ((width as f32) * cut_ratio) as usize;
    let cut_h = ((height as f32) * cut_ratio) as usize;

    let cx = rng.gen_range(0..width);
    let cy = rng.gen_range(0..height);

    let x1 = cx.saturating_sub(cut_w / 2);
    let y1 = cy.saturating_sub(cut_h / 2);
    let x2 = (cx + cut_w / 2).min(width);
    let y2 = (cy + cut_h / 2).min(height);

    (x1, y1, x2, y2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type B = NdArray<f32>;

    #[test]
    fn rand_bbox_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let lam: f32 = rng.gen();
            let (x1, y1, x2, y2) = rand_bbox(64, 48, lam, &mut rng);
            assert!(x1 <= x2 && x2 <= 64);
            assert!(y1 <= y2 && y2 <= 48);
        }
    }

    #[test]
    fn mix_gate_is_deterministic_under_seed() {
        let draw = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| should_mix(1.0, 0.5, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(9), draw(9));
        // beta == 0 disables the gate entirely.
        let mut rng = StdRng::seed_from_u64(9);
        assert!((0..50).all(|_| !should_mix(0.0, 1.0, &mut rng)));
    }

    #[test]
    fn adjusted_lam_matches_pasted_area() {
        let device = Default::default();
        let images = Tensor::<B, 4>::zeros([4, 3, 32, 32], &device);
        let labels = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3], &device);
        let mut rng = StdRng::seed_from_u64(21);
        let mixed = generate_mixed_sample(1.0, images, labels, &mut rng).unwrap();
        assert!((0.0..=1.0).contains(&mixed.lam));
        assert_eq!(mixed.images.dims(), [4, 3, 32, 32]);
    }

    #[test]
    fn labels_b_is_a_permutation_of_labels_a() {
        let device = Default::default();
        let images = Tensor::<B, 4>::zeros([5, 3, 16, 16], &device);
        let labels = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3, 4], &device);
        let mut rng = StdRng::seed_from_u64(2);
        let mixed = generate_mixed_sample(1.0, images, labels, &mut rng).unwrap();
        let mut a: Vec<i64> = mixed.labels_a.into_data().to_vec().unwrap();
        let mut b: Vec<i64> = mixed.labels_b.into_data().to_vec().unwrap();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }

    #[test]
    fn mixed_pixels_come_from_the_batch() {
        let device = Default::default();
        // Image 0 all zeros, image 1 all ones.
        let zeros = Tensor::<B, 4>::zeros([1, 3, 8, 8], &device);
        let ones = Tensor::<B, 4>::ones([1, 3, 8, 8], &device);
        let images = Tensor::cat(vec![zeros, ones], 0);
        let labels = Tensor::<B, 1, Int>::from_ints([0, 1], &device);
        let mut rng = StdRng::seed_from_u64(77);
        let mixed = generate_mixed_sample(1.0, images, labels, &mut rng).unwrap();
        let data: Vec<f32> = mixed.images.into_data().to_vec().unwrap();
        assert!(data.iter().all(|&v| v == 0.0 || v == 1.0));
    }
}
