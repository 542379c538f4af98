use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use image::DynamicImage;
use rand::Rng;

/// Per-image augmentation applied at decode time on the train split.
pub struct DataAugmentation {
    pub enable: bool,
    pub erase_prob: f32,
    pub gray_prob: f32,
}

impl DataAugmentation {
    pub fn new(enable: bool, erase_prob: f32, gray_prob: f32) -> Self {
        Self {
            enable,
            erase_prob,
            gray_prob,
        }
    }

    pub fn apply<R: Rng>(&self, img: DynamicImage, rng: &mut R) -> DynamicImage {
        if !self.enable {
            return img;
        }

        let mut img = img;

        // Random horizontal flip (50% chance)
        if rng.gen_bool(0.5) {
            img = img.fliph();
        }

        // Random brightness adjustment
        if rng.gen_bool(0.3) {
            let delta = rng.gen_range(-20i32..20i32);
            img = img.brighten(delta);
        }

        if self.gray_prob > 0.0 && rng.gen_bool(self.gray_prob as f64) {
            img = DynamicImage::ImageLuma8(img.to_luma8()).to_rgb8().into();
        }

        if self.erase_prob > 0.0 && rng.gen_bool(self.erase_prob as f64) {
            img = random_erase(img, rng);
        }

        img
    }
}

/// Blanks a random rectangle covering 2-20% of the image area.
fn random_erase<R: Rng>(img: DynamicImage, rng: &mut R) -> DynamicImage {
    let mut rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    if w < 4 || h < 4 {
        return DynamicImage::ImageRgb8(rgb);
    }
    let area = (w * h) as f32;
    let erase_area = area * rng.gen_range(0.02..0.2);
    let aspect = rng.gen_range(0.3..3.3f32);
    let ew = ((erase_area * aspect).sqrt() as u32).clamp(1, w - 1);
    let eh = ((erase_area / aspect).sqrt() as u32).clamp(1, h - 1);
    let x0 = rng.gen_range(0..w - ew);
    let y0 = rng.gen_range(0..h - eh);
    for y in y0..y0 + eh {
        for x in x0..x0 + ew {
            rgb.put_pixel(x, y, image::Rgb([128, 128, 128]));
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Active training resolution, re-sampled from a fixed discrete set every
/// `interval` iterations and constant in between.
#[derive(Debug, Clone)]
pub struct MultiScaleSchedule {
    sizes: Vec<usize>,
    interval: usize,
    current: usize,
}

impl MultiScaleSchedule {
    pub fn new(sizes: Vec<usize>, interval: usize, base_size: usize) -> Self {
        Self {
            sizes,
            interval: interval.max(1),
            current: base_size,
        }
    }

    /// Called once per training iteration; re-samples the active scale only at
    /// iteration indices divisible by the interval.
    pub fn select<R: Rng>(&mut self, iteration: usize, rng: &mut R) -> usize {
        if !self.sizes.is_empty() && iteration % self.interval == 0 {
            self.current = self.sizes[rng.gen_range(0..self.sizes.len())];
        }
        self.current
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }
}

/// Resizes a NCHW batch to `size`x`size` with bilinear interpolation. No-op
/// when the batch is already at the requested resolution.
pub fn resize_batch<B: Backend>(images: Tensor<B, 4>, size: usize) -> Tensor<B, 4> {
    let [_, _, h, w] = images.dims();
    if h == size && w == size {
        return images;
    }
    interpolate(
        images,
        [size, size],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn scale_changes_only_at_interval_boundaries() {
        let mut schedule = MultiScaleSchedule::new(vec![256, 288, 320, 352], 10, 416);
        let mut rng = StdRng::seed_from_u64(0);
        let mut active = Vec::new();
        for i in 0..35 {
            active.push(schedule.select(i, &mut rng));
        }
        for i in 0..35 {
            if i % 10 != 0 {
                assert_eq!(active[i], active[i - 1], "scale moved at iteration {i}");
            }
            assert!([256, 288, 320, 352].contains(&active[i]));
        }
    }

    #[test]
    fn epoch_restart_of_the_index_redraws_at_the_first_batch() {
        // 13 batches per epoch with interval 10: the index restarts at zero
        // each epoch, so every epoch opens a fresh window and holds it until
        // the next in-epoch multiple of the interval.
        let mut schedule = MultiScaleSchedule::new(vec![256, 288, 320, 352, 384, 416], 10, 416);
        let mut rng = StdRng::seed_from_u64(4);
        for _epoch in 0..3 {
            let mut previous = schedule.select(0, &mut rng);
            for i in 1..13 {
                let active = schedule.select(i, &mut rng);
                if i % 10 != 0 {
                    assert_eq!(active, previous, "scale moved mid-window at batch {i}");
                }
                previous = active;
            }
        }
    }

    #[test]
    fn scale_selection_is_deterministic_under_seed() {
        let pick = |seed: u64| {
            let mut schedule = MultiScaleSchedule::new(vec![256, 288, 320], 5, 320);
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20).map(|i| schedule.select(i, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(pick(42), pick(42));
    }

    #[test]
    fn empty_size_set_keeps_base_resolution() {
        let mut schedule = MultiScaleSchedule::new(vec![], 10, 416);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(schedule.select(0, &mut rng), 416);
        assert_eq!(schedule.select(10, &mut rng), 416);
    }

    #[test]
    fn augmentation_disabled_passes_image_through() {
        let aug = DataAugmentation::new(false, 0.9, 0.9);
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            4,
            4,
            image::Rgb([10, 20, 30]),
        ));
        let mut rng = StdRng::seed_from_u64(0);
        let out = aug.apply(img.clone(), &mut rng);
        assert_eq!(out.to_rgb8().as_raw(), img.to_rgb8().as_raw());
    }

    #[test]
    fn random_erase_keeps_dimensions() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            32,
            32,
            image::Rgb([255, 0, 0]),
        ));
        let mut rng = StdRng::seed_from_u64(3);
        let erased = random_erase(img, &mut rng);
        assert_eq!(erased.to_rgb8().dimensions(), (32, 32));
        // Some pixels must have been blanked to gray.
        let gray = erased
            .to_rgb8()
            .pixels()
            .filter(|p| p.0 == [128, 128, 128])
            .count();
        assert!(gray > 0);
    }
}
