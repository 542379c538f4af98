use crate::data::dataset::ClassifyDataset;
use crate::data::transforms::DataAugmentation;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// ImageNet channel statistics used to normalize decoded images.
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct ClassifyBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 1, Int>,
    /// Dataset indices of the batched samples; carried for validation
    /// bookkeeping, unused by the training core.
    pub sample_ids: Vec<usize>,
    pub batch_size: usize,
}

/// Mini-batch iterator over one fold subset of the dataset. Decodes, resizes
/// to `image_size`, optionally augments, and normalizes to CHW float tensors.
pub struct ClassifyDataLoader<B: Backend> {
    dataset: ClassifyDataset,
    subset: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    image_size: usize,
    augmentation: Option<DataAugmentation>,
    device: B::Device,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
}

impl<B: Backend> ClassifyDataLoader<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dataset: ClassifyDataset,
        subset: Vec<usize>,
        batch_size: usize,
        image_size: usize,
        shuffle: bool,
        augmentation: Option<DataAugmentation>,
        seed: Option<u64>,
        device: B::Device,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(rand::random));
        let mut order = subset.clone();
        if shuffle {
            order.shuffle(&mut rng);
        }
        Self {
            dataset,
            subset,
            batch_size: batch_size.max(1),
            shuffle,
            image_size,
            augmentation,
            device,
            rng,
            order,
            cursor: 0,
        }
    }

    /// Rewinds the loader for the next epoch, reshuffling when enabled.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.order = self.subset.clone();
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    /// Number of batches per full pass.
    pub fn len(&self) -> usize {
        self.subset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.subset.is_empty()
    }

    pub fn num_samples(&self) -> usize {
        self.subset.len()
    }
}

impl<B: Backend> Iterator for ClassifyDataLoader<B> {
    type Item = ClassifyBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch_indices: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let size = self.image_size;
        let mut images_vec: Vec<f32> = Vec::with_capacity(batch_indices.len() * 3 * size * size);
        let mut labels: Vec<i32> = Vec::with_capacity(batch_indices.len());
        let mut sample_ids = Vec::with_capacity(batch_indices.len());

        for &idx in &batch_indices {
            let sample = match self.dataset.sample(idx) {
                Ok(s) => s.clone(),
                Err(err) => {
                    log::warn!("skipping sample {idx}: {err}");
                    continue;
                }
            };
            let img = match image::open(&sample.path) {
                Ok(img) => img,
                Err(err) => {
                    log::warn!("failed to decode {}: {err}", sample.path.display());
                    continue;
                }
            };

            let img = match &self.augmentation {
                Some(aug) => aug.apply(img, &mut self.rng),
                None => img,
            };

            let img = img.resize_exact(
                size as u32,
                size as u32,
                image::imageops::FilterType::Lanczos3,
            );
            let rgb = img.to_rgb8();

            for c in 0..3 {
                for y in 0..size {
                    for x in 0..size {
                        let pixel = rgb.get_pixel(x as u32, y as u32);
                        let val = pixel[c] as f32 / 255.0;
                        images_vec.push((val - MEAN[c]) / STD[c]);
                    }
                }
            }
            labels.push(sample.label as i32);
            sample_ids.push(idx);
        }

        if labels.is_empty() {
            // Whole batch failed to decode; move on to the next one.
            return self.next();
        }

        let actual = labels.len();
        let images = Tensor::<B, 1>::from_floats(images_vec.as_slice(), &self.device)
            .reshape([actual, 3, size, size]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        Some(ClassifyBatch {
            images,
            labels,
            sample_ids,
            batch_size: actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::path::Path;

    type B = NdArray<f32>;

    fn write_fake_dataset(root: &Path, classes: &[(&str, usize)]) {
        for (name, count) in classes {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                let img = image::RgbImage::from_pixel(8, 8, image::Rgb([128, 64, 32]));
                img.save(dir.join(format!("{i}.png"))).unwrap();
            }
        }
    }

    #[test]
    fn yields_batches_of_requested_shape() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_dataset(tmp.path(), &[("a", 3), ("b", 2)]);
        let dataset = ClassifyDataset::new(tmp.path(), None).unwrap();
        let subset: Vec<usize> = (0..dataset.len()).collect();
        let loader: ClassifyDataLoader<B> = ClassifyDataLoader::new(
            dataset,
            subset,
            2,
            16,
            false,
            None,
            Some(0),
            Default::default(),
        );
        assert_eq!(loader.len(), 3);
        let batches: Vec<_> = loader.collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].images.dims(), [2, 3, 16, 16]);
        assert_eq!(batches[2].batch_size, 1);
        let total: usize = batches.iter().map(|b| b.batch_size).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn reset_restarts_iteration() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_dataset(tmp.path(), &[("a", 4)]);
        let dataset = ClassifyDataset::new(tmp.path(), None).unwrap();
        let subset: Vec<usize> = (0..dataset.len()).collect();
        let mut loader: ClassifyDataLoader<B> = ClassifyDataLoader::new(
            dataset,
            subset,
            4,
            8,
            true,
            None,
            Some(1),
            Default::default(),
        );
        assert!(loader.next().is_some());
        assert!(loader.next().is_none());
        loader.reset();
        assert!(loader.next().is_some());
    }
}
