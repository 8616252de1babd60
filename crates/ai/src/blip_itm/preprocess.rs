use image::RgbImage;
use ndarray::Array3;

pub const TARGET_IMAGE_SIZE: u32 = 384;

const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Resize to a 384x384 square and normalize into a `(3, H, W)` array.
pub fn preprocess_rgb8_image(image: &RgbImage) -> Array3<f32> {
    let image = image::imageops::resize(
        image,
        TARGET_IMAGE_SIZE,
        TARGET_IMAGE_SIZE,
        image::imageops::FilterType::Triangle,
    );

    let size = TARGET_IMAGE_SIZE as usize;
    let mut array = Array3::zeros((3, size, size));

    for (x, y, p) in image.enumerate_pixels() {
        for c in 0..3 {
            array[[c, y as usize, x as usize]] = (p[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }

    array
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_values() {
        let image = RgbImage::from_pixel(20, 10, image::Rgb([255, 0, 128]));
        let array = preprocess_rgb8_image(&image);

        assert_eq!(array.shape(), &[3, 384, 384]);
        assert!((array[[0, 0, 0]] - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-4);
        assert!((array[[1, 100, 100]] - (0.0 - MEAN[1]) / STD[1]).abs() < 1e-4);
    }
}
