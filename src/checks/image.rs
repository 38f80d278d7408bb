use super::{Check, CheckOutcome};
use crate::engine::model::Response;
use crate::error::{CheckError, ErrorCode};
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

/// Decodes the body as PNG/JPEG and checks its format/dimensions/content
/// against any of the fields set. Content comparison (`histogram_hex`,
/// `fingerprint_hex`) uses `threshold` as a normalized distance bound —
/// unset threshold defaults to requiring an exact match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub histogram_hex: Option<String>,
    pub fingerprint_hex: Option<String>,
    pub threshold: Option<f64>,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            format: None,
            width: None,
            height: None,
            histogram_hex: None,
            fingerprint_hex: None,
            threshold: None,
        }
    }
}

impl Check for Image {
    fn execute(&self, response: &Response) -> CheckOutcome {
        let detected = image::guess_format(&response.body).ok();
        let decoded = image::load_from_memory(&response.body);

        if let Some(expected) = &self.format {
            let actual = detected.map(format_name).unwrap_or("unknown");
            if !actual.eq_ignore_ascii_case(expected) {
                return CheckOutcome::Fail(format!(
                    "expected image format '{expected}', got '{actual}'"
                ));
            }
        }

        let img = match decoded {
            Ok(img) => img,
            Err(e) => {
                return CheckOutcome::Error(CheckError::CantCheck(
                    ErrorCode::CHECK_IMAGE,
                    format!("could not decode image: {e}"),
                ))
            }
        };

        let (width, height) = img.dimensions();
        if let Some(expected) = self.width {
            if width != expected {
                return CheckOutcome::Fail(format!("expected width {expected}, got {width}"));
            }
        }
        if let Some(expected) = self.height {
            if height != expected {
                return CheckOutcome::Fail(format!("expected height {expected}, got {height}"));
            }
        }

        let threshold = self.threshold.unwrap_or(0.0);

        if let Some(expected_hex) = &self.histogram_hex {
            let expected = match hex_decode(expected_hex) {
                Some(b) if b.len() == 12 => b,
                _ => {
                    return CheckOutcome::Error(CheckError::malformed(
                        ErrorCode::MALFORMED_CHECK,
                        "histogram_hex must decode to 12 bytes",
                    ))
                }
            };
            let actual = histogram(&img);
            let distance = normalized_hamming(&actual, &expected);
            if distance > threshold {
                return CheckOutcome::Fail(format!(
                    "histogram distance {distance:.4} exceeds threshold {threshold:.4}"
                ));
            }
        }

        if let Some(expected_hex) = &self.fingerprint_hex {
            let expected = match hex_decode(expected_hex) {
                Some(b) if b.len() == 8 => b,
                _ => {
                    return CheckOutcome::Error(CheckError::malformed(
                        ErrorCode::MALFORMED_CHECK,
                        "fingerprint_hex must decode to 8 bytes",
                    ))
                }
            };
            let actual = fingerprint(&img);
            let distance = normalized_hamming(&actual, &expected);
            if distance > threshold {
                return CheckOutcome::Fail(format!(
                    "fingerprint distance {distance:.4} exceeds threshold {threshold:.4}"
                ));
            }
        }

        CheckOutcome::Pass
    }

    fn name(&self) -> &'static str {
        "Image"
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        _ => "unknown",
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// 12-byte packed histogram: 4 buckets per RGB channel, each bucket a
/// saturating count of pixels whose channel value falls in that quartile,
/// scaled into a single byte.
fn histogram(img: &DynamicImage) -> Vec<u8> {
    let rgb = img.to_rgb8();
    let mut buckets = [0u32; 12];
    let total = (rgb.width() * rgb.height()).max(1);
    for pixel in rgb.pixels() {
        for (channel, value) in pixel.0.iter().enumerate() {
            let bucket = (*value as usize * 4 / 256).min(3);
            buckets[channel * 4 + bucket] += 1;
        }
    }
    buckets
        .iter()
        .map(|&count| ((count as u64 * 255) / total as u64) as u8)
        .collect()
}

/// 8-byte block-mean-value fingerprint: image resized to an 8x8 grayscale
/// grid, each cell's mean luminance packed into one byte.
fn fingerprint(img: &DynamicImage) -> Vec<u8> {
    let gray = img
        .resize_exact(8, 8, image::imageops::FilterType::Triangle)
        .to_luma8();
    gray.pixels().map(|p| p.0[0]).collect()
}

fn normalized_hamming(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let differing_bits: u32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();
    differing_bits as f64 / (a.len() as f64 * 8.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::ok;

    fn tiny_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 6, image::Rgb([200, 10, 10])));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn format_matches_png() {
        let check = Image {
            format: Some("png".into()),
            ..Default::default()
        };
        assert!(check.execute(&ok(&tiny_png())).is_pass());
    }

    #[test]
    fn format_mismatch_fails() {
        let check = Image {
            format: Some("jpg".into()),
            ..Default::default()
        };
        assert!(!check.execute(&ok(&tiny_png())).is_pass());
    }

    #[test]
    fn width_mismatch_fails() {
        let check = Image {
            width: Some(12),
            ..Default::default()
        };
        assert!(!check.execute(&ok(&tiny_png())).is_pass());
    }

    #[test]
    fn dimensions_match() {
        let check = Image {
            width: Some(8),
            height: Some(6),
            ..Default::default()
        };
        assert!(check.execute(&ok(&tiny_png())).is_pass());
    }

    #[test]
    fn undecodable_body_is_cant_check_error() {
        let check = Image {
            format: None,
            ..Default::default()
        };
        let outcome = check.execute(&ok(b"not an image"));
        assert!(matches!(outcome, CheckOutcome::Error(CheckError::CantCheck(_, _))));
    }
}
