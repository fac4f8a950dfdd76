//! ONNX image classifiers run with `tract`.
//!
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::{pipeline::ScoreSource, utils::download_file};

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ImageNet class names matching the output order of the supported models.
const LABELS_URL: &str =
    "https://raw.githubusercontent.com/onnx/models/main/validated/vision/classification/synset.txt";
const LABELS_FILENAME: &str = "synset.txt";

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ClassifierVariant {
    #[value(name = "mobilenet-v2")]
    MobileNetV2,
    #[value(name = "squeezenet")]
    SqueezeNet,
}

impl ClassifierVariant {
    pub fn url(&self) -> &'static str {
        match self {
            ClassifierVariant::MobileNetV2 => "https://github.com/onnx/models/raw/main/validated/vision/classification/mobilenet/model/mobilenetv2-7.onnx",
            ClassifierVariant::SqueezeNet => "https://github.com/onnx/models/raw/main/validated/vision/classification/squeezenet/model/squeezenet1.1-7.onnx",
        }
    }

    pub fn filename(&self) -> &'static str {
        match self {
            ClassifierVariant::MobileNetV2 => "mobilenetv2-7.onnx",
            ClassifierVariant::SqueezeNet => "squeezenet1.1-7.onnx",
        }
    }

    /// Input width and height in pixels.
    pub fn input_size(&self) -> (u32, u32) {
        (224, 224)
    }

    pub fn num_classes(&self) -> usize {
        1000
    }
}

/// Default directory to cache downloaded models and labels in.
pub fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("classify_cam")
}

/// Classifier producing class probabilities for a frame.
pub struct OnnxClassifier {
    model: NnModel,
    variant: ClassifierVariant,
}

impl OnnxClassifier {
    /// Load the model, downloading it into `model_dir` first if it is not cached yet.
    pub async fn new(variant: ClassifierVariant, model_dir: &Path) -> Result<Self> {
        let filepath = model_dir.join(variant.filename());
        if !filepath.exists() {
            std::fs::create_dir_all(model_dir)?;
            log::info!("Downloading {:?} model to {}", variant, filepath.display());
            download_file(&reqwest::Client::new(), variant.url(), &filepath).await?;
        }

        let model = load_model(&filepath, variant.input_size())?;
        log::info!("Loaded {:?} model from {}", variant, filepath.display());

        Ok(Self { model, variant })
    }
}

impl ScoreSource for OnnxClassifier {
    fn num_classes(&self) -> usize {
        self.variant.num_classes()
    }

    fn scores(&self, frame: &RgbImage) -> Result<Vec<f32>> {
        let (width, height) = self.variant.input_size();
        let input = preprocess(frame, width, height);
        let outputs = self.model.run(tvec!(input.into()))?;

        let logits: Vec<f32> = outputs[0].to_array_view::<f32>()?.iter().copied().collect();
        if logits.len() != self.num_classes() {
            bail!(
                "expected {} logits, model returned {}",
                self.num_classes(),
                logits.len()
            );
        }

        Ok(softmax(&logits))
    }
}

/// Return the path of the ImageNet label file, downloading it if needed.
pub async fn download_labels(model_dir: &Path) -> Result<PathBuf> {
    let filepath = model_dir.join(LABELS_FILENAME);
    if !filepath.exists() {
        std::fs::create_dir_all(model_dir)?;
        log::info!("Downloading labels to {}", filepath.display());
        download_file(&reqwest::Client::new(), LABELS_URL, &filepath).await?;
    }

    Ok(filepath)
}

fn load_model(filepath: &Path, (width, height): (u32, u32)) -> Result<NnModel> {
    let input_fact = InferenceFact::dt_shape(
        f32::datum_type(),
        tvec!(1, 3, height as usize, width as usize),
    );
    let model = tract_onnx::onnx()
        .model_for_path(filepath)?
        .with_input_fact(0, input_fact)?
        .into_optimized()?
        .into_runnable()?;

    Ok(model)
}

/// Resize the frame and lay it out as a normalized NCHW tensor.
pub fn preprocess(frame: &RgbImage, width: u32, height: u32) -> Tensor {
    let resized: RgbImage =
        image::imageops::resize(frame, width, height, image::imageops::FilterType::Triangle);

    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, c, y, x)| (resized[(x as _, y as _)][c] as f32 / 255.0 - MEAN[c]) / STD[c],
    )
    .into()
}

/// Turn logits into probabilities.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    exps.into_iter().map(|x| x / sum).collect()
}

#[cfg(test)]
mod test {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn test_variant_cli_names() {
        assert_eq!(
            ClassifierVariant::from_str("mobilenet-v2", false),
            Ok(ClassifierVariant::MobileNetV2)
        );
        assert_eq!(
            ClassifierVariant::from_str("squeezenet", false),
            Ok(ClassifierVariant::SqueezeNet)
        );
        assert!(ClassifierVariant::from_str("squeeze-net", false).is_err());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();

        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[0] < probs[1] && probs[1] < probs[2]);
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert_eq!(probs, vec![0.5, 0.5]);
    }

    #[test]
    fn test_preprocess_layout() -> Result<()> {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([255, 0, 255]));
        let tensor = preprocess(&frame, 224, 224);

        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        let view = tensor.to_array_view::<f32>()?;
        let white = (1.0 - MEAN[0]) / STD[0];
        let black = -MEAN[1] / STD[1];
        assert!((view[[0, 0, 100, 100]] - white).abs() < 1e-5);
        assert!((view[[0, 1, 100, 100]] - black).abs() < 1e-5);

        Ok(())
    }

    #[test]
    fn test_model_dir_is_namespaced() {
        assert!(default_model_dir().ends_with("classify_cam"));
    }
}
