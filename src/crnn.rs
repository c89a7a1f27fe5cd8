use std::path::PathBuf;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{ArrayView2, Axis};
use ort::{inputs, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::util::subtract_mean_normalize;
use crate::{Error, TextLine};

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

/// Input height the recognition model was trained on; width scales with the
/// crop's aspect ratio.
const DEST_HEIGHT: u32 = 48;

/// CRNN text recognizer. The model is a black box from the pipeline's point
/// of view: plate crop in, text line out.
pub(crate) struct CrnnNet {
    session: Session,
    keys: Vec<String>,
}

impl CrnnNet {
    #[instrument(level = "debug")]
    pub fn init(
        model_path: PathBuf,
        keys_path: PathBuf,
        num_threads: usize,
    ) -> Result<Self, Error> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_parallel_execution(true)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)?;

        let keys = std::fs::read_to_string(&keys_path).map_err(|source| Error::Keys {
            path: keys_path,
            source,
        })?;
        let keys = keys.lines().map(|line| line.to_string());
        // Index 0 is the CTC blank; the trailing entry covers the space glyph.
        let keys = ["#".to_string()]
            .into_iter()
            .chain(keys)
            .chain([" ".to_string()]);

        log::debug!("recognizer inputs: {:?}", session.inputs);
        log::debug!("recognizer outputs: {:?}", session.outputs);

        Ok(Self {
            session,
            keys: keys.collect(),
        })
    }

    #[instrument(level = "trace", skip(self, image))]
    pub fn recognize(&self, image: &DynamicImage) -> Result<TextLine, Error> {
        let scale = DEST_HEIGHT as f32 / image.height() as f32;
        let dest_width = ((image.width() as f32 * scale) as u32).min(u16::MAX as u32);
        let image = image.resize_exact(dest_width.max(1), DEST_HEIGHT, FilterType::Nearest);

        let tensor_values =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => tensor_values]?)?;
        let output_tensor = outputs
            .first_key_value()
            .unwrap()
            .1
            .try_extract_tensor::<f32>()?;

        let width = output_tensor.len_of(Axis(1));
        let classes = output_tensor.len_of(Axis(2));
        let output_tensor = output_tensor.remove_axis(Axis(0));
        let output = output_tensor.to_shape((width, classes)).unwrap();

        Ok(self.decode(output.view()))
    }

    /// Greedy CTC decode: argmax per timestep, blanks and out-of-range
    /// indices dropped. An all-blank output decodes to the empty line.
    fn decode(&self, data: ArrayView2<f32>) -> TextLine {
        let keys_size = self.keys.len();

        let max_scores = data
            .outer_iter()
            .map(|it| {
                let (i, value) = it
                    .indexed_iter()
                    .max_by_key(|(_, value)| FloatOrd(**value))
                    .unwrap();
                (i, *value)
            })
            .filter(|(i, _)| *i > 0 && *i < keys_size)
            .map(|(i, score)| (self.keys[i].as_str(), score))
            .collect::<Vec<_>>();

        let text = max_scores.iter().map(|(text, _)| *text).collect::<String>();
        let scores = max_scores
            .iter()
            .map(|(_, score)| *score)
            .collect::<Vec<_>>();

        TextLine {
            text,
            character_scores: scores,
        }
    }
}
