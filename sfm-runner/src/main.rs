use log::*;
use sfm_depth::PngDepthReader;
use sfm_model::{
    correct_sfm_with_depth, create_reference_sfm_from_store, scannet_reference, ColmapStore,
    Format, ReconstructionStore,
};
use sfm_runner::{
    load_correction_settings, result_filenames, run_scannet, CommandDriver, Result, RunConfig,
    ScanNetLayout,
};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(
    name = "sfm-runner",
    about = "Builds reference reconstructions and corrects them with sensor depth"
)]
struct Opt {
    /// Write models as text tables instead of binary ones.
    #[structopt(long)]
    text: bool,
    #[structopt(subcommand)]
    command: Subcommand,
}

#[derive(StructOpt, Clone)]
enum Subcommand {
    /// Moves the points of a model onto the sensor depth of its images.
    Correct {
        /// The model to correct. It is not modified.
        #[structopt(short, long)]
        input: PathBuf,
        /// Folder of 16-bit depth images in millimeters, named like the color images.
        #[structopt(short, long)]
        depth: PathBuf,
        /// Where the corrected model is written.
        #[structopt(short, long)]
        output: PathBuf,
        /// The file where settings are specified.
        ///
        /// This is in the format of `sfm_model::CorrectionSettings`.
        #[structopt(short, long, default_value = "correction-settings.json")]
        settings: PathBuf,
    },
    /// Removes the query images from a full model.
    Reference {
        #[structopt(short, long)]
        full: PathBuf,
        #[structopt(short, long)]
        output: PathBuf,
        /// Names of the query images, one per line.
        #[structopt(short, long)]
        blacklist: Option<PathBuf>,
    },
    /// Builds a model without points from the ground-truth poses of a ScanNet scene.
    ReferenceScannet {
        #[structopt(short, long)]
        scene: PathBuf,
        #[structopt(short, long)]
        output: PathBuf,
    },
    /// Prepares the reference model of a ScanNet scene with an external pipeline.
    Run {
        /// The run configuration in JSON.
        #[structopt(short, long)]
        config: PathBuf,
        /// Program invoked as `<program> <stage> <args...>` for every pipeline stage.
        #[structopt(short, long)]
        program: PathBuf,
        #[structopt(short, long)]
        dataset: PathBuf,
        #[structopt(long)]
        scene: String,
        /// Names of the query images, one per line.
        #[structopt(short, long)]
        test_list: Option<PathBuf>,
    },
}

fn run(opt: Opt) -> Result<()> {
    let store = ColmapStore::new(if opt.text { Format::Text } else { Format::Binary });
    match opt.command {
        Subcommand::Correct {
            input,
            depth,
            output,
            settings,
        } => {
            let settings = load_correction_settings(&settings)?;
            let reader = PngDepthReader::new(depth).extension(settings.depth_extension.clone());
            let summary = correct_sfm_with_depth(&store, &input, &reader, &output, &settings)?;
            info!("{:?}", summary);
        }
        Subcommand::Reference {
            full,
            output,
            blacklist,
        } => {
            let split =
                create_reference_sfm_from_store(&store, &full, &output, blacklist.as_deref())?;
            info!(
                "{} database and {} query images",
                split.train.len(),
                split.test.len()
            );
        }
        Subcommand::ReferenceScannet { scene, output } => {
            let reference = scannet_reference(&scene)?;
            store.write(&reference.reconstruction, &output)?;
        }
        Subcommand::Run {
            config,
            program,
            dataset,
            scene,
            test_list,
        } => {
            let config = RunConfig::load(&config)?;
            let (_, joint) = result_filenames(&config.localization, config.use_dense_depth)?;
            let output_dir = config
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("outputs"));
            let layout = ScanNetLayout {
                dataset,
                results_file: output_dir.join(&scene).join(joint),
                scene,
                test_list,
            };
            std::fs::create_dir_all(layout.results_dir()).map_err(|source| {
                sfm_model::Error::Io {
                    path: layout.results_dir(),
                    source,
                }
            })?;
            let mut driver = CommandDriver::new(program);
            let outcome = run_scannet(&config, &mut driver, &layout, &store)?;
            info!(
                "localize {} queries against {}; logs go to {}",
                outcome.query_ids.len(),
                outcome.reference_model.display(),
                outcome.log_file.display()
            );
        }
    }
    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}
