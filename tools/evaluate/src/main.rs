//! Evaluation CLI
//!
//! Loads a saved checkpoint and runs one validation pass, printing the
//! per-class IoU table and optionally writing the report as JSON.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::data::dataset::Dataset;
use clap::{Parser, ValueEnum};
use tracing::info;

use seg_core::cli::setup_cli_logging;
use seg_core::{BackboneKind, ConfusionMatrix, DatasetKind, ModelKind, IGNORE_INDEX};
use seg_dataset::{batch_plan, batch_stream, read_id_file, ParallelLoader, SegBatcher, SegSampleSet};
use seg_training::{evaluate_pass, print_report, SegModel, SegModelConfig};

type Backend = NdArray<f32>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DatasetArg {
    Pascal,
    Cityscapes,
    Coco,
}

impl From<DatasetArg> for DatasetKind {
    fn from(arg: DatasetArg) -> Self {
        match arg {
            DatasetArg::Pascal => DatasetKind::Pascal,
            DatasetArg::Cityscapes => DatasetKind::Cityscapes,
            DatasetArg::Coco => DatasetKind::Coco,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackboneArg {
    Resnet50,
    Resnet101,
}

impl From<BackboneArg> for BackboneKind {
    fn from(arg: BackboneArg) -> Self {
        match arg {
            BackboneArg::Resnet50 => BackboneKind::ResNet50,
            BackboneArg::Resnet101 => BackboneKind::ResNet101,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Deeplabv3plus,
    Pspnet,
    Deeplabv2,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Deeplabv3plus => ModelKind::DeepLabV3Plus,
            ModelArg::Pspnet => ModelKind::PspNet,
            ModelArg::Deeplabv2 => ModelKind::DeepLabV2,
        }
    }
}

/// Semi-supervised semantic segmentation -- evaluation
#[derive(Parser, Debug)]
#[command(name = "evaluate", about = "Semi-supervised semantic segmentation -- evaluation")]
struct Args {
    /// Checkpoint to evaluate
    #[arg(long, value_name = "FILE")]
    checkpoint: PathBuf,

    /// Root path of the dataset (validation ids in <root>/val.txt)
    #[arg(long, value_name = "DIR")]
    data_root: PathBuf,

    /// Dataset to evaluate on
    #[arg(long, value_enum, default_value_t = DatasetArg::Pascal)]
    dataset: DatasetArg,

    /// Backbone the checkpoint was trained with
    #[arg(long, value_enum, default_value_t = BackboneArg::Resnet50)]
    backbone: BackboneArg,

    /// Model architecture the checkpoint was trained with
    #[arg(long, value_enum, default_value_t = ModelArg::Deeplabv3plus)]
    model: ModelArg,

    /// Batch size of evaluation (defaults to the per-dataset rule)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Worker threads for data loading
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Optional JSON report output path
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    let dataset: DatasetKind = args.dataset.into();
    let model_kind: ModelKind = args.model.into();
    let backbone: BackboneKind = args.backbone.into();
    let device: NdArrayDevice = Default::default();

    let val_ids = read_id_file(&args.data_root.join("val.txt"))
        .context("failed to read validation id list (expected val.txt under the data root)")?;
    let val_set = SegSampleSet::validation(dataset, &args.data_root, val_ids);
    info!("Validation samples: {}", val_set.len());

    let model_config = SegModelConfig::new(model_kind, backbone, dataset.num_classes());
    let model = SegModel::<Backend>::new(&model_config, &device)
        .load_pretrained(&args.checkpoint, &device)
        .context("failed to load checkpoint")?;
    info!("Loaded checkpoint from {}", args.checkpoint.display());

    let batch_size = args.batch_size.unwrap_or(match dataset {
        DatasetKind::Cityscapes => 16,
        _ => 1,
    });
    let plan = batch_plan(val_set.len(), batch_size, false);
    let loader = ParallelLoader::new(args.workers)?;
    let batcher = SegBatcher::<Backend>::new();

    let mut metric = ConfusionMatrix::new(dataset.num_classes(), IGNORE_INDEX);
    let report = evaluate_pass(
        batch_stream(&loader, &val_set, &plan, &batcher, &device),
        |images| model.forward(images),
        &mut metric,
    )?;

    print_report(&report);
    info!("mIoU = {:.2}", report.mean * 100.0);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
