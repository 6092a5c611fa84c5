//! Training CLI
//!
//! Runs the full epoch cycle (train, evaluate, checkpoint) for supervised
//! or semi-supervised semantic segmentation. Defaults for learning rate,
//! epoch count, and crop size are resolved per dataset; validation ids are
//! read from `val.txt` under the data root.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::data::dataset::Dataset;
use burn::module::Module;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use seg_core::cli::setup_cli_logging;
use seg_core::{
    BackboneKind, ConfusionMatrix, DatasetKind, ModelKind, TrainConfig, TrainMode, TrainOptions,
    IGNORE_INDEX,
};
use seg_dataset::{
    batch_plan, batch_stream, oversample_small, read_id_file, shuffled_batch_plan, ParallelLoader,
    SegBatcher, SegSampleSet,
};
use seg_training::{
    evaluate_pass, should_snapshot, CheckpointManager, PolyLrSchedule, SegModel, SegModelConfig,
    Trainer,
};

type InferenceBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferenceBackend>;

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
enum ModeArg {
    #[value(name = "train")]
    Train,
    #[value(name = "semi_train")]
    SemiTrain,
}

impl From<ModeArg> for TrainMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Train => TrainMode::Train,
            ModeArg::SemiTrain => TrainMode::SemiTrain,
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

/// Semi-supervised semantic segmentation -- training
#[derive(Parser, Debug)]
#[command(name = "train", about = "Semi-supervised semantic segmentation -- training")]
struct Args {
    /// Root path of the training dataset (validation ids in <root>/val.txt)
    #[arg(long, value_name = "DIR")]
    data_root: PathBuf,

    /// Training dataset
    #[arg(long, value_enum, default_value_t = DatasetArg::Pascal)]
    dataset: DatasetArg,

    /// Batch size of training
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// Learning rate (defaulted per dataset if unset)
    #[arg(long)]
    lr: Option<f64>,

    /// Training epochs (defaulted per dataset if unset)
    #[arg(long)]
    epochs: Option<usize>,

    /// Cropping size of training samples (defaulted per dataset if unset)
    #[arg(long)]
    crop_size: Option<usize>,

    /// Backbone of the segmentation model
    #[arg(long, value_enum, default_value_t = BackboneArg::Resnet50)]
    backbone: BackboneArg,

    /// Model for semantic segmentation
    #[arg(long, value_enum, default_value_t = ModelArg::Deeplabv3plus)]
    model: ModelArg,

    /// Supervised or semi-supervised setting
    #[arg(long, value_enum, default_value_t = ModeArg::Train)]
    mode: ModeArg,

    /// Path of labeled image ids
    #[arg(long, value_name = "FILE")]
    labeled_id_path: PathBuf,

    /// Path of unlabeled image ids (semi_train mode)
    #[arg(long, value_name = "FILE")]
    unlabeled_id_path: Option<PathBuf>,

    /// Path of generated pseudo masks (semi_train mode)
    #[arg(long, value_name = "DIR")]
    pseudo_mask_path: Option<PathBuf>,

    /// Path of saved checkpoints
    #[arg(long, value_name = "DIR")]
    save_path: PathBuf,

    /// Optional pretrained initialization for the model weights
    #[arg(long, value_name = "FILE")]
    pretrained: Option<PathBuf>,

    /// Random seed for data shuffling
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Worker threads for training data loading
    #[arg(long, default_value_t = 16)]
    train_workers: usize,

    /// Worker threads for validation data loading
    #[arg(long, default_value_t = 4)]
    eval_workers: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    let config = TrainOptions {
        dataset: args.dataset.into(),
        mode: args.mode.into(),
        data_root: args.data_root,
        labeled_id_path: args.labeled_id_path,
        unlabeled_id_path: args.unlabeled_id_path,
        pseudo_mask_path: args.pseudo_mask_path,
        save_path: args.save_path,
        batch_size: args.batch_size,
        lr: args.lr,
        epochs: args.epochs,
        crop_size: args.crop_size,
        backbone: args.backbone.into(),
        model: args.model.into(),
        pretrained: args.pretrained,
        seed: args.seed,
        train_workers: args.train_workers,
        eval_workers: args.eval_workers,
    }
    .resolve()
    .context("invalid training configuration")?;

    info!("Semi-supervised semantic segmentation -- training");
    info!(
        "dataset = {}, mode = {}, model = {}, backbone = {}",
        config.dataset, config.mode, config.model, config.backbone
    );
    info!(
        "epochs = {}, batch size = {}, lr = {}, crop size = {}",
        config.epochs, config.batch_size, config.lr, config.crop_size
    );

    run_training(&config)
}

fn build_train_set(config: &TrainConfig) -> Result<SegSampleSet> {
    let labeled_ids = read_id_file(&config.labeled_id_path)?;
    info!("Loaded {} labeled ids", labeled_ids.len());

    match config.mode {
        TrainMode::Train => {
            let ids = oversample_small(labeled_ids);
            info!("Training id list size after oversampling: {}", ids.len());
            Ok(SegSampleSet::supervised(
                config.dataset,
                &config.data_root,
                ids,
                config.crop_size,
            ))
        }
        TrainMode::SemiTrain => {
            let unlabeled_path = config
                .unlabeled_id_path
                .as_deref()
                .context("unlabeled id path missing after validation")?;
            let pseudo_mask_path = config
                .pseudo_mask_path
                .as_deref()
                .context("pseudo mask path missing after validation")?;

            let unlabeled_ids = read_id_file(unlabeled_path)?;
            info!(
                "Loaded {} unlabeled ids with pseudo masks from {}",
                unlabeled_ids.len(),
                pseudo_mask_path.display()
            );

            Ok(SegSampleSet::semi_supervised(
                config.dataset,
                &config.data_root,
                labeled_ids,
                unlabeled_ids,
                pseudo_mask_path,
                config.crop_size,
            ))
        }
    }
}

fn run_training(config: &TrainConfig) -> Result<()> {
    let device: NdArrayDevice = Default::default();

    let train_set = build_train_set(config)?;
    let val_ids = read_id_file(&config.data_root.join("val.txt"))
        .context("failed to read validation id list (expected val.txt under the data root)")?;
    let val_set = SegSampleSet::validation(config.dataset, &config.data_root, val_ids);

    info!(
        "Training samples: {} ({} labeled, {} pseudo-labeled), validation samples: {}",
        train_set.len(),
        train_set.num_labeled(),
        train_set.num_pseudo_labeled(),
        val_set.len()
    );

    let batches_per_epoch = train_set.len() / config.batch_size;
    if batches_per_epoch == 0 {
        bail!(
            "not enough training samples ({}) for batch size {}",
            train_set.len(),
            config.batch_size
        );
    }
    let total_iters = batches_per_epoch * config.epochs;

    let model_config = SegModelConfig::new(config.model, config.backbone, config.num_classes());
    let mut model = SegModel::<TrainBackend>::new(&model_config, &device);
    info!("Params: {:.1}M", model.num_params() as f64 / 1e6);

    if let Some(path) = &config.pretrained {
        model = model
            .load_pretrained(path, &device)
            .context("failed to load pretrained initialization")?;
        info!("Loaded pretrained initialization from {}", path.display());
    }

    let schedule = PolyLrSchedule::new(config.lr, total_iters, config.head_lr_multiplier);
    let mut trainer = Trainer::new(model, schedule, IGNORE_INDEX);
    let mut manager = CheckpointManager::new(&config.save_path, config.model, config.backbone)?;

    let train_loader = ParallelLoader::new(config.train_workers)?;
    let eval_loader = ParallelLoader::new(config.eval_workers)?;
    let train_batcher = SegBatcher::<TrainBackend>::new();
    let eval_batcher = SegBatcher::<InferenceBackend>::new();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let progress = ProgressBar::new(config.epochs as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} epochs ({eta})")
            .unwrap()
            .progress_chars("=>-"),
    );

    // Stable order, partial batch retained.
    let eval_plan = batch_plan(val_set.len(), config.eval_batch_size, false);

    for epoch in 0..config.epochs {
        let rates = trainer.current_rates();
        info!(
            "==> Epoch {}, learning rate = {:.4}, previous best = {:.2}",
            epoch,
            rates.backbone,
            manager.previous_best()
        );

        let train_plan = shuffled_batch_plan(train_set.len(), config.batch_size, &mut rng);
        let train_loss = trainer.train_epoch(batch_stream(
            &train_loader,
            &train_set,
            &train_plan,
            &train_batcher,
            &device,
        ))?;

        let eval_model = trainer.valid_model();
        let mut metric = ConfusionMatrix::new(config.num_classes(), IGNORE_INDEX);
        let report = evaluate_pass(
            batch_stream(&eval_loader, &val_set, &eval_plan, &eval_batcher, &device),
            |images| eval_model.forward(images),
            &mut metric,
        )?;
        let score = report.mean * 100.0;

        let improved = manager.update_best(&eval_model, score)?;
        if should_snapshot(config.mode, epoch) {
            manager.snapshot(&eval_model, epoch, score)?;
        }

        info!(
            "Epoch {}: loss = {:.3}, mIoU = {:.2}{}",
            epoch,
            train_loss,
            score,
            if improved { " (new best)" } else { "" }
        );
        progress.inc(1);
    }

    progress.finish_with_message("training completed");
    info!("Training complete. Best mIoU: {:.2}", manager.previous_best());

    Ok(())
}
