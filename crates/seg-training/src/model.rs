//! Segmentation model construction: a residual backbone plus one of three
//! task heads, kept as separate modules so each parameter group can be
//! stepped at its own learning rate.
//!
//! The architecture-name-to-constructor mapping is resolved once in
//! [`SegModel::new`]; everywhere else the model is just `forward` plus its
//! two parameter groups.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d, Relu};
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::module::{adaptive_avg_pool2d, interpolate};
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

use seg_core::{BackboneKind, Error, ModelKind, Result};

/// Configuration for building a segmentation model.
#[derive(Debug, Clone)]
pub struct SegModelConfig {
    pub model: ModelKind,
    pub backbone: BackboneKind,
    pub num_classes: usize,
    /// Channel width of the first backbone stage; later stages double it.
    pub base_width: usize,
    /// Channel width of the head's intermediate features.
    pub head_width: usize,
}

impl SegModelConfig {
    pub fn new(model: ModelKind, backbone: BackboneKind, num_classes: usize) -> Self {
        Self {
            model,
            backbone,
            num_classes,
            base_width: 64,
            head_width: 256,
        }
    }

    pub fn with_base_width(mut self, base_width: usize) -> Self {
        self.base_width = base_width;
        self
    }

    pub fn with_head_width(mut self, head_width: usize) -> Self {
        self.head_width = head_width;
        self
    }
}

fn stage_blocks(kind: BackboneKind) -> [usize; 4] {
    match kind {
        BackboneKind::ResNet50 => [3, 4, 6, 3],
        BackboneKind::ResNet101 => [3, 4, 23, 3],
    }
}

fn conv3x3<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    dilation: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_dilation([dilation, dilation])
        .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
        .with_bias(false)
        .init(device)
}

fn conv1x1<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device)
}

/// Convolution, batch norm, ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv3x3(in_channels, out_channels, stride, 1, device),
            norm: BatchNormConfig::new(out_channels).init(device),
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.activation.forward(self.norm.forward(self.conv.forward(input)))
    }
}

/// Basic residual block with an optional projection shortcut.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    shortcut: Option<Conv2d<B>>,
    activation: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let shortcut = (stride != 1 || in_channels != out_channels).then(|| {
            Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device)
        });

        Self {
            conv1: conv3x3(in_channels, out_channels, stride, 1, device),
            norm1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3(out_channels, out_channels, 1, 1, device),
            norm2: BatchNormConfig::new(out_channels).init(device),
            shortcut,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = match &self.shortcut {
            Some(projection) => projection.forward(input.clone()),
            None => input.clone(),
        };

        let out = self.activation.forward(self.norm1.forward(self.conv1.forward(input)));
        let out = self.norm2.forward(self.conv2.forward(out));
        self.activation.forward(out + residual)
    }
}

/// Residual feature-extraction backbone, the pretrained parameter group.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stem: ConvBlock<B>,
    blocks: Vec<ResidualBlock<B>>,
    out_channels: Ignored<usize>,
}

impl<B: Backend> Backbone<B> {
    pub fn new(kind: BackboneKind, base_width: usize, device: &B::Device) -> Self {
        let widths = [base_width, base_width * 2, base_width * 4, base_width * 8];
        let mut blocks = Vec::new();
        let mut in_channels = base_width;

        for (stage, &count) in stage_blocks(kind).iter().enumerate() {
            let out_channels = widths[stage];
            for block in 0..count {
                let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                blocks.push(ResidualBlock::new(in_channels, out_channels, stride, device));
                in_channels = out_channels;
            }
        }

        Self {
            stem: ConvBlock::new(3, base_width, 2, device),
            blocks,
            out_channels: Ignored(base_width * 8),
        }
    }

    pub fn out_channels(&self) -> usize {
        *self.out_channels
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut features = self.stem.forward(input);
        for block in &self.blocks {
            features = block.forward(features);
        }
        features
    }
}

/// Atrous spatial pyramid head (DeepLabV3+): parallel dilated branches,
/// fused and projected to class scores.
#[derive(Module, Debug)]
pub struct AsppHead<B: Backend> {
    branches: Vec<Conv2d<B>>,
    fuse: Conv2d<B>,
    classifier: Conv2d<B>,
    activation: Relu,
}

impl<B: Backend> AsppHead<B> {
    const DILATIONS: [usize; 4] = [1, 6, 12, 18];

    fn new(in_channels: usize, hidden: usize, num_classes: usize, device: &B::Device) -> Self {
        let branches = Self::DILATIONS
            .iter()
            .map(|&dilation| conv3x3(in_channels, hidden, 1, dilation, device))
            .collect();

        Self {
            branches,
            fuse: conv1x1(hidden * Self::DILATIONS.len(), hidden, device),
            classifier: conv1x1(hidden, num_classes, device),
            activation: Relu::new(),
        }
    }

    fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        let outputs: Vec<Tensor<B, 4>> = self
            .branches
            .iter()
            .map(|branch| branch.forward(features.clone()))
            .collect();
        let fused = self.activation.forward(self.fuse.forward(Tensor::cat(outputs, 1)));
        self.classifier.forward(fused)
    }
}

/// Pyramid pooling head (PSPNet): pooled context at several grid sizes,
/// upsampled and concatenated with the input features.
#[derive(Module, Debug)]
pub struct PyramidHead<B: Backend> {
    branches: Vec<Conv2d<B>>,
    fuse: Conv2d<B>,
    classifier: Conv2d<B>,
    activation: Relu,
    pool_sizes: Ignored<Vec<usize>>,
}

impl<B: Backend> PyramidHead<B> {
    const POOL_SIZES: [usize; 4] = [1, 2, 3, 6];

    fn new(in_channels: usize, hidden: usize, num_classes: usize, device: &B::Device) -> Self {
        let branches = Self::POOL_SIZES
            .iter()
            .map(|_| conv1x1(in_channels, hidden, device))
            .collect();

        Self {
            branches,
            fuse: conv1x1(in_channels + hidden * Self::POOL_SIZES.len(), hidden, device),
            classifier: conv1x1(hidden, num_classes, device),
            activation: Relu::new(),
            pool_sizes: Ignored(Self::POOL_SIZES.to_vec()),
        }
    }

    fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = features.dims();

        let mut outputs = vec![features.clone()];
        for (branch, &size) in self.branches.iter().zip(self.pool_sizes.iter()) {
            let pooled = adaptive_avg_pool2d(features.clone(), [size, size]);
            let projected = branch.forward(pooled);
            outputs.push(interpolate(
                projected,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            ));
        }

        let fused = self.activation.forward(self.fuse.forward(Tensor::cat(outputs, 1)));
        self.classifier.forward(fused)
    }
}

/// Dilated classifier head (DeepLabV2): parallel dilated branches mapping
/// straight to class scores, summed.
#[derive(Module, Debug)]
pub struct DilatedHead<B: Backend> {
    branches: Vec<Conv2d<B>>,
}

impl<B: Backend> DilatedHead<B> {
    const DILATIONS: [usize; 4] = [6, 12, 18, 24];

    fn new(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        let branches = Self::DILATIONS
            .iter()
            .map(|&dilation| conv3x3(in_channels, num_classes, 1, dilation, device))
            .collect();

        Self { branches }
    }

    fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut scores = self.branches[0].forward(features.clone());
        for branch in &self.branches[1..] {
            scores = scores + branch.forward(features.clone());
        }
        scores
    }
}

/// Task head, the parameter group trained at the multiplied rate.
#[derive(Module, Debug)]
pub enum SegHead<B: Backend> {
    Aspp(AsppHead<B>),
    Pyramid(PyramidHead<B>),
    Dilated(DilatedHead<B>),
}

impl<B: Backend> SegHead<B> {
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            SegHead::Aspp(head) => head.forward(features),
            SegHead::Pyramid(head) => head.forward(features),
            SegHead::Dilated(head) => head.forward(features),
        }
    }
}

/// A segmentation model: backbone features, head scores, bilinear upsampling
/// back to the input resolution.
#[derive(Module, Debug)]
pub struct SegModel<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: SegHead<B>,
}

impl<B: Backend> SegModel<B> {
    pub fn new(config: &SegModelConfig, device: &B::Device) -> Self {
        let backbone = Backbone::new(config.backbone, config.base_width, device);
        let in_channels = backbone.out_channels();

        let head = match config.model {
            ModelKind::DeepLabV3Plus => SegHead::Aspp(AsppHead::new(
                in_channels,
                config.head_width,
                config.num_classes,
                device,
            )),
            ModelKind::PspNet => SegHead::Pyramid(PyramidHead::new(
                in_channels,
                config.head_width,
                config.num_classes,
                device,
            )),
            ModelKind::DeepLabV2 => {
                SegHead::Dilated(DilatedHead::new(in_channels, config.num_classes, device))
            }
        };

        Self { backbone, head }
    }

    /// Per-pixel class scores with shape [batch, num_classes, height, width].
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = images.dims();
        let features = self.backbone.forward(images);
        let scores = self.head.forward(features);
        interpolate(
            scores,
            [height, width],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        )
    }

    /// Loads a pretrained initialization saved with the workspace recorder.
    pub fn load_pretrained(self, path: &std::path::Path, device: &B::Device) -> Result<Self> {
        let recorder = CompactRecorder::new();
        self.load_file(path, &recorder, device).map_err(|e| {
            Error::Model(format!(
                "failed to load pretrained weights from {}: {e:?}",
                path.display()
            ))
        })
    }
}
