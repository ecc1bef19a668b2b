// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The U-Net denoising network.
//!
//! Four 2x pooling levels on the way down, four 2x upsampling levels on the
//! way up, with skip connections feeding concatenated-input convolutions:
//!
//! ```text
//! input ─ enc_conv0 ─ enc_conv1+pool ─ enc_conv2+pool ─ enc_conv3+pool ─ enc_conv4+pool
//!   │                     │ pool1          │ pool2          │ pool3            │
//!   │                     │                │                │        enc_conv5a ─ enc_conv5b+up
//!   │                     │                │                └──────── dec_conv4a ─ dec_conv4b+up
//!   │                     │                └───────────────────────── dec_conv3a ─ dec_conv3b+up
//!   │                     └────────────────────────────────────────── dec_conv2a ─ dec_conv2b+up
//!   └──────────────────────────────────────────────────────────────── dec_conv1a ─ dec_conv1b ─ dec_conv0 ─ output
//! ```

use op_graph::{Activation, Graph, GraphError, OpHandle, PostOp};
use tensor_core::TensorDims;

/// Tile sizes are multiples of this, so that four pooling levels divide evenly.
pub const ALIGNMENT: usize = 16;

/// Receptive field of the network in pixels.
pub const RECEPTIVE_FIELD: usize = 174;

/// Overlap between neighbouring tiles: half the receptive field, aligned.
pub const OVERLAP: usize = 96;

/// Output channels of the network.
pub const OUTPUT_CHANNELS: usize = 3;

/// One convolution of the network and its channel counts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConvLayer {
    pub name: &'static str,
    pub in_channels: usize,
    pub out_channels: usize,
}

/// Every convolution in declaration order.
pub fn conv_layers(input_channels: usize) -> Vec<ConvLayer> {
    let table: [(&'static str, usize, usize); 16] = [
        ("enc_conv0", input_channels, 32),
        ("enc_conv1", 32, 32),
        ("enc_conv2", 32, 48),
        ("enc_conv3", 48, 64),
        ("enc_conv4", 64, 80),
        ("enc_conv5a", 80, 96),
        ("enc_conv5b", 96, 96),
        ("dec_conv4a", 96 + 64, 112),
        ("dec_conv4b", 112, 112),
        ("dec_conv3a", 112 + 48, 96),
        ("dec_conv3b", 96, 96),
        ("dec_conv2a", 96 + 32, 64),
        ("dec_conv2b", 64, 64),
        ("dec_conv1a", 64 + input_channels, 64),
        ("dec_conv1b", 64, 32),
        ("dec_conv0", 32, OUTPUT_CHANNELS),
    ];
    table
        .into_iter()
        .map(|(name, in_channels, out_channels)| ConvLayer {
            name,
            in_channels,
            out_channels,
        })
        .collect()
}

/// Declares the network into an empty `graph` for one tile size.
///
/// Returns the handle of the output op.
pub fn build_unet(
    graph: &mut Graph,
    input_channels: usize,
    tile_h: usize,
    tile_w: usize,
) -> Result<OpHandle, GraphError> {
    use Activation::ReLU;

    let input = graph.add_input_process("input", TensorDims::chw(input_channels, tile_h, tile_w), ALIGNMENT)?;

    let enc_conv0 = graph.add_conv("enc_conv0", input, ReLU, PostOp::None)?;
    let pool1 = graph.add_conv("enc_conv1", enc_conv0, ReLU, PostOp::Pool)?;
    let pool2 = graph.add_conv("enc_conv2", pool1, ReLU, PostOp::Pool)?;
    let pool3 = graph.add_conv("enc_conv3", pool2, ReLU, PostOp::Pool)?;
    let pool4 = graph.add_conv("enc_conv4", pool3, ReLU, PostOp::Pool)?;
    let enc_conv5a = graph.add_conv("enc_conv5a", pool4, ReLU, PostOp::None)?;

    let upsample4 = graph.add_conv("enc_conv5b", enc_conv5a, ReLU, PostOp::Upsample)?;
    let dec_conv4a = graph.add_concat_conv("dec_conv4a", upsample4, pool3, ReLU)?;

    let upsample3 = graph.add_conv("dec_conv4b", dec_conv4a, ReLU, PostOp::Upsample)?;
    let dec_conv3a = graph.add_concat_conv("dec_conv3a", upsample3, pool2, ReLU)?;

    let upsample2 = graph.add_conv("dec_conv3b", dec_conv3a, ReLU, PostOp::Upsample)?;
    let dec_conv2a = graph.add_concat_conv("dec_conv2a", upsample2, pool1, ReLU)?;

    let upsample1 = graph.add_conv("dec_conv2b", dec_conv2a, ReLU, PostOp::Upsample)?;
    let dec_conv1a = graph.add_concat_conv("dec_conv1a", upsample1, input, ReLU)?;
    let dec_conv1b = graph.add_conv("dec_conv1b", dec_conv1a, ReLU, PostOp::None)?;

    let dec_conv0 = graph.add_conv("dec_conv0", dec_conv1b, Activation::None, PostOp::None)?;

    graph.add_output_process("output", dec_conv0)
}
