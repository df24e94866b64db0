//! Layertex turns document subtrees into content-addressed GPU textures.
//!
//! Elements marked as layers are serialized into self-contained vector snapshots, hashed,
//! rasterized, block-compressed on a worker pool and persisted so identical visual states
//! are rendered once. The public API is pipeline-oriented:
//!
//! - Build or mutate a [`Document`]
//! - Track elements with [`LayerPipeline::create_layer`]
//! - Drive work with [`LayerPipeline::tick`] and show results through a [`LayerScene`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod document;
mod foundation;
mod layer;
mod pipeline;
mod raster;
mod scene;
mod snapshot;
mod store;

pub use crate::foundation::core::{Affine, Bounds, Edges, Point, Rect, Rgba8, Vec2};
pub use crate::foundation::error::{LayerError, LayerResult, StoreErrorKind};
pub use crate::foundation::math::unpremultiply_rgba8_in_place;

pub use crate::document::geometry::{
    content_origin, full_size, get_border, get_bounds, get_margin, get_padding,
    has_nontrivial_transform,
};
pub use crate::document::tree::{
    BoxStyle, Document, DocumentEvent, DocumentSpec, MutationKind, MutationRecord, Node, NodeId,
    NodeKind, NodeSpec, StyleSheet,
};
pub use crate::layer::state::{CompressStatus, LayerState, TextureState};
pub use crate::layer::surface::{PseudoState, Surface, SurfaceId};
pub use crate::layer::tree::{LAYER_ATTR, LayerEvent, SurfaceTree, is_boundary, is_media_tag};
pub use crate::pipeline::manager::{LayerPipeline, PipelineStats, TickSummary};
pub use crate::pipeline::opts::PipelineOpts;
pub use crate::pipeline::rasterize::{RasterJob, RasterStep};
pub use crate::pipeline::scheduler::{QueueMarks, TaskQueue};
pub use crate::pipeline::serialize::SerializeOutcome;
pub use crate::raster::codec::{CompressedTexture, TextureFormat, decode_bc3, encode_bc3};
pub use crate::raster::rasterizer::{RasterOutput, Rasterizer, SvgRasterizer};
pub use crate::raster::worker::{
    Bc3Encoder, CompressPool, EncodeRequest, EncodeResponse, MAX_COMPRESS_WORKERS, TextureEncoder,
};
pub use crate::scene::consumer::{LayerMesh, LayerScene, MeshId, SceneHit, TextureBinding};
pub use crate::snapshot::fingerprint::{StateHash, TextureHash};
pub use crate::snapshot::markup::Snapshot;
pub use crate::store::backend::{MemoryStore, SCHEMA_VERSION, StateRow, StoreBackend, TextureRow};
pub use crate::store::blob::{
    ExportDocument, pack_export, pack_texture, unpack_export, unpack_texture,
};
pub use crate::store::cache::{ImportSummary, TextureCache};
pub use crate::store::fs::FsStore;
