use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use layertex::{
    Document, DocumentSpec, FsStore, LayerPipeline, NodeId, PipelineOpts, StoreBackend as _,
    TextureCache, decode_bc3, is_boundary, unpack_texture,
    unpremultiply_rgba8_in_place,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "layertex", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterize every top-level layer of a document into a texture store.
    Render(RenderArgs),
    /// Write the contents of a store as an export blob.
    Export(ExportArgs),
    /// Load an export blob into a store.
    Import(ImportArgs),
    /// Print row counts and byte usage of a store.
    Stats(StoreArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Store directory (created if missing).
    #[arg(long)]
    store: PathBuf,

    /// Pipeline options JSON.
    #[arg(long)]
    opts: Option<PathBuf>,

    /// Write one PNG per settled layer into this directory.
    #[arg(long)]
    png_dir: Option<PathBuf>,

    /// Give up after this many milliseconds.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Store directory.
    #[arg(long)]
    store: PathBuf,

    /// Output blob path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Store directory (created if missing).
    #[arg(long)]
    store: PathBuf,

    /// Input blob path.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Store directory.
    #[arg(long)]
    store: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Export(args) => cmd_export(args),
        Command::Import(args) => cmd_import(args),
        Command::Stats(args) => cmd_stats(args),
    }
}

fn read_doc_json(path: &Path) -> anyhow::Result<Document> {
    let f = File::open(path).with_context(|| format!("open document '{}'", path.display()))?;
    let spec: DocumentSpec =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse document JSON")?;
    let mut doc = Document::from_spec(&spec)?;
    doc.finish_load();
    Ok(doc)
}

/// Outermost layer boundaries under `body`.
fn top_level_layers(doc: &Document) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = doc.children(doc.body()).into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        if is_boundary(doc, id) {
            out.push(id);
            continue;
        }
        stack.extend(doc.children(id).into_iter().rev());
    }
    out
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut doc = read_doc_json(&args.in_path)?;
    let mut opts = match &args.opts {
        Some(path) => PipelineOpts::from_json_file(path)?,
        None => PipelineOpts::default(),
    };
    if args.png_dir.is_some() {
        opts.retain_raw_after_compress = true;
    }

    let store = FsStore::open(&args.store)?;
    let mut pipeline = LayerPipeline::new(opts, Box::new(store))?;

    let roots = top_level_layers(&doc);
    if roots.is_empty() {
        anyhow::bail!("document has no layer boundaries");
    }
    for el in &roots {
        pipeline.create_layer(&doc, *el)?;
    }

    let settled = pipeline.run_until_idle(&mut doc, Duration::from_millis(args.timeout_ms));
    if !settled {
        tracing::warn!(timeout_ms = args.timeout_ms, "pipeline did not settle");
    }
    pipeline.save().context("flush store")?;

    if let Some(dir) = &args.png_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir '{}'", dir.display()))?;
        for (id, surface) in pipeline.surfaces().iter() {
            let (Some(key), Some(tex)) = (surface.current_state_key(), pipeline.current_texture(id))
            else {
                continue;
            };
            let mut image = match (&tex.canvas, &tex.compressed) {
                (Some(canvas), _) => canvas.as_ref().clone(),
                (None, Some(compressed)) => decode_bc3(compressed)?,
                (None, None) => continue,
            };
            unpremultiply_rgba8_in_place(&mut image);
            let out = dir.join(format!("{key}.png"));
            image
                .save_with_format(&out, image::ImageFormat::Png)
                .with_context(|| format!("write png '{}'", out.display()))?;
        }
    }

    let stats = pipeline.stats();
    let layers: Vec<serde_json::Value> = pipeline
        .surfaces()
        .iter()
        .map(|(id, s)| {
            let state = pipeline.current_layer_state(id);
            serde_json::json!({
                "element": s.element().index(),
                "state": s.current_state_key().map(|k| k.to_string()),
                "texture": state.and_then(|st| st.texture).map(|t| t.to_string()),
                "size": state.map(|st| [st.texture_width, st.texture_height]),
            })
        })
        .collect();
    let report = serde_json::json!({
        "settled": settled,
        "layers": layers,
        "serializations": stats.serializations,
        "raster_attempts": stats.raster_attempts,
        "compressions": stats.compressions,
        "failed_jobs": stats.failed_jobs,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    pipeline.close_store()?;
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let store = FsStore::open(&args.store)?;
    let mut cache = TextureCache::new(Box::new(store), Duration::ZERO);
    let blob = cache.export_snapshot(None)?;
    std::fs::write(&args.out, &blob)
        .with_context(|| format!("write export '{}'", args.out.display()))?;
    eprintln!("wrote {} ({} bytes)", args.out.display(), blob.len());
    Ok(())
}

fn cmd_import(args: ImportArgs) -> anyhow::Result<()> {
    let blob = std::fs::read(&args.in_path)
        .with_context(|| format!("read export '{}'", args.in_path.display()))?;
    let store = FsStore::open(&args.store)?;
    let mut cache = TextureCache::new(Box::new(store), Duration::ZERO);
    let summary = cache.import_snapshot(&blob)?;
    cache.close()?;
    println!(
        "{}",
        serde_json::json!({ "states": summary.states, "textures": summary.textures })
    );
    Ok(())
}

fn cmd_stats(args: StoreArgs) -> anyhow::Result<()> {
    let mut store = FsStore::open(&args.store)?;
    let textures = store.texture_hashes()?;
    let mut gpu_bytes = 0usize;
    for hash in &textures {
        let row = store.get_texture(*hash)?;
        gpu_bytes += unpack_texture(&row.compressed)?.byte_len();
    }
    println!(
        "{}",
        serde_json::json!({
            "schema_version": store.schema_version(),
            "states": store.state_hashes()?.len(),
            "textures": textures.len(),
            "used_bytes": store.used_bytes(),
            "gpu_bytes": gpu_bytes,
        })
    );
    Ok(())
}
