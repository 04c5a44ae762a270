use clap::{Parser, Subcommand};
use flactag::block::{MetadataBlock, Picture, PictureType};
use flactag::tags::{read_tags, FlacTags, TagMap, TagOptions};
use flactag::{FlacStream, TaggerWriter};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flactag", about = "Read and rewrite FLAC metadata")]
struct Cli {
    /// Log block-level decisions to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the comment tags and picture summary
    Read {
        input: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List every metadata block in the chain
    Blocks {
        input: PathBuf,
    },
    /// Stream a copy of the input with new tags
    Write {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// KEY=VALUE; repeat a key for multiple values
        #[arg(short, long = "tag", value_name = "KEY=VALUE")]
        tag: Vec<String>,
        /// Image file to embed
        #[arg(long)]
        picture: Option<PathBuf>,
        /// Picture type code, 0-20 (3 = front cover)
        #[arg(long, default_value = "3")]
        picture_type: u32,
        #[arg(long, default_value = "")]
        description: String,
        /// Vendor string for a newly created comment block
        #[arg(long)]
        vendor: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    match cli.command {

        // ── Read ─────────────────────────────────────────────────────────────
        Commands::Read { input, json } => {
            let tags = read_tags(BufReader::new(File::open(&input)?))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
                return Ok(());
            }
            match &tags.tag_map {
                Some(map) => {
                    for (key, value) in map.iter() {
                        for v in value.values() {
                            println!("{key}={v}");
                        }
                    }
                }
                None => println!("(no comment block)"),
            }
            if let Some(p) = &tags.picture {
                println!(
                    "picture: {:?} {} {}x{} {} B {:?}",
                    p.picture_type,
                    p.mime.as_deref().unwrap_or("?"),
                    p.width.unwrap_or(0),
                    p.height.unwrap_or(0),
                    p.data.len(),
                    p.description,
                );
            }
        }

        // ── Blocks ───────────────────────────────────────────────────────────
        Commands::Blocks { input } => {
            let stream = FlacStream::read_metadata(BufReader::new(File::open(&input)?))?;
            println!("{:<3} {:<14} {:>9} {:<5} Detail", "#", "Type", "Length", "Last");
            for (i, block) in stream.blocks.iter().enumerate() {
                println!(
                    "{:<3} {:<14} {:>9} {:<5} {}",
                    i,
                    block.block_type().name(),
                    block.body_len(),
                    block.header().is_last,
                    detail(block)
                );
            }
        }

        // ── Write ────────────────────────────────────────────────────────────
        Commands::Write { input, output, tag, picture, picture_type, description, vendor } => {
            let mut tags = FlacTags::default();
            if !tag.is_empty() {
                let mut map = TagMap::new();
                for entry in &tag {
                    let (key, value) = entry
                        .split_once('=')
                        .ok_or_else(|| format!("tag '{entry}' is not KEY=VALUE"))?;
                    map.append(key, value);
                }
                tags.tag_map = Some(map);
            }
            if let Some(path) = picture {
                tags.picture = Some(Picture {
                    picture_type: PictureType::try_from(picture_type)?,
                    description,
                    ..Picture::new(std::fs::read(path)?)
                });
            }

            let mut opts = TagOptions::default();
            if let Some(v) = vendor {
                opts.vendor_string = v;
            }
            let mut src    = BufReader::with_capacity(opts.chunk_size, File::open(&input)?);
            let mut writer = TaggerWriter::with_options(BufWriter::new(File::create(&output)?), Some(tags), &opts)?;
            let copied     = io::copy(&mut src, &mut writer)?;
            let (_, tagger) = writer.finish()?;
            println!(
                "Wrote {} ({} B in, {} metadata blocks)",
                output.display(),
                copied,
                tagger.blocks()?.len()
            );
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn detail(block: &MetadataBlock) -> String {
    match block {
        MetadataBlock::Comment(c) => format!("vendor={:?} comments={}", c.vendor_string, c.comments.len()),
        MetadataBlock::Picture(p) => format!(
            "{:?} {} {}x{} data={} B",
            p.picture_type, p.mime, p.width, p.height, p.data.len()
        ),
        MetadataBlock::Opaque(o) => {
            let head = &o.body[..o.body.len().min(8)];
            format!("head={}", hex::encode(head))
        }
    }
}
