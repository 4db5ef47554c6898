use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use docxide_layout::fonts::FontBook;
use docxide_layout::{DocumentSnapshot, EngineConfig, Error, docx, paginate_snapshot};

/// Paginate a document snapshot and print its layout package as JSON.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Document snapshot (JSON)
    input: PathBuf,

    /// Take page style, lists and headers/footers from this DOCX package
    #[arg(long)]
    docx: Option<PathBuf>,

    /// Measure FAMILY with the font file at PATH
    #[arg(long = "font", value_name = "FAMILY=PATH")]
    fonts: Vec<String>,

    /// Write the layout here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    pretty: bool,

    /// Gap between pages, in pixels
    #[arg(long)]
    page_gap: Option<f32>,
}

fn load_fonts(args: &[String]) -> Result<FontBook, Error> {
    let mut book = FontBook::new();
    for arg in args {
        let Some((family, path)) = arg.split_once('=') else {
            return Err(Error::Font(format!("expected FAMILY=PATH, got {arg:?}")));
        };
        book.register_file(family, std::path::Path::new(path))?;
    }
    Ok(book)
}

fn run(args: Args) -> Result<(), Error> {
    let text = std::fs::read_to_string(&args.input)?;
    let mut doc: DocumentSnapshot = serde_json::from_str(&text)?;
    if let Some(path) = &args.docx {
        docx::read_package_defaults(path)?.apply_to(&mut doc);
    }
    let fonts = load_fonts(&args.fonts)?;

    let mut config = EngineConfig::default();
    if let Some(gap) = args.page_gap {
        config.page_gap_px = gap;
    }
    let layout = paginate_snapshot(&doc, fonts, config);

    let json = if args.pretty {
        serde_json::to_string_pretty(&*layout)?
    } else {
        serde_json::to_string(&*layout)?
    };
    match &args.output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
