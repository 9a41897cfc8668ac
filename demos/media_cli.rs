use clap::Parser;
use colored::Colorize;
use media_parser::{MediaService, ParseOptions, ParserConfig};
use std::error::Error;

/// Parse media URLs and print their records.
#[derive(Parser, Debug)]
#[command(name = "media_cli")]
struct Args {
    /// URLs to parse
    #[arg(required = true)]
    urls: Vec<String>,

    /// Bypass and refresh the cache
    #[arg(long)]
    force: bool,

    /// Print the full JSON record
    #[arg(long)]
    json: bool,

    /// Print the oEmbed projection for this viewer URL
    #[arg(long)]
    viewer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    println!("{}", "Media Parser".bold().green());
    println!("{}", "============".green());

    let service = MediaService::new_with_config(ParserConfig::from_env());
    let options = ParseOptions { force: args.force };

    for url in &args.urls {
        match service.parse_with(url, options).await {
            Ok(record) => {
                println!("\n{}", record.canonical_url.bold().blue());
                println!(
                    "{}: {} / {}",
                    "Kind".bold(),
                    record.provider,
                    record.media_type
                );
                if !record.identity.uuid.is_empty() {
                    println!("{}: {}", "UUID".bold(), record.identity.uuid);
                }
                println!("{}: {}", "Title".bold(), record.fields.title);
                println!("{}: {}", "Author".bold(), record.fields.author_name);
                println!("{}: {}", "Picture".bold(), record.fields.picture);
                if let Some(error) = &record.error {
                    println!("{}: {} ({})", "Warning".bold().yellow(), error.message, error.kind);
                }

                if args.json {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                if let Some(viewer) = &args.viewer {
                    let oembed = service.as_oembed(&record, viewer, 600, 400);
                    println!("{}", serde_json::to_string_pretty(&oembed)?);
                }
            }
            Err(e) => {
                eprintln!("{}: {} - {}", "Error".bold().red(), url, e);
            }
        }
    }

    Ok(())
}
