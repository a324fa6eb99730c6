use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use plugin_router::routing::codec::{decode_opaque, encode_opaque, ParsedRequest};

#[derive(Parser)]
#[command(name = "router-cli")]
#[command(about = "Inspect plugin URLs and opaque argument bundles", long_about = None)]
struct Cli {
    /// Reserved query key of the opaque bundle.
    #[arg(short, long, default_value = "_")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a plugin URL into its parts (opaque bundle decoded)
    Parse { url: String },
    /// Encode a JSON object as an opaque bundle
    Encode { json: String },
    /// Decode an opaque bundle to JSON
    Decode { blob: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { url } => {
            let request = ParsedRequest::parse(&url)?;
            let mut query = request.query.clone();
            let opaque = query.remove(&cli.key).map(|blob| decode_opaque(&blob)).transpose()?;
            let out = json!({
                "scheme": request.scheme,
                "host": request.host,
                "path": request.path,
                "query": query.pairs(),
                "opaque": opaque,
                "fragment": request.fragment,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Encode { json } => {
            let values: BTreeMap<String, Value> = serde_json::from_str(&json)?;
            println!("{}={}", cli.key, encode_opaque(&values)?);
        }
        Commands::Decode { blob } => {
            let blob = blob
                .strip_prefix(&format!("{}=", cli.key))
                .unwrap_or(&blob)
                .to_string();
            let values = decode_opaque(&blob)?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
    }

    Ok(())
}
