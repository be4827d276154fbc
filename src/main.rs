// src/main.rs
// ============================================================================
// HELIOS-SAFECONVERT CLI
// ============================================================================
//
// Uso simple:
//   helios-safeconvert model.pt
//
// Con conversión selectiva:
//   helios-safeconvert model.safetensors \
//       -c float32:float16 \
//       -c int32:int16 \
//       -o model_fp16.safetensors
//
// ============================================================================

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use helios_safeconvert::builder::{run, ConvertOptions};
use helios_safeconvert::format_size;

#[derive(Parser, Debug)]
#[command(name = "helios-safeconvert")]
#[command(about = "Convert PyTorch or safetensors files to safetensors format")]
#[command(version = "0.1.0")]
struct Args {
    /// Input .pt or .safetensors file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output .safetensors file (default: INPUT with .safetensors extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Selective dtype conversion rule, e.g. 'float32:float16'. Repeatable.
    #[arg(short, long = "convert", value_name = "FROM:TO")]
    convert: Vec<String>,

    /// Don't show the input file structure
    #[arg(long)]
    no_show_input: bool,

    /// Don't show the output file structure
    #[arg(long)]
    no_show_output: bool,

    /// Print the dtype summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let start = Instant::now();

    let options = ConvertOptions {
        input: args.input,
        output: args.output,
        convert: args.convert,
        show_input: !args.no_show_input,
        show_output: !args.no_show_output,
        show_summary: true,
        progress: true,
    };

    println!("═══════════════════════════════════════════════════════════════");
    println!("  HELIOS SAFECONVERT v0.1.0");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Input:      {}", options.input.display());
    println!("  Output:     {}", options.output_path().display());
    if options.convert.is_empty() {
        println!("  Convert:    (none)");
    } else {
        println!("  Convert:    {}", options.convert.join(", "));
    }
    println!("═══════════════════════════════════════════════════════════════");

    let report = run(&options)?;

    if args.json {
        println!();
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
    }

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("  ✓ Successfully converted to {}", report.output.display());
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Time:       {:.1}s", start.elapsed().as_secs_f64());
    println!("  Tensors:    {} ({} converted)", report.tensor_count, report.converted_count);
    println!(
        "  Size:       {} -> {}",
        format_size(report.bytes_before),
        format_size(report.bytes_after)
    );
    println!("═══════════════════════════════════════════════════════════════");

    Ok(())
}
