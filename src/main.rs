//! CLI entry point for autoparam
//!
//! - `parse`: show how channel identifiers normalize (or why they are rejected)
//! - `demo`: drive the mock `SUM` accumulator and test instrument end to end
//!
//! # Usage
//!
//! ```bash
//! autoparam parse "SUM  set 5" "WAVE [1,2]"
//! autoparam --log-level debug demo --options driver.toml
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use autoparam::kind::{Float32Array, Int32};
use autoparam::logging::{self, LogFormat, LoggingConfig};
use autoparam::mock::{instrument_driver, sum_driver};
use autoparam::{ChannelKey, DataType, DriverOptions, InitHooks};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "autoparam")]
#[command(about = "Dynamic channel registry and typed dispatch for parameter drivers", long_about = None)]
struct Cli {
    /// Default log level (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse channel identifiers and print their normalized form
    Parse {
        /// Raw identifiers, e.g. "SUM set 5"
        #[arg(required = true)]
        raw: Vec<String>,
    },

    /// Run the mock drivers through resolve, read/write and subscribe
    Demo {
        /// Driver options file (TOML)
        #[arg(long)]
        options: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LoggingConfig::from_level_name(&cli.log_level)?.with_format(cli.log_format))?;

    match cli.command {
        Commands::Parse { raw } => parse_channels(&raw),
        Commands::Demo { options } => run_demo(options),
    }
}

fn parse_channels(raw: &[String]) -> Result<()> {
    let mut rejected = 0;
    for input in raw {
        match ChannelKey::parse(input) {
            Ok(key) => println!(
                "{:?} -> {:?} (function {}, {} argument(s))",
                input,
                key.normalized(),
                key.function(),
                key.arguments().len()
            ),
            Err(e) => {
                rejected += 1;
                println!("{:?} -> rejected: {}", input, e);
            }
        }
    }
    if rejected > 0 {
        bail!("{} of {} identifier(s) rejected", rejected, raw.len());
    }
    Ok(())
}

fn run_demo(options_path: Option<PathBuf>) -> Result<()> {
    let options = DriverOptions::load(options_path.as_deref())
        .context("Failed to load driver options")?;
    info!(?options, "Driver options loaded");
    println!("Options: {:?}", options);
    println!();

    let hooks = InitHooks::new();

    // SUM accumulator
    let (sums, device) = sum_driver("SUMS", options);
    sums.register_after_init(&hooks);
    print_functions("SUMS", sums.handlers().functions());

    let one = sums.resolve("SUM 1")?;
    let set = sums.resolve("SUM set 5")?;
    let again = sums.resolve("SUM   1")?;
    println!("SUM 1 -> {}, SUM set 5 -> {}, \"SUM   1\" -> {}", one, set, again);

    let subscription = sums.subscribe::<Int32>(one)?;
    for value in [2, 3] {
        let reply = sums.write_int32(one, value);
        println!("write SUM 1 += {} -> {}", value, reply.status);
    }
    sums.write_int32(set, 10);
    println!("read SUM 1 -> {:?}", sums.read_int32(one).value);
    println!("read SUM set 5 -> {:?}", sums.read_int32(set).value);

    hooks.run();
    println!("init hook polling: {:?}", device.polling());
    println!("deliveries: {}", sums.host().deliveries().len());
    sums.unsubscribe::<Int32>(subscription)?;
    println!("interrupt transitions: {:?}", device.events());
    println!();

    // Test instrument
    let (instr, state) = instrument_driver("INSTR", options);
    print_functions("INSTR", instr.handlers().functions());

    let long = instr.resolve("LONG")?;
    let reply = instr.read_int32(long);
    println!("read LONG -> {:?} ({})", reply.value, reply.status);
    let reply = instr.write_int32(long, 1);
    println!("write LONG -> {} {:?}", reply.status, reply.alarm);

    let volts = instr.resolve("VOLTS")?;
    instr.write_float64(volts, 1.25);
    println!(
        "write VOLTS 1.25 -> setpoint {:?}, read -> {}",
        state.setpoint(),
        instr.read_float64(volts).status
    );

    let wave = instr.resolve("WAVE 6")?;
    let stream = instr.subscribe::<Float32Array>(wave)?;
    let mut samples = [0.0f32; 16];
    let reply = instr.read_float32_array(wave, &mut samples);
    let n = reply.value.unwrap_or(0);
    println!(
        "read {} -> {:?} (streaming: {})",
        instr.lookup(wave)?.key(),
        &samples[..n],
        state.streaming()
    );
    instr.unsubscribe::<Float32Array>(stream)?;

    let bits = instr.resolve("BITS")?;
    instr.write_uint32_digital(bits, 0xFF, 0x0F);
    println!(
        "write BITS 0xFF/0x0F -> register {:#06x}, read mask 0x03 -> {:?}",
        state.bits(),
        instr.read_uint32_digital(bits, 0x03).value
    );

    let name = instr.resolve("NAME")?;
    instr.write_octet(name, "demo-rig");
    let mut buf = [0u8; 32];
    let len = instr.read_octet(name, &mut buf).value.unwrap_or(0);
    println!("read NAME -> {:?}", String::from_utf8_lossy(&buf[..len]));

    Ok(())
}

fn print_functions(port: &str, mut functions: Vec<(&str, DataType)>) {
    functions.sort_by_key(|(name, _)| *name);
    let listed: Vec<String> = functions
        .iter()
        .map(|(name, data_type)| format!("{} ({})", name, data_type))
        .collect();
    println!("{}: {}", port, listed.join(", "));
}
