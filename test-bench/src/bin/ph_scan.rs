use anyhow::{Context, Result};
use clap::Parser;
use hardware::{BenchHvSupply, EmulatedReadout, HvSupply};
use shared::{DutConfig, RocConfig};
use std::path::PathBuf;
use test_bench::{CollectingSink, PulseHeightScan, TestParameters};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pulse-height scan against the emulated testboard", long_about = None)]
struct Args {
    #[arg(short, long, help = "Test parameter file")]
    params: PathBuf,

    #[arg(
        short,
        long,
        help = "Test name to run from the parameter file",
        default_value = "ph"
    )]
    test: String,

    #[arg(long, help = "Parameter overrides as name=value;name=value;...")]
    set: Option<String>,

    #[arg(long, help = "Number of ROCs on the emulated module", default_value = "1")]
    rocs: u8,

    #[arg(long, help = "Sensor bias voltage in volts", default_value = "150.0")]
    bias: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut parameters = TestParameters::from_file(&args.params)
        .with_context(|| format!("loading {}", args.params.display()))?;
    if let Some(overrides) = &args.set {
        if !parameters.merge_from_str(&args.test, overrides) {
            anyhow::bail!("test {:?} not present in {}", args.test, args.params.display());
        }
    }
    parameters.dump();

    let mut scan = PulseHeightScan::new(&args.test);
    scan.configure(&parameters);

    let roc_ids: Vec<u8> = (0..args.rocs).collect();
    let mut dut = DutConfig::new(roc_ids.iter().map(|&id| RocConfig::full(id)).collect())
        .context("assembling DUT configuration")?;
    let mut api = EmulatedReadout::new(roc_ids);
    let mut sink = CollectingSink::default();

    let mut supply = BenchHvSupply::new();
    supply
        .set_voltage(args.bias)
        .context("programming bias voltage")?;
    supply.hv_on().context("switching HV on")?;

    let summary = scan.run(&mut dut, &mut api, &mut sink)?;

    supply.hv_off().context("switching HV off")?;

    println!(
        "scan {:?}: {} triggers, {} histograms, {} readings filled, {} dropped, {} transient faults",
        scan.test_name(),
        summary.triggers,
        summary.histograms,
        summary.readings_filled,
        summary.readings_dropped,
        summary.transient_faults
    );
    for (_, histogram) in sink.received() {
        println!(
            "  {:<16} entries {:>6}  mean {:7.1}",
            histogram.name(),
            histogram.entries(),
            histogram.mean()
        );
    }
    if let Some(displayed) = sink.displayed() {
        println!("displayed: {displayed}");
    }

    Ok(())
}
