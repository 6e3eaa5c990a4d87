use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use mathcheck_core::{function_list, Precision};
use mathcheck_device::{Fault, HostDevice};
use mathcheck_harness::{Runner, TestConfig};
use mathcheck_tracing::{init_global_tracing, TracingConfig};

/// Brute-force ulp verification of OpenCL math builtins.
///
/// Every builtin is swept over its input domain on each vector width and
/// compared against a correctly rounded host reference. Exits non-zero if
/// any builtin fails.
#[derive(Parser, Debug)]
#[command(name = "mathcheck", version)]
struct Cli {
    /// Builtins to test (default: all)
    functions: Vec<String>,

    /// Sample the domain instead of sweeping all of it
    #[arg(short = 'w', long)]
    wimpy: bool,

    /// Wimpy reduction factor (1..=512)
    #[arg(long, value_name = "FACTOR")]
    wimpy_reduction: Option<u32>,

    /// Force flush-to-zero
    #[arg(short = 'z', long)]
    ftz: bool,

    /// Do not test relaxed-math variants
    #[arg(long)]
    no_relaxed: bool,

    /// Check derived relaxed builtins instead of skipping them
    #[arg(long)]
    check_derived: bool,

    /// Poison output buffers from the host instead of with a device fill
    #[arg(long)]
    host_fill: bool,

    /// Vector widths to test
    #[arg(long, value_delimiter = ',', value_name = "W,...")]
    widths: Option<Vec<u32>>,

    /// Worker threads (0 = one per core)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Seed for random inputs
    #[arg(long)]
    seed: Option<u64>,

    /// Use embedded profile tolerances
    #[arg(long)]
    embedded: bool,

    /// Launch kernels without checking results
    #[arg(short = 'l', long)]
    skip_correctness: bool,

    /// Stop at the first failing builtin
    #[arg(short = 's', long)]
    stop_on_error: bool,

    /// Precisions to test
    #[arg(short = 'p', long = "precision", value_enum)]
    precisions: Vec<PrecisionArg>,

    /// Log job geometry and per-job detail
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log only warnings and failures
    #[arg(short = 'q', long)]
    quiet: bool,

    /// List the builtins and exit
    #[arg(long)]
    list: bool,

    /// Host device: advertise no fp64 support
    #[arg(long)]
    no_fp64: bool,

    /// Host device: advertise no fp16 support
    #[arg(long)]
    no_fp16: bool,

    /// Host device: flush single precision denormals
    #[arg(long)]
    no_denormals: bool,

    /// Host device: embedded profile rounding single precision toward zero
    #[arg(long)]
    round_toward_zero: bool,

    /// Host device: inject an error, as FUNCTION:ELEMENT:ULPS
    #[arg(long, value_name = "SPEC")]
    fault: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PrecisionArg {
    Half,
    Float,
    Double,
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Half => Precision::Half,
            PrecisionArg::Float => Precision::Float,
            PrecisionArg::Double => Precision::Double,
        }
    }
}

fn parse_fault(spec: &str) -> Result<Fault> {
    let parts: Vec<&str> = spec.split(':').collect();
    let [function, element, ulps] = parts.as_slice() else {
        bail!("fault {spec:?} is not FUNCTION:ELEMENT:ULPS");
    };
    Ok(Fault::new(
        *function,
        element.parse().with_context(|| format!("element in fault {spec:?}"))?,
        ulps.parse().with_context(|| format!("ulps in fault {spec:?}"))?,
    ))
}

fn config_from(cli: &Cli) -> Result<TestConfig> {
    let mut config = TestConfig::from_env().context("reading MATHCHECK_* environment")?;
    config.wimpy |= cli.wimpy;
    config.force_ftz |= cli.ftz;
    config.host_fill |= cli.host_fill;
    config.embedded |= cli.embedded;
    config.skip_correctness |= cli.skip_correctness;
    config.stop_on_error |= cli.stop_on_error;
    config.verbose |= cli.verbose;
    if cli.no_relaxed {
        config.relaxed = false;
    }
    if cli.check_derived {
        config.fast_relaxed_derived = false;
    }
    if let Some(reduction) = cli.wimpy_reduction {
        config.wimpy_reduction = reduction;
    }
    if let Some(widths) = &cli.widths {
        config.vector_widths = widths.clone();
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if !cli.precisions.is_empty() {
        config.precisions = cli.precisions.iter().map(|&p| p.into()).collect();
    }
    config.functions = cli.functions.clone();
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list {
        for function in function_list() {
            let precisions: Vec<&str> = Precision::ALL
                .into_iter()
                .filter(|&p| function.supports(p))
                .map(Precision::type_name)
                .collect();
            println!("{:<16} {}", function.name, precisions.join(" "));
        }
        return Ok(());
    }

    let tracing_config = if cli.verbose {
        TracingConfig::for_verbose()
    } else if cli.quiet {
        TracingConfig::for_quiet()
    } else {
        TracingConfig::from_env()
    };
    init_global_tracing(&tracing_config)?;

    let config = config_from(&cli)?;
    for name in &config.functions {
        mathcheck_core::lookup(name)?;
    }

    let mut device = HostDevice::new();
    if cli.no_fp64 {
        device = device.without_fp64();
    }
    if cli.no_fp16 {
        device = device.without_fp16();
    }
    if cli.no_denormals {
        device = device.without_denormals();
    }
    if cli.round_toward_zero {
        device = device.round_toward_zero();
    }
    for spec in &cli.fault {
        device = device.with_fault(parse_fault(spec)?);
    }

    tracing::info!(
        device = %mathcheck_device::Device::info(&device).name,
        wimpy = config.wimpy,
        ftz = config.force_ftz,
        relaxed = config.relaxed,
        threads = config.worker_count(),
        widths = ?config.vector_widths,
        "starting"
    );

    let summary = Runner::new(&device, config)?.run_all()?;
    summary.log();
    println!("{summary}");

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
