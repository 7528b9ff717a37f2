// src/main.rs
//
// CLI entrypoint for the greenwave benchmark harness.
//
// Constraints:
// - Config precedence: CLI overrides GREENWAVE_* env, which overrides the
//   optional --spec run spec, which overrides defaults.
// - Deterministic runs via --seed (run i uses seed + i - 1).
// - Print a concise run header (scenario, trials, cfg version/hash).
// - Per-trial failures degrade the sample count; only aggregation or
//   rendering failures abort.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, ValueEnum};

use greenwave::config::BenchConfig;
use greenwave::env::SimEnvFactory;
use greenwave::harness::BenchHarness;
use greenwave::logging::FileSink;
use greenwave::output::create_run_dirs;
use greenwave::policy::{LearnedPolicy, PolicyVariant};
use greenwave::report::{ConsoleRenderer, JsonRenderer, MarkdownRenderer};
use greenwave::scenario::RunSpec;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    /// Write both report.md and report.json.
    Both,
    Markdown,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "greenwave",
    about = "Learned vs fixed-time traffic-signal control benchmark",
    version
)]
struct Args {
    /// Optional YAML run spec.
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Trials per variant (K).
    #[arg(long)]
    trials: Option<usize>,

    /// Base seed; run i uses seed + i - 1.
    #[arg(long)]
    seed: Option<u64>,

    /// Signalised intersections (agents).
    #[arg(long)]
    agents: Option<usize>,

    /// Output directory for artifacts and reports.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Learned policy weights (JSON). Untrained fallback when omitted.
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Which report files to write (console summary always prints).
    #[arg(long, value_enum, default_value = "both")]
    format: FormatArg,

    /// Verbosity: -v per-run lines, -vv debug.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn main() {
    let args = Args::parse();

    // Defaults, then spec, then env, then CLI (highest precedence last).
    let mut cfg = BenchConfig::default();

    if let Some(spec_path) = &args.spec {
        match RunSpec::from_yaml_file(spec_path) {
            Ok(spec) => cfg.apply_spec(&spec),
            Err(e) => {
                eprintln!("{}", e);
                process::exit(2);
            }
        }
    }
    cfg.apply_env();

    if let Some(trials) = args.trials {
        cfg.trials = trials;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(agents) = args.agents {
        cfg.n_agents = agents;
    }
    if let Some(out_dir) = &args.out_dir {
        cfg.out_dir = out_dir.clone();
    }
    if let Some(weights) = &args.weights {
        cfg.weights_path = Some(weights.clone());
    }

    if let Err(e) = cfg.validate() {
        eprintln!("{}", e);
        process::exit(2);
    }

    let cfg_hash = fnv1a64(&format!("{cfg:?}"));
    println!(
        "greenwave | cfg={} | cfg_hash=0x{:016x} | scenario={} | trials={} | seed={} | agents={}",
        cfg.version, cfg_hash, cfg.scenario_id, cfg.trials, cfg.seed, cfg.n_agents
    );

    // Learned policy: load weights or fall back to the untrained head.
    let learned = match &cfg.weights_path {
        Some(path) => match LearnedPolicy::load(path) {
            Ok(policy) => {
                println!("policy={} agents={}", policy.version(), policy.agent_count());
                policy
            }
            Err(e) => {
                eprintln!("{}", e);
                process::exit(2);
            }
        },
        None => {
            eprintln!("no weights supplied; using untrained policy head");
            LearnedPolicy::untrained(cfg.n_agents, cfg.obs_dim, cfg.act_dim)
        }
    };

    // Output layout + adapter factory + sinks.
    let paths = match create_run_dirs(&cfg.out_dir) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("Failed to create output directory: {}", e);
            process::exit(1);
        }
    };
    let factory = SimEnvFactory::new(cfg.clone(), paths.raw_artifact.clone());

    let sink: Box<dyn greenwave::logging::TrialSink> = match FileSink::create(&paths.trial_log) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            eprintln!("Failed to create trial log: {}", e);
            process::exit(1);
        }
    };

    let report_md = paths.report_md.clone();
    let report_json = paths.report_json.clone();
    let mut harness = BenchHarness::new(
        cfg,
        paths,
        factory,
        PolicyVariant::Learned(learned),
    )
    .with_sink(sink)
    .with_verbosity(args.verbose)
    .with_renderer(Box::new(ConsoleRenderer));

    match args.format {
        FormatArg::Both => {
            harness = harness
                .with_renderer(Box::new(MarkdownRenderer {
                    path: report_md.clone(),
                }))
                .with_renderer(Box::new(JsonRenderer {
                    path: report_json.clone(),
                }));
        }
        FormatArg::Markdown => {
            harness = harness.with_renderer(Box::new(MarkdownRenderer {
                path: report_md.clone(),
            }));
        }
        FormatArg::Json => {
            harness = harness.with_renderer(Box::new(JsonRenderer {
                path: report_json.clone(),
            }));
        }
    }

    match harness.run() {
        Ok(_report) => {
            println!();
            println!("Output written to:");
            match args.format {
                FormatArg::Both => {
                    println!("  Markdown: {}", report_md.display());
                    println!("  JSON:     {}", report_json.display());
                }
                FormatArg::Markdown => println!("  Markdown: {}", report_md.display()),
                FormatArg::Json => println!("  JSON:     {}", report_json.display()),
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
