use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use reconf_plan::applier::{DependencyBasedApplier, PlanApplier, TimeBasedApplier};
use reconf_plan::test_harness::{run_simulator, GeneratorConfig, PlanGenerator, SimulatorConfig};
use tracing_subscriber::EnvFilter;

fn shape_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("seed")
            .long("seed")
            .default_value("42")
            .value_parser(value_parser!(u64))
            .help("Random seed for reproducibility"),
    )
    .arg(
        Arg::new("nodes")
            .long("nodes")
            .default_value("5")
            .value_parser(value_parser!(u32))
            .help("Number of nodes per plan"),
    )
    .arg(
        Arg::new("vms")
            .long("vms")
            .default_value("8")
            .value_parser(value_parser!(u32))
            .help("Number of VMs per plan"),
    )
}

fn generator_config(args: &ArgMatches) -> anyhow::Result<(u64, GeneratorConfig)> {
    let seed = *args.get_one::<u64>("seed").context("missing --seed")?;
    let nodes = *args.get_one::<u32>("nodes").context("missing --nodes")?;
    let vms = *args.get_one::<u32>("vms").context("missing --vms")?;
    Ok((
        seed,
        GeneratorConfig::default().with_nodes(nodes).with_vms(vms),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Command::new("reconf-sim")
        .version(reconf_plan::VERSION)
        .about("Reconfiguration plan simulator")
        .subcommand_required(true)
        .subcommand(
            shape_args(Command::new("simulate").about("Generate plans and drive them end to end"))
                .arg(
                    Arg::new("plans")
                        .long("plans")
                        .default_value("100")
                        .value_parser(value_parser!(u64))
                        .help("Number of plans to generate"),
                )
                .arg(
                    Arg::new("max-in-flight")
                        .long("max-in-flight")
                        .default_value("0")
                        .value_parser(value_parser!(usize))
                        .help("Maximum number of concurrent effects, 0 for no limit"),
                )
                .arg(
                    Arg::new("keep-going")
                        .long("keep-going")
                        .action(ArgAction::SetTrue)
                        .help("Do not stop on the first violation"),
                ),
        )
        .subcommand(
            shape_args(Command::new("describe").about("Print one generated plan"))
                .arg(
                    Arg::new("by-dependencies")
                        .long("by-dependencies")
                        .action(ArgAction::SetTrue)
                        .help("Use the dependency-based applier"),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("simulate", args)) => {
            let (seed, generator) = generator_config(args)?;
            let plans = *args.get_one::<u64>("plans").context("missing --plans")?;
            let max_in_flight = *args
                .get_one::<usize>("max-in-flight")
                .context("missing --max-in-flight")?;

            let mut config = SimulatorConfig::default()
                .with_seed(seed)
                .with_plans(plans)
                .with_generator(generator)
                .with_max_in_flight(max_in_flight);
            config.stop_on_first_violation = !args.get_flag("keep-going");

            let report = run_simulator(config).await;
            println!("{}", report.generate_text());
            if !report.passed() {
                std::process::exit(1);
            }
        }
        Some(("describe", args)) => {
            let (seed, generator) = generator_config(args)?;
            let plan = PlanGenerator::new(seed, generator).generate();
            let applier: &dyn PlanApplier = if args.get_flag("by-dependencies") {
                &DependencyBasedApplier
            } else {
                &TimeBasedApplier
            };

            println!("{}", plan.origin());
            println!("--- {} ({} actions, duration {})", applier.name(), plan.size(), plan.duration());
            print!("{}", applier.describe(&plan));
            let result = applier.apply(&plan).context("plan is not applyable")?;
            println!("---\n{result}");
        }
        _ => unreachable!("a subcommand is required"),
    }
    Ok(())
}
