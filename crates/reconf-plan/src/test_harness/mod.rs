//! Randomized end-to-end exercise of the plan machinery

mod generator;
mod simulator;

pub use generator::{GeneratorConfig, PlanGenerator, CPU};
pub use simulator::{
    run_simulator, NestingChecker, ShufflingVisitor, SimulationViolation, SimulatorConfig,
    SimulatorReport, SimulatorStats,
};
