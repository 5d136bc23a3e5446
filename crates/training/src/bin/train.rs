use clap::Parser;
use training::util::{init_tracing, run_train};
use training::TrainArgs;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = TrainArgs::parse();
    let summary = run_train(args)?;
    println!(
        "trained {} iterations ({} optimizer steps); best score {:?}",
        summary.iterations, summary.optimizer_steps, summary.best_score
    );
    Ok(())
}
