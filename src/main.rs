use anyhow::Result;
use depthnet_eval::config::{Config, Task};
use depthnet_eval::eval::{measure_depth, measure_kp_error};
use depthnet_eval::pose::OnnxDepthNet;
use depthnet_eval::NpzDataProvider;

const CONFIG_PATH: &str = "eval.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_from_args(std::env::args().nth(1), CONFIG_PATH)?;
    let eval = &config.eval;
    let mode = eval.split()?;

    println!("=== depthnet-eval ({}) ===", env!("DEPTHNET_EVAL_VERSION"));
    println!("data:  {}", config.data.dir.display());
    println!("model: {}", config.model.path.display());
    println!("split: {}, grid: {}", mode, eval.grid);
    println!();

    let data = NpzDataProvider::new(&config.data.dir);
    let mut net = OnnxDepthNet::new(&config.model)?;

    if matches!(eval.task, Task::All | Task::Depth) {
        println!("--- depth ---");
        measure_depth(&mut net, &data, eval.grid, eval.dump_path.as_deref(), mode)?;
    }

    if matches!(eval.task, Task::All | Task::Keypoint) {
        println!("--- keypoint error ---");
        measure_kp_error(&mut net, &data, eval.grid, mode)?;
    }

    Ok(())
}
