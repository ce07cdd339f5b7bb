//! `procuresense context`: build a layered context from fragment files.

use super::{BoxError, ContextInputs, Engine};
use procuresense_config::AppConfig;

pub fn run(config: &AppConfig, inputs: &ContextInputs, render: bool) -> Result<(), BoxError> {
    let engine = Engine::load(config)?;
    let context = engine.build_context(&inputs.load()?)?;

    if render {
        print!("{}", context.render());
    } else {
        println!("{}", serde_json::to_string_pretty(&context.metadata())?);
    }
    Ok(())
}
