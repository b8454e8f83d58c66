//! Binary entrypoint that launches the market trends agent.

use std::process::ExitCode;

use market_trends_agent::start_market_trends_agent;

/// Start the agent prompt loop, or prune duplicate stores with `--prune-duplicates`.
fn main() -> ExitCode {
    start_market_trends_agent::run()
}
