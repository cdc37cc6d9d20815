//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() -> eyre::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));
    poimark_cli::run()?;
    Ok(())
}
