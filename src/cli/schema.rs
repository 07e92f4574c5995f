use lobbybot::config;

/// Print the JSON Schema for `lobbybot.toml` to stdout.
pub fn run_schema() -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&config::schema())?;
    println!("{json}");
    Ok(())
}
